//! Game controller input.
//!
//! The bench is operated from an Xbox-style controller. Controller state is
//! modelled on the XInput gamepad report: two signed 16-bit stick axes, two
//! 8-bit triggers, and a 16-bit button mask. Any backend that can fill a
//! [`ControllerState`] can drive the magnets through [`InputSource`].
//!
//! Backends:
//! - [`ScriptedInput`] - replays a recorded sequence of states (tests, dry runs)
//! - `GilrsInput` - physical controller via `gilrs` (feature `gilrs`)

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "gilrs")]
mod gilrs_input;
mod scripted;

#[cfg(feature = "gilrs")]
pub use gilrs_input::GilrsInput;
pub use scripted::{ScriptFrame, ScriptedInput};

/// Full-scale positive stick deflection.
pub const STICK_MAX: i16 = i16::MAX;

/// Full-scale negative stick deflection.
pub const STICK_MIN: i16 = i16::MIN;

/// Errors from controller backends.
#[derive(Error, Debug)]
pub enum GamepadError {
    #[error("Gamepad backend unavailable: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input script: {0}")]
    Script(#[from] serde_json::Error),
}

bitflags! {
    /// Button mask, bit-compatible with `XINPUT_GAMEPAD.wButtons`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Buttons: u16 {
        const DPAD_UP = 0x0001;
        const DPAD_DOWN = 0x0002;
        const DPAD_LEFT = 0x0004;
        const DPAD_RIGHT = 0x0008;
        const START = 0x0010;
        const BACK = 0x0020;
        const LEFT_THUMB = 0x0040;
        const RIGHT_THUMB = 0x0080;
        const LEFT_SHOULDER = 0x0100;
        const RIGHT_SHOULDER = 0x0200;
        const A = 0x1000;
        const B = 0x2000;
        const X = 0x4000;
        const Y = 0x8000;

        const DPAD = Self::DPAD_UP.bits()
            | Self::DPAD_DOWN.bits()
            | Self::DPAD_LEFT.bits()
            | Self::DPAD_RIGHT.bits();
    }
}

/// Snapshot of the controller at one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerState {
    /// Left stick X, -32768 (left) to 32767 (right)
    pub thumb_lx: i16,
    /// Left stick Y, -32768 (down) to 32767 (up)
    pub thumb_ly: i16,
    /// Left trigger pressure, 0-255
    pub left_trigger: u8,
    /// Right trigger pressure, 0-255
    pub right_trigger: u8,
    pub buttons: Buttons,
}

impl ControllerState {
    /// Sticks centred, triggers released, no buttons.
    pub const NEUTRAL: Self = Self {
        thumb_lx: 0,
        thumb_ly: 0,
        left_trigger: 0,
        right_trigger: 0,
        buttons: Buttons::empty(),
    };

    pub fn with_buttons(buttons: Buttons) -> Self {
        Self {
            buttons,
            ..Self::NEUTRAL
        }
    }

    pub fn with_stick(thumb_lx: i16, thumb_ly: i16) -> Self {
        Self {
            thumb_lx,
            thumb_ly,
            ..Self::NEUTRAL
        }
    }

    /// Left stick normalized to [-1, 1] on both axes.
    ///
    /// Each half of the range is scaled by its own full-scale value so that
    /// both -32768 and 32767 map exactly to ±1.
    pub fn left_stick(&self) -> (f64, f64) {
        (normalize_axis(self.thumb_lx), normalize_axis(self.thumb_ly))
    }
}

fn normalize_axis(raw: i16) -> f64 {
    if raw >= 0 {
        raw as f64 / STICK_MAX as f64
    } else {
        raw as f64 / -(STICK_MIN as f64)
    }
}

/// A polled source of controller state.
pub trait InputSource {
    /// Current controller state. Never blocks; a disconnected controller
    /// reports [`ControllerState::NEUTRAL`].
    fn poll(&mut self) -> ControllerState;

    /// Whether a controller is currently attached.
    fn is_connected(&mut self) -> bool;
}
