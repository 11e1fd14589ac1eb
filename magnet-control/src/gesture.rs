//! Gesture state machine
//!
//! Buttons start and end the field gestures. The machine is pure: it maps the
//! current state and this poll's button mask to the next state and the action
//! the control loop must take. It never blocks on a held button; holding simply
//! keeps returning [`Transition::None`].
//!
//! ```text
//!            X alone                       all released
//!   Idle ───────────────► Spinning ───────────────────────► Idle
//!     │  one d-pad alone                  all released
//!     └─────────────────► Hopping(dir) ───────────────────► Idle
//!
//!   any state ── Start alone ──► Stopped (terminal)
//! ```

use hardware::gamepad::Buttons;
use serde::{Deserialize, Serialize};

use crate::waveform::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GestureState {
    /// Free joystick and trigger control.
    #[default]
    Idle,
    Spinning,
    Hopping(Direction),
    /// Start was pressed; the loop exits.
    Stopped,
}

/// Action the control loop takes on entering the next state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    StartSpin,
    StartHop(Direction),
    /// Spin released: reset X and Y.
    EndSpin,
    /// Hop released: reset X, Y and Z.
    EndHop(Direction),
    /// Reset every axis and stop.
    Stop,
}

impl GestureState {
    pub fn is_active(self) -> bool {
        matches!(self, GestureState::Spinning | GestureState::Hopping(_))
    }

    /// Next state for this poll's button mask.
    pub fn next(self, buttons: Buttons) -> (GestureState, Transition) {
        use GestureState::*;

        if self == Stopped {
            return (Stopped, Transition::None);
        }
        if buttons == Buttons::START {
            return (Stopped, Transition::Stop);
        }

        match self {
            Idle => {
                if buttons == Buttons::X {
                    (Spinning, Transition::StartSpin)
                } else if let Some(direction) = Direction::from_buttons(buttons) {
                    (Hopping(direction), Transition::StartHop(direction))
                } else {
                    (Idle, Transition::None)
                }
            }
            Spinning if buttons.is_empty() => (Idle, Transition::EndSpin),
            Hopping(direction) if buttons.is_empty() => (Idle, Transition::EndHop(direction)),
            // Held, or other buttons pressed mid-gesture
            active => (active, Transition::None),
        }
    }
}
