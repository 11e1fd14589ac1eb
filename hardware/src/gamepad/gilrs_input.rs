//! Physical controller input through `gilrs`.

use gilrs::{Axis, Button, EventType, GamepadId, Gilrs};
use tracing::{info, warn};

use super::{Buttons, ControllerState, GamepadError, InputSource, STICK_MAX, STICK_MIN};

const BUTTON_MAP: [(Button, Buttons); 14] = [
    (Button::DPadUp, Buttons::DPAD_UP),
    (Button::DPadDown, Buttons::DPAD_DOWN),
    (Button::DPadLeft, Buttons::DPAD_LEFT),
    (Button::DPadRight, Buttons::DPAD_RIGHT),
    (Button::Start, Buttons::START),
    (Button::Select, Buttons::BACK),
    (Button::LeftThumb, Buttons::LEFT_THUMB),
    (Button::RightThumb, Buttons::RIGHT_THUMB),
    (Button::LeftTrigger, Buttons::LEFT_SHOULDER),
    (Button::RightTrigger, Buttons::RIGHT_SHOULDER),
    // gilrs names face buttons by position; on an Xbox pad West is X
    (Button::South, Buttons::A),
    (Button::East, Buttons::B),
    (Button::West, Buttons::X),
    (Button::North, Buttons::Y),
];

/// First connected game controller, read through `gilrs`.
///
/// Follows the first pad that reports an event. If it disconnects, polls
/// return [`ControllerState::NEUTRAL`] until another pad shows up.
pub struct GilrsInput {
    gilrs: Gilrs,
    active: Option<GamepadId>,
}

impl GilrsInput {
    pub fn new() -> Result<Self, GamepadError> {
        let gilrs = Gilrs::new().map_err(|e| GamepadError::Backend(e.to_string()))?;
        let active = gilrs.gamepads().next().map(|(id, pad)| {
            info!("Using controller {} ({:?})", pad.name(), id);
            id
        });
        Ok(Self { gilrs, active })
    }

    fn pump_events(&mut self) {
        while let Some(event) = self.gilrs.next_event() {
            match event.event {
                EventType::Disconnected if self.active == Some(event.id) => {
                    warn!("Controller {:?} disconnected", event.id);
                    self.active = None;
                }
                EventType::Disconnected => {}
                _ => {
                    if self.active.is_none() {
                        info!("Using controller {:?}", event.id);
                        self.active = Some(event.id);
                    }
                }
            }
        }
    }
}

fn stick_to_raw(value: f32) -> i16 {
    let value = value.clamp(-1.0, 1.0) as f64;
    if value >= 0.0 {
        (value * STICK_MAX as f64).round() as i16
    } else {
        (value * -(STICK_MIN as f64)).round() as i16
    }
}

fn trigger_to_raw(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

impl InputSource for GilrsInput {
    fn poll(&mut self) -> ControllerState {
        self.pump_events();

        let Some(id) = self.active else {
            return ControllerState::NEUTRAL;
        };
        let pad = self.gilrs.gamepad(id);
        if !pad.is_connected() {
            return ControllerState::NEUTRAL;
        }

        let trigger = |button| {
            pad.button_data(button)
                .map(|data| trigger_to_raw(data.value()))
                .unwrap_or(0)
        };

        let buttons = BUTTON_MAP
            .iter()
            .filter(|(button, _)| pad.is_pressed(*button))
            .fold(Buttons::empty(), |acc, (_, flag)| acc | *flag);

        ControllerState {
            thumb_lx: stick_to_raw(pad.value(Axis::LeftStickX)),
            thumb_ly: stick_to_raw(pad.value(Axis::LeftStickY)),
            left_trigger: trigger(Button::LeftTrigger2),
            right_trigger: trigger(Button::RightTrigger2),
            buttons,
        }
    }

    fn is_connected(&mut self) -> bool {
        self.pump_events();
        self.active
            .map(|id| self.gilrs.gamepad(id).is_connected())
            .unwrap_or(false)
    }
}
