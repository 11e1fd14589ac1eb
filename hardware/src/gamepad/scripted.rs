//! Replay of a recorded controller session.

use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Buttons, ControllerState, GamepadError, InputSource};

/// One entry of an input script: a state held for `repeat` polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFrame {
    #[serde(flatten)]
    pub state: ControllerState,
    #[serde(default = "default_repeat")]
    pub repeat: u32,
}

fn default_repeat() -> u32 {
    1
}

/// Input source that plays back a fixed sequence of states.
///
/// Once the script is exhausted the source reports a disconnected
/// controller (neutral state), or a Start press if built with
/// [`then_stop`](Self::then_stop) so a control loop shuts down cleanly.
///
/// # Example
///
/// ```
/// use hardware::gamepad::{Buttons, ControllerState, InputSource, ScriptedInput};
///
/// let mut input = ScriptedInput::new([
///     ControllerState::with_buttons(Buttons::DPAD_RIGHT),
///     ControllerState::NEUTRAL,
/// ]);
/// assert_eq!(input.poll().buttons, Buttons::DPAD_RIGHT);
/// assert_eq!(input.poll(), ControllerState::NEUTRAL);
/// assert!(!input.is_connected());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    frames: VecDeque<ControllerState>,
    stop_when_done: bool,
    polls: u64,
}

impl ScriptedInput {
    pub fn new(states: impl IntoIterator<Item = ControllerState>) -> Self {
        Self {
            frames: states.into_iter().collect(),
            stop_when_done: false,
            polls: 0,
        }
    }

    /// Expand frames with repeat counts into a flat script.
    pub fn from_frames(frames: &[ScriptFrame]) -> Self {
        Self::new(
            frames
                .iter()
                .flat_map(|f| std::iter::repeat(f.state).take(f.repeat as usize)),
        )
    }

    /// Load a JSON array of [`ScriptFrame`]s.
    ///
    /// ```json
    /// [
    ///   {"thumb_lx": 32767, "repeat": 10},
    ///   {"buttons": "DPAD_UP", "repeat": 200},
    ///   {}
    /// ]
    /// ```
    pub fn load(path: &Path) -> Result<Self, GamepadError> {
        let text = std::fs::read_to_string(path)?;
        let frames: Vec<ScriptFrame> = serde_json::from_str(&text)?;
        debug!("Loaded {} script frames from {}", frames.len(), path.display());
        Ok(Self::from_frames(&frames))
    }

    /// Report Start pressed once the script runs out.
    pub fn then_stop(mut self) -> Self {
        self.stop_when_done = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }

    /// Number of polls served so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) -> ControllerState {
        self.polls += 1;
        match self.frames.pop_front() {
            Some(state) => state,
            None if self.stop_when_done => ControllerState::with_buttons(Buttons::START),
            None => ControllerState::NEUTRAL,
        }
    }

    fn is_connected(&mut self) -> bool {
        !self.frames.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_expand_repeats() {
        let frames = [
            ScriptFrame {
                state: ControllerState::with_buttons(Buttons::X),
                repeat: 3,
            },
            ScriptFrame {
                state: ControllerState::NEUTRAL,
                repeat: 1,
            },
        ];
        let mut input = ScriptedInput::from_frames(&frames);
        assert_eq!(input.remaining(), 4);
        for _ in 0..3 {
            assert_eq!(input.poll().buttons, Buttons::X);
        }
        assert_eq!(input.poll(), ControllerState::NEUTRAL);
        assert_eq!(input.polls(), 4);
    }

    #[test]
    fn test_exhausted_script_is_neutral() {
        let mut input = ScriptedInput::new([]);
        assert_eq!(input.poll(), ControllerState::NEUTRAL);
        assert_eq!(input.poll(), ControllerState::NEUTRAL);
    }

    #[test]
    fn test_then_stop_presses_start() {
        let mut input = ScriptedInput::new([ControllerState::NEUTRAL]).then_stop();
        assert_eq!(input.poll(), ControllerState::NEUTRAL);
        assert_eq!(input.poll().buttons, Buttons::START);
    }

    #[test]
    fn test_parse_script_json() {
        let json = r#"[
            {"thumb_lx": 32767, "repeat": 2},
            {"buttons": "DPAD_UP"},
            {}
        ]"#;
        let frames: Vec<ScriptFrame> = serde_json::from_str(json).unwrap();
        let mut input = ScriptedInput::from_frames(&frames);
        assert_eq!(input.remaining(), 4);
        assert_eq!(input.poll().thumb_lx, 32767);
        assert_eq!(input.poll().thumb_lx, 32767);
        assert_eq!(input.poll().buttons, Buttons::DPAD_UP);
        assert_eq!(input.poll(), ControllerState::NEUTRAL);
    }
}
