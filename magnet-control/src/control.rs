//! The control loop: poll the controller, track the sticks and triggers, and
//! drive the gesture state machine.
//!
//! One iteration is one poll. While no gesture is running the left stick and
//! triggers are written straight to the supplies as instant setpoints. Gesture
//! buttons are evaluated on the same poll; a held button produces no new
//! commands and no busy wait.

use std::time::Duration;

use hardware::gamepad::{ControllerState, InputSource};
use hardware::kepco::FieldCommand;
use tracing::{debug, info, warn};

use crate::axis::{Axis, AxisSet};
use crate::gesture::{GestureState, Transition};
use crate::session::Session;
use crate::waveform::Composer;

/// Whether the loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stopped,
}

/// Instant setpoints for the stick (X, Y) and triggers (Z).
pub fn tracking_commands(
    pad: &ControllerState,
    composer: &Composer,
) -> AxisSet<Option<FieldCommand>> {
    let (x, y) = composer.joystick(pad);
    AxisSet {
        x: Some(x),
        y: Some(y),
        z: composer.trigger(pad),
    }
}

pub struct ControlLoop<I: InputSource> {
    session: Session,
    input: I,
    state: GestureState,
    poll_interval: Duration,
    iterations: u64,
}

impl<I: InputSource> ControlLoop<I> {
    pub fn new(session: Session, input: I) -> Self {
        Self {
            session,
            input,
            state: GestureState::Idle,
            poll_interval: Duration::ZERO,
            iterations: 0,
        }
    }

    /// Sleep between polls (default none).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn state(&self) -> GestureState {
        self.state
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Poll once and act on it.
    pub fn step(&mut self) -> Step {
        if self.state == GestureState::Stopped {
            return Step::Stopped;
        }

        let pad = self.input.poll();
        self.iterations += 1;

        if self.state == GestureState::Idle {
            let commands = tracking_commands(&pad, self.session.composer());
            debug!(
                "Tracking stick ({}, {}) triggers ({}, {})",
                pad.thumb_lx, pad.thumb_ly, pad.left_trigger, pad.right_trigger
            );
            self.session.dispatcher().apply(commands);
        }

        let (next, transition) = self.state.next(pad.buttons);
        if next != self.state {
            info!("Gesture {:?} -> {:?}", self.state, next);
        }
        self.state = next;

        match transition {
            Transition::None => {}
            Transition::StartSpin => {
                self.session.spin();
            }
            Transition::StartHop(direction) => {
                self.session.hop(direction);
            }
            Transition::EndSpin => {
                self.session.reset(&Axis::XY);
            }
            Transition::EndHop(_) => {
                self.session.reset_all();
            }
            Transition::Stop => {
                info!("Start pressed, resetting all axes");
                self.session.reset_all();
            }
        }

        match self.state {
            GestureState::Stopped => Step::Stopped,
            _ => Step::Continue,
        }
    }

    /// Run until Start is pressed. Returns the number of polls.
    pub fn run(&mut self) -> u64 {
        if !self.input.is_connected() {
            warn!("No controller connected, sticks read as neutral until one appears");
        }

        while self.step() == Step::Continue {
            if !self.poll_interval.is_zero() {
                std::thread::sleep(self.poll_interval);
            }
        }

        info!("Control loop stopped after {} polls", self.iterations);
        self.iterations
    }

    pub fn into_session(self) -> Session {
        self.session
    }
}
