//! Current waveforms for the field gestures
//!
//! # Hop
//!
//! A hop rolls a particle one step across the surface by rotating the
//! in-plane field through half a turn, pausing, and rotating on through the
//! second half. Over one period of `2N` list entries (dwell `1/(freq·N)`):
//!
//! ```text
//! entries      0 .. N/2    N/2 .. N       N .. 3N/2     3N/2 .. 2N
//! angle        θ (hold)    θ → θ+π        θ+π (hold)    θ+π → θ+2π
//! ```
//!
//! `θ` is set by the direction: right 0, up N/4, left N/2, down 3N/4 steps.
//! The Z coil flips sign every half period (two entries, dwell `1/freq`) so
//! its reversal lines up with the in-plane half-turn.
//!
//! # Spin
//!
//! The plain cos/sin tables played at dwell `1/(freq·N)` rotate the field
//! continuously at `freq` revolutions per second.

use hardware::gamepad::{Buttons, ControllerState};
use hardware::kepco::{FieldCommand, ListWaveform};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use crate::axis::AxisSet;
use crate::lut::TrigLut;

/// Trigger pressure above which the Z field is reversed.
pub const TRIGGER_THRESHOLD: u8 = 50;

/// Hop direction, in the plane of the X/Y coils.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Right,
    Up,
    Left,
    Down,
}

impl Direction {
    /// Table index of the hop's starting angle.
    pub fn start_offset(self, steps: usize) -> usize {
        match self {
            Direction::Right => 0,
            Direction::Up => steps / 4,
            Direction::Left => steps / 2,
            Direction::Down => steps * 3 / 4,
        }
    }

    /// The direction of a lone d-pad press, if exactly one d-pad button and
    /// nothing else is held.
    pub fn from_buttons(buttons: Buttons) -> Option<Self> {
        if buttons == Buttons::DPAD_RIGHT {
            Some(Direction::Right)
        } else if buttons == Buttons::DPAD_UP {
            Some(Direction::Up)
        } else if buttons == Buttons::DPAD_LEFT {
            Some(Direction::Left)
        } else if buttons == Buttons::DPAD_DOWN {
            Some(Direction::Down)
        } else {
            None
        }
    }
}

/// Expand one table into the `2N`-entry hop sequence starting at `start`.
///
/// `start` is reduced modulo the table length, so any offset is accepted;
/// [`Direction::start_offset`] yields the four canonical ones.
pub fn hop_samples(table: &[f64], start: usize) -> Vec<f64> {
    let n = table.len();
    if n == 0 {
        return Vec::new();
    }
    let s = start % n;
    let half = n / 2;

    (0..2 * n)
        .map(|i| {
            let idx = if i < half {
                s
            } else if i < n {
                (s + i - half) % n
            } else if i < n + half {
                (s + half) % n
            } else {
                (s + i - n) % n
            };
            table[idx]
        })
        .collect()
}

/// Builds every per-axis command the controller can ask for.
///
/// Holds the session's fixed parameters: the XY tables, Z current, voltage
/// limit, and gesture frequency.
#[derive(Debug, Clone)]
pub struct Composer {
    lut: TrigLut,
    z_current: f64,
    voltage_limit: f64,
    freq: f64,
}

impl Composer {
    pub fn new(lut: TrigLut, z_current: f64, voltage_limit: f64, freq: f64) -> Self {
        Self {
            lut,
            z_current,
            voltage_limit,
            freq,
        }
    }

    pub fn lut(&self) -> &TrigLut {
        &self.lut
    }

    pub fn xy_current(&self) -> f64 {
        self.lut.magnitude()
    }

    pub fn z_current(&self) -> f64 {
        self.z_current
    }

    pub fn voltage_limit(&self) -> f64 {
        self.voltage_limit
    }

    pub fn freq(&self) -> f64 {
        self.freq
    }

    /// Dwell per table step: one revolution takes `1/freq` seconds.
    pub fn step_dwell_s(&self) -> f64 {
        1.0 / self.freq / self.lut.steps() as f64
    }

    fn instant(&self, current: f64) -> FieldCommand {
        FieldCommand::Instant {
            current,
            voltage_limit: self.voltage_limit,
        }
    }

    fn endless(&self, values: Vec<f64>, dwell_s: f64) -> ListWaveform {
        ListWaveform {
            values,
            voltage_limit: self.voltage_limit,
            dwell_s,
            repeat_count: 0,
        }
    }

    /// In-plane field from the left stick: full deflection gives the full XY
    /// current on that axis.
    pub fn joystick(&self, pad: &ControllerState) -> (FieldCommand, FieldCommand) {
        let (x, y) = pad.left_stick();
        let xy = self.xy_current();
        (self.instant(x * xy), self.instant(y * xy))
    }

    /// Z field from the triggers: reversed while either trigger is pressed
    /// past the threshold.
    ///
    /// A right trigger sitting exactly on the threshold (with the left one
    /// released) leaves the Z supply untouched.
    pub fn trigger(&self, pad: &ControllerState) -> Option<FieldCommand> {
        let lt = pad.left_trigger;
        let rt = pad.right_trigger;
        if rt > TRIGGER_THRESHOLD || lt > TRIGGER_THRESHOLD {
            Some(self.instant(-self.z_current))
        } else if rt < TRIGGER_THRESHOLD {
            Some(self.instant(self.z_current))
        } else {
            None
        }
    }

    /// Continuous rotation on X and Y; Z is left alone.
    pub fn spin(&self) -> AxisSet<Option<FieldCommand>> {
        let dwell = self.step_dwell_s();
        AxisSet {
            x: Some(self.endless(self.lut.cos().to_vec(), dwell).into()),
            y: Some(self.endless(self.lut.sin().to_vec(), dwell).into()),
            z: None,
        }
    }

    /// Hop list for one in-plane table.
    pub fn hop_list(&self, table: &[f64], direction: Direction) -> ListWaveform {
        let start = direction.start_offset(table.len());
        self.endless(hop_samples(table, start), self.step_dwell_s())
    }

    /// Z square wave, one entry per half hop period.
    pub fn z_hop(&self) -> ListWaveform {
        self.endless(vec![self.z_current, -self.z_current], 1.0 / self.freq)
    }

    /// All three lists for a hop in `direction`.
    pub fn hop(&self, direction: Direction) -> AxisSet<Option<FieldCommand>> {
        AxisSet {
            x: Some(self.hop_list(self.lut.cos(), direction).into()),
            y: Some(self.hop_list(self.lut.sin(), direction).into()),
            z: Some(self.z_hop().into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lut::DEFAULT_STEPS;
    use approx::assert_relative_eq;
    use strum::IntoEnumIterator;

    fn composer() -> Composer {
        let lut = TrigLut::new(1.0, DEFAULT_STEPS).unwrap();
        Composer::new(lut, 0.5, 20.0, 2.0)
    }

    fn list(cmd: &Option<FieldCommand>) -> &ListWaveform {
        match cmd {
            Some(FieldCommand::List(list)) => list,
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_hop_phases_for_every_offset() {
        let lut = TrigLut::new(1.0, DEFAULT_STEPS).unwrap();
        let n = lut.steps();
        for table in [lut.cos(), lut.sin()] {
            for s in 0..n {
                let hop = hop_samples(table, s);
                assert_eq!(hop.len(), 2 * n);
                assert!(hop[..n / 2].iter().all(|&v| v == table[s]));
                assert!(hop[n..n + n / 2]
                    .iter()
                    .all(|&v| v == table[(s + n / 2) % n]));
            }
        }
    }

    #[test]
    fn test_hop_ramps_follow_the_table() {
        let table: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let hop = hop_samples(&table, 2);
        assert_eq!(
            hop,
            vec![
                2.0, 2.0, 2.0, 2.0, // hold θ
                2.0, 3.0, 4.0, 5.0, // θ → θ+π
                6.0, 6.0, 6.0, 6.0, // hold θ+π
                6.0, 7.0, 0.0, 1.0, // θ+π → θ+2π
            ]
        );
    }

    #[test]
    fn test_hop_offset_wraps() {
        let table: Vec<f64> = (0..8).map(|i| i as f64).collect();
        assert_eq!(hop_samples(&table, 10), hop_samples(&table, 2));
        assert!(hop_samples(&[], 3).is_empty());
    }

    #[test]
    fn test_direction_offsets() {
        assert_eq!(Direction::Right.start_offset(48), 0);
        assert_eq!(Direction::Up.start_offset(48), 12);
        assert_eq!(Direction::Left.start_offset(48), 24);
        assert_eq!(Direction::Down.start_offset(48), 36);
    }

    #[test]
    fn test_direction_from_buttons() {
        assert_eq!(
            Direction::from_buttons(Buttons::DPAD_RIGHT),
            Some(Direction::Right)
        );
        assert_eq!(Direction::from_buttons(Buttons::DPAD_UP), Some(Direction::Up));
        assert_eq!(
            Direction::from_buttons(Buttons::DPAD_LEFT),
            Some(Direction::Left)
        );
        assert_eq!(
            Direction::from_buttons(Buttons::DPAD_DOWN),
            Some(Direction::Down)
        );
        assert_eq!(
            Direction::from_buttons(Buttons::DPAD_UP | Buttons::DPAD_RIGHT),
            None
        );
        assert_eq!(Direction::from_buttons(Buttons::DPAD_UP | Buttons::A), None);
        assert_eq!(Direction::from_buttons(Buttons::empty()), None);
    }

    #[test]
    fn test_direction_names() {
        let names: Vec<String> = Direction::iter().map(|d| d.to_string()).collect();
        assert_eq!(names, vec!["right", "up", "left", "down"]);
    }

    #[test]
    fn test_hop_right_lists() {
        let c = composer();
        let hop = c.hop(Direction::Right);

        let x = list(&hop.x);
        let y = list(&hop.y);
        let z = list(&hop.z);

        assert_eq!(x.values.len(), 96);
        assert!(x.values[..24].iter().all(|&v| v == 1.0));
        assert!(y.values[..24].iter().all(|&v| v == 0.0));
        assert_eq!(z.values, vec![0.5, -0.5]);

        assert_relative_eq!(x.dwell_s, 1.0 / 2.0 / 48.0);
        assert_relative_eq!(y.dwell_s, 1.0 / 2.0 / 48.0);
        assert_relative_eq!(z.dwell_s, 0.5);

        for l in [x, y, z] {
            assert_eq!(l.repeat_count, 0);
            assert_eq!(l.voltage_limit, 20.0);
        }

        // X/Y list period equals the Z square wave period
        assert_relative_eq!(x.period_s(), z.period_s(), epsilon = 1e-12);
    }

    #[test]
    fn test_hop_up_starts_at_quarter_turn() {
        let c = composer();
        let hop = c.hop(Direction::Up);
        let x = list(&hop.x);
        let y = list(&hop.y);
        assert_relative_eq!(x.values[0], c.lut().cos()[12]);
        assert_relative_eq!(y.values[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(y.values[48], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spin_lists() {
        let c = composer();
        let spin = c.spin();
        assert!(spin.z.is_none());
        assert_eq!(list(&spin.x).values, c.lut().cos());
        assert_eq!(list(&spin.y).values, c.lut().sin());
        assert_relative_eq!(list(&spin.x).period_s(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_joystick_full_scale() {
        let c = composer();
        let (x, y) = c.joystick(&ControllerState::with_stick(32767, 0));
        assert_eq!(
            x,
            FieldCommand::Instant {
                current: 1.0,
                voltage_limit: 20.0
            }
        );
        assert_eq!(
            y,
            FieldCommand::Instant {
                current: 0.0,
                voltage_limit: 20.0
            }
        );

        let (x, _) = c.joystick(&ControllerState::with_stick(-32768, 0));
        assert_eq!(
            x,
            FieldCommand::Instant {
                current: -1.0,
                voltage_limit: 20.0
            }
        );
    }

    #[test]
    fn test_trigger_flips_z() {
        let c = composer();
        let pressed = |lt, rt| ControllerState {
            left_trigger: lt,
            right_trigger: rt,
            ..ControllerState::NEUTRAL
        };
        let z = |current| {
            Some(FieldCommand::Instant {
                current,
                voltage_limit: 20.0,
            })
        };

        assert_eq!(c.trigger(&pressed(0, 0)), z(0.5));
        assert_eq!(c.trigger(&pressed(0, 51)), z(-0.5));
        assert_eq!(c.trigger(&pressed(255, 0)), z(-0.5));
        assert_eq!(c.trigger(&pressed(50, 0)), z(0.5));
        assert_eq!(c.trigger(&pressed(0, 50)), None);
        assert_eq!(c.trigger(&pressed(51, 50)), z(-0.5));
    }
}
