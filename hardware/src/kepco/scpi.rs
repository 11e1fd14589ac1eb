//! SCPI command encoding for Kepco BOP supplies
//!
//! Only the handful of commands the magnet bench uses are encoded:
//!
//! ```text
//! func:mode curr;:curr <current>;:volt <voltageLimit>;:outp on      instant setpoint
//! list:cle;:list:dwel <dwell>;:func:mode curr;:volt <voltageLimit>  list setup
//! list:curr <v0>,<v1>,...,<v7>                                      list values (8 per line)
//! list:coun <count>;:outp on;:curr:mode list                        list activation
//! *rst                                                              reset
//! ```
//!
//! # Number rendering
//!
//! Currents and voltages are printed with six decimals and then cut to the
//! first [`VALUE_WIDTH`] characters: `1.0` becomes `1.000`, `-0.5` becomes
//! `-0.50`, `0.99997` becomes `0.999`. This is truncation, not rounding, and
//! it keeps each list chunk short enough for the supply's input buffer.
//! Dwell times are the exception and keep all six decimals; cutting
//! `0.010417` to `0.010` would shift the waveform period by 4%.
//!
//! # Staging and commit
//!
//! Every encoded command is split into *staging* lines, which only prepare
//! the supply (clearing and loading a list), and one *commit* line, whose
//! arrival changes the output. Multi-axis dispatch synchronizes only the
//! commit lines.

use std::fmt::Write;

/// Number of list values sent per `list:curr` line.
pub const LIST_CHUNK_LEN: usize = 8;

/// Characters kept when rendering a current or voltage value.
pub const VALUE_WIDTH: usize = 5;

/// Render a current/voltage value, truncated to [`VALUE_WIDTH`] characters.
///
/// ```
/// use hardware::kepco::format_value;
///
/// assert_eq!(format_value(1.0), "1.000");
/// assert_eq!(format_value(-0.5), "-0.50");
/// assert_eq!(format_value(0.99997), "0.999");
/// assert_eq!(format_value(20.0), "20.00");
/// ```
pub fn format_value(value: f64) -> String {
    let mut text = format!("{value:.6}");
    text.truncate(VALUE_WIDTH);
    text
}

/// Whether `value` keeps its full integer part when rendered by
/// [`format_value`]. Wider values lose their low digits and come out at a
/// tenth (or less) of their magnitude.
///
/// ```
/// use hardware::kepco::value_fits;
///
/// assert!(value_fits(-9999.0));
/// assert!(!value_fits(-10000.0));
/// assert!(!value_fits(123456.0));
/// ```
pub fn value_fits(value: f64) -> bool {
    format!("{value:.6}")
        .find('.')
        .is_some_and(|dot| dot <= VALUE_WIDTH)
}

/// Render a dwell time in seconds with six decimals.
pub fn format_dwell(dwell_s: f64) -> String {
    format!("{dwell_s:.6}")
}

/// A current list played back by the supply, one value per dwell period.
#[derive(Debug, Clone, PartialEq)]
pub struct ListWaveform {
    /// Current setpoints in amperes
    pub values: Vec<f64>,
    /// Compliance voltage limit in volts
    pub voltage_limit: f64,
    /// Time each value is held, in seconds
    pub dwell_s: f64,
    /// Number of passes through the list; 0 repeats until superseded
    pub repeat_count: u32,
}

impl ListWaveform {
    /// Total time of one pass through the list, in seconds.
    pub fn period_s(&self) -> f64 {
        self.dwell_s * self.values.len() as f64
    }
}

/// A single instruction for one power supply.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCommand {
    /// Constant current with a voltage limit, output enabled.
    Instant { current: f64, voltage_limit: f64 },
    /// Dwell-stepped current list.
    List(ListWaveform),
    /// `*rst`: output off, settings to power-on defaults.
    Reset,
}

impl FieldCommand {
    pub fn encode(&self) -> EncodedCommand {
        match self {
            FieldCommand::Instant {
                current,
                voltage_limit,
            } => encode_instant(*current, *voltage_limit),
            FieldCommand::List(list) => encode_list(
                &list.values,
                list.voltage_limit,
                list.dwell_s,
                list.repeat_count,
            ),
            FieldCommand::Reset => encode_reset(),
        }
    }
}

impl From<ListWaveform> for FieldCommand {
    fn from(list: ListWaveform) -> Self {
        FieldCommand::List(list)
    }
}

/// Newline-terminated command lines ready to be written to one supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCommand {
    /// Lines that prepare the supply without changing its output
    pub staging: Vec<String>,
    /// Line that changes the output
    pub commit: String,
}

impl EncodedCommand {
    /// All lines in write order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.staging
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.commit.as_str()))
    }

    /// Total encoded size in bytes.
    pub fn len(&self) -> usize {
        self.lines().map(str::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append an instant current setpoint line to `buf`.
pub fn write_instant(buf: &mut String, current: f64, voltage_limit: f64) {
    let _ = writeln!(
        buf,
        "func:mode curr;:curr {};:volt {};:outp on",
        format_value(current),
        format_value(voltage_limit)
    );
}

/// Append a reset line to `buf`.
pub fn write_reset(buf: &mut String) {
    buf.push_str("*rst\n");
}

pub fn encode_instant(current: f64, voltage_limit: f64) -> EncodedCommand {
    let mut commit = String::with_capacity(64);
    write_instant(&mut commit, current, voltage_limit);
    EncodedCommand {
        staging: Vec::new(),
        commit,
    }
}

pub fn encode_reset() -> EncodedCommand {
    let mut commit = String::with_capacity(8);
    write_reset(&mut commit);
    EncodedCommand {
        staging: Vec::new(),
        commit,
    }
}

/// Encode a current list: setup line, value chunks, activation line.
///
/// The values are split into lines of at most [`LIST_CHUNK_LEN`] entries
/// because the supply rejects overly long command lines.
pub fn encode_list(
    values: &[f64],
    voltage_limit: f64,
    dwell_s: f64,
    repeat_count: u32,
) -> EncodedCommand {
    let mut staging = Vec::with_capacity(1 + values.len().div_ceil(LIST_CHUNK_LEN));

    staging.push(format!(
        "list:cle;:list:dwel {};:func:mode curr;:volt {}\n",
        format_dwell(dwell_s),
        format_value(voltage_limit)
    ));

    for chunk in values.chunks(LIST_CHUNK_LEN) {
        let rendered: Vec<String> = chunk.iter().map(|&v| format_value(v)).collect();
        staging.push(format!("list:curr {}\n", rendered.join(",")));
    }

    EncodedCommand {
        staging,
        commit: format!("list:coun {repeat_count};:outp on;:curr:mode list\n"),
    }
}
