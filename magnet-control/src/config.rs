//! Session configuration.
//!
//! A session is described by a [`MagnetConfig`], read from an optional JSON
//! file and then overridden field by field from the command line. The result
//! is validated once and never changes for the life of the session.

use std::ops::Index;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use hardware::kepco::{value_fits, LinkOptions, DEFAULT_BAUD_RATE, VALUE_WIDTH};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::axis::Axis;
use crate::dispatcher::SkewCompensation;
use crate::lut::DEFAULT_STEPS;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Resource descriptor per axis supply. Axes missing from a config file keep
/// the bench defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Descriptors {
    pub x: String,
    pub y: String,
    pub z: String,
}

impl Default for Descriptors {
    fn default() -> Self {
        Self {
            x: "ASRL3::INSTR".to_string(),
            y: "ASRL4::INSTR".to_string(),
            z: "ASRL5::INSTR".to_string(),
        }
    }
}

impl Descriptors {
    /// `(axis, descriptor)` pairs in X, Y, Z order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &str)> {
        [
            (Axis::X, self.x.as_str()),
            (Axis::Y, self.y.as_str()),
            (Axis::Z, self.z.as_str()),
        ]
        .into_iter()
    }
}

impl Index<Axis> for Descriptors {
    type Output = String;

    fn index(&self, axis: Axis) -> &String {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }
}

/// Everything needed to open the bench and drive the gestures.
///
/// # Example
///
/// ```
/// use magnet_control::config::MagnetConfig;
///
/// let config: MagnetConfig = serde_json::from_str(r#"{"freq": 2.0}"#).unwrap();
/// assert_eq!(config.freq, 2.0);
/// assert_eq!(config.xy_current, 1.0);
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnetConfig {
    pub descriptors: Descriptors,
    /// Peak in-plane current (A).
    pub xy_current: f64,
    /// Z coil current (A).
    pub z_current: f64,
    /// Gesture frequency (Hz): one spin revolution or one hop per period.
    pub freq: f64,
    /// Supply voltage limit (V).
    pub voltage_limit: f64,
    /// Table steps per revolution.
    pub steps: usize,
    pub skew: SkewCompensation,
    /// Link write timeout (ms).
    pub timeout_ms: u64,
    pub baud_rate: u32,
    /// Extra attempts after a failed write.
    pub write_retries: u32,
    /// Use recording links instead of the real supplies.
    pub dry_run: bool,
}

impl Default for MagnetConfig {
    fn default() -> Self {
        Self {
            descriptors: Descriptors::default(),
            xy_current: 1.0,
            z_current: 0.5,
            freq: 1.0,
            voltage_limit: 20.0,
            steps: DEFAULT_STEPS,
            skew: SkewCompensation::default(),
            timeout_ms: 5000,
            baud_rate: DEFAULT_BAUD_RATE,
            write_retries: 0,
            dry_run: false,
        }
    }
}

impl MagnetConfig {
    /// Load a config file; fields missing from the file keep their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let io_err = |source: std::io::Error| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(io_err)
    }

    /// Check the numeric fields for values the bench cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |field: &'static str, reason: &str| -> ConfigResult<()> {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };

        if !self.freq.is_finite() || self.freq <= 0.0 {
            return invalid("freq", "must be a positive number of Hz");
        }
        if !self.xy_current.is_finite() {
            return invalid("xy_current", "must be finite");
        }
        if !self.z_current.is_finite() {
            return invalid("z_current", "must be finite");
        }
        if !self.voltage_limit.is_finite() || self.voltage_limit < 0.0 {
            return invalid("voltage_limit", "must be a non-negative number of volts");
        }

        // Both signs of each current go on the wire
        let too_wide = format!("integer part must fit in {VALUE_WIDTH} characters");
        if !value_fits(-self.xy_current.abs()) {
            return invalid("xy_current", &too_wide);
        }
        if !value_fits(-self.z_current.abs()) {
            return invalid("z_current", &too_wide);
        }
        if !value_fits(self.voltage_limit) {
            return invalid("voltage_limit", &too_wide);
        }
        if self.steps == 0 || self.steps % 4 != 0 {
            return invalid("steps", "must be a positive multiple of 4");
        }
        if self.timeout_ms == 0 {
            return invalid("timeout_ms", "must be non-zero");
        }
        for (axis, descriptor) in self.descriptors.iter() {
            if descriptor.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "descriptors",
                    reason: format!("{axis} axis descriptor is empty"),
                });
            }
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            timeout: self.timeout(),
            baud_rate: self.baud_rate,
        }
    }

    /// Descriptor actually opened for `axis`: a mock resource in dry-run mode.
    pub fn effective_descriptor(&self, axis: Axis) -> String {
        if self.dry_run {
            format!("MOCK::{axis}")
        } else {
            self.descriptors[axis].clone()
        }
    }
}

/// Command-line overrides for [`MagnetConfig`] fields.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// X axis supply descriptor (e.g. ASRL3::INSTR)
    #[arg(long)]
    pub x_port: Option<String>,

    /// Y axis supply descriptor
    #[arg(long)]
    pub y_port: Option<String>,

    /// Z axis supply descriptor
    #[arg(long)]
    pub z_port: Option<String>,

    /// Peak XY current in amperes
    #[arg(long)]
    pub xy_current: Option<f64>,

    /// Z current in amperes
    #[arg(long)]
    pub z_current: Option<f64>,

    /// Gesture frequency in Hz
    #[arg(short, long)]
    pub freq: Option<f64>,

    /// Supply voltage limit in volts
    #[arg(long)]
    pub voltage: Option<f64>,

    /// Table steps per revolution (multiple of 4)
    #[arg(long)]
    pub steps: Option<usize>,

    /// Commit delay for X in synchronized dispatch (ms)
    #[arg(long)]
    pub skew_x_ms: Option<u64>,

    /// Commit delay for Y in synchronized dispatch (ms)
    #[arg(long)]
    pub skew_y_ms: Option<u64>,

    /// Commit delay for Z in synchronized dispatch (ms)
    #[arg(long)]
    pub skew_z_ms: Option<u64>,

    /// Link write timeout in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Serial baud rate
    #[arg(long)]
    pub baud: Option<u32>,

    /// Extra attempts after a failed write
    #[arg(long)]
    pub retries: Option<u32>,

    /// Log commands instead of sending them to the supplies
    #[arg(long)]
    pub dry_run: bool,
}

impl ConfigOverrides {
    /// Overwrite every field of `config` that was given on the command line.
    pub fn apply_to(&self, config: &mut MagnetConfig) {
        if let Some(d) = &self.x_port {
            config.descriptors.x = d.clone();
        }
        if let Some(d) = &self.y_port {
            config.descriptors.y = d.clone();
        }
        if let Some(d) = &self.z_port {
            config.descriptors.z = d.clone();
        }
        if let Some(v) = self.xy_current {
            config.xy_current = v;
        }
        if let Some(v) = self.z_current {
            config.z_current = v;
        }
        if let Some(v) = self.freq {
            config.freq = v;
        }
        if let Some(v) = self.voltage {
            config.voltage_limit = v;
        }
        if let Some(v) = self.steps {
            config.steps = v;
        }
        if let Some(v) = self.skew_x_ms {
            config.skew.x_ms = v;
        }
        if let Some(v) = self.skew_y_ms {
            config.skew.y_ms = v;
        }
        if let Some(v) = self.skew_z_ms {
            config.skew.z_ms = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.baud {
            config.baud_rate = v;
        }
        if let Some(v) = self.retries {
            config.write_retries = v;
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }

    /// Defaults, then the file at `path` if given, then these overrides.
    pub fn resolve(&self, path: Option<&Path>) -> ConfigResult<MagnetConfig> {
        let mut config = match path {
            Some(path) => MagnetConfig::load(path)?,
            None => MagnetConfig::default(),
        };
        self.apply_to(&mut config);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = MagnetConfig::default();
        config.validate().unwrap();
        assert_eq!(config.descriptors.y, "ASRL4::INSTR");
        assert_eq!(config.steps, 48);
        assert_eq!(config.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"z_current": 0.8, "skew": {{"y_ms": 5}}, "descriptors": {{"x": "COM7", "y": "COM8", "z": "COM9"}}}}"#
        )
        .unwrap();

        let config = MagnetConfig::load(file.path()).unwrap();
        assert_eq!(config.z_current, 0.8);
        assert_eq!(config.skew.y_ms, 5);
        assert_eq!(config.skew.x_ms, 57);
        assert_eq!(config.descriptors.z, "COM9");
        assert_eq!(config.freq, 1.0);
    }

    #[test]
    fn test_single_descriptor_keeps_other_defaults() {
        let config: MagnetConfig =
            serde_json::from_str(r#"{"descriptors": {"z": "COM9"}}"#).unwrap();
        assert_eq!(config.descriptors.x, "ASRL3::INSTR");
        assert_eq!(config.descriptors.y, "ASRL4::INSTR");
        assert_eq!(config.descriptors.z, "COM9");
        assert_eq!(config.descriptors[Axis::Z], "COM9");
        config.validate().unwrap();
    }

    #[test]
    fn test_values_too_wide_for_the_wire() {
        let cases = [
            MagnetConfig {
                voltage_limit: 123456.0,
                ..Default::default()
            },
            MagnetConfig {
                xy_current: 10000.0,
                ..Default::default()
            },
            MagnetConfig {
                z_current: -10000.0,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "{config:?}"
            );
        }

        let widest = MagnetConfig {
            xy_current: 9999.0,
            voltage_limit: 99999.0,
            ..Default::default()
        };
        widest.validate().unwrap();
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let config = MagnetConfig {
            freq: 3.5,
            dry_run: true,
            ..MagnetConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(MagnetConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_bad_json_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = MagnetConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn test_missing_file() {
        let err = MagnetConfig::load(Path::new("/no/such/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            MagnetConfig {
                freq: 0.0,
                ..Default::default()
            },
            MagnetConfig {
                freq: f64::NAN,
                ..Default::default()
            },
            MagnetConfig {
                xy_current: f64::INFINITY,
                ..Default::default()
            },
            MagnetConfig {
                steps: 50,
                ..Default::default()
            },
            MagnetConfig {
                steps: 0,
                ..Default::default()
            },
            MagnetConfig {
                timeout_ms: 0,
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid { .. })),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_overrides_win_over_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"freq": 2.0, "xy_current": 1.5}}"#).unwrap();

        let overrides = ConfigOverrides {
            freq: Some(4.0),
            y_port: Some("TCPIP0::10.0.0.9::5025::SOCKET".to_string()),
            skew_x_ms: Some(0),
            dry_run: true,
            ..Default::default()
        };
        let config = overrides.resolve(Some(file.path())).unwrap();

        assert_eq!(config.freq, 4.0);
        assert_eq!(config.xy_current, 1.5);
        assert_eq!(config.descriptors.y, "TCPIP0::10.0.0.9::5025::SOCKET");
        assert_eq!(config.skew.x_ms, 0);
        assert!(config.dry_run);
        assert_eq!(config.effective_descriptor(Axis::Z), "MOCK::Z");
    }

    #[test]
    fn test_resolve_validates() {
        let overrides = ConfigOverrides {
            steps: Some(30),
            ..Default::default()
        };
        assert!(overrides.resolve(None).is_err());
    }
}
