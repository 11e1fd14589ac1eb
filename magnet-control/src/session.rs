//! An open bench: three supplies behind a dispatcher, plus the waveform
//! composer built from the session config.

use hardware::kepco::{KepcoError, PowerSupply};
use thiserror::Error;
use tracing::{info, warn};

use crate::axis::{Axis, AxisSet};
use crate::config::{ConfigError, MagnetConfig};
use crate::dispatcher::{DispatchError, DispatchReport, Dispatcher};
use crate::lut::{LutError, TrigLut};
use crate::waveform::{Composer, Direction};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Lut(#[from] LutError),

    #[error("{axis} axis supply unavailable: {source}")]
    Link {
        axis: Axis,
        #[source]
        source: KepcoError,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type SessionResult<T> = Result<T, SessionError>;

pub struct Session {
    dispatcher: Dispatcher,
    composer: Composer,
}

impl Session {
    /// Open all three supplies and reset them.
    ///
    /// A descriptor no transport understands is fatal. A supply that fails to
    /// open is logged and kept; its writes fail for the rest of the session.
    pub fn open(config: &MagnetConfig) -> SessionResult<Self> {
        config.validate()?;
        let options = config.link_options();

        let open = |axis: Axis| -> SessionResult<PowerSupply> {
            let descriptor = config.effective_descriptor(axis);
            let mut supply = PowerSupply::open(&descriptor, &options)
                .map_err(|source| SessionError::Link { axis, source })?;
            if !supply.is_connected() {
                warn!("{axis} axis ({descriptor}) is not connected, its commands will fail");
            }
            supply.set_write_retries(config.write_retries);
            Ok(supply)
        };
        let supplies = AxisSet {
            x: open(Axis::X)?,
            y: open(Axis::Y)?,
            z: open(Axis::Z)?,
        };

        let session = Self::with_supplies(supplies, config)?;
        let report = session.reset_all();
        if !report.is_ok() {
            warn!("Startup reset incomplete ({} of 3 axes)", report.sent());
        }
        Ok(session)
    }

    /// Build a session around supplies that are already open. Nothing is
    /// written.
    pub fn with_supplies(
        supplies: AxisSet<PowerSupply>,
        config: &MagnetConfig,
    ) -> SessionResult<Self> {
        let lut = TrigLut::new(config.xy_current, config.steps)?;
        let composer = Composer::new(lut, config.z_current, config.voltage_limit, config.freq);
        let dispatcher = Dispatcher::new(supplies, config.skew)?;

        info!(
            "Session ready: xy={} A, z={} A, {} Hz, {} V, {} steps",
            config.xy_current, config.z_current, config.freq, config.voltage_limit, config.steps
        );

        Ok(Self {
            dispatcher,
            composer,
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Start a synchronized hop in `direction`.
    pub fn hop(&self, direction: Direction) -> DispatchReport {
        info!("Hop {direction}");
        self.dispatcher.dispatch(self.composer.hop(direction))
    }

    /// Start the rotating field.
    pub fn spin(&self) -> DispatchReport {
        info!("Spin at {} Hz", self.composer.freq());
        self.dispatcher.dispatch(self.composer.spin())
    }

    pub fn reset(&self, axes: &[Axis]) -> DispatchReport {
        self.dispatcher.reset(axes)
    }

    pub fn reset_all(&self) -> DispatchReport {
        self.dispatcher.reset_all()
    }
}
