//! One Kepco BOP supply driving one field axis.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::link::{open_link, Descriptor, InstrumentLink, KepcoError, KepcoResult, LinkOptions};
use super::scpi::{self, EncodedCommand, FieldCommand};

/// Handle to one power supply.
///
/// Owns its link and its own command buffer. A supply whose link failed to
/// open is still constructed: every write then fails with
/// [`KepcoError::NotConnected`], which keeps a flaky axis from taking down the
/// other two.
pub struct PowerSupply {
    descriptor: String,
    link: Option<Box<dyn InstrumentLink>>,
    timeout: Duration,
    write_retries: u32,
    buffer: String,
}

impl PowerSupply {
    /// Open a supply from a resource descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`KepcoError::LinkUnavailable`] if no transport can handle the
    /// descriptor. A device that fails to open is logged and returned in the
    /// disconnected state instead.
    pub fn open(descriptor: &str, options: &LinkOptions) -> KepcoResult<Self> {
        let parsed = Descriptor::parse(descriptor)?;
        info!("Connecting to {} ({})", descriptor, parsed);

        let link = match open_link(&parsed, options) {
            Ok(link) => Some(link),
            Err(e) => {
                error!("{e}");
                None
            }
        };

        Ok(Self {
            descriptor: descriptor.to_string(),
            link,
            timeout: options.timeout,
            write_retries: 0,
            buffer: String::with_capacity(128),
        })
    }

    /// Wrap an already-open link.
    pub fn with_link(descriptor: impl Into<String>, link: impl InstrumentLink + 'static) -> Self {
        Self {
            descriptor: descriptor.into(),
            link: Some(Box::new(link)),
            timeout: super::link::DEFAULT_TIMEOUT,
            write_retries: 0,
            buffer: String::with_capacity(128),
        }
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> KepcoResult<()> {
        self.timeout = timeout;
        match self.link.as_mut() {
            Some(link) => Ok(link.set_timeout(timeout)?),
            None => Err(KepcoError::NotConnected(self.descriptor.clone())),
        }
    }

    /// Number of extra attempts after a failed write (default 0).
    pub fn set_write_retries(&mut self, retries: u32) {
        self.write_retries = retries;
    }

    /// Write one newline-terminated command line.
    pub fn execute(&mut self, line: &str) -> KepcoResult<()> {
        let Some(link) = self.link.as_mut() else {
            return Err(KepcoError::NotConnected(self.descriptor.clone()));
        };

        debug!("{} <- {:?}", self.descriptor, line.trim_end());

        let mut attempt = 0;
        loop {
            match link.write(line.as_bytes()) {
                Ok(_) => return Ok(()),
                Err(e) if attempt < self.write_retries => {
                    attempt += 1;
                    warn!(
                        "Write to {} failed ({e}), retry {attempt}/{}",
                        self.descriptor, self.write_retries
                    );
                }
                Err(source) => {
                    return Err(KepcoError::WriteFailed {
                        descriptor: self.descriptor.clone(),
                        source,
                    })
                }
            }
        }
    }

    /// Write the staging lines of a command, stopping at the first failure.
    pub fn stage(&mut self, command: &EncodedCommand) -> KepcoResult<()> {
        for line in &command.staging {
            self.execute(line)?;
        }
        Ok(())
    }

    /// Write the commit line of a command.
    pub fn commit(&mut self, command: &EncodedCommand) -> KepcoResult<()> {
        self.execute(&command.commit)
    }

    /// Write a whole command: staging lines, then the commit line.
    pub fn send(&mut self, command: &EncodedCommand) -> KepcoResult<()> {
        self.stage(command)?;
        self.commit(command)
    }

    /// Write one command in full. Resets and instant setpoints are rendered
    /// into the supply's own buffer; lists are encoded and sent line by line.
    pub fn apply(&mut self, command: &FieldCommand) -> KepcoResult<()> {
        match command {
            FieldCommand::Reset => self.reset(),
            FieldCommand::Instant {
                current,
                voltage_limit,
            } => self.set_current(*current, *voltage_limit),
            FieldCommand::List(_) => self.send(&command.encode()),
        }
    }

    /// Reset the supply (`*rst`).
    pub fn reset(&mut self) -> KepcoResult<()> {
        info!("Resetting {}", self.descriptor);
        self.buffer.clear();
        scpi::write_reset(&mut self.buffer);
        self.flush_buffer()
    }

    /// Set a constant current with a voltage limit and enable the output.
    pub fn set_current(&mut self, current: f64, voltage_limit: f64) -> KepcoResult<()> {
        self.buffer.clear();
        scpi::write_instant(&mut self.buffer, current, voltage_limit);
        self.flush_buffer()
    }

    fn flush_buffer(&mut self) -> KepcoResult<()> {
        let line = std::mem::take(&mut self.buffer);
        let result = self.execute(&line);
        self.buffer = line;
        result
    }
}

impl std::fmt::Debug for PowerSupply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerSupply")
            .field("descriptor", &self.descriptor)
            .field("connected", &self.is_connected())
            .field("timeout", &self.timeout)
            .field("write_retries", &self.write_retries)
            .finish()
    }
}
