//! Kepco BOP bipolar power supply driver.
//!
//! The magnet bench runs three BOP supplies in current mode, one per field
//! axis. Each supply is written open-loop over its own serial (or LAN) link
//! using a small SCPI subset; nothing is ever read back.
//!
//! # Example
//!
//! ```no_run
//! use hardware::kepco::{LinkOptions, PowerSupply};
//!
//! let mut supply = PowerSupply::open("ASRL3::INSTR", &LinkOptions::default())?;
//! supply.reset()?;
//! supply.set_current(0.5, 20.0)?;
//! # Ok::<(), hardware::kepco::KepcoError>(())
//! ```

mod link;
mod mock;
mod scpi;
mod supply;

pub use link::{
    open_link, Descriptor, InstrumentLink, KepcoError, KepcoResult, LinkOptions, SerialLink,
    TcpLink, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT,
};
pub use mock::{MockLink, RecordedWrite};
pub use scpi::{
    encode_instant, encode_list, encode_reset, format_dwell, format_value, value_fits,
    write_instant, write_reset, EncodedCommand, FieldCommand, ListWaveform, LIST_CHUNK_LEN,
    VALUE_WIDTH,
};
pub use supply::PowerSupply;
