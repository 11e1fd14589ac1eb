//! Three-axis electromagnet field control from a game controller.
//!
//! The left stick steers the in-plane field, the triggers flip the Z field,
//! and buttons start gestures that play current lists on the supplies:
//!
//! - **X** held: rotate the field continuously ([`waveform::Composer::spin`])
//! - **D-pad** held: hop one step in that direction ([`waveform::Composer::hop`])
//! - **Start**: reset every supply and exit
//!
//! # Modules
//! - [`lut`] - cos/sin tables for one revolution
//! - [`waveform`] - spin, hop, and tracking commands
//! - [`dispatcher`] - per-axis workers and synchronized dispatch
//! - [`gesture`] - button state machine
//! - [`control`] - the poll loop
//! - [`config`] - session configuration
//! - [`session`] - opened supplies plus composer

pub mod axis;
pub mod config;
pub mod control;
pub mod dispatcher;
pub mod gesture;
pub mod lut;
pub mod session;
pub mod waveform;

pub use axis::{Axis, AxisSet};
pub use config::{ConfigOverrides, MagnetConfig};
pub use control::{ControlLoop, Step};
pub use dispatcher::{DispatchReport, Dispatcher, SkewCompensation};
pub use gesture::{GestureState, Transition};
pub use session::Session;
pub use waveform::{Composer, Direction};
