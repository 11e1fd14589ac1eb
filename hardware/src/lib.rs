//! Hardware drivers for the electromagnet bench.
//!
//! The bench steers a magnetic field with three orthogonal coil pairs, each
//! powered by a Kepco BOP supply in current mode, and is operated from a game
//! controller.
//!
//! # Modules
//! - [`kepco`] - SCPI encoding and serial/LAN links for the power supplies
//! - [`gamepad`] - controller state, input sources, and script replay
//!
//! # Features
//! - `gilrs` - physical game controller support through the `gilrs` crate

pub mod gamepad;
pub mod kepco;
