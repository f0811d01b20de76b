//! Hardware abstraction traits for the Prawn Digital Output sequencer
//!
//! This crate provides trait-based abstractions for the peripherals the
//! firmware drives, enabling development and testing without a board.
//!
//! # Architecture Layers
//!
//! ```text
//! Application Layer (firmware crate: protocol, controller, program store)
//!         ↓
//! Platform traits (this crate)
//!         ↓
//! Hardware Layer (embassy-rp PIO / DMA / PAC)
//! ```
//!
//! # Abstractions
//!
//! - [`SerialTransport`] - line-oriented command channel plus raw binary reads
//! - [`PulseSequencer`] - streams instruction words to the output pins
//! - [`ClockControl`] - system PLL, external reference and frequency counter
//! - [`Board`] - output readback, activity LED and bootloader entry
//!
//! # Features
//!
//! - `std`: Enable standard library support and the [`mocks`] module
//! - `pico2`: Select Pico 2 board limits in [`config`]
//! - `defmt`: Enable defmt formatting for public types

// ── Lint policy ─────────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)] // no .unwrap() in production code
#![deny(clippy::expect_used)] // no .expect() in production code
#![deny(clippy::panic)] // no panic!() in production code
#![deny(clippy::unreachable)] // no unreachable!() that isn't documented
#![deny(unused_must_use)]
// all Results must be handled
// ────────────────────────────────────────────────────────────────────────────
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![allow(clippy::doc_markdown)] // register names in doc comments
#![allow(clippy::must_use_candidate)] // hardware accessors, callers decide
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(async_fn_in_trait)] // Embassy no_std: single-threaded, Send bounds not needed

pub mod board;
pub mod clock;
pub mod config;
pub mod sequencer;
pub mod serial;

#[cfg(any(test, feature = "std"))]
pub mod mocks;

pub use board::Board;
pub use clock::{sys_pll_params, ClockControl, ClockDomain, ClockError, ClockSource, PllParams};
pub use config::{BoardModel, BOARD};
pub use sequencer::{PulseSequencer, SequencerError};
pub use serial::{IoTransport, IoTransportError, SerialTransport};
