//! Prawn Digital Output Firmware
//!
//! Pulse-train sequencer firmware for the Raspberry Pi Pico: a host uploads a
//! program of `(output, duration)` instructions over a serial line and the
//! device replays it on 16 output pins through a PIO state machine fed by
//! DMA.
//!
//! # Architecture
//!
//! ```text
//! Core 0: Dispatcher (protocol)  ──Request──►  Core 1: ExecutionController
//!            │       ▲                                    │
//!            │       └──────────Diagnostic────────────────┤
//!            ▼                                            ▼
//!   InstructionStore / RunStatus / ClockManager (shared)  PulseSequencer
//!         ↓
//! Platform traits (platform crate)
//!         ↓
//! Hardware (embassy-rp PIO, DMA, PAC)  |  Emulator (stdio, timed model)
//! ```
//!
//! # Features
//!
//! - `hardware` - Build for RP2040 (embassy-rp, PIO, defmt)
//! - `emulator` - Build the desktop emulator (tokio, tracing)
//! - `pico2` - Pico 2 board limits
//! - `std` - Enable standard library (for emulator and testing)
//!
//! # Examples
//!
//! ## Hardware Target
//!
//! ```bash
//! cargo build --release --target thumbv6m-none-eabi --features hardware --bin firmware
//! ```
//!
//! ## Emulator Target
//!
//! ```bash
//! cargo run --features emulator --bin emulator
//! ```

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]
// Upgrade relevant warns to deny; keep pedantic as warn (too noisy for firmware)
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Critical correctness: deny these
#![deny(clippy::await_holding_lock)] // holding a blocking Mutex across .await is a bug
#![deny(unsafe_op_in_unsafe_fn)]
// unsafe fn body is not implicitly unsafe block
// Logging discipline
#![warn(clippy::print_stdout)] // prefer tracing/defmt over println! in lib code
#![warn(clippy::dbg_macro)] // dbg! should not be left in committed code
// Intentional allows for this codebase:
#![allow(clippy::module_name_repetitions)] // common in Rust crates; not a real issue
#![allow(clippy::missing_errors_doc)] // most errors are self-explanatory
// Pedantic lints too noisy for firmware application code:
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::unused_async)]

pub mod boot;
pub mod clock;
pub mod controller;
pub mod program;
pub mod protocol;
pub mod shared;
pub mod status;

#[cfg(feature = "hardware")]
pub mod hardware;

#[cfg(feature = "emulator")]
pub mod emulator;

// Re-export key types
pub use clock::{ClockConfig, ClockManager};
pub use controller::{Diagnostic, ExecutionController, Request};
pub use program::{Instruction, InstructionStore, StoreError, MAX_INSTRUCTIONS};
pub use protocol::{Command, CommandError, Dispatcher};
pub use shared::Shared;
pub use status::{RunStatus, SharedState};
