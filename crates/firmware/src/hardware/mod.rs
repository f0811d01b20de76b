//! RP2040 implementations of the platform traits
//!
//! | Trait | Implementation | Resources |
//! |---|---|---|
//! | `PulseSequencer` | [`RpSequencer`] | PIO0 SM0, DMA CH0, GP0–GP15 out, GP22 trigger |
//! | `ClockControl` | [`RpClockControl`] | PLL_SYS, clk_sys mux, GPIN0 on GP20, FC0 |
//! | `Board` | [`RpBoard`] | GP25 LED, SIO input bank, boot ROM |
//! | `SerialTransport` | `IoTransport<BufferedUart>` | UART0 on GP16/GP17 |
//!
//! The shared state is a single static so the clock resuscitation interrupt
//! can reach it.

pub mod board;
pub mod clock;
pub mod sequencer;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

pub use board::RpBoard;
pub use clock::{enable_resuscitation, RpClockControl};
pub use sequencer::RpSequencer;

use crate::program::MAX_INSTRUCTIONS;
use crate::shared::Shared;

/// Shared state type on the board: both cores go through critical sections.
pub type HwShared = Shared<CriticalSectionRawMutex, RpClockControl, MAX_INSTRUCTIONS>;

/// The one instance of the cross-core state.
pub static SHARED: HwShared = Shared::new(RpClockControl::new());

/// UART baud rate of the host link.
pub const HOST_BAUD: u32 = 115_200;
