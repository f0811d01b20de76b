//! Product configuration and constants
//!
//! This module defines central configuration values used across the firmware.
//! Board-dependent limits are selected at compile time by the `pico2` feature;
//! everything else is fixed for the product.

/// Product name, printed in the boot banner.
pub const APP_NAME: &str = "Prawn Digital Output";

/// Firmware version reported by the `ver` command (synchronized with Cargo.toml).
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default system clock after boot and after clock resuscitation (Hz).
pub const DEFAULT_SYSTEM_HZ: u32 = 100_000_000;

/// Size of the line buffer used for command input.
///
/// Incoming lines longer than `SERIAL_BUFFER_SIZE - 1` bytes are truncated.
pub const SERIAL_BUFFER_SIZE: usize = 256;

/// Bytes per binary instruction record (`adm`): 2-byte output + 4-byte duration.
pub const BULK_RECORD_BYTES: usize = 6;

/// Records consumed per raw read during a bulk load.
pub const BULK_RECORDS_PER_READ: usize = SERIAL_BUFFER_SIZE / BULK_RECORD_BYTES;

/// GPIO used as the external clock reference input (clk_gpin0).
pub const EXTERNAL_CLOCK_PIN: u8 = 20;

/// Supported board models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoardModel {
    /// Raspberry Pi Pico (RP2040).
    Pico1,
    /// Raspberry Pi Pico 2 (RP2350).
    Pico2,
}

impl BoardModel {
    /// Board number reported by the `brd` command.
    pub const fn number(self) -> u8 {
        match self {
            Self::Pico1 => 1,
            Self::Pico2 => 2,
        }
    }

    /// Highest system clock the `clk` command accepts (Hz).
    pub const fn max_system_hz(self) -> u32 {
        match self {
            Self::Pico1 => 133_000_000,
            Self::Pico2 => 150_000_000,
        }
    }

    /// Number of instructions the program store holds on this board.
    ///
    /// Each instruction occupies two 32-bit words of SRAM.
    pub const fn max_instructions(self) -> usize {
        match self {
            Self::Pico1 => 30_000,
            Self::Pico2 => 60_000,
        }
    }
}

/// The board this build targets.
#[cfg(not(feature = "pico2"))]
pub const BOARD: BoardModel = BoardModel::Pico1;

/// The board this build targets.
#[cfg(feature = "pico2")]
pub const BOARD: BoardModel = BoardModel::Pico2;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn bulk_read_is_whole_records_within_line_buffer() {
        assert_eq!(BULK_RECORDS_PER_READ, 42);
        assert!(BULK_RECORDS_PER_READ * BULK_RECORD_BYTES <= SERIAL_BUFFER_SIZE);
    }

    #[test]
    fn default_clock_is_below_every_board_limit() {
        assert!(DEFAULT_SYSTEM_HZ <= BoardModel::Pico1.max_system_hz());
        assert!(DEFAULT_SYSTEM_HZ <= BoardModel::Pico2.max_system_hz());
    }

    #[test]
    fn board_numbers_match_model() {
        assert_eq!(BoardModel::Pico1.number(), 1);
        assert_eq!(BoardModel::Pico2.number(), 2);
    }
}
