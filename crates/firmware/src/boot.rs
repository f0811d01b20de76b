//! Boot sequence for Prawn Digital Output.
//!
//! Initialization order (MUST be respected):
//!   1. Embassy init with `clk_peri` on PLL_USB, so the UART baud rate does not
//!      move when `clk_sys` is reprogrammed
//!   2. System clock to the internal 100 MHz default
//!   3. Arm clock resuscitation (the fallback needs the default applied first)
//!   4. Activity LED on, banner, LED off
//!   5. Core 1: execution controller
//!   6. Core 0: dispatcher loop
//!
//! Steps 2 to 4 are [`announce`], shared by the hardware and emulator entry
//! points; the platform passes its resus arming as a hook.

use embassy_sync::blocking_mutex::raw::RawMutex;
use platform::board::Board;
use platform::clock::ClockControl;
use platform::serial::SerialTransport;

use crate::shared::Shared;

/// First line printed after reset.
pub const BANNER: &str = "Prawn Digital Output online";

/// Ordered boot steps, for documentation and ordering tests.
pub const BOOT_SEQUENCE_STEPS: &[&str] = &[
    "1. embassy_rp::init: clk_peri from PLL_USB (UART independent of clk_sys)",
    "2. Clocks: clk_sys internal 100 MHz",
    "3. Resus: enable clk_sys resuscitation and CLOCKS_IRQ",
    "4. Banner: LED on, print banner, LED off",
    "5. Core 1: spawn execution controller",
    "6. Core 0: dispatcher loop",
];

/// Apply the default clock, arm the fallback and greet the host.
pub async fn announce<M, C, T, B, const N: usize>(
    shared: &Shared<M, C, N>,
    transport: &mut T,
    board: &mut B,
    arm_resuscitation: impl FnOnce(),
) -> Result<(), T::Error>
where
    M: RawMutex,
    C: ClockControl,
    T: SerialTransport,
    B: Board,
{
    if let Err(_e) = shared.clock.apply_default() {
        #[cfg(feature = "defmt")]
        defmt::error!("boot: default clock rejected: {}", _e);
    }
    arm_resuscitation();

    board.set_activity(true);
    transport.write_all(BANNER.as_bytes()).await?;
    transport.write_all(b"\r\n").await?;
    board.set_activity(false);

    #[cfg(feature = "defmt")]
    defmt::info!("{=str} v{=str} ready", platform::config::APP_NAME, platform::config::FIRMWARE_VERSION);
    Ok(())
}

/// Embassy configuration for the RP2040.
#[cfg(feature = "hardware")]
pub fn build_embassy_config() -> embassy_rp::config::Config {
    use embassy_rp::clocks::{ClockConfig, PeriClkSrc};

    let mut clocks = ClockConfig::crystal(12_000_000);
    clocks.peri_clk_src = Some(PeriClkSrc::PllUsb);
    embassy_rp::config::Config::new(clocks)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use platform::mocks::{MockBoard, MockClock, MockSerialPort};
    use platform::serial::IoTransport;

    #[test]
    fn clocks_are_set_before_banner_and_resus_after_clocks() {
        let position = |needle: &str| {
            BOOT_SEQUENCE_STEPS
                .iter()
                .position(|s| s.contains(needle))
                .expect("step present")
        };
        assert!(position("Clocks") < position("Resus"));
        assert!(position("Resus") < position("Banner"));
        assert!(position("Banner") < position("Core 1"));
    }

    #[tokio::test]
    async fn announce_sets_default_clock_and_prints_banner() {
        let shared: Shared<NoopRawMutex, MockClock, 4> = Shared::new(MockClock::new(125_000));
        let mut transport = IoTransport::new(MockSerialPort::new());
        let mut board = MockBoard::new();

        let mut armed = false;
        announce(&shared, &mut transport, &mut board, || armed = true)
            .await
            .unwrap();

        assert!(armed);
        assert_eq!(
            transport.inner_mut().take_output_string(),
            "Prawn Digital Output online\r\n"
        );
        assert_eq!(shared.clock.with_control(|c| c.system_khz), 100_000);
        assert!(!board.activity);
        assert_eq!(board.activity_changes, 2);
    }
}
