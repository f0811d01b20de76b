//! Pico board services

use embassy_rp::gpio::{Level, Output};
use embassy_rp::pac;
use platform::board::Board;

/// LED, GPIO readback and bootloader entry.
pub struct RpBoard<'d> {
    led: Output<'d>,
}

impl<'d> RpBoard<'d> {
    /// Wrap the activity LED.
    pub fn new(led: Output<'d>) -> Self {
        Self { led }
    }
}

impl Board for RpBoard<'_> {
    fn read_outputs(&self) -> u32 {
        // Input levels of bank 0 reflect the pins whatever function drives them.
        pac::SIO.gpio_in(0).read()
    }

    fn set_activity(&mut self, on: bool) {
        self.led.set_level(Level::from(on));
    }

    fn reset_to_bootloader(&mut self) {
        defmt::info!("board: entering USB bootloader");
        embassy_rp::rom_data::reset_to_usb_boot(0, 0);
    }
}
