//! Board-level services outside the sequencer
//!
//! Physical output readback, the activity LED and bootloader re-entry.

/// Board services used by the protocol engine.
pub trait Board {
    /// Raw GPIO input levels of the whole bank.
    ///
    /// Callers apply the output mask.
    fn read_outputs(&self) -> u32;

    /// Switch the activity LED.
    fn set_activity(&mut self, on: bool);

    /// Reboot into the USB mass-storage bootloader.
    ///
    /// On hardware this does not return. Host implementations record the
    /// request and return.
    fn reset_to_bootloader(&mut self);
}
