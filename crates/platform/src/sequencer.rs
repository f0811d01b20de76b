//! Hardware pulse sequencer abstraction
//!
//! The sequencer is a state machine fed by a memory-to-peripheral burst
//! transfer. Once armed it runs independently of the CPU, consuming the
//! program as a flat list of 32-bit words: `[output, duration, output,
//! duration, ...]`. Software only sees four things: arm-and-start,
//! stop-and-flush, a completion flag raised when the engine reaches a
//! terminator, and the engine's current program position.
//!
//! ```text
//!   arm(words, hw_start) ──► [waiting for trigger] ──► [emitting] ──► complete
//!            ▲                                              │
//!            └──────────────────── stop() ◄─────────────────┘
//! ```

/// Errors raised while arming the sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SequencerError {
    /// The program does not fit the transfer engine.
    ProgramTooLong,
    /// The engine could not be started.
    StartFailed,
}

impl core::fmt::Display for SequencerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ProgramTooLong => f.write_str("program exceeds transfer length"),
            Self::StartFailed => f.write_str("sequencer failed to start"),
        }
    }
}

/// Narrow interface of the hardware sequencer and its burst transfer.
pub trait PulseSequencer {
    /// Reset the engine, queue the start mode and begin streaming `words`.
    ///
    /// With `hardware_start` the engine waits for an external trigger edge
    /// before emitting the first output.
    ///
    /// The transfer keeps reading `words` until [`stop`](Self::stop) returns,
    /// so the caller must keep the slice alive and unmodified for that span.
    fn arm(&mut self, words: &[u32], hardware_start: bool) -> Result<(), SequencerError>;

    /// Abort the transfer, halt the engine and flush its queues.
    fn stop(&mut self);

    /// Whether the engine has signalled that it reached a terminator.
    ///
    /// Must be cheap: it is polled in a tight loop.
    fn is_complete(&self) -> bool;

    /// Acknowledge the completion signal.
    fn clear_complete(&mut self);

    /// Current position of the engine within its own program.
    fn position(&self) -> u8;

    /// Drive a raw word onto the output pins, outside of any program.
    fn drive_outputs(&mut self, word: u32);
}
