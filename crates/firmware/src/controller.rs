//! Execution controller
//!
//! Owns the [`PulseSequencer`] and runs in its own context (core 1 on
//! hardware). It waits for [`Request`]s from the dispatcher and, for a
//! buffered run, drives the status through the run/abort state machine:
//!
//! ```text
//! Buffered ─► TRANSITION_TO_RUNNING ─► arm ─► RUNNING ─► poll ┬─► complete ─► TRANSITION_TO_STOP ─► STOPPED
//!                                                             └─► abort ────► ABORTING ──────────► ABORTED
//! ```
//!
//! The poll loop checks the completion flag and the abort request on every
//! iteration and does nothing else. Abort is cooperative: the dispatcher only
//! flips the status and this loop acts on it.

use embassy_sync::blocking_mutex::raw::RawMutex;
use platform::clock::ClockControl;
use platform::sequencer::PulseSequencer;

use crate::program::OUTPUT_MASK;
use crate::shared::Shared;
use crate::status::RunStatus;

/// Work handed from the dispatcher to the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Request {
    /// Stream the stored program
    Buffered {
        /// Wait for the external trigger before the first output
        hardware_start: bool,
    },
    /// Drive one raw word onto the outputs
    Manual(u32),
}

/// Verbose event lines printed by the dispatcher when debug is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Diagnostic {
    /// Buffered run accepted, with its start mode
    HardwareStart(bool),
    /// Poll loop exited
    LoopEnded,
    /// Sequencer position when the loop exited
    EndedAt(u8),
    /// Run finished through abort
    Aborted,
    /// Run finished normally
    Stopped,
    /// Manual word driven
    OutputCommanded(u32),
    /// The sequencer refused the program
    ArmFailed,
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::HardwareStart(hw) => write!(f, "hwstart: {}", u8::from(*hw)),
            Self::LoopEnded => f.write_str("Tight execution loop ended"),
            Self::EndedAt(position) => write!(f, "Program ended at instr {position}"),
            Self::Aborted => f.write_str("Aborted execution"),
            Self::Stopped => f.write_str("Execution stopped"),
            Self::OutputCommanded(word) => write!(f, "Output commanded: {word:x}"),
            Self::ArmFailed => f.write_str("Sequencer failed to start"),
        }
    }
}

/// Sequencer owner and state machine driver.
pub struct ExecutionController<'a, M: RawMutex, C, S, const N: usize> {
    shared: &'a Shared<M, C, N>,
    sequencer: S,
}

impl<'a, M, C, S, const N: usize> ExecutionController<'a, M, C, S, N>
where
    M: RawMutex,
    C: ClockControl,
    S: PulseSequencer,
{
    /// Create a controller owning `sequencer`.
    pub fn new(shared: &'a Shared<M, C, N>, sequencer: S) -> Self {
        Self { shared, sequencer }
    }

    /// Mutable access to the owned sequencer.
    pub fn sequencer_mut(&mut self) -> &mut S {
        &mut self.sequencer
    }

    /// Serve requests forever.
    pub async fn run(&mut self) -> ! {
        loop {
            self.serve_one().await;
        }
    }

    /// Wait for one request and carry it out.
    pub async fn serve_one(&mut self) {
        let request = self.shared.requests.receive().await;
        #[cfg(feature = "defmt")]
        defmt::debug!("controller: {}", request);
        match request {
            Request::Buffered { hardware_start } => self.run_buffered(hardware_start).await,
            Request::Manual(word) => self.drive_manual(word),
        }
    }

    fn drive_manual(&mut self, word: u32) {
        self.sequencer.drive_outputs(word & OUTPUT_MASK);
        self.shared.diagnose(Diagnostic::OutputCommanded(word));
    }

    async fn run_buffered(&mut self, hardware_start: bool) {
        let shared = self.shared;
        shared.state.set_status(RunStatus::TransitionToRunning);
        shared.diagnose(Diagnostic::HardwareStart(hardware_start));

        // Held until the sequencer is stopped: the transfer reads from it.
        let program = shared.program.lock().await;

        if let Err(_e) = self.sequencer.arm(program.words(), hardware_start) {
            #[cfg(feature = "defmt")]
            defmt::error!("controller: arm failed: {}", _e);
            self.sequencer.stop();
            drop(program);
            shared.state.set_status(RunStatus::Aborted);
            shared.diagnose(Diagnostic::ArmFailed);
            return;
        }
        shared
            .state
            .advance(RunStatus::TransitionToRunning, RunStatus::Running);

        while !self.sequencer.is_complete() && shared.state.status() != RunStatus::AbortRequested {
            embassy_futures::yield_now().await;
        }
        self.sequencer.clear_complete();
        shared.diagnose(Diagnostic::LoopEnded);
        shared.diagnose(Diagnostic::EndedAt(self.sequencer.position()));

        if shared
            .state
            .advance(RunStatus::Running, RunStatus::TransitionToStop)
        {
            self.sequencer.stop();
            drop(program);
            shared.state.set_status(RunStatus::Stopped);
            shared.diagnose(Diagnostic::Stopped);
        } else {
            shared.state.set_status(RunStatus::Aborting);
            self.sequencer.stop();
            drop(program);
            shared.state.set_status(RunStatus::Aborted);
            shared.diagnose(Diagnostic::Aborted);
        }
        #[cfg(feature = "defmt")]
        defmt::info!("controller: run finished as {}", shared.state.status());
    }
}
