//! Synchronized run status
//!
//! One [`RunStatus`] value is shared by the dispatcher and the execution
//! controller. Every access takes the lock for a single read, write or
//! compare-and-set; no critical section ever spans I/O.
//!
//! ```text
//!  STOPPED ──start──► TRANSITION_TO_RUNNING ──armed──► RUNNING
//!     ▲                      │                           │   │
//!     │                      └────────abort──────────────┘   │ complete
//!     │                                │                     ▼
//!     │                          ABORT_REQUESTED      TRANSITION_TO_STOP
//!     │                                │                     │
//!     │                            ABORTING                  │
//!     │                                │                     │
//!     │                             ABORTED                  │
//!     └──────────────────────────────────────────stopped─────┘
//! ```
//!
//! The controller owns every transition except the abort request, which the
//! dispatcher performs for the operator.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

/// Execution state, reported numerically by `sts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RunStatus {
    /// Idle; initial state and clean finish
    Stopped = 0,
    /// Arming the sequencer
    TransitionToRunning = 1,
    /// Sequencer streaming the program
    Running = 2,
    /// Operator asked to abort
    AbortRequested = 3,
    /// Controller is stopping the sequencer after an abort
    Aborting = 4,
    /// Idle after an abort
    Aborted = 5,
    /// Controller is stopping the sequencer after completion
    TransitionToStop = 6,
}

impl RunStatus {
    /// Idle states permit program mutation and starting a run.
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Stopped | Self::Aborted)
    }

    /// States from which an abort may be requested.
    pub const fn is_abortable(self) -> bool {
        matches!(self, Self::Running | Self::TransitionToRunning)
    }

    /// Wire code.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// State shared between the dispatcher and the execution controller.
pub struct SharedState<M: RawMutex> {
    status: Mutex<M, Cell<RunStatus>>,
    debug: Mutex<M, Cell<bool>>,
}

impl<M: RawMutex> SharedState<M> {
    /// Create state in `Stopped` with diagnostics off
    pub const fn new() -> Self {
        Self {
            status: Mutex::new(Cell::new(RunStatus::Stopped)),
            debug: Mutex::new(Cell::new(false)),
        }
    }

    /// Current status
    pub fn status(&self) -> RunStatus {
        self.status.lock(Cell::get)
    }

    /// Overwrite the status
    pub fn set_status(&self, status: RunStatus) {
        self.status.lock(|s| s.set(status));
    }

    /// Move `from → to` only if the status is still `from`.
    pub fn advance(&self, from: RunStatus, to: RunStatus) -> bool {
        self.status.lock(|s| {
            if s.get() == from {
                s.set(to);
                true
            } else {
                false
            }
        })
    }

    /// Flip a running program to `AbortRequested`.
    ///
    /// Fails with the observed status when nothing is running.
    pub fn request_abort(&self) -> Result<(), RunStatus> {
        self.status.lock(|s| {
            let current = s.get();
            if current.is_abortable() {
                s.set(RunStatus::AbortRequested);
                Ok(())
            } else {
                Err(current)
            }
        })
    }

    /// Whether verbose diagnostics are enabled
    pub fn debug(&self) -> bool {
        self.debug.lock(Cell::get)
    }

    /// Enable or disable verbose diagnostics
    pub fn set_debug(&self, on: bool) {
        self.debug.lock(|d| d.set(on));
    }
}

impl<M: RawMutex> Default for SharedState<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;

    const ALL: [RunStatus; 7] = [
        RunStatus::Stopped,
        RunStatus::TransitionToRunning,
        RunStatus::Running,
        RunStatus::AbortRequested,
        RunStatus::Aborting,
        RunStatus::Aborted,
        RunStatus::TransitionToStop,
    ];

    #[test]
    fn codes_match_wire_protocol() {
        let codes: Vec<u8> = ALL.iter().map(|s| s.code()).collect();
        assert_eq!(codes, [0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn only_stopped_and_aborted_are_idle() {
        let idle: Vec<_> = ALL.into_iter().filter(|s| s.is_idle()).collect();
        assert_eq!(idle, [RunStatus::Stopped, RunStatus::Aborted]);
    }

    #[test]
    fn abort_only_from_running_or_arming() {
        for status in ALL {
            let state = SharedState::<NoopRawMutex>::new();
            state.set_status(status);
            let result = state.request_abort();
            if status.is_abortable() {
                assert_eq!(result, Ok(()));
                assert_eq!(state.status(), RunStatus::AbortRequested);
            } else {
                assert_eq!(result, Err(status));
                assert_eq!(state.status(), status, "failed abort must not change status");
            }
        }
    }

    /// An abort landing while the sequencer is armed must survive the
    /// controller's move to `Running`.
    #[test]
    fn advance_does_not_overwrite_abort_request() {
        let state = SharedState::<NoopRawMutex>::new();
        state.set_status(RunStatus::TransitionToRunning);
        state.request_abort().unwrap();
        assert!(!state.advance(RunStatus::TransitionToRunning, RunStatus::Running));
        assert_eq!(state.status(), RunStatus::AbortRequested);
    }

    #[test]
    fn debug_flag_toggles() {
        let state = SharedState::<NoopRawMutex>::new();
        assert!(!state.debug());
        state.set_debug(true);
        assert!(state.debug());
    }
}
