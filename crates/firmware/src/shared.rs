//! State shared by the dispatcher and the execution controller
//!
//! Everything the two contexts exchange lives in one [`Shared`] value that
//! both borrow. On hardware it is a `static` guarded by
//! `CriticalSectionRawMutex` (the contexts run on different cores); tests and
//! the emulator use the same type with a cheaper mutex.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex;
use platform::clock::ClockControl;

use crate::clock::ClockManager;
use crate::controller::{Diagnostic, Request};
use crate::program::InstructionStore;
use crate::status::SharedState;

/// Requests in flight from dispatcher to controller.
pub const REQUEST_DEPTH: usize = 1;

/// Verbose diagnostics buffered between prints.
pub const DIAGNOSTIC_DEPTH: usize = 8;

/// Cross-context state.
pub struct Shared<M: RawMutex, C, const N: usize> {
    /// Run status and debug flag
    pub state: SharedState<M>,
    /// The program, held by the controller for a whole buffered run
    pub program: Mutex<M, InstructionStore<N>>,
    /// Dispatcher → controller
    pub requests: Channel<M, Request, REQUEST_DEPTH>,
    /// Controller → dispatcher
    pub diagnostics: Channel<M, Diagnostic, DIAGNOSTIC_DEPTH>,
    /// Clock configuration and fallback
    pub clock: ClockManager<M, C>,
}

impl<M: RawMutex, C: ClockControl, const N: usize> Shared<M, C, N> {
    /// Create idle state with an empty program.
    pub const fn new(clock: C) -> Self {
        Self {
            state: SharedState::new(),
            program: Mutex::new(InstructionStore::new()),
            requests: Channel::new(),
            diagnostics: Channel::new(),
            clock: ClockManager::new(clock),
        }
    }

    /// Post a verbose diagnostic if enabled; dropped when the queue is full.
    pub fn diagnose(&self, diagnostic: Diagnostic) {
        if self.state.debug() {
            let _ = self.diagnostics.try_send(diagnostic);
        }
    }
}
