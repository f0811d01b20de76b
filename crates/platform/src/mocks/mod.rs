//! Mock implementations for testing
//!
//! This module provides mock implementations of all platform traits
//! for use in unit and integration tests.

#![cfg(any(test, feature = "std"))]
#![allow(clippy::arithmetic_side_effects)] // test doubles: counters never approach overflow

use core::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::vec::Vec;

use crate::clock::{sys_pll_params, ClockControl, ClockDomain, ClockError};
use crate::sequencer::{PulseSequencer, SequencerError};
use crate::Board;

// ── Serial ──────────────────────────────────────────────────────────────────

/// Error type of [`MockSerialPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockIoError;

impl embedded_io::Error for MockIoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

/// In-memory byte stream.
///
/// Reads drain the scripted input and report end of stream (`Ok(0)`) once it
/// is empty, unless the port is held open. Writes are captured.
#[derive(Default)]
pub struct MockSerialPort {
    input: VecDeque<u8>,
    output: Vec<u8>,
    max_chunk: Option<usize>,
    fail_writes: bool,
    held_open: bool,
}

impl MockSerialPort {
    /// Create an empty port
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a port that returns at most `max_chunk` bytes per read.
    pub fn with_max_chunk(max_chunk: usize) -> Self {
        Self {
            max_chunk: Some(max_chunk.max(1)),
            ..Self::default()
        }
    }

    /// Make reads on empty input wait forever instead of reporting end of stream.
    pub fn held_open(mut self) -> Self {
        self.held_open = true;
        self
    }

    /// Append bytes to the input script.
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Bytes not yet read.
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Take everything written so far.
    pub fn take_output(&mut self) -> Vec<u8> {
        core::mem::take(&mut self.output)
    }

    /// Take everything written so far as text.
    pub fn take_output_string(&mut self) -> String {
        String::from_utf8_lossy(&self.take_output()).into_owned()
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }
}

impl embedded_io::ErrorType for MockSerialPort {
    type Error = MockIoError;
}

impl embedded_io_async::Read for MockSerialPort {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.held_open && self.input.is_empty() {
            core::future::pending::<()>().await;
        }
        let limit = self.max_chunk.unwrap_or(usize::MAX).min(buf.len());
        let mut n = 0;
        for slot in buf.iter_mut().take(limit) {
            match self.input.pop_front() {
                Some(b) => {
                    *slot = b;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }
}

impl embedded_io_async::Write for MockSerialPort {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_writes {
            return Err(MockIoError);
        }
        self.output.extend_from_slice(buf);
        Ok(buf.len())
    }
}

// ── Sequencer ───────────────────────────────────────────────────────────────

/// Observation and control handle shared with a [`MockSequencer`].
///
/// The controller owns the sequencer, so tests steer and inspect it through
/// this probe instead.
#[derive(Default)]
pub struct SequencerProbe {
    arm_count: Cell<u32>,
    stop_count: Cell<u32>,
    last_hardware_start: Cell<Option<bool>>,
    armed_words: RefCell<Vec<u32>>,
    complete_after: Cell<Option<u32>>,
    polls: Cell<u32>,
    complete: Cell<bool>,
    fail_arm: Cell<bool>,
    driven: Cell<Option<u32>>,
    position: Cell<u8>,
}

impl SequencerProbe {
    /// Create a probe whose sequencer completes on the first poll.
    pub fn new() -> Self {
        let probe = Self::default();
        probe.complete_after.set(Some(0));
        probe
    }

    /// Complete after `polls` calls to `is_complete`, or never with `None`.
    pub fn complete_after(&self, polls: Option<u32>) {
        self.complete_after.set(polls);
    }

    /// Make the next arm attempts fail.
    pub fn fail_arm(&self, fail: bool) {
        self.fail_arm.set(fail);
    }

    /// Report `position` from the sequencer.
    pub fn set_position(&self, position: u8) {
        self.position.set(position);
    }

    /// Number of successful arms.
    pub fn arm_count(&self) -> u32 {
        self.arm_count.get()
    }

    /// Number of stops.
    pub fn stop_count(&self) -> u32 {
        self.stop_count.get()
    }

    /// Start mode of the last arm.
    pub fn last_hardware_start(&self) -> Option<bool> {
        self.last_hardware_start.get()
    }

    /// Words handed to the last arm.
    pub fn armed_words(&self) -> Vec<u32> {
        self.armed_words.borrow().clone()
    }

    /// Last word driven manually.
    pub fn driven(&self) -> Option<u32> {
        self.driven.get()
    }

    /// Whether the completion flag is raised.
    pub fn is_complete(&self) -> bool {
        self.complete.get()
    }
}

/// Sequencer double driven by a [`SequencerProbe`].
pub struct MockSequencer<'a> {
    probe: &'a SequencerProbe,
}

impl<'a> MockSequencer<'a> {
    /// Create a sequencer reporting through `probe`
    pub fn new(probe: &'a SequencerProbe) -> Self {
        Self { probe }
    }
}

impl PulseSequencer for MockSequencer<'_> {
    fn arm(&mut self, words: &[u32], hardware_start: bool) -> Result<(), SequencerError> {
        if self.probe.fail_arm.get() {
            return Err(SequencerError::StartFailed);
        }
        self.probe.arm_count.set(self.probe.arm_count.get() + 1);
        self.probe.last_hardware_start.set(Some(hardware_start));
        *self.probe.armed_words.borrow_mut() = words.to_vec();
        self.probe.polls.set(0);
        self.probe.complete.set(false);
        Ok(())
    }

    fn stop(&mut self) {
        self.probe.stop_count.set(self.probe.stop_count.get() + 1);
    }

    fn is_complete(&self) -> bool {
        if !self.probe.complete.get() {
            let polls = self.probe.polls.get();
            if let Some(limit) = self.probe.complete_after.get() {
                if polls >= limit {
                    self.probe.complete.set(true);
                }
            }
            self.probe.polls.set(polls.saturating_add(1));
        }
        self.probe.complete.get()
    }

    fn clear_complete(&mut self) {
        self.probe.complete.set(false);
    }

    fn position(&self) -> u8 {
        self.probe.position.get()
    }

    fn drive_outputs(&mut self, word: u32) {
        self.probe.driven.set(Some(word));
    }
}

// ── Clock ───────────────────────────────────────────────────────────────────

/// Clock double using the real PLL divider search.
pub struct MockClock {
    /// Current PLL_SYS output (kHz)
    pub system_khz: u32,
    /// External reference frequency while attached (Hz)
    pub external_hz: Option<u32>,
    /// Number of `release_external_reference` calls
    pub releases: u32,
    /// Number of successful PLL reprogrammings
    pub reprograms: u32,
}

impl MockClock {
    /// Create a clock running at `system_khz`
    pub fn new(system_khz: u32) -> Self {
        Self {
            system_khz,
            external_hz: None,
            releases: 0,
            reprograms: 0,
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(125_000)
    }
}

impl ClockControl for MockClock {
    fn set_system_khz(&mut self, khz: u32) -> Result<(), ClockError> {
        sys_pll_params(khz).ok_or(ClockError::FrequencyUnachievable)?;
        self.system_khz = khz;
        self.reprograms += 1;
        Ok(())
    }

    fn use_external_reference(&mut self, freq_hz: u32) {
        self.external_hz = Some(freq_hz);
    }

    fn release_external_reference(&mut self) {
        self.external_hz = None;
        self.releases += 1;
    }

    fn measure_khz(&mut self, domain: ClockDomain) -> u32 {
        let sys = self
            .external_hz
            .map_or(self.system_khz, |hz| hz / 1000);
        match domain {
            ClockDomain::PllSys => self.system_khz,
            ClockDomain::PllUsb | ClockDomain::ClkPeri | ClockDomain::ClkUsb | ClockDomain::ClkAdc => {
                48_000
            }
            ClockDomain::Rosc => 6_500,
            ClockDomain::ClkSys => sys,
            ClockDomain::ClkRtc => 46,
        }
    }
}

// ── Board ───────────────────────────────────────────────────────────────────

/// Board double.
#[derive(Default)]
pub struct MockBoard {
    /// Value returned by `read_outputs`
    pub gpio_levels: u32,
    /// Current activity LED state
    pub activity: bool,
    /// Number of LED switches
    pub activity_changes: u32,
    /// Number of bootloader requests
    pub bootloader_requests: u32,
}

impl MockBoard {
    /// Create a board with all inputs low
    pub fn new() -> Self {
        Self::default()
    }
}

impl Board for MockBoard {
    fn read_outputs(&self) -> u32 {
        self.gpio_levels
    }

    fn set_activity(&mut self, on: bool) {
        self.activity = on;
        self.activity_changes += 1;
    }

    fn reset_to_bootloader(&mut self) {
        self.bootloader_requests += 1;
    }
}
