//! Desktop implementations of the platform traits
//!
//! The emulator speaks the same protocol as the board over stdin/stdout.
//! Output pins are a single word in memory and the sequencer replays the
//! armed program against wall-clock time at the current `clk_sys` rate.
//!
//! There is no trigger input. Hardware-start runs and holds resume at once.

use core::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use platform::board::Board;
use platform::clock::{sys_pll_params, ClockControl, ClockDomain, ClockError};
use platform::sequencer::{PulseSequencer, SequencerError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::program::{DURATION_OVERHEAD, MAX_INSTRUCTIONS, OUTPUT_MASK};
use crate::shared::Shared;

/// Shared state type of the emulator.
pub type EmuShared = Shared<CriticalSectionRawMutex, EmulatedClock, MAX_INSTRUCTIONS>;

/// The one instance of the shared state.
pub static SHARED: EmuShared = Shared::new(EmulatedClock::new(POWER_ON_KHZ));

/// Levels of the emulated output pins.
static OUTPUTS: AtomicU32 = AtomicU32::new(0);

/// Current `clk_sys` rate seen by the sequencer (kHz).
static CLK_SYS_KHZ: AtomicU32 = AtomicU32::new(POWER_ON_KHZ);

/// Boot ROM clock before the firmware applies its default.
const POWER_ON_KHZ: u32 = 125_000;

// ── Serial ──────────────────────────────────────────────────────────────────

/// Error of the stdio stream.
#[derive(Debug)]
pub struct StdioError(pub std::io::ErrorKind);

impl core::fmt::Display for StdioError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "stdio: {}", self.0)
    }
}

impl embedded_io::Error for StdioError {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::Other
    }
}

impl From<std::io::Error> for StdioError {
    fn from(e: std::io::Error) -> Self {
        Self(e.kind())
    }
}

/// stdin/stdout as one byte stream.
pub struct StdioPort {
    stdin: tokio::io::Stdin,
    stdout: tokio::io::Stdout,
}

impl StdioPort {
    /// Attach to the process streams.
    pub fn new() -> Self {
        Self {
            stdin: tokio::io::stdin(),
            stdout: tokio::io::stdout(),
        }
    }
}

impl Default for StdioPort {
    fn default() -> Self {
        Self::new()
    }
}

impl embedded_io::ErrorType for StdioPort {
    type Error = StdioError;
}

impl embedded_io_async::Read for StdioPort {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        Ok(self.stdin.read(buf).await?)
    }
}

impl embedded_io_async::Write for StdioPort {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.stdout.write(buf).await?)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.stdout.flush().await?)
    }
}

// ── Sequencer ───────────────────────────────────────────────────────────────

/// Where a replay stands at some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Playhead {
    /// Instruction being emitted
    pub index: usize,
    /// Output word on the pins
    pub output: u32,
    /// The program reached two consecutive holds
    pub finished: bool,
}

/// Replay `words` for `elapsed` system clock cycles.
///
/// A program without a terminator stalls on its last instruction, like the
/// hardware waiting on an exhausted transfer.
pub fn locate(words: &[u32], elapsed: u64) -> Playhead {
    let mut head = Playhead {
        index: 0,
        output: 0,
        finished: false,
    };
    let mut end: u64 = 0;
    let mut pairs = words.chunks_exact(2).enumerate().peekable();
    while let Some((index, pair)) = pairs.next() {
        let &[output, stored] = pair else { break };
        head.index = index;
        head.output = output;
        if stored == 0 {
            if pairs.peek().is_some_and(|(_, next)| next.get(1) == Some(&0)) {
                head.finished = true;
                return head;
            }
            continue;
        }
        end = end
            .saturating_add(u64::from(stored))
            .saturating_add(u64::from(DURATION_OVERHEAD));
        if elapsed < end {
            return head;
        }
    }
    head
}

struct Run {
    words: Vec<u32>,
    started: Instant,
    khz: u32,
}

impl Run {
    fn playhead(&self) -> Playhead {
        let nanos = u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        let cycles = nanos
            .saturating_mul(u64::from(self.khz))
            .saturating_div(1_000_000);
        locate(&self.words, cycles)
    }
}

/// Time-based sequencer model.
#[derive(Default)]
pub struct EmulatedSequencer {
    run: Option<Run>,
    acknowledged: bool,
}

impl EmulatedSequencer {
    /// Create an idle sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    fn sample(&self) -> Option<Playhead> {
        let head = self.run.as_ref()?.playhead();
        OUTPUTS.store(head.output & OUTPUT_MASK, Ordering::Relaxed);
        Some(head)
    }
}

impl PulseSequencer for EmulatedSequencer {
    fn arm(&mut self, words: &[u32], hardware_start: bool) -> Result<(), SequencerError> {
        if u32::try_from(words.len()).is_err() {
            return Err(SequencerError::ProgramTooLong);
        }
        let khz = CLK_SYS_KHZ.load(Ordering::Relaxed);
        if hardware_start {
            tracing::info!("sequencer: no trigger input, starting immediately");
        }
        tracing::debug!(words = words.len(), khz, "sequencer: armed");
        self.acknowledged = false;
        self.run = Some(Run {
            words: words.to_vec(),
            started: Instant::now(),
            khz,
        });
        Ok(())
    }

    fn stop(&mut self) {
        // Pins keep their last level.
        let _ = self.sample();
        self.run = None;
    }

    fn is_complete(&self) -> bool {
        !self.acknowledged && self.sample().is_some_and(|head| head.finished)
    }

    fn clear_complete(&mut self) {
        self.acknowledged = true;
    }

    fn position(&self) -> u8 {
        self.sample().map_or(0, |head| head.index as u8)
    }

    fn drive_outputs(&mut self, word: u32) {
        OUTPUTS.store(word, Ordering::Relaxed);
    }
}

// ── Clock ───────────────────────────────────────────────────────────────────

/// Clock tree model using the real PLL divider search.
pub struct EmulatedClock {
    system_khz: u32,
    external_hz: Option<u32>,
}

impl EmulatedClock {
    /// Start with PLL_SYS at `system_khz`.
    pub const fn new(system_khz: u32) -> Self {
        Self {
            system_khz,
            external_hz: None,
        }
    }

    fn clk_sys_khz(&self) -> u32 {
        self.external_hz
            .map_or(self.system_khz, |hz| hz.saturating_div(1000))
    }
}

impl ClockControl for EmulatedClock {
    fn set_system_khz(&mut self, khz: u32) -> Result<(), ClockError> {
        let params = sys_pll_params(khz).ok_or(ClockError::FrequencyUnachievable)?;
        tracing::info!(
            fbdiv = params.fbdiv,
            postdiv1 = params.postdiv1,
            postdiv2 = params.postdiv2,
            "clock: PLL_SYS -> {khz} kHz"
        );
        self.system_khz = khz;
        self.external_hz = None;
        CLK_SYS_KHZ.store(khz, Ordering::Relaxed);
        Ok(())
    }

    fn use_external_reference(&mut self, freq_hz: u32) {
        tracing::info!("clock: clk_sys from external reference at {freq_hz} Hz");
        self.external_hz = Some(freq_hz);
        CLK_SYS_KHZ.store(self.clk_sys_khz(), Ordering::Relaxed);
    }

    fn release_external_reference(&mut self) {
        self.external_hz = None;
        CLK_SYS_KHZ.store(self.system_khz, Ordering::Relaxed);
    }

    fn measure_khz(&mut self, domain: ClockDomain) -> u32 {
        match domain {
            ClockDomain::PllSys => self.system_khz,
            ClockDomain::ClkSys => self.clk_sys_khz(),
            ClockDomain::PllUsb | ClockDomain::ClkPeri | ClockDomain::ClkUsb | ClockDomain::ClkAdc => {
                48_000
            }
            ClockDomain::Rosc => 6_500,
            ClockDomain::ClkRtc => 46,
        }
    }
}

// ── Board ───────────────────────────────────────────────────────────────────

/// Board model: LED and bootloader requests go to the log.
#[derive(Default)]
pub struct EmulatedBoard {
    bootloader_requests: u32,
}

impl EmulatedBoard {
    /// Create the board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `prg` requests seen.
    pub fn bootloader_requests(&self) -> u32 {
        self.bootloader_requests
    }
}

impl Board for EmulatedBoard {
    fn read_outputs(&self) -> u32 {
        OUTPUTS.load(Ordering::Relaxed)
    }

    fn set_activity(&mut self, on: bool) {
        tracing::trace!(on, "board: activity LED");
    }

    fn reset_to_bootloader(&mut self) {
        self.bootloader_requests = self.bootloader_requests.saturating_add(1);
        tracing::warn!("board: bootloader requested, ignored by the emulator");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    // Stored words: durations already have the overhead removed.
    const PROGRAM: [u32; 10] = [0x1, 6, 0x2, 0, 0x4, 16, 0, 0, 0, 0];

    #[test]
    fn playhead_walks_timed_instructions() {
        assert_eq!(locate(&PROGRAM, 0).output, 0x1);
        assert_eq!(locate(&PROGRAM, 9).index, 0);
        // The hold at index 1 resumes at once, so index 2 starts at cycle 10.
        let head = locate(&PROGRAM, 10);
        assert_eq!((head.index, head.output, head.finished), (2, 0x4, false));
    }

    #[test]
    fn two_holds_finish_the_program() {
        let head = locate(&PROGRAM, 30);
        assert!(head.finished);
        assert_eq!(head.index, 3);
        assert_eq!(head.output, 0);
    }

    #[test]
    fn unterminated_program_stalls_on_last_instruction() {
        let head = locate(&[0x8, 1, 0x9, 1], 1_000);
        assert_eq!((head.index, head.output, head.finished), (1, 0x9, false));
    }

    #[test]
    fn empty_program_never_finishes() {
        assert!(!locate(&[], 10).finished);
    }

    #[test]
    fn clock_rejects_unachievable_frequency() {
        let mut clock = EmulatedClock::new(125_000);
        assert_eq!(
            clock.set_system_khz(1),
            Err(ClockError::FrequencyUnachievable)
        );
        assert_eq!(clock.measure_khz(ClockDomain::PllSys), 125_000);
        clock.set_system_khz(100_000).unwrap();
        clock.use_external_reference(10_000_000);
        assert_eq!(clock.measure_khz(ClockDomain::ClkSys), 10_000);
        clock.release_external_reference();
        assert_eq!(clock.measure_khz(ClockDomain::ClkSys), 100_000);
    }
}
