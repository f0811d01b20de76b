//! Host command protocol
//!
//! The dispatcher reads `\n`-terminated ASCII lines and answers with
//! `\r\n`-terminated lines. A command is named by its first three bytes; the
//! rest of the line is its argument tail, parsed the way the host tooling
//! formats it (whitespace separated, hexadecimal except for `clk`).
//!
//! # Gating
//!
//! Lines shorter than a mnemonic are always `Invalid command`. `ver`, `brd`,
//! `sts`, `deb`, `ndb` and `abt` are served in every state. Anything else,
//! unrecognised lines included, needs an idle run status; otherwise the reply is
//! `Cannot execute command <line> during buffered execution.` and nothing
//! happens.
//!
//! # Binary load
//!
//! `adm <start> <count>` answers `ready` and then reads exactly `count`
//! six-byte records (little-endian `u16` output, `u32` duration) in chunks of
//! [`BULK_RECORDS_PER_READ`]. The whole stream is always drained; records with
//! an impossible duration are stored as holds and summarised at the end.

use core::fmt::{self, Write as _};

use embassy_futures::select::{select, select3, Either, Either3};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::MutexGuard;
use heapless::String;
use platform::board::Board;
use platform::clock::{ClockControl, ClockDomain, ClockError, ClockSource};
use platform::config::{BOARD, BULK_RECORDS_PER_READ, FIRMWARE_VERSION, SERIAL_BUFFER_SIZE};
use platform::serial::SerialTransport;

use crate::controller::Request;
use crate::program::{Instruction, InstructionStore, StoreError, OUTPUT_MASK, RECORD_SIZE};
use crate::shared::Shared;

/// Longest reply line, terminator included.
pub const REPLY_CAPACITY: usize = SERIAL_BUFFER_SIZE + 64;

// ── Commands ────────────────────────────────────────────────────────────────

/// Protocol commands, keyed by their three-letter mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// `ver`: firmware version
    Version,
    /// `brd`: board model
    Board,
    /// `sts`: run and clock status
    Status,
    /// `deb`: verbose diagnostics on
    DebugOn,
    /// `ndb`: verbose diagnostics off
    DebugOff,
    /// `abt`: abort a buffered run
    Abort,
    /// `cls`: clear the program
    Clear,
    /// `run`: buffered run, waiting for the trigger
    RunTriggered,
    /// `swr`: buffered run, started immediately
    RunSoftware,
    /// `man`: drive a raw output word
    Manual,
    /// `gto`: read the physical outputs
    GetOutputs,
    /// `set`: write one instruction
    Set,
    /// `get`: read one instruction
    Get,
    /// `add`: append instructions line by line
    Add,
    /// `adm`: binary bulk load
    AddBinary,
    /// `dmp`: dump the program
    Dump,
    /// `len`: program length
    Length,
    /// `clk`: clock source and frequency
    Clock,
    /// `edt`: replace the last instruction
    Edit,
    /// `cur`: show the last instruction
    Current,
    /// `frq`: measured clock frequencies
    Frequencies,
    /// `prg`: reboot into the bootloader
    Program,
}

impl Command {
    /// Look up the command named by the first three bytes of `line`.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let command = match line.get(..3)? {
            b"ver" => Self::Version,
            b"brd" => Self::Board,
            b"sts" => Self::Status,
            b"deb" => Self::DebugOn,
            b"ndb" => Self::DebugOff,
            b"abt" => Self::Abort,
            b"cls" => Self::Clear,
            b"run" => Self::RunTriggered,
            b"swr" => Self::RunSoftware,
            b"man" => Self::Manual,
            b"gto" => Self::GetOutputs,
            b"set" => Self::Set,
            b"get" => Self::Get,
            b"add" => Self::Add,
            b"adm" => Self::AddBinary,
            b"dmp" => Self::Dump,
            b"len" => Self::Length,
            b"clk" => Self::Clock,
            b"edt" => Self::Edit,
            b"cur" => Self::Current,
            b"frq" => Self::Frequencies,
            b"prg" => Self::Program,
            _ => return None,
        };
        Some(command)
    }

    /// Commands served regardless of run status.
    pub const fn allowed_while_running(self) -> bool {
        matches!(
            self,
            Self::Version
                | Self::Board
                | Self::Status
                | Self::DebugOn
                | Self::DebugOff
                | Self::Abort
        )
    }
}

// ── Argument scanning ───────────────────────────────────────────────────────

/// Whitespace-separated numeric field reader.
///
/// Once a field fails to parse, every later field fails too.
pub struct Scanner<'a> {
    rest: &'a [u8],
    failed: bool,
}

impl<'a> Scanner<'a> {
    /// Scan `line` from its first byte.
    pub fn new(line: &'a [u8]) -> Self {
        Self {
            rest: line,
            failed: false,
        }
    }

    /// Scan the fields following the first token (the mnemonic).
    pub fn after_mnemonic(line: &'a [u8]) -> Self {
        let mut scanner = Self::new(line);
        scanner.skip_whitespace();
        let token = scanner
            .rest
            .iter()
            .position(u8::is_ascii_whitespace)
            .unwrap_or(scanner.rest.len());
        scanner.rest = scanner.rest.get(token..).unwrap_or_default();
        scanner
    }

    fn skip_whitespace(&mut self) {
        let start = self
            .rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.rest.len());
        self.rest = self.rest.get(start..).unwrap_or_default();
    }

    fn number(&mut self, radix: u32) -> Option<u32> {
        if self.failed {
            return None;
        }
        self.skip_whitespace();
        if radix == 16 {
            if let [b'0', b'x' | b'X', next, ..] = self.rest {
                if next.is_ascii_hexdigit() {
                    self.rest = self.rest.get(2..).unwrap_or_default();
                }
            }
        }

        let digits = self
            .rest
            .iter()
            .position(|&b| char::from(b).to_digit(radix).is_none())
            .unwrap_or(self.rest.len());
        let value = self.rest.get(..digits).and_then(|field| {
            if field.is_empty() {
                return None;
            }
            field.iter().try_fold(0u32, |acc, &b| {
                let digit = char::from(b).to_digit(radix)?;
                acc.checked_mul(radix)?.checked_add(digit)
            })
        });

        match value {
            Some(v) => {
                self.rest = self.rest.get(digits..).unwrap_or_default();
                Some(v)
            }
            None => {
                self.failed = true;
                None
            }
        }
    }

    /// Next hexadecimal field, with optional `0x` prefix.
    pub fn hex(&mut self) -> Option<u32> {
        self.number(16)
    }

    /// Next unsigned decimal field.
    pub fn decimal(&mut self) -> Option<u32> {
        self.number(10)
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Command failures. Every one is answered and the loop goes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// Short or unrecognised line
    UnknownCommand,
    /// Idle-only command while a program runs
    Busy,
    /// `abt` with nothing to abort
    NotRunning,
    /// `set` without three fields
    InvalidInstruction,
    /// `get` or `adm` without their fields
    InvalidRequest,
    /// `man` without a field, or with bits outside the output mask
    InvalidManualRequest,
    /// `get` beyond the program
    InvalidAddress,
    /// `adm` range does not fit the store
    BulkRange {
        /// First address
        start: u32,
        /// Record count
        count: u32,
    },
    /// `clk` without two fields
    InvalidClockRequest,
    /// `cur` on an empty program
    NothingToShow,
    /// Rejected by the instruction store
    Store(StoreError),
    /// Rejected by the clock manager
    Clock(ClockError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCommand => f.write_str("Invalid command"),
            Self::Busy => f.write_str("Cannot execute command during buffered execution."),
            Self::NotRunning => f.write_str("Can only abort when status is 1 or 2"),
            Self::InvalidInstruction => f.write_str("Invalid instruction"),
            Self::InvalidRequest => f.write_str("Invalid request"),
            Self::InvalidManualRequest => f.write_str("invalid request"),
            Self::InvalidAddress => f.write_str("Invalid address"),
            Self::BulkRange { start, count } => write!(
                f,
                "Invalid address and/or too many instructions ({start} + {count})."
            ),
            Self::InvalidClockRequest => f.write_str("invalid clock request"),
            Self::NothingToShow => f.write_str("No commands to show"),
            Self::Store(e) => e.fmt(f),
            Self::Clock(e) => e.fmt(f),
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<ClockError> for CommandError {
    fn from(e: ClockError) -> Self {
        Self::Clock(e)
    }
}

/// Outcome of a command handler: a reply-worthy error or a dead transport.
#[derive(Debug)]
pub enum DispatchError<E> {
    /// Answer the host with this error
    Command(CommandError),
    /// The transport failed mid-command
    Transport(E),
}

impl<E> From<CommandError> for DispatchError<E> {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

impl<E> From<StoreError> for DispatchError<E> {
    fn from(e: StoreError) -> Self {
        Self::Command(CommandError::Store(e))
    }
}

impl<E> From<ClockError> for DispatchError<E> {
    fn from(e: ClockError) -> Self {
        Self::Command(CommandError::Clock(e))
    }
}

// ── Reply formatting ────────────────────────────────────────────────────────

/// Raw line bytes shown as text.
struct Ascii<'a>(&'a [u8]);

impl fmt::Display for Ascii<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.iter().try_for_each(|&b| f.write_char(char::from(b)))
    }
}

/// Format one reply line with its `\r\n` terminator.
fn render(args: fmt::Arguments<'_>) -> String<REPLY_CAPACITY> {
    let mut text = String::new();
    // Truncated if overlong; no reply comes near the capacity.
    let _ = text.write_fmt(args);
    let _ = text.push_str("\r\n");
    text
}

// ── Dispatcher ──────────────────────────────────────────────────────────────

/// Main-context protocol engine.
pub struct Dispatcher<'a, M: RawMutex, C, T, B, const N: usize> {
    shared: &'a Shared<M, C, N>,
    transport: T,
    board: B,
    line: [u8; SERIAL_BUFFER_SIZE],
    line_len: usize,
}

type Outcome<E> = Result<(), DispatchError<E>>;

impl<'a, M, C, T, B, const N: usize> Dispatcher<'a, M, C, T, B, N>
where
    M: RawMutex,
    C: ClockControl,
    T: SerialTransport,
    B: Board,
{
    /// Create a dispatcher over `transport`.
    pub fn new(shared: &'a Shared<M, C, N>, transport: T, board: B) -> Self {
        Self {
            shared,
            transport,
            board,
            line: [0; SERIAL_BUFFER_SIZE],
            line_len: 0,
        }
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// The board services
    pub fn board(&self) -> &B {
        &self.board
    }

    /// Wait for one command line, handle it and print pending diagnostics.
    ///
    /// While waiting, diagnostics from the controller are printed and a clock
    /// resuscitation resets the transport and is reported to the host.
    pub async fn process_next(&mut self) -> Result<(), T::Error> {
        self.board.set_activity(true);
        let len = loop {
            let event = select3(
                self.shared.clock.wait_resuscitated(),
                self.shared.diagnostics.receive(),
                self.transport.read_line(&mut self.line),
            )
            .await;
            match event {
                Either3::First(()) => self.report_resuscitation().await?,
                Either3::Second(diagnostic) => {
                    self.send_raw(format_args!("{diagnostic}")).await?;
                }
                Either3::Third(result) => break result?,
            }
        };
        self.board.set_activity(false);
        self.line_len = len;

        match self.dispatch().await {
            Ok(()) => {}
            Err(DispatchError::Command(e)) => self.reply_error(e).await?,
            Err(DispatchError::Transport(e)) => return Err(e),
        }

        while let Ok(diagnostic) = self.shared.diagnostics.try_receive() {
            self.send_raw(format_args!("{diagnostic}")).await?;
        }
        Ok(())
    }

    fn line(&self) -> &[u8] {
        self.line.get(..self.line_len).unwrap_or_default()
    }

    async fn dispatch(&mut self) -> Outcome<T::Error> {
        if self.line().len() < 3 {
            return Err(CommandError::UnknownCommand.into());
        }
        let command = Command::parse(self.line()).ok_or(CommandError::UnknownCommand);
        let status = self.shared.state.status();

        match command {
            Ok(cmd) if cmd.allowed_while_running() => self.execute(cmd).await,
            _ if !status.is_idle() => Err(CommandError::Busy.into()),
            Ok(cmd) => self.execute(cmd).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn execute(&mut self, command: Command) -> Outcome<T::Error> {
        #[cfg(feature = "defmt")]
        defmt::debug!("dispatch: {}", command);
        match command {
            Command::Version => self.say(format_args!("Version: {FIRMWARE_VERSION}")).await,
            Command::Board => self.say(format_args!("board: pico{}", BOARD.number())).await,
            Command::Status => {
                let run = self.shared.state.status().code();
                let clock = self.shared.clock.config().source as u8;
                self.say(format_args!("run-status:{run} clock-status:{clock}"))
                    .await
            }
            Command::DebugOn => {
                self.shared.state.set_debug(true);
                self.ok().await
            }
            Command::DebugOff => {
                self.shared.state.set_debug(false);
                self.ok().await
            }
            Command::Abort => {
                self.shared
                    .state
                    .request_abort()
                    .map_err(|_| CommandError::NotRunning)?;
                self.ok().await
            }
            Command::Clear => {
                self.program()?.clear();
                self.ok().await
            }
            Command::RunTriggered => self.start(true).await,
            Command::RunSoftware => self.start(false).await,
            Command::Manual => self.manual().await,
            Command::GetOutputs => {
                let outputs = self.board.read_outputs() & OUTPUT_MASK;
                self.say(format_args!("{outputs:x}")).await
            }
            Command::Set => self.set().await,
            Command::Get => self.get().await,
            Command::Add => self.add().await,
            Command::AddBinary => self.add_binary().await,
            Command::Dump => self.dump().await,
            Command::Length => self.length().await,
            Command::Clock => self.clock().await,
            Command::Edit => self.edit().await,
            Command::Current => self.current().await,
            Command::Frequencies => self.frequencies().await,
            Command::Program => {
                #[cfg(feature = "defmt")]
                defmt::info!("dispatch: rebooting into bootloader");
                self.board.reset_to_bootloader();
                Ok(())
            }
        }
    }

    // ── Handlers ────────────────────────────────────────────────────────────

    async fn start(&mut self, hardware_start: bool) -> Outcome<T::Error> {
        self.shared
            .requests
            .send(Request::Buffered { hardware_start })
            .await;
        self.ok().await
    }

    async fn manual(&mut self) -> Outcome<T::Error> {
        let word = Scanner::after_mnemonic(self.line())
            .hex()
            .filter(|w| w & !OUTPUT_MASK == 0)
            .ok_or(CommandError::InvalidManualRequest)?;
        self.shared.requests.send(Request::Manual(word)).await;
        self.ok().await
    }

    async fn set(&mut self) -> Outcome<T::Error> {
        let mut args = Scanner::after_mnemonic(self.line());
        let (Some(addr), Some(output), Some(duration)) = (args.hex(), args.hex(), args.hex())
        else {
            return Err(CommandError::InvalidInstruction.into());
        };
        self.program()?.write(addr, output, duration)?;
        self.ok().await
    }

    async fn get(&mut self) -> Outcome<T::Error> {
        let addr = Scanner::after_mnemonic(self.line())
            .hex()
            .ok_or(CommandError::InvalidRequest)?;
        let instruction = self
            .program()?
            .read(addr)
            .map_err(|_| CommandError::InvalidAddress)?;
        self.say(format_args!(
            "{:x} {:x}",
            instruction.output, instruction.duration
        ))
        .await
    }

    /// Append `<output> <duration>` lines until `end`.
    ///
    /// Lines without two fields are skipped. The first rejected instruction
    /// ends the batch with its error; later lines are then read as commands.
    /// A store filled exactly by the batch still accepts the closing `end`.
    async fn add(&mut self) -> Outcome<T::Error> {
        let shared = self.shared;
        let mut program = shared.program.try_lock().map_err(|_| CommandError::Busy)?;
        loop {
            let Some(instruction) = self.read_instruction_line(true).await? else {
                drop(program);
                return self.ok().await;
            };
            if program.is_full() {
                return Err(StoreError::CapacityExceeded.into());
            }
            if shared.state.debug() {
                self.say(format_args!("Output: {:x}", instruction.output))
                    .await?;
                self.say(format_args!("Number of Reps: {}", instruction.duration))
                    .await?;
                if instruction.is_hold() {
                    self.say(format_args!("Wait")).await?;
                }
            }
            program.push(instruction)?;
        }
    }

    /// Load `<count>` 6-byte records at instruction `<start>`.
    ///
    /// The error summary names the 0-based absolute address of the most
    /// recent coerced record, the same address `get` takes. Hosts written
    /// against the C firmware, which counted from 1, must subtract one.
    async fn add_binary(&mut self) -> Outcome<T::Error> {
        let mut args = Scanner::after_mnemonic(self.line());
        let (Some(start), Some(count)) = (args.hex(), args.hex()) else {
            return Err(CommandError::InvalidRequest.into());
        };
        let shared = self.shared;
        let mut program = shared.program.try_lock().map_err(|_| CommandError::Busy)?;
        let mut load = program
            .bulk_load(start, count)
            .map_err(|_| CommandError::BulkRange { start, count })?;
        self.say(format_args!("ready")).await?;

        while load.remaining() > 0 {
            let records = load.remaining().min(BULK_RECORDS_PER_READ);
            let bytes = records.saturating_mul(RECORD_SIZE);
            let chunk = self.line.get_mut(..bytes).unwrap_or_default();
            self.transport
                .read_exact(chunk)
                .await
                .map_err(DispatchError::Transport)?;
            load.feed(chunk);
        }

        let summary = load.finish();
        drop(program);
        #[cfg(feature = "defmt")]
        defmt::info!("adm: {}", summary);
        match summary.last_error {
            Some(last) if summary.errors > 0 => {
                self.say(format_args!(
                    "Invalid number of reps in {} instructions, most recent error at instruction {}. Setting reps to zero for these instructions.",
                    summary.errors, last
                ))
                .await
            }
            _ => self.ok().await,
        }
    }

    async fn dump(&mut self) -> Outcome<T::Error> {
        let shared = self.shared;
        let program = shared.program.try_lock().map_err(|_| CommandError::Busy)?;
        for instruction in program.iter() {
            self.say(format_args!("do_cmd: {:04x}", instruction.output))
                .await?;
            if instruction.is_hold() {
                self.say(format_args!("\tWait")).await?;
            } else {
                self.say(format_args!("\treps: {:x}", instruction.duration))
                    .await?;
            }
        }
        Ok(())
    }

    async fn length(&mut self) -> Outcome<T::Error> {
        let (words, instructions) = {
            let program = self.program()?;
            (program.logical_length(), program.instruction_count())
        };
        self.say(format_args!("Number of command lines: {words}"))
            .await?;
        self.say(format_args!("Number of instructions: {instructions}"))
            .await
    }

    async fn clock(&mut self) -> Outcome<T::Error> {
        let mut args = Scanner::after_mnemonic(self.line());
        let (Some(source), Some(frequency)) = (args.decimal(), args.decimal()) else {
            return Err(CommandError::InvalidClockRequest.into());
        };
        let source = ClockSource::try_from(source)?;
        self.shared.clock.configure(source, frequency)?;
        self.ok().await
    }

    /// Replace the last instruction with the next `<output> <duration>` line.
    async fn edit(&mut self) -> Outcome<T::Error> {
        let shared = self.shared;
        let mut program = shared.program.try_lock().map_err(|_| CommandError::Busy)?;
        if program.is_empty() {
            drop(program);
            self.say(format_args!("No commands to edit")).await?;
            return self.ok().await;
        }
        if let Some(instruction) = self.read_instruction_line(false).await? {
            program.replace_last(instruction)?;
        }
        drop(program);
        self.ok().await
    }

    async fn current(&mut self) -> Outcome<T::Error> {
        let last = self.program()?.last().ok_or(CommandError::NothingToShow)?;
        self.say(format_args!("Output: {:x}", last.output)).await?;
        self.say(format_args!("Reps: {}", last.duration)).await?;
        if last.is_hold() {
            self.say(format_args!("Wait")).await?;
        }
        Ok(())
    }

    async fn frequencies(&mut self) -> Outcome<T::Error> {
        for domain in ClockDomain::ALL {
            let khz = self.shared.clock.measure_khz(domain);
            self.say(format_args!("{} = {khz}kHz", domain.name())).await?;
        }
        Ok(())
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    /// Lock the program for an idle-only command.
    ///
    /// The controller holds the lock for a whole run, so contention means busy.
    fn program(&self) -> Result<MutexGuard<'a, M, InstructionStore<N>>, CommandError> {
        self.shared
            .program
            .try_lock()
            .map_err(|_| CommandError::Busy)
    }

    /// Read lines until one carries `<output> <duration>`.
    ///
    /// With `stop_at_end`, a line starting with `end` yields `None`.
    /// A clock resuscitation while waiting is reported at once and the batch
    /// goes on reading.
    async fn read_instruction_line(
        &mut self,
        stop_at_end: bool,
    ) -> Result<Option<Instruction>, DispatchError<T::Error>> {
        let shared = self.shared;
        loop {
            let event = select(
                shared.clock.wait_resuscitated(),
                self.transport.read_line(&mut self.line),
            )
            .await;
            self.line_len = match event {
                Either::First(()) => {
                    self.report_resuscitation()
                        .await
                        .map_err(DispatchError::Transport)?;
                    continue;
                }
                Either::Second(result) => result.map_err(DispatchError::Transport)?,
            };
            let line = self.line();
            if stop_at_end && line.starts_with(b"end") {
                return Ok(None);
            }
            let mut fields = Scanner::new(line);
            if let (Some(output), Some(duration)) = (fields.hex(), fields.hex()) {
                return Ok(Some(Instruction::new(output, duration)));
            }
        }
    }

    /// Drop in-flight input and tell the host the clock fell back.
    async fn report_resuscitation(&mut self) -> Result<(), T::Error> {
        self.transport.reinit();
        self.send_raw(format_args!("System Clock Resus'd")).await
    }

    async fn reply_error(&mut self, error: CommandError) -> Result<(), T::Error> {
        #[cfg(feature = "defmt")]
        defmt::debug!("dispatch: {}", error);
        let reply = match error {
            CommandError::UnknownCommand => {
                render(format_args!("Invalid command: {}", Ascii(self.line())))
            }
            CommandError::Busy => render(format_args!(
                "Cannot execute command {} during buffered execution.",
                Ascii(self.line())
            )),
            other => render(format_args!("{other}")),
        };
        self.transport.write_all(reply.as_bytes()).await
    }

    async fn ok(&mut self) -> Outcome<T::Error> {
        self.say(format_args!("ok")).await
    }

    async fn say(&mut self, args: fmt::Arguments<'_>) -> Outcome<T::Error> {
        self.send_raw(args).await.map_err(DispatchError::Transport)
    }

    async fn send_raw(&mut self, args: fmt::Arguments<'_>) -> Result<(), T::Error> {
        let reply = render(args);
        self.transport.write_all(reply.as_bytes()).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn mnemonic_is_first_three_bytes() {
        assert_eq!(Command::parse(b"set 0 1 5"), Some(Command::Set));
        assert_eq!(Command::parse(b"stsxyz"), Some(Command::Status));
        assert_eq!(Command::parse(b"SET 0 1 5"), None);
        assert_eq!(Command::parse(b"se"), None);
    }

    #[test]
    fn only_queries_and_abort_bypass_gating() {
        let mnemonics = [
            "ver", "brd", "sts", "deb", "ndb", "abt", "cls", "run", "swr", "man", "gto", "set",
            "get", "add", "adm", "dmp", "len", "clk", "edt", "cur", "frq", "prg",
        ];
        let open: Vec<&str> = mnemonics
            .into_iter()
            .filter(|m| Command::parse(m.as_bytes()).unwrap().allowed_while_running())
            .collect();
        assert_eq!(open, ["ver", "brd", "sts", "deb", "ndb", "abt"]);
    }

    #[test]
    fn scanner_reads_hex_fields_after_mnemonic() {
        let mut s = Scanner::after_mnemonic(b"set 1f 0xFFFF 64");
        assert_eq!(s.hex(), Some(0x1f));
        assert_eq!(s.hex(), Some(0xffff));
        assert_eq!(s.hex(), Some(0x64));
        assert_eq!(s.hex(), None);
    }

    #[test]
    fn scanner_failure_is_sticky() {
        let mut s = Scanner::new(b"1 zz 5");
        assert_eq!(s.hex(), Some(1));
        assert_eq!(s.hex(), None);
        assert_eq!(s.hex(), None);
    }

    #[test]
    fn scanner_rejects_overflow() {
        assert_eq!(Scanner::new(b"100000000").hex(), None);
        assert_eq!(Scanner::new(b"ffffffff").hex(), Some(u32::MAX));
        assert_eq!(Scanner::new(b"4294967296").decimal(), None);
    }

    #[test]
    fn scanner_decimal_stops_at_non_digit() {
        let mut s = Scanner::after_mnemonic(b"clk 0 100000000");
        assert_eq!(s.decimal(), Some(0));
        assert_eq!(s.decimal(), Some(100_000_000));
        let mut s = Scanner::after_mnemonic(b"clk 0 1f");
        assert_eq!(s.decimal(), Some(0));
        assert_eq!(s.decimal(), Some(1));
    }

    #[test]
    fn mnemonic_glued_to_argument_is_one_token() {
        let mut s = Scanner::after_mnemonic(b"get5");
        assert_eq!(s.hex(), None);
    }

    #[test]
    fn error_texts() {
        assert_eq!(
            CommandError::BulkRange { start: 10, count: 30000 }.to_string(),
            "Invalid address and/or too many instructions (10 + 30000)."
        );
        assert_eq!(
            CommandError::Store(StoreError::InvalidDuration(3)).to_string(),
            "Reps must be 0 or greater than 4, got 3"
        );
        assert_eq!(
            CommandError::Clock(ClockError::InvalidSource).to_string(),
            "invalid clock source request"
        );
    }

    #[test]
    fn replies_end_with_crlf() {
        assert_eq!(render(format_args!("ok")).as_str(), "ok\r\n");
        assert_eq!(
            render(format_args!("Invalid command: {}", Ascii(b"xy"))).as_str(),
            "Invalid command: xy\r\n"
        );
    }
}
