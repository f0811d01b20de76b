//! Instruction store
//!
//! A program is an ordered list of `(output, duration)` instructions. The
//! store keeps them densely packed as 32-bit word pairs, exactly the layout
//! the sequencer's burst transfer streams out:
//!
//! ```text
//!   slot:   [ out0 | dur0 ] [ out1 | dur1 ] ... [ outN | durN ]
//!   words:  0      1        2      3             2N     2N+1
//!                                          ▲
//!                          logical length ─┘ (even, counts words)
//! ```
//!
//! # Durations
//!
//! Durations are in system clock ticks. The engine spends
//! [`DURATION_OVERHEAD`] ticks on every instruction by itself, so the stored
//! word is `duration - DURATION_OVERHEAD`; every read path adds it back.
//! `0` is the indefinite-hold sentinel and is stored unchanged. Non-zero
//! durations below [`MIN_DURATION`] cannot be produced and are rejected.
//!
//! Two consecutive zero-duration instructions mark the end of the program.

use platform::config::BOARD;

/// Number of output pins driven by the sequencer.
pub const OUTPUT_WIDTH: u32 = 16;

/// Bits an output word may have set.
pub const OUTPUT_MASK: u32 = (1 << OUTPUT_WIDTH) - 1;

/// Ticks the engine consumes per instruction on its own.
pub const DURATION_OVERHEAD: u32 = 4;

/// Shortest non-zero duration the engine can produce.
pub const MIN_DURATION: u32 = DURATION_OVERHEAD + 1;

/// Instruction capacity of this board.
pub const MAX_INSTRUCTIONS: usize = BOARD.max_instructions();

/// One program step, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Instruction {
    /// Output word (masked to [`OUTPUT_MASK`])
    pub output: u32,
    /// Duration in ticks; `0` holds indefinitely
    pub duration: u32,
}

impl Instruction {
    /// Create an instruction
    pub const fn new(output: u32, duration: u32) -> Self {
        Self { output, duration }
    }

    /// Whether this instruction parks the engine.
    pub const fn is_hold(&self) -> bool {
        self.duration == 0
    }

    /// Check the output mask and duration floor.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.output & !OUTPUT_MASK != 0 {
            return Err(StoreError::InvalidOutput(self.output));
        }
        if self.duration != 0 && self.duration < MIN_DURATION {
            return Err(StoreError::InvalidDuration(self.duration));
        }
        Ok(())
    }

    /// Stored word pair (overhead removed).
    fn encode(self) -> [u32; 2] {
        [self.output, self.duration.saturating_sub(DURATION_OVERHEAD)]
    }

    /// Host view of a stored word pair (overhead added back).
    fn decode([output, stored]: [u32; 2]) -> Self {
        let duration = if stored == 0 {
            0
        } else {
            stored.saturating_add(DURATION_OVERHEAD)
        };
        Self { output, duration }
    }
}

/// Instruction store failures.
///
/// `Display` produces the reply text sent to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Address at or beyond the store capacity
    InvalidAddress(u32),
    /// Output has bits outside [`OUTPUT_MASK`]
    InvalidOutput(u32),
    /// Non-zero duration below [`MIN_DURATION`]
    InvalidDuration(u32),
    /// No free slot left
    CapacityExceeded,
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidAddress(addr) => write!(f, "Invalid instruction address {addr:x}"),
            Self::InvalidOutput(output) => write!(f, "Invalid output specification {output:x}"),
            Self::InvalidDuration(reps) => {
                write!(f, "Reps must be 0 or greater than 4, got {reps:x}")
            }
            Self::CapacityExceeded => write!(
                f,
                "Too many DO commands ({}). Please use resources more efficiently or increase MAX_DO_CMDS and recompile.",
                MAX_INSTRUCTIONS.saturating_mul(2)
            ),
        }
    }
}

/// Fixed-capacity program storage.
pub struct InstructionStore<const N: usize> {
    slots: [[u32; 2]; N],
    /// Populated words; always even.
    len: usize,
}

impl<const N: usize> InstructionStore<N> {
    /// Create an empty store
    pub const fn new() -> Self {
        Self {
            slots: [[0; 2]; N],
            len: 0,
        }
    }

    /// Maximum number of instructions.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Populated words (two per instruction).
    pub const fn logical_length(&self) -> usize {
        self.len
    }

    /// Populated instructions.
    pub const fn instruction_count(&self) -> usize {
        self.len / 2
    }

    /// Whether no instruction is populated.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether every slot is populated.
    pub const fn is_full(&self) -> bool {
        self.instruction_count() >= N
    }

    /// The populated program as the flat word list the sequencer streams.
    pub fn words(&self) -> &[u32] {
        self.slots.as_flattened().get(..self.len).unwrap_or_default()
    }

    /// Reset the logical length to zero. Slot contents are left in place.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Write one instruction at `addr`.
    ///
    /// Checks address, output and duration in that order. Extends the logical
    /// length to cover `addr`; writing a hold directly after another hold
    /// truncates the program to end at `addr`.
    pub fn write(&mut self, addr: u32, output: u32, duration: u32) -> Result<(), StoreError> {
        let index = usize::try_from(addr)
            .ok()
            .filter(|&i| i < N)
            .ok_or(StoreError::InvalidAddress(addr))?;
        let instruction = Instruction::new(output, duration);
        instruction.validate()?;

        let encoded = instruction.encode();
        let previous_is_hold = index
            .checked_sub(1)
            .and_then(|prev| self.slots.get(prev))
            .is_some_and(|[_, stored]| *stored == 0);
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(StoreError::InvalidAddress(addr))?;
        *slot = encoded;

        let first_word = index.saturating_mul(2);
        let end = first_word.saturating_add(2);
        if first_word.saturating_add(1) > self.len {
            self.len = end;
        } else if instruction.is_hold() && previous_is_hold {
            self.len = end;
        }
        Ok(())
    }

    /// Read the instruction at `addr` within the logical length.
    pub fn read(&self, addr: u32) -> Result<Instruction, StoreError> {
        usize::try_from(addr)
            .ok()
            .filter(|&i| i < self.instruction_count())
            .and_then(|i| self.slots.get(i))
            .map(|pair| Instruction::decode(*pair))
            .ok_or(StoreError::InvalidAddress(addr))
    }

    /// Append after the last populated instruction.
    pub fn push(&mut self, instruction: Instruction) -> Result<(), StoreError> {
        instruction.validate()?;
        let index = self.instruction_count();
        let slot = self
            .slots
            .get_mut(index)
            .ok_or(StoreError::CapacityExceeded)?;
        *slot = instruction.encode();
        self.len = self.len.saturating_add(2);
        Ok(())
    }

    /// The last populated instruction.
    pub fn last(&self) -> Option<Instruction> {
        self.instruction_count()
            .checked_sub(1)
            .and_then(|i| self.slots.get(i))
            .map(|pair| Instruction::decode(*pair))
    }

    /// Overwrite the last populated instruction.
    pub fn replace_last(&mut self, instruction: Instruction) -> Result<(), StoreError> {
        instruction.validate()?;
        let slot = self
            .instruction_count()
            .checked_sub(1)
            .and_then(|i| self.slots.get_mut(i))
            .ok_or(StoreError::InvalidAddress(0))?;
        *slot = instruction.encode();
        Ok(())
    }

    /// Iterate the populated instructions in order.
    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.slots
            .iter()
            .take(self.instruction_count())
            .map(|pair| Instruction::decode(*pair))
    }

    /// Start a binary bulk load of `count` instructions at `start`.
    ///
    /// The logical length is reset to end just before `start`, then grows as
    /// records are fed.
    pub fn bulk_load(&mut self, start: u32, count: u32) -> Result<BulkLoad<'_, N>, StoreError> {
        let start_index = usize::try_from(start).map_err(|_| StoreError::InvalidAddress(start))?;
        let count_usize = usize::try_from(count).map_err(|_| StoreError::CapacityExceeded)?;
        match start_index.checked_add(count_usize) {
            Some(end) if end <= N => {}
            _ => return Err(StoreError::CapacityExceeded),
        }
        self.len = start_index.saturating_mul(2);
        Ok(BulkLoad {
            store: self,
            remaining: count_usize,
            errors: 0,
            last_error: None,
        })
    }
}

impl<const N: usize> Default for InstructionStore<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Bulk load ───────────────────────────────────────────────────────────────

/// Bytes per binary record: little-endian `u16` output, `u32` duration.
pub const RECORD_SIZE: usize = platform::config::BULK_RECORD_BYTES;

/// Result of a finished bulk load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BulkSummary {
    /// Records stored
    pub loaded: usize,
    /// Records whose duration was coerced to a hold
    pub errors: u32,
    /// Address of the most recent coerced record
    pub last_error: Option<u32>,
}

/// In-progress binary load.
///
/// Every record is stored. A non-zero duration below [`MIN_DURATION`] is
/// coerced to a hold and counted instead of aborting, so the sender's byte
/// stream is always fully consumed.
pub struct BulkLoad<'a, const N: usize> {
    store: &'a mut InstructionStore<N>,
    remaining: usize,
    errors: u32,
    last_error: Option<u32>,
}

impl<const N: usize> BulkLoad<'_, N> {
    /// Records still expected.
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Store whole records from `bytes`. Bytes beyond the expected count or
    /// a trailing partial record are ignored.
    pub fn feed(&mut self, bytes: &[u8]) {
        for record in bytes.chunks_exact(RECORD_SIZE) {
            if self.remaining == 0 {
                break;
            }
            let (output, duration) = match record {
                [o0, o1, d0, d1, d2, d3] => (
                    u32::from(u16::from_le_bytes([*o0, *o1])),
                    u32::from_le_bytes([*d0, *d1, *d2, *d3]),
                ),
                _ => continue,
            };

            let index = self.store.instruction_count();
            let mut instruction = Instruction::new(output, duration);
            if instruction.validate().is_err() {
                instruction.duration = 0;
                self.errors = self.errors.saturating_add(1);
                self.last_error = u32::try_from(index).ok();
            }
            if let Some(slot) = self.store.slots.get_mut(index) {
                *slot = instruction.encode();
                self.store.len = self.store.len.saturating_add(2);
            }
            self.remaining = self.remaining.saturating_sub(1);
        }
    }

    /// Finish the load and report coerced records.
    pub fn finish(self) -> BulkSummary {
        BulkSummary {
            loaded: self.store.instruction_count(),
            errors: self.errors,
            last_error: self.last_error,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    type Store = InstructionStore<8>;

    #[test]
    fn write_then_read_restores_host_duration() {
        let mut store = Store::new();
        store.write(0, 0x1, 5).unwrap();
        store.write(1, 0xFFFF, 1000).unwrap();
        assert_eq!(store.read(0).unwrap(), Instruction::new(1, 5));
        assert_eq!(store.read(1).unwrap(), Instruction::new(0xFFFF, 1000));
        // Stored form has the overhead removed.
        assert_eq!(store.words(), &[1, 1, 0xFFFF, 996]);
    }

    #[test]
    fn write_rejects_in_address_output_duration_order() {
        let mut store = Store::new();
        assert_eq!(store.write(8, 0x1_0000, 3), Err(StoreError::InvalidAddress(8)));
        assert_eq!(store.write(0, 0x1_0000, 3), Err(StoreError::InvalidOutput(0x1_0000)));
        assert_eq!(store.write(0, 0x1, 3), Err(StoreError::InvalidDuration(3)));
        assert_eq!(store.logical_length(), 0);
    }

    #[test]
    fn duration_floor_is_five_ticks() {
        let mut store = Store::new();
        for d in 1..MIN_DURATION {
            assert_eq!(store.write(0, 0, d), Err(StoreError::InvalidDuration(d)));
        }
        store.write(0, 0, MIN_DURATION).unwrap();
        store.write(1, 0, 0).unwrap();
    }

    #[test]
    fn write_extends_length_to_cover_address() {
        let mut store = Store::new();
        store.write(3, 1, 10).unwrap();
        assert_eq!(store.logical_length(), 8);
        store.write(1, 1, 10).unwrap();
        assert_eq!(store.logical_length(), 8);
    }

    /// Writing a terminator (hold after hold) earlier than the end shortens
    /// the program.
    #[test]
    fn hold_after_hold_truncates_program() {
        let mut store = Store::new();
        for addr in 0..6 {
            store.write(addr, 1, 10).unwrap();
        }
        store.write(1, 0, 0).unwrap();
        assert_eq!(store.logical_length(), 12, "single hold does not truncate");
        store.write(2, 0, 0).unwrap();
        assert_eq!(store.logical_length(), 6);
    }

    #[test]
    fn hold_at_address_zero_never_truncates() {
        let mut store = Store::new();
        store.write(0, 0, 0).unwrap();
        store.write(1, 0, 0).unwrap();
        store.write(2, 1, 10).unwrap();
        store.write(0, 0, 0).unwrap();
        assert_eq!(store.logical_length(), 6);
    }

    #[test]
    fn read_beyond_logical_length_fails() {
        let mut store = Store::new();
        store.write(0, 1, 5).unwrap();
        assert_eq!(store.read(1), Err(StoreError::InvalidAddress(1)));
        store.clear();
        assert_eq!(store.read(0), Err(StoreError::InvalidAddress(0)));
    }

    #[test]
    fn push_appends_until_full() {
        let mut store = InstructionStore::<2>::new();
        store.push(Instruction::new(1, 5)).unwrap();
        store.push(Instruction::new(2, 0)).unwrap();
        assert!(store.is_full());
        assert_eq!(store.push(Instruction::new(3, 5)), Err(StoreError::CapacityExceeded));
        assert_eq!(store.instruction_count(), 2);
    }

    #[test]
    fn replace_last_overwrites_final_instruction() {
        let mut store = Store::new();
        assert_eq!(store.last(), None);
        assert!(store.replace_last(Instruction::new(1, 5)).is_err());

        store.push(Instruction::new(1, 5)).unwrap();
        store.push(Instruction::new(2, 6)).unwrap();
        store.replace_last(Instruction::new(3, 0)).unwrap();
        assert_eq!(store.last(), Some(Instruction::new(3, 0)));
        assert_eq!(store.instruction_count(), 2);
    }

    fn record(output: u16, duration: u32) -> [u8; RECORD_SIZE] {
        let mut r = [0u8; RECORD_SIZE];
        r[..2].copy_from_slice(&output.to_le_bytes());
        r[2..].copy_from_slice(&duration.to_le_bytes());
        r
    }

    #[test]
    fn bulk_load_coerces_short_durations_and_counts_them() {
        let mut store = Store::new();
        let mut load = store.bulk_load(0, 3).unwrap();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&record(0x1, 3));
        bytes.extend_from_slice(&record(0x2, 10));
        bytes.extend_from_slice(&record(0x3, 1));
        load.feed(&bytes);
        assert_eq!(load.remaining(), 0);
        let summary = load.finish();

        assert_eq!(summary.loaded, 3);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.last_error, Some(2));
        assert_eq!(store.read(0).unwrap(), Instruction::new(1, 0));
        assert_eq!(store.read(1).unwrap(), Instruction::new(2, 10));
    }

    #[test]
    fn bulk_load_resets_length_to_start() {
        let mut store = Store::new();
        for addr in 0..6 {
            store.write(addr, 1, 10).unwrap();
        }
        let mut load = store.bulk_load(2, 1).unwrap();
        load.feed(&record(0xA, 0));
        load.finish();
        assert_eq!(store.instruction_count(), 3);
        assert_eq!(store.read(2).unwrap(), Instruction::new(0xA, 0));
    }

    #[test]
    fn bulk_load_ignores_records_beyond_count() {
        let mut store = Store::new();
        let mut load = store.bulk_load(0, 1).unwrap();
        let mut bytes = record(1, 5).to_vec();
        bytes.extend_from_slice(&record(2, 5));
        load.feed(&bytes);
        assert_eq!(load.finish().loaded, 1);
    }

    #[test]
    fn bulk_load_range_must_fit() {
        let mut store = Store::new();
        assert!(store.bulk_load(4, 5).is_err());
        assert!(store.bulk_load(u32::MAX, 2).is_err());
        assert!(store.bulk_load(4, 4).is_ok());
    }

    #[test]
    fn capacity_message_reports_word_count() {
        let text = format!("{}", StoreError::CapacityExceeded);
        assert!(text.starts_with(&format!("Too many DO commands ({})", MAX_INSTRUCTIONS * 2)));
    }
}
