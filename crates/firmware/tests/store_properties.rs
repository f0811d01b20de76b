//! Property tests for the instruction store.
//!
//! Run with: cargo test -p firmware --test store_properties

// Property test file -- intentional test patterns permitted.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation,
)]

use firmware::program::{DURATION_OVERHEAD, MIN_DURATION, OUTPUT_MASK};
use firmware::{Instruction, InstructionStore, StoreError};
use proptest::prelude::*;

const CAPACITY: usize = 64;

type Store = InstructionStore<CAPACITY>;

fn any_duration() -> impl Strategy<Value = u32> {
    prop_oneof![Just(0u32), MIN_DURATION..=u32::MAX]
}

fn timed_program(store: &mut Store, len: usize) {
    for addr in 0..len {
        store.write(addr as u32, 1, MIN_DURATION).unwrap();
    }
}

proptest! {
    /// What the host writes is what it reads back; the stored word carries
    /// the engine overhead removed.
    #[test]
    fn host_view_survives_storage(
        addr in 0u32..CAPACITY as u32,
        output in 0u32..=OUTPUT_MASK,
        duration in any_duration(),
    ) {
        let mut store = Store::new();
        store.write(addr, output, duration).unwrap();

        prop_assert_eq!(store.read(addr).unwrap(), Instruction::new(output, duration));
        let stored = store.words()[addr as usize * 2 + 1];
        let expected = if duration == 0 { 0 } else { duration - DURATION_OVERHEAD };
        prop_assert_eq!(stored, expected);
        prop_assert_eq!(store.logical_length(), (addr as usize + 1) * 2);
    }

    /// Durations the engine cannot produce are refused without side effects.
    #[test]
    fn unproducible_duration_leaves_store_untouched(
        len in 0usize..8,
        addr in 0u32..CAPACITY as u32,
        duration in 1u32..MIN_DURATION,
    ) {
        let mut store = Store::new();
        timed_program(&mut store, len);
        let before = store.words().to_vec();

        prop_assert_eq!(
            store.write(addr, 1, duration),
            Err(StoreError::InvalidDuration(duration))
        );
        prop_assert_eq!(store.words(), before.as_slice());
    }

    /// Outputs wider than the pin bank are refused.
    #[test]
    fn wide_outputs_are_refused(output in (OUTPUT_MASK + 1)..=u32::MAX) {
        let mut store = Store::new();
        prop_assert_eq!(store.write(0, output, 0), Err(StoreError::InvalidOutput(output)));
        prop_assert!(store.is_empty());
    }

    /// Writing a second consecutive hold inside the program ends it there.
    #[test]
    fn terminator_truncates_program(len in 3usize..CAPACITY, cut in 0usize..CAPACITY) {
        let cut = cut % (len - 1);
        let mut store = Store::new();
        timed_program(&mut store, len);

        store.write(cut as u32, 0, 0).unwrap();
        prop_assert_eq!(store.instruction_count(), len);
        store.write(cut as u32 + 1, 0, 0).unwrap();

        prop_assert_eq!(store.instruction_count(), cut + 2);
        prop_assert!(store.read(cut as u32 + 2).is_err());
    }

    /// A bulk load always consumes its records and reports every coercion.
    #[test]
    fn bulk_load_counts_coerced_records(durations in prop::collection::vec(0u32..16, 1..CAPACITY)) {
        let mut store = Store::new();
        let mut bytes = Vec::new();
        for &d in &durations {
            bytes.extend_from_slice(&1u16.to_le_bytes());
            bytes.extend_from_slice(&d.to_le_bytes());
        }

        let mut load = store.bulk_load(0, durations.len() as u32).unwrap();
        load.feed(&bytes);
        prop_assert_eq!(load.remaining(), 0);
        let summary = load.finish();

        let bad: Vec<usize> = durations
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d != 0 && d < MIN_DURATION)
            .map(|(i, _)| i)
            .collect();
        prop_assert_eq!(summary.loaded, durations.len());
        prop_assert_eq!(summary.errors as usize, bad.len());
        prop_assert_eq!(summary.last_error, bad.last().map(|&i| i as u32));
        for &i in &bad {
            prop_assert!(store.read(i as u32).unwrap().is_hold());
        }
    }
}
