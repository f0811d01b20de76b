//! Integration test: execution controller transitions against a mock sequencer.
//!
//! Run with: cargo test -p firmware --test controller_state_machine

// Integration test file -- intentional test patterns permitted.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
)]

use embassy_futures::select::select;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use firmware::{Diagnostic, ExecutionController, Request, RunStatus, Shared};
use platform::mocks::{MockClock, MockSequencer, SequencerProbe};

type TestShared = Shared<NoopRawMutex, MockClock, 8>;

fn shared_with_program() -> TestShared {
    let shared: TestShared = Shared::new(MockClock::default());
    {
        let mut program = shared.program.try_lock().unwrap();
        program.write(0, 0x3, 10).unwrap();
        program.write(1, 0, 0).unwrap();
        program.write(2, 0, 0).unwrap();
    }
    shared.state.set_debug(true);
    shared
}

fn drain(shared: &TestShared) -> Vec<Diagnostic> {
    std::iter::from_fn(|| shared.diagnostics.try_receive().ok()).collect()
}

#[tokio::test]
async fn completed_run_stops_and_releases_program() {
    let shared = shared_with_program();
    let probe = SequencerProbe::new();
    probe.complete_after(Some(3));
    let mut controller = ExecutionController::new(&shared, MockSequencer::new(&probe));

    shared
        .requests
        .try_send(Request::Buffered { hardware_start: true })
        .unwrap();
    controller.serve_one().await;

    assert_eq!(shared.state.status(), RunStatus::Stopped);
    assert_eq!(probe.arm_count(), 1);
    assert_eq!(probe.stop_count(), 1);
    assert_eq!(probe.last_hardware_start(), Some(true));
    assert_eq!(probe.armed_words(), vec![0x3, 6, 0, 0, 0, 0]);
    // Completion is acknowledged before the sequencer is stopped.
    assert!(!probe.is_complete());
    assert!(shared.program.try_lock().is_ok());
    assert_eq!(
        drain(&shared),
        vec![
            Diagnostic::HardwareStart(true),
            Diagnostic::LoopEnded,
            Diagnostic::EndedAt(0),
            Diagnostic::Stopped,
        ]
    );
}

#[tokio::test]
async fn arm_failure_ends_as_aborted() {
    let shared = shared_with_program();
    let probe = SequencerProbe::new();
    probe.fail_arm(true);
    let mut controller = ExecutionController::new(&shared, MockSequencer::new(&probe));

    shared
        .requests
        .try_send(Request::Buffered { hardware_start: false })
        .unwrap();
    controller.serve_one().await;

    assert_eq!(shared.state.status(), RunStatus::Aborted);
    assert_eq!(probe.arm_count(), 0);
    assert_eq!(probe.stop_count(), 1);
    assert!(shared.program.try_lock().is_ok());
    assert_eq!(
        drain(&shared),
        vec![Diagnostic::HardwareStart(false), Diagnostic::ArmFailed]
    );
}

#[tokio::test]
async fn abort_request_interrupts_a_running_program() {
    let shared = shared_with_program();
    let probe = SequencerProbe::default();
    let mut controller = ExecutionController::new(&shared, MockSequencer::new(&probe));

    shared
        .requests
        .try_send(Request::Buffered { hardware_start: false })
        .unwrap();
    let operator = async {
        while shared.state.status() != RunStatus::Running {
            embassy_futures::yield_now().await;
        }
        // The controller holds the program for the whole run.
        assert!(shared.program.try_lock().is_err());
        shared.state.request_abort().unwrap();
        assert_eq!(shared.state.status(), RunStatus::AbortRequested);
        core::future::pending::<()>().await;
    };
    select(controller.serve_one(), operator).await;

    assert_eq!(shared.state.status(), RunStatus::Aborted);
    assert_eq!(probe.stop_count(), 1);
    assert!(shared.program.try_lock().is_ok());
    assert_eq!(drain(&shared).last(), Some(&Diagnostic::Aborted));
}

#[tokio::test]
async fn a_new_run_may_follow_an_abort() {
    let shared = shared_with_program();
    shared.state.set_status(RunStatus::Aborted);
    let probe = SequencerProbe::new();
    let mut controller = ExecutionController::new(&shared, MockSequencer::new(&probe));

    shared
        .requests
        .try_send(Request::Buffered { hardware_start: false })
        .unwrap();
    controller.serve_one().await;

    assert_eq!(shared.state.status(), RunStatus::Stopped);
}

#[tokio::test]
async fn manual_word_is_masked_to_output_pins() {
    let shared = shared_with_program();
    let probe = SequencerProbe::new();
    let mut controller = ExecutionController::new(&shared, MockSequencer::new(&probe));

    shared
        .requests
        .try_send(Request::Manual(0xFFFF_FFFF))
        .unwrap();
    controller.serve_one().await;

    assert_eq!(probe.driven(), Some(0xFFFF));
    assert_eq!(probe.arm_count(), 0);
    assert_eq!(shared.state.status(), RunStatus::Stopped);
    assert_eq!(drain(&shared), vec![Diagnostic::OutputCommanded(0xFFFF_FFFF)]);
}

#[tokio::test]
async fn diagnostics_are_silent_without_debug() {
    let shared = shared_with_program();
    shared.state.set_debug(false);
    let probe = SequencerProbe::new();
    let mut controller = ExecutionController::new(&shared, MockSequencer::new(&probe));

    shared
        .requests
        .try_send(Request::Buffered { hardware_start: false })
        .unwrap();
    controller.serve_one().await;

    assert!(drain(&shared).is_empty());
}
