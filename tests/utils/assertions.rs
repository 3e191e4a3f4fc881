//! Test assertion helpers
#![allow(dead_code)] // Test utilities may not all be used in every test

use std::time::Duration;
use tokio::time::Instant;

use rtm_bridge::rtm::{CallRecord, Operation};

use super::mocks::RecordingSubscriber;
use super::setup::TestSetup;

// ============================================================================
// Timing Assertions
// ============================================================================

/// Gaps between consecutive calls of `operation`, in milliseconds
pub fn call_gaps_ms(calls: &[CallRecord]) -> Vec<u128> {
    calls
        .windows(2)
        .map(|pair| (pair[1].at - pair[0].at).as_millis())
        .collect()
}

pub fn assert_call_gaps(setup: &TestSetup, operation: Operation, expected: &[Duration]) {
    let calls = setup.client.calls_for(operation);
    let expected: Vec<u128> = expected.iter().map(Duration::as_millis).collect();
    assert_eq!(
        call_gaps_ms(&calls),
        expected,
        "unexpected retry spacing for {}",
        operation
    );
}

pub fn assert_elapsed(from: Instant, to: Instant, expected: Duration) {
    assert_eq!(
        (to - from).as_millis(),
        expected.as_millis(),
        "expected {:?} between instants",
        expected
    );
}

// ============================================================================
// Event Assertions
// ============================================================================

pub fn assert_event_names(subscriber: &RecordingSubscriber, expected: &[&str]) {
    assert_eq!(
        subscriber.names(),
        expected
            .iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>(),
        "subscriber saw unexpected events"
    );
}

pub fn assert_nothing_dispatched(subscriber: &RecordingSubscriber) {
    assert!(
        subscriber.events().is_empty(),
        "expected no events, got {:?}",
        subscriber.names()
    );
}
