pub mod assertions;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use assertions::*;
#[allow(unused_imports)]
pub use mocks::{RecordingSink, RecordingSubscriber};
#[allow(unused_imports)]
pub use setup::{envelope, event_message, settle, TestSetup, TestSetupBuilder, CHANNEL, LOCAL_UID};
