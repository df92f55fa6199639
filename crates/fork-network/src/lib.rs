//! Network helpers shared by the fork harness.
//!
//! - [`readiness`] polls a JSON-RPC endpoint until it answers.
//! - [`retry`] wraps any fallible async operation with exponential backoff
//!   or a deadline.
//! - [`cleanup`] collects teardown tasks and runs them on exit signals.

pub mod cleanup;
pub mod readiness;
pub mod retry;

pub use cleanup::{CleanupRegistry, CleanupTask};
pub use readiness::{fetch_block_number, wait_for_network, ReadinessOptions};
pub use retry::{retry_with_backoff, with_timeout, RetryOptions};
