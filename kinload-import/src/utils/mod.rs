//! Utility functions

pub mod retry;

pub use retry::{retry_transient, RetryPolicy};
