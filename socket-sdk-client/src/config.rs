//! Request-level configuration:
//! - [`CallOptions`]: Per-call timeout, retries and headers
//! - [`RetryPolicy`]: Retry behavior with exponential backoff
//! - [`RetryController`]: Drives one call through its attempts

mod options;
mod retry;

pub use options::CallOptions;
pub use retry::{
    ExponentialBackoff, RetryController, RetryOutcome, RetryPolicy, defaults, retry,
    retry_with_policy,
};
