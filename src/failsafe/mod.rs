//! Failsafe mechanisms for outbound calls.
//!
//! Only retry survives here: the gateway never retries on its own, but
//! services that talk to external backends (payments) wrap their calls in
//! [`with_retry`].

mod retry;

pub use retry::{RetryPolicy, with_retry};
