//! Deadlines for remote calls.
//!
//! Every operation that talks to the knowledge service takes a [`Deadline`].
//! Each individual call is raced against it; on expiry the pending call is
//! dropped and the operation fails with [`Error::Timeout`] naming the call.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    #[must_use]
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    #[must_use]
    pub fn remaining(self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    /// Run `call` unless the deadline passes first.
    pub async fn run<F, T>(self, operation: &'static str, target: &str, call: F) -> Result<T, Error>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout_at(self.0, call)
            .await
            .map_err(|_| Error::Timeout {
                operation,
                target: target.to_string(),
            })
    }
}
