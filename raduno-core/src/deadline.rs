// ABOUTME: Per-call deadline wrapper for collaborator calls (chain, transport, completion)
// ABOUTME: Converts a timed-out future into a typed DeadlineExceeded error

use crate::metrics;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Default bound for a single collaborator call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// A collaborator call did not finish within its deadline.
///
/// Recover it from an `anyhow::Error` with `downcast_ref::<DeadlineExceeded>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlineExceeded {
    /// Name of the call that timed out (e.g. "add_members")
    pub call: &'static str,
    pub limit: Duration,
}

impl std::fmt::Display for DeadlineExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} did not complete within {}ms",
            self.call,
            self.limit.as_millis()
        )
    }
}

impl std::error::Error for DeadlineExceeded {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// Run `call` under this deadline.
    pub async fn run<T, F>(&self, name: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.limit, call).await {
            Ok(result) => result,
            Err(_) => {
                metrics::record_timeout(name);
                tracing::warn!(
                    call = name,
                    limit_ms = self.limit.as_millis() as u64,
                    "Collaborator call timed out"
                );
                Err(DeadlineExceeded {
                    call: name,
                    limit: self.limit,
                }
                .into())
            }
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new(DEFAULT_CALL_TIMEOUT)
    }
}
