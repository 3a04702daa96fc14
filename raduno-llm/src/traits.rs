// ABOUTME: Core CompletionBackend trait that all backends implement.
// ABOUTME: A single request/response call returning free text.

use crate::CompletionRequest;
use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Core trait that all completion backends implement.
///
/// Methods return boxed futures so backends can be stored as
/// `Arc<dyn CompletionBackend>` and shared across tasks.
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logging and metrics
    fn name(&self) -> &'static str;

    /// Send one system+user prompt pair and return the model's text
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String>>;
}

/// Shared handle used by the agent
pub type SharedBackend = Arc<dyn CompletionBackend>;
