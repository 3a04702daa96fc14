// ABOUTME: Mock backend for testing - returns pre-configured responses.
// ABOUTME: Allows deterministic tests without calling a real completion service.
//!
//! # Example
//!
//! ```no_run
//! use raduno_llm::backends::mock::MockBackend;
//! use raduno_llm::{CompletionBackend, CompletionRequest};
//!
//! # async fn example() {
//! let mock = MockBackend::new()
//!     .on_prompt("REGISTER").respond_text("RECOMMEND")
//!     .on_prompt("recommendation").respond_text("Try the hackathon!");
//!
//! let request = CompletionRequest::new("Respond with REGISTER or RECOMMEND", "hi");
//! let text = mock.complete(&request).await.unwrap();
//! assert_eq!(text, "RECOMMEND");
//! assert_eq!(mock.calls().len(), 1);
//! # }
//! ```

use crate::registry::BackendFactory;
use crate::traits::{CompletionBackend, SharedBackend};
use crate::CompletionRequest;
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Mock backend for testing
#[derive(Clone)]
pub struct MockBackend {
    expectations: Arc<Mutex<VecDeque<Expectation>>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

struct Expectation {
    pattern: String,
    reply: Reply,
}

enum Reply {
    Text(String),
    Error(String),
}

impl MockBackend {
    /// Create a new mock backend with no expectations
    pub fn new() -> Self {
        Self {
            expectations: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set up an expectation for a request whose system or user prompt contains `pattern`
    pub fn on_prompt(self, pattern: &str) -> ExpectationBuilder {
        ExpectationBuilder {
            backend: self,
            pattern: pattern.to_string(),
        }
    }

    /// Every request received so far, in order
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of expectations not yet consumed
    pub fn pending(&self) -> usize {
        self.expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Wrap a clone of this mock as a shared backend; the clone shares call history
    pub fn shared(&self) -> SharedBackend {
        Arc::new(self.clone())
    }

    /// Factory function for the registry
    pub fn factory() -> BackendFactory {
        Box::new(|_config: &serde_json::Value| {
            let backend: SharedBackend = Arc::new(MockBackend::new());
            Ok(backend)
        })
    }

    fn answer(&self, request: &CompletionRequest) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let haystack = format!("{}\n{}", request.system, request.user);

        // FIFO preference: check the front first, fall back to searching the queue.
        let reply = {
            let mut exp = self.expectations.lock().unwrap_or_else(|e| e.into_inner());
            match exp.front() {
                Some(front) if haystack.contains(&front.pattern) => {
                    exp.pop_front().map(|e| e.reply)
                }
                Some(_) => exp
                    .iter()
                    .position(|e| haystack.contains(&e.pattern))
                    .and_then(|i| exp.remove(i))
                    .map(|e| e.reply),
                None => None,
            }
        };

        match reply {
            Some(Reply::Text(text)) => Ok(text),
            Some(Reply::Error(message)) => Err(anyhow::anyhow!(message)),
            None => Ok(format!("Mock: no expectation for '{}'", request.user)),
        }
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move { self.answer(request) })
    }
}

/// Builder for setting up mock expectations with a fluent API
pub struct ExpectationBuilder {
    backend: MockBackend,
    pattern: String,
}

impl ExpectationBuilder {
    fn push(self, reply: Reply) -> MockBackend {
        self.backend
            .expectations
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Expectation {
                pattern: self.pattern,
                reply,
            });
        self.backend
    }

    /// Respond with a simple text result
    pub fn respond_text(self, text: &str) -> MockBackend {
        self.push(Reply::Text(text.to_string()))
    }

    /// Respond with an error
    pub fn respond_error(self, message: &str) -> MockBackend {
        self.push(Reply::Error(message.to_string()))
    }
}
