// ABOUTME: Pluggable text-completion backend abstraction for the raduno agent.
// ABOUTME: Provides a trait-based backend (OpenAI-compatible HTTP, scripted mock) behind Arc handles.

pub mod error;
pub mod registry;
pub mod request;
pub mod traits;

pub mod backends;

pub use error::CompletionError;
pub use registry::{BackendFactory, BackendRegistry};
pub use request::CompletionRequest;
pub use traits::{CompletionBackend, SharedBackend};
