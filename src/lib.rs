// ABOUTME: Root library module for the raduno agent binary
// ABOUTME: Network adapters (XMTP bridge, JSON-RPC) plus the sync and inbound loops

pub mod bridge;
pub mod inbound;
pub mod rpc;
pub mod scheduler;

// Re-export platform-agnostic modules from raduno-core
pub use raduno_core::assistant;
pub use raduno_core::config;
pub use raduno_core::metrics;
pub use raduno_core::paths;
pub use raduno_core::reconciler;
pub use raduno_core::store;
pub use raduno_core::traits;

// Re-export raduno-llm types for convenience
pub use raduno_llm::{BackendRegistry, SharedBackend};
