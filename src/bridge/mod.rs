// ABOUTME: XMTP network access through a local bridge sidecar
// ABOUTME: Wire types plus the MessagingTransport implementation

pub mod client;
pub mod wire;

pub use client::{BridgeClient, BridgeTransport};
