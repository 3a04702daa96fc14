// ABOUTME: Base chain access over JSON-RPC
// ABOUTME: Raw eth_call client plus the EventContracts implementation built on it

pub mod client;
pub mod contracts;

pub use client::RpcClient;
pub use contracts::RpcEventContracts;
