// ABOUTME: Backend implementations (OpenAI-compatible HTTP, mock).
// ABOUTME: Each backend implements the CompletionBackend trait.

pub mod mock;
pub mod openai;
