// ABOUTME: Typed completion failures that callers may need to branch on.
// ABOUTME: Carried inside anyhow::Error and recovered with downcast_ref.

use std::fmt;

/// Failure modes of a completion call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionError {
    /// No API key configured for a backend that needs one
    MissingCredential,
    /// Upstream answered with a non-success status
    Http { status: u16, body: String },
    /// Upstream answered but returned no choices or empty content
    Empty,
}

impl fmt::Display for CompletionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingCredential => write!(f, "completion backend has no API key configured"),
            Self::Http { status, body } => write!(f, "completion request failed: HTTP {}: {}", status, body),
            Self::Empty => write!(f, "completion response contained no text"),
        }
    }
}

impl std::error::Error for CompletionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_status() {
        let err = CompletionError::Http {
            status: 429,
            body: "slow down".to_string(),
        };
        assert_eq!(err.to_string(), "completion request failed: HTTP 429: slow down");
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let err: anyhow::Error = CompletionError::Empty.into();
        assert_eq!(
            err.downcast_ref::<CompletionError>(),
            Some(&CompletionError::Empty)
        );
    }
}
