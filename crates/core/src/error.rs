//! Error types for the Mnemo domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Mnemo operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Knowledge base errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Permission denied: {name} — {reason}")]
    PermissionDenied { name: String, reason: String },

    #[error("Corrupted snapshot: {0}")]
    Snapshot(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Backend failed: {backend} — {reason}")]
    Backend { backend: String, reason: String },

    #[error("Backend timed out: {backend} after {timeout_secs}s")]
    Timeout { backend: String, timeout_secs: u64 },
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge base query failed: {name} — {reason}")]
    QueryFailed { name: String, reason: String },

    #[error("Index build failed: {0}")]
    IndexFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_displays_name_and_reason() {
        let err = Error::Memory(MemoryError::PermissionDenied {
            name: "memory_write".into(),
            reason: "writes disabled for this tool".into(),
        });
        assert!(err.to_string().contains("memory_write"));
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn retrieval_timeout_displays_backend() {
        let err = Error::Retrieval(RetrievalError::Timeout {
            backend: "vector".into(),
            timeout_secs: 5,
        });
        assert!(err.to_string().contains("vector"));
        assert!(err.to_string().contains("5"));
    }
}
