//! Context blocks — the unit the orchestrator assembles into a prompt.

use serde::{Deserialize, Serialize};

/// A role-tagged, token-priced fragment of context.
///
/// Sources emit blocks; the orchestrator concatenates them under the
/// budget. Priority drives last-resort trimming when the assembled prompt
/// would exceed the window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBlock {
    /// The rendered content
    pub content: String,

    /// Wire role this block is emitted under ("system", "user", ...)
    pub role: String,

    /// Measured token count of `content`
    pub token_count: usize,

    /// Priority in [0, 1]; higher survives trimming longer
    pub priority: f64,

    /// Which source emitted this block
    pub source: String,

    /// Whether the compactor may summarize this block away
    pub compressible: bool,

    /// Provenance metadata (candidate ids, origin, promoted flag)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ContextBlock {
    pub fn new(content: impl Into<String>, role: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role: role.into(),
            token_count: 0,
            priority: 0.5,
            source: source.into(),
            compressible: true,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.token_count = tokens;
        self
    }

    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority.clamp(0.0, 1.0);
        self
    }

    pub fn not_compressible(mut self) -> Self {
        self.compressible = false;
        self
    }
}
