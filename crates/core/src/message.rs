//! Message record domain types.
//!
//! These are the core value objects of the L1 sliding window:
//! user input enters as a record → the window enforces its token budget →
//! records are emitted to the LLM provider in wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a record in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules)
    System,
    /// The end user
    User,
    /// The AI assistant
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    /// Wire-format role string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A message content payload: plain text, structured JSON, or empty.
///
/// Assistant records that only carry tool calls have `Empty` content and
/// serialize with `content: null` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Structured(serde_json::Value),
    Empty,
}

impl Content {
    /// Flatten to text for token counting and substring search.
    ///
    /// Structured payloads render as compact JSON; `Empty` is "".
    pub fn as_text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Structured(v) => v.to_string(),
            Content::Empty => String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Structured(v) => v.is_null(),
            Content::Empty => true,
        }
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Content::Text(s.to_string())
    }
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Content::Text(s)
    }
}

/// A tool call embedded in an assistant record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDescriptor {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

/// A single record in the L1 message window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Unique record ID
    pub id: String,

    /// Who produced this record
    pub role: Role,

    /// The content payload
    pub content: Content,

    /// Token cost of this record, as measured on ingest
    pub token_count: usize,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDescriptor>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Tool name for tool result records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (importance, channel info, provenance)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MessageRecord {
    fn base(role: Role, content: Content) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            token_count: 0,
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user record.
    pub fn user(content: impl Into<Content>) -> Self {
        Self::base(Role::User, content.into())
    }

    /// Create a new assistant record.
    pub fn assistant(content: impl Into<Content>) -> Self {
        Self::base(Role::Assistant, content.into())
    }

    /// Create an assistant record carrying tool calls.
    pub fn assistant_with_tools(
        content: impl Into<Content>,
        tool_calls: Vec<ToolCallDescriptor>,
    ) -> Self {
        let mut record = Self::base(Role::Assistant, content.into());
        record.tool_calls = tool_calls;
        record
    }

    /// Create a new system record.
    pub fn system(content: impl Into<Content>) -> Self {
        Self::base(Role::System, content.into())
    }

    /// Create a tool result record.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<Content>) -> Self {
        let mut record = Self::base(Role::Tool, content.into());
        record.tool_call_id = Some(tool_call_id.into());
        record
    }

    /// Set the measured token count (builder-style).
    pub fn with_token_count(mut self, tokens: usize) -> Self {
        self.token_count = tokens;
        self
    }

    /// Set the importance metadata used by L1→L2 promotion.
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.metadata
            .insert("importance".into(), serde_json::json!(importance));
        self
    }

    /// Importance carried in metadata, or the engine default of 0.5.
    pub fn importance(&self) -> f64 {
        self.metadata
            .get("importance")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.5)
    }

    /// Emit the LLM wire shape for this record.
    ///
    /// Content is `null` when empty and tool calls are present; tool
    /// records carry `tool_call_id` (and `name` when known).
    pub fn to_wire(&self) -> serde_json::Value {
        let mut msg = serde_json::Map::new();
        msg.insert("role".into(), serde_json::json!(self.role.as_str()));

        let content = match &self.content {
            Content::Text(s) => serde_json::json!(s),
            Content::Structured(v) => v.clone(),
            Content::Empty => serde_json::Value::Null,
        };
        if content.is_null() && !self.tool_calls.is_empty() {
            msg.insert("content".into(), serde_json::Value::Null);
        } else {
            msg.insert("content".into(), content);
        }

        if !self.tool_calls.is_empty() {
            let calls: Vec<serde_json::Value> = self
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "function": { "name": tc.name, "arguments": tc.arguments },
                    })
                })
                .collect();
            msg.insert("tool_calls".into(), serde_json::Value::Array(calls));
        }

        if let Some(tcid) = &self.tool_call_id {
            msg.insert("tool_call_id".into(), serde_json::json!(tcid));
        }
        if let Some(name) = &self.tool_name {
            msg.insert("name".into(), serde_json::json!(name));
        }

        serde_json::Value::Object(msg)
    }
}
