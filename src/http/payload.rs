//! Chat request body validation.
//!
//! Runs inside handlers, after the guard has admitted the request. Failures
//! become 400 responses through [`ShieldError::BadRequest`].

use serde::Serialize;
use serde_json::Value;

use crate::config::SecurityConfig;
use crate::error::ShieldError;
use crate::security::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn parse(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A sanitized chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    pub conversation_history: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn parse(body: &[u8], limits: &SecurityConfig) -> Result<Self, ShieldError> {
        let bad = |msg: &str| ShieldError::BadRequest(msg.to_string());

        let body: Value = serde_json::from_slice(body).map_err(|_| bad("Invalid JSON body"))?;
        let body = body.as_object().ok_or_else(|| bad("Invalid JSON body"))?;

        let message = match body.get("message") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(v) if is_truthy(v) => return Err(bad("Message must be a string")),
            _ => return Err(bad("Message is required")),
        };

        let message = sanitize(message, limits.max_message_chars);
        if message.is_empty() {
            return Err(bad("Message cannot be empty"));
        }

        let history = match body.get("conversation_history") {
            None => &[][..],
            Some(Value::Array(items)) => items.as_slice(),
            Some(_) => return Err(bad("Conversation history must be an array")),
        };

        let skip = history.len().saturating_sub(limits.max_history_entries);
        let conversation_history = history[skip..]
            .iter()
            .filter_map(|entry| {
                let entry = entry.as_object()?;
                let role = Role::parse(entry.get("role")?)?;
                let content = content_text(entry.get("content")?);
                Some(ChatMessage {
                    role,
                    content: sanitize(&content, limits.max_history_chars),
                })
            })
            .collect();

        Ok(Self {
            message,
            conversation_history,
        })
    }
}

// Null and booleans are spelled `None`, `True`, `False`. Arrays and objects
// stay compact JSON.
fn content_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string(),
    }
}

// A present-but-falsy message (0, false, [], {}) reads as missing.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
