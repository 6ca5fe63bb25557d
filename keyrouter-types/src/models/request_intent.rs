use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::RouterError;

/// A single chat-style message within a `RequestIntent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// One of `system`, `user`, `assistant`, `tool`.
    pub role: String,
    /// Message body. May be empty only if `tool_calls` is non-empty.
    pub content: String,
    /// Tool invocations attached to this message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
}

const ALLOWED_ROLES: [&str; 4] = ["system", "user", "assistant", "tool"];

impl Message {
    /// Construct and validate a `Message`.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `role` is not one of
    /// `system`/`user`/`assistant`/`tool`, or if `content` is empty while no
    /// `tool_calls` are attached.
    pub fn new(
        role: impl Into<String>,
        content: impl Into<String>,
        tool_calls: Option<Vec<Value>>,
    ) -> Result<Self, RouterError> {
        let role = role.into();
        if !ALLOWED_ROLES.contains(&role.as_str()) {
            return Err(RouterError::invalid_arg(format!(
                "role must be one of {ALLOWED_ROLES:?}, got {role}"
            )));
        }
        let content = content.into();
        let has_tool_calls = tool_calls.as_ref().is_some_and(|tc| !tc.is_empty());
        if content.is_empty() && !has_tool_calls {
            return Err(RouterError::invalid_arg(
                "content must be non-empty unless tool_calls are present",
            ));
        }
        Ok(Self {
            role,
            content,
            tool_calls,
        })
    }
}

/// Provider-agnostic description of a request a caller wants routed.
///
/// This is the unit the whole decision pipeline (`PolicyEngine`,
/// `RoutingEngine`, `CostController`) reasons about; it carries no
/// understanding of message semantics (see `spec.md` Non-goals).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestIntent {
    /// Caller-requested model identifier (provider-specific string).
    pub model: String,
    /// Conversation history, 1..=1000 entries.
    pub messages: Vec<Message>,
    /// Free-form request parameters (`temperature`, `max_tokens`, `top_p`,
    /// `stream`, and any provider-specific extras).
    pub parameters: HashMap<String, Value>,
}

impl RequestIntent {
    /// Construct and validate a `RequestIntent`.
    ///
    /// # Errors
    /// Returns `RouterError::InvalidArg` if `model` exceeds 200 characters,
    /// `messages` is empty or exceeds 1000 entries, or any recognized
    /// parameter is outside its valid range.
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        parameters: HashMap<String, Value>,
    ) -> Result<Self, RouterError> {
        let model = model.into();
        if model.len() > 200 {
            return Err(RouterError::invalid_arg("model must be <= 200 characters"));
        }
        if messages.is_empty() || messages.len() > 1000 {
            return Err(RouterError::invalid_arg(
                "messages must contain between 1 and 1000 entries",
            ));
        }
        let intent = Self {
            model,
            messages,
            parameters,
        };
        intent.validate_parameters()?;
        Ok(intent)
    }

    fn validate_parameters(&self) -> Result<(), RouterError> {
        if let Some(t) = self.parameters.get("temperature").and_then(Value::as_f64) {
            if !(0.0..=2.0).contains(&t) {
                return Err(RouterError::invalid_arg("temperature must be within 0..=2"));
            }
        }
        if let Some(m) = self.parameters.get("max_tokens").and_then(Value::as_u64) {
            if !(1..=1_000_000).contains(&m) {
                return Err(RouterError::invalid_arg(
                    "max_tokens must be within 1..=1_000_000",
                ));
            }
        }
        if let Some(p) = self.parameters.get("top_p").and_then(Value::as_f64) {
            if !(0.0..=1.0).contains(&p) {
                return Err(RouterError::invalid_arg("top_p must be within 0..=1"));
            }
        }
        Ok(())
    }

    /// `temperature` parameter, if present.
    #[must_use]
    pub fn temperature(&self) -> Option<f64> {
        self.parameters.get("temperature").and_then(Value::as_f64)
    }

    /// `max_tokens` parameter, if present.
    #[must_use]
    pub fn max_tokens(&self) -> Option<u64> {
        self.parameters.get("max_tokens").and_then(Value::as_u64)
    }

    /// `top_p` parameter, if present.
    #[must_use]
    pub fn top_p(&self) -> Option<f64> {
        self.parameters.get("top_p").and_then(Value::as_f64)
    }

    /// `stream` parameter, defaulting to `false`.
    #[must_use]
    pub fn stream(&self) -> bool {
        self.parameters
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_role() {
        assert!(Message::new("narrator", "hi", None).is_err());
    }

    #[test]
    fn allows_empty_content_with_tool_calls() {
        let msg = Message::new("assistant", "", Some(vec![Value::String("call".into())]));
        assert!(msg.is_ok());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        let mut params = HashMap::new();
        params.insert("temperature".to_string(), Value::from(5.0));
        let msgs = vec![Message::new("user", "hi", None).unwrap()];
        assert!(RequestIntent::new("gpt-4", msgs, params).is_err());
    }

    #[test]
    fn stream_defaults_false() {
        let msgs = vec![Message::new("user", "hi", None).unwrap()];
        let intent = RequestIntent::new("gpt-4", msgs, HashMap::new()).unwrap();
        assert!(!intent.stream());
    }
}
