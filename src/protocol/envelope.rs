//! Wire envelope exchanged with the agent backend.
//!
//! Every field except `type` is optional on decode so that partial or older
//! backend messages still parse.  Outbound envelopes leave `id` and
//! `timestamp` unset; the backend fills them in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::kind::MessageKind;

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default = "unknown_agent")]
    pub agent_id: String,
    #[serde(default)]
    pub role: String,
}

fn unknown_agent() -> String {
    "unknown".into()
}

impl Default for Sender {
    fn default() -> Self {
        Self {
            agent_id: unknown_agent(),
            role: String::new(),
        }
    }
}

/// Where a message is headed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    #[serde(default = "broadcast")]
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

fn broadcast() -> String {
    "broadcast".into()
}

impl Default for Recipient {
    fn default() -> Self {
        Self {
            target: broadcast(),
            room: None,
        }
    }
}

/// Message body.  Fields outside the common schema (e.g. `text` on voice
/// pipeline messages) are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub content: Value,
    #[serde(default = "text_format")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn text_format() -> String {
    "text".into()
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            content: Value::Null,
            format: text_format(),
            emotion: None,
            extra: Map::new(),
        }
    }
}

/// Routing metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default = "normal_priority")]
    pub priority: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

fn normal_priority() -> String {
    "normal".into()
}

fn default_ttl() -> u32 {
    5
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            priority: normal_priority(),
            ttl: default_ttl(),
            correlation_id: None,
        }
    }
}

/// One message on the backend bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub sender: Sender,
    #[serde(default)]
    pub recipient: Recipient,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Envelope {
    /// Bare envelope of the given type with default sub-objects.
    pub fn new(kind: MessageKind) -> Self {
        Self {
            id: None,
            timestamp: None,
            kind: kind.as_str().to_owned(),
            sender: Sender::default(),
            recipient: Recipient::default(),
            payload: Payload::default(),
            metadata: Metadata::default(),
        }
    }

    /// A user utterance addressed to `target` (`"broadcast"` for everyone).
    pub fn user_narrative(text: &str, target: &str) -> Self {
        let mut env = Self::new(MessageKind::NarrativeText);
        env.sender = Sender {
            agent_id: "user".into(),
            role: "user".into(),
        };
        env.recipient.target = target.to_owned();
        env.payload.content = Value::String(text.to_owned());
        env
    }

    /// Pushes the UI's log level to the backend.
    pub fn config_update(log_level: &str) -> Self {
        let mut env = Self::new(MessageKind::ConfigUpdate);
        env.sender = Sender {
            agent_id: "user".into(),
            role: "admin".into(),
        };
        env.recipient.target = "system".into();
        env.payload.content = serde_json::json!({ "log_level": log_level });
        env.payload.format = "json".into();
        env.metadata.priority = "system".into();
        env
    }

    pub fn message_kind(&self) -> MessageKind {
        MessageKind::from_wire(&self.kind)
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.metadata
            .correlation_id
            .as_deref()
            .filter(|c| !c.is_empty())
    }

    /// Narrative text carried by the payload.
    ///
    /// Chunks arrive either as a plain string or wrapped as
    /// `{"content": "<fragment>"}`.
    pub fn text_content(&self) -> Option<&str> {
        match &self.payload.content {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("content").and_then(Value::as_str),
            _ => None,
        }
    }

    /// Readable text of an `expert.response`: `result`, else `error`, else
    /// the raw JSON of the content.
    pub fn response_text(&self) -> String {
        match &self.payload.content {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            Value::Object(map) => map
                .get("result")
                .or_else(|| map.get("error"))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| self.payload.content.to_string()),
            other => other.to_string(),
        }
    }

    /// Looks up `key` in the content object, falling back to the payload's
    /// extra fields.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.payload
            .content
            .as_object()
            .and_then(|m| m.get(key))
            .or_else(|| self.payload.extra.get(key))
    }

    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.field(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_message_parses_with_defaults() {
        let env: Envelope = serde_json::from_str(r#"{"type":"system.heartbeat"}"#).unwrap();
        assert_eq!(env.kind, "system.heartbeat");
        assert_eq!(env.sender.agent_id, "unknown");
        assert_eq!(env.recipient.target, "broadcast");
        assert_eq!(env.metadata.ttl, 5);
        assert!(env.correlation_id().is_none());
    }

    #[test]
    fn chunk_content_may_be_wrapped() {
        let env: Envelope = serde_json::from_str(
            r#"{"type":"narrative.chunk","sender":{"agent_id":"Renarde","role":"agent"},
                "payload":{"content":{"content":"Bon"}},
                "metadata":{"correlation_id":"c1"}}"#,
        )
        .unwrap();
        assert_eq!(env.text_content(), Some("Bon"));
        assert_eq!(env.correlation_id(), Some("c1"));
    }

    #[test]
    fn empty_correlation_id_counts_as_missing() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"narrative.chunk","metadata":{"correlation_id":""}}"#)
                .unwrap();
        assert!(env.correlation_id().is_none());
    }

    #[test]
    fn response_text_prefers_result_then_error() {
        let mut env = Envelope::new(MessageKind::ExpertResponse);
        env.payload.content = serde_json::json!({ "result": "pong" });
        assert_eq!(env.response_text(), "pong");

        env.payload.content = serde_json::json!({ "error": "unknown command" });
        assert_eq!(env.response_text(), "unknown command");

        env.payload.content = serde_json::json!({ "other": 1 });
        assert_eq!(env.response_text(), r#"{"other":1}"#);
    }

    #[test]
    fn extra_payload_fields_are_reachable() {
        let env: Envelope =
            serde_json::from_str(r#"{"type":"transcription_update","payload":{"text":"allo"}}"#)
                .unwrap();
        assert_eq!(env.field_str("text"), Some("allo"));
    }

    #[test]
    fn outbound_narrative_omits_id_and_timestamp() {
        let env = Envelope::user_narrative("bonsoir", "Renarde");
        let json = serde_json::to_value(&env).unwrap();
        assert!(json.get("id").is_none());
        assert!(json.get("timestamp").is_none());
        assert_eq!(json["type"], "narrative.text");
        assert_eq!(json["recipient"]["target"], "Renarde");
        assert_eq!(json["payload"]["content"], "bonsoir");
    }

    #[test]
    fn config_update_carries_log_level() {
        let env = Envelope::config_update("DEBUG");
        assert_eq!(env.kind, "system.config_update");
        assert_eq!(env.field_str("log_level"), Some("DEBUG"));
    }
}
