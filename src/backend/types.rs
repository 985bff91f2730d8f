//! Response bodies of the backend HTTP API.

use serde::Deserialize;
use serde_json::Value;

use super::client::BackendError;
use crate::protocol::{Envelope, MessageKind};

// ---------------------------------------------------------------------------
// AgentInfo
// ---------------------------------------------------------------------------

fn yes() -> bool {
    true
}

/// One entry of the agent roster.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    #[serde(default = "yes")]
    pub active: bool,
    /// Agents that are not personified never get a character on stage.
    #[serde(default = "yes")]
    pub personified: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AgentsBody {
    List(Vec<AgentInfo>),
    Wrapped {
        #[serde(default)]
        agents: Vec<AgentInfo>,
    },
}

/// Parse `GET /api/agents`.  An empty roster means the backend is still
/// warming up.
pub fn parse_agents(body: Value) -> Result<Vec<AgentInfo>, BackendError> {
    let agents = match serde_json::from_value(body)? {
        AgentsBody::List(list) => list,
        AgentsBody::Wrapped { agents } => agents,
    };
    if agents.is_empty() {
        return Err(BackendError::Warming);
    }
    Ok(agents)
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One displayable message from the history backlog.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub message_id: Option<String>,
    pub speaker: String,
    pub text: String,
    pub from_user: bool,
}

impl HistoryEntry {
    /// Only narrative text and expert responses are shown in history.
    pub fn from_envelope(env: &Envelope) -> Option<Self> {
        let text = match env.message_kind() {
            MessageKind::NarrativeText => env.text_content()?.to_owned(),
            MessageKind::ExpertResponse => env.response_text(),
            _ => return None,
        };
        Some(Self {
            message_id: env.id.clone(),
            from_user: env.sender.agent_id == "user",
            speaker: env.sender.agent_id.clone(),
            text,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryBody {
    List(Vec<Value>),
    Wrapped {
        #[serde(default)]
        messages: Vec<Value>,
        #[serde(default)]
        status: Option<String>,
    },
}

/// Parse `GET /api/history`.  `{"status": "connecting"}` means the backend's
/// store is not up yet.  Entries that are not displayable are skipped.
pub fn parse_history(body: Value) -> Result<Vec<HistoryEntry>, BackendError> {
    let messages = match serde_json::from_value(body)? {
        HistoryBody::List(list) => list,
        HistoryBody::Wrapped { status, .. } if status.as_deref() == Some("connecting") => {
            return Err(BackendError::Warming);
        }
        HistoryBody::Wrapped { messages, .. } => messages,
    };

    Ok(messages
        .into_iter()
        .filter_map(|m| serde_json::from_value::<Envelope>(m).ok())
        .filter_map(|env| HistoryEntry::from_envelope(&env))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn agents_plain_list() {
        let agents = parse_agents(json!([
            {"id": "Renarde", "commands": ["ping"]},
            {"id": "Lisa", "personified": false, "total_tokens": 12}
        ]))
        .unwrap();
        assert_eq!(agents.len(), 2);
        assert!(agents[0].personified && agents[0].active);
        assert_eq!(agents[0].commands, vec!["ping"]);
        assert!(!agents[1].personified);
        assert_eq!(agents[1].total_tokens, 12);
    }

    #[test]
    fn agents_wrapped_list() {
        let agents = parse_agents(json!({"agents": [{"id": "A"}]})).unwrap();
        assert_eq!(agents[0].id, "A");
    }

    #[test]
    fn empty_roster_is_warming() {
        assert!(matches!(parse_agents(json!([])), Err(BackendError::Warming)));
    }

    #[test]
    fn agents_garbage_is_parse_error() {
        assert!(matches!(parse_agents(json!("nope")), Err(BackendError::Parse(_))));
    }

    #[test]
    fn history_connecting_is_warming() {
        let err = parse_history(json!({"messages": [], "status": "connecting"})).unwrap_err();
        assert!(matches!(err, BackendError::Warming));
    }

    #[test]
    fn history_keeps_displayable_entries() {
        let entries = parse_history(json!({
            "status": "ok",
            "messages": [
                {"id": "m1", "type": "narrative.text",
                 "sender": {"agent_id": "user", "role": "user"},
                 "payload": {"content": "Bonjour"}},
                {"id": "m2", "type": "expert.response",
                 "sender": {"agent_id": "Renarde", "role": "agent"},
                 "payload": {"content": {"result": "42"}}},
                {"id": "m3", "type": "system.log", "payload": {"content": "x"}},
                {"garbage": true}
            ]
        }))
        .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message_id.as_deref(), Some("m1"));
        assert!(entries[0].from_user);
        assert_eq!(entries[1].text, "42");
        assert!(!entries[1].from_user);
    }

    #[test]
    fn history_plain_list() {
        let entries = parse_history(json!([
            {"type": "narrative.text", "sender": {"agent_id": "A"}, "payload": {"content": "hi"}}
        ]))
        .unwrap();
        assert_eq!(entries[0].speaker, "A");
        assert_eq!(entries[0].message_id, None);
    }
}
