//! Session-to-agent lookup.
//!
//! Not every tmux session running the host is managed: a session without an
//! enabled entry in `agent-registry.json` is ignored by every hook.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::paths::StateLayout;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentEntry {
    pub agent_id: String,
    pub session_name: String,
    #[serde(alias = "openclaw_session_id")]
    pub gateway_session_id: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRegistry {
    pub agents: Vec<AgentEntry>,
}

impl AgentRegistry {
    pub fn find(&self, session: &str) -> Option<&AgentEntry> {
        self.agents
            .iter()
            .find(|a| a.session_name == session)
            .filter(|a| a.enabled)
    }
}

/// Resolve the enabled agent that owns `session`.
///
/// A missing or unreadable registry is the same as "not managed": it is
/// logged and yields `None`.
pub fn lookup(layout: &StateLayout, session: &str) -> Option<AgentEntry> {
    if session.is_empty() {
        return None;
    }
    let path = layout.registry_file();
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no agent registry");
            return None;
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read agent registry");
            return None;
        }
    };
    let registry: AgentRegistry = match serde_json::from_str(&content) {
        Ok(registry) => registry,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to parse agent registry");
            return None;
        }
    };
    registry.find(session).cloned()
}
