//! Host hook payloads and their typed form.

use std::io::Read;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::HookKind;
use crate::question::SubQuestion;

/// The JSON document the host writes to a hook's stdin. Only the fields
/// the handlers read are modelled; the rest of the envelope is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub stop_hook_active: bool,
    #[serde(default)]
    pub last_assistant_message: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_use_id: Option<String>,
    #[serde(default)]
    pub tool_input: Value,
    #[serde(default)]
    pub tool_response: Value,
}

/// Read a payload from `reader`. Empty or malformed input yields `None`.
pub fn read_payload(mut reader: impl Read) -> Option<HookPayload> {
    let mut raw = String::new();
    if let Err(e) = reader.read_to_string(&mut raw) {
        debug!(error = %e, "hook stdin unreadable");
        return None;
    }
    let raw = raw.trim();
    if raw.is_empty() {
        debug!("hook stdin empty");
        return None;
    }
    match serde_json::from_str(raw) {
        Ok(payload) => Some(payload),
        Err(e) => {
            debug!(error = %e, "hook stdin is not a valid payload");
            None
        }
    }
}

/// A tool invocation the host is about to run or has just run.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub tool_use_id: String,
    pub input: Value,
    pub response: Value,
}

impl ToolCall {
    /// `tool_input.questions`, when present and well formed.
    pub fn questions(&self) -> Option<Vec<SubQuestion>> {
        let raw = self.input.get("questions")?;
        match serde_json::from_value(raw.clone()) {
            Ok(questions) => Some(questions),
            Err(e) => {
                debug!(error = %e, "tool_input.questions malformed");
                None
            }
        }
    }

    /// `tool_response.answers`, as the host recorded them.
    pub fn recorded_answers(&self) -> Option<&Map<String, Value>> {
        self.response.get("answers")?.as_object()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    TurnEnded {
        last_message: Option<String>,
        /// Set when the host is already continuing because of a stop hook.
        reentrant: bool,
    },
    SessionStarted {
        source: Option<String>,
    },
    PromptSubmitted {
        prompt: String,
    },
    ToolRequested(ToolCall),
    ToolCompleted(ToolCall),
}

impl HookEvent {
    pub fn from_payload(kind: HookKind, payload: HookPayload) -> Self {
        let tool_call = |payload: HookPayload| ToolCall {
            name: payload.tool_name.unwrap_or_default(),
            tool_use_id: payload.tool_use_id.unwrap_or_default(),
            input: payload.tool_input,
            response: payload.tool_response,
        };
        match kind {
            HookKind::Stop => Self::TurnEnded {
                last_message: payload.last_assistant_message,
                reentrant: payload.stop_hook_active,
            },
            HookKind::SessionStart => Self::SessionStarted {
                source: payload.source,
            },
            HookKind::UserPromptSubmit => Self::PromptSubmitted {
                prompt: payload.prompt.unwrap_or_default(),
            },
            HookKind::PreToolUse => Self::ToolRequested(tool_call(payload)),
            HookKind::PostToolUse => Self::ToolCompleted(tool_call(payload)),
        }
    }
}
