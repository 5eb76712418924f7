//! Modal questions asked by the host, and the intent recorded for answering
//! them.
//!
//! The question file is written when the host asks; the pending-answer file
//! is written by the navigator before it sends a single key. Both are
//! removed once the host's recorded answer has been reconciled.

pub mod navigator;
pub mod reconcile;
pub mod report;

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::paths::StateLayout;
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    #[serde(default)]
    pub description: String,
}

/// One tab of the modal. Field names follow the host's tool input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubQuestion {
    #[serde(default)]
    pub header: Option<String>,
    #[serde(rename = "question", alias = "question_text", default)]
    pub question_text: String,
    #[serde(rename = "multiSelect", alias = "multi_select", default)]
    pub multi_select: bool,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub tool_use_id: String,
    pub saved_at: DateTime<Utc>,
    pub session: String,
    pub questions: Vec<SubQuestion>,
}

/// How one sub-question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Select,
    Type,
    MultiSelect,
    Chat,
}

impl ActionKind {
    pub const ALL: [ActionKind; 4] = [
        ActionKind::Select,
        ActionKind::Type,
        ActionKind::MultiSelect,
        ActionKind::Chat,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Select => "select",
            Self::Type => "type",
            Self::MultiSelect => "multi-select",
            Self::Chat => "chat",
        }
    }
}

/// A single action for one-question modals, one per tab otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PendingAction {
    Single(ActionKind),
    PerQuestion(Vec<ActionKind>),
}

impl PendingAction {
    pub fn for_index(&self, index: usize) -> Option<ActionKind> {
        match self {
            Self::Single(kind) => Some(*kind),
            Self::PerQuestion(kinds) => kinds.get(index).copied(),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        match self {
            Self::Single(kind) => vec![kind.as_str().to_string()],
            Self::PerQuestion(kinds) => kinds.iter().map(|k| k.as_str().to_string()).collect(),
        }
    }
}

/// The intended value for one sub-question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Index(usize),
    Indices(Vec<usize>),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAnswer {
    pub tool_use_id: String,
    pub saved_at: DateTime<Utc>,
    pub session: String,
    /// Keyed by zero-based sub-question index.
    pub answers: BTreeMap<usize, AnswerValue>,
    pub action: PendingAction,
}

/// File-backed question and intent repository.
#[derive(Debug, Clone)]
pub struct QuestionStore {
    layout: StateLayout,
}

impl QuestionStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn question_path(&self, session: &str) -> PathBuf {
        self.layout.question_file(session)
    }

    pub fn pending_path(&self, session: &str) -> PathBuf {
        self.layout.pending_answer_file(session)
    }

    pub fn save_question(&self, question: &Question) -> Result<()> {
        store::write_json_atomic(&self.question_path(&question.session), question)
    }

    pub fn load_question(&self, session: &str) -> Result<Option<Question>> {
        store::read_json(&self.question_path(session))
    }

    pub fn delete_question(&self, session: &str) -> Result<bool> {
        store::remove(&self.question_path(session))
    }

    pub fn save_pending(&self, pending: &PendingAnswer) -> Result<()> {
        store::write_json_atomic(&self.pending_path(&pending.session), pending)
    }

    pub fn load_pending(&self, session: &str) -> Result<Option<PendingAnswer>> {
        store::read_json(&self.pending_path(session))
    }

    pub fn delete_pending(&self, session: &str) -> Result<bool> {
        store::remove(&self.pending_path(session))
    }

    /// Drop both files once a question is settled or abandoned.
    pub fn clear(&self, session: &str) -> Result<()> {
        self.delete_pending(session)?;
        self.delete_question(session)?;
        Ok(())
    }
}
