//! Per-session command queues.
//!
//! A queue is an ordered list of commands to type into one session. The
//! first command is written `active`; each later one waits `pending` until
//! the lifecycle event its predecessor awaits has been observed. Queues are
//! plain JSON files under `queues/` and are only ever replaced atomically.

pub mod scheduler;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DriveError;
use crate::paths::StateLayout;
use crate::store;

/// The command that restarts the host's conversation.
pub const CLEAR_COMMAND: &str = "/clear";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Active,
    Done,
}

impl std::fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Done => "done",
        };
        f.pad(label)
    }
}

/// Lifecycle events a queued command can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleKind {
    /// The host finished responding to a prompt.
    TurnEnded,
    /// The host started a new conversation in the same process.
    SessionRestarted,
}

impl std::fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::TurnEnded => "turn-ended",
            Self::SessionRestarted => "session-restarted",
        };
        f.pad(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Awaits {
    pub kind: LifecycleKind,
    #[serde(default)]
    pub subkind: Option<String>,
}

impl Awaits {
    /// `/clear` restarts the session; everything else ends a turn.
    pub fn for_text(text: &str) -> Self {
        if text == CLEAR_COMMAND {
            Self {
                kind: LifecycleKind::SessionRestarted,
                subkind: Some("clear".to_string()),
            }
        } else {
            Self {
                kind: LifecycleKind::TurnEnded,
                subkind: None,
            }
        }
    }

    /// A `None` subkind accepts any subkind of the right kind.
    pub fn matches(&self, kind: LifecycleKind, subkind: Option<&str>) -> bool {
        if self.kind != kind {
            return false;
        }
        match &self.subkind {
            None => true,
            Some(expected) => subkind == Some(expected.as_str()),
        }
    }
}

/// Submission telemetry written by the injector and the prompt hook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub typed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enter_sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub enter_attempts: u32,
    #[serde(default)]
    pub submit_confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedCommand {
    /// 1-based position in the queue.
    pub id: u32,
    #[serde(alias = "command")]
    pub text: String,
    pub status: CommandStatus,
    pub awaits: Awaits,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
}

impl QueuedCommand {
    pub fn is_confirmed(&self) -> bool {
        self.status == CommandStatus::Done
            || self
                .delivery
                .as_ref()
                .is_some_and(|d| d.submit_confirmed_at.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queue {
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    pub commands: Vec<QueuedCommand>,
}

impl Queue {
    /// Build a fresh queue with the first command active.
    pub fn from_texts(texts: &[String]) -> Result<Self, DriveError> {
        if texts.is_empty() {
            return Err(DriveError::argument(
                "command array must contain at least one command",
            ));
        }
        let now = Utc::now();
        let commands = texts
            .iter()
            .enumerate()
            .map(|(index, text)| QueuedCommand {
                id: index as u32 + 1,
                text: text.clone(),
                status: if index == 0 {
                    CommandStatus::Active
                } else {
                    CommandStatus::Pending
                },
                awaits: Awaits::for_text(text),
                result: None,
                created_at: now,
                completed_at: None,
                delivery: None,
            })
            .collect();
        Ok(Self {
            created_at: now,
            commands,
        })
    }

    pub fn active(&self) -> Option<&QueuedCommand> {
        self.commands
            .iter()
            .find(|c| c.status == CommandStatus::Active)
    }

    pub fn active_mut(&mut self) -> Option<&mut QueuedCommand> {
        self.commands
            .iter_mut()
            .find(|c| c.status == CommandStatus::Active)
    }

    pub fn completed_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| c.status == CommandStatus::Done)
            .count()
    }

    /// Commands that have not finished, in order.
    pub fn remaining(&self) -> Vec<QueuedCommand> {
        self.commands
            .iter()
            .filter(|c| c.status != CommandStatus::Done)
            .cloned()
            .collect()
    }
}

/// File-backed queue repository for all sessions below a state root.
#[derive(Debug, Clone)]
pub struct QueueStore {
    layout: StateLayout,
}

impl QueueStore {
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    pub fn path(&self, session: &str) -> PathBuf {
        self.layout.queue_file(session)
    }

    pub fn stale_path(&self, session: &str) -> PathBuf {
        self.layout.stale_queue_file(session)
    }

    pub fn load(&self, session: &str) -> Result<Option<Queue>> {
        store::read_json(&self.path(session))
    }

    pub fn save(&self, session: &str, queue: &Queue) -> Result<()> {
        store::write_json_atomic(&self.path(session), queue)
    }

    pub fn exists(&self, session: &str) -> bool {
        self.path(session).is_file()
    }

    /// Move the queue aside to `queue-<s>.stale.json`.
    pub fn archive(&self, session: &str) -> Result<bool> {
        store::archive(&self.path(session), &self.stale_path(session))
    }

    /// Load, mutate the active command and save. Returns `None` without
    /// writing when there is no queue or no active command.
    pub fn update_active<T>(
        &self,
        session: &str,
        mutate: impl FnOnce(&mut QueuedCommand) -> T,
    ) -> Result<Option<T>> {
        let Some(mut queue) = self.load(session)? else {
            return Ok(None);
        };
        let Some(active) = queue.active_mut() else {
            return Ok(None);
        };
        let outcome = mutate(active);
        self.save(session, &queue)?;
        Ok(Some(outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn clear_awaits_session_restart() {
        let awaits = Awaits::for_text("/clear");
        assert_eq!(awaits.kind, LifecycleKind::SessionRestarted);
        assert_eq!(awaits.subkind.as_deref(), Some("clear"));

        let awaits = Awaits::for_text("/gsd:plan-phase 3");
        assert_eq!(awaits.kind, LifecycleKind::TurnEnded);
        assert!(awaits.subkind.is_none());

        // Only the exact command restarts the session.
        assert_eq!(
            Awaits::for_text("/clear now").kind,
            LifecycleKind::TurnEnded
        );
    }

    #[test]
    fn awaits_subkind_must_match_when_present() {
        let clear = Awaits::for_text("/clear");
        assert!(clear.matches(LifecycleKind::SessionRestarted, Some("clear")));
        assert!(!clear.matches(LifecycleKind::SessionRestarted, Some("startup")));
        assert!(!clear.matches(LifecycleKind::SessionRestarted, None));
        assert!(!clear.matches(LifecycleKind::TurnEnded, Some("clear")));

        let turn = Awaits::for_text("hello");
        assert!(turn.matches(LifecycleKind::TurnEnded, None));
        assert!(turn.matches(LifecycleKind::TurnEnded, Some("anything")));
    }

    #[test]
    fn new_queue_activates_only_first_command() {
        let queue = Queue::from_texts(&texts(&["/clear", "/gsd:plan-phase 3", "go"])).unwrap();
        let statuses: Vec<_> = queue.commands.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![
                CommandStatus::Active,
                CommandStatus::Pending,
                CommandStatus::Pending
            ]
        );
        let ids: Vec<_> = queue.commands.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(queue.active().unwrap().text, "/clear");
    }

    #[test]
    fn empty_queue_is_an_argument_error() {
        let err = Queue::from_texts(&[]).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn serialized_queue_uses_kebab_awaits() {
        let queue = Queue::from_texts(&texts(&["/clear"])).unwrap();
        let json = serde_json::to_value(&queue).unwrap();
        assert_eq!(json["commands"][0]["awaits"]["kind"], "session-restarted");
        assert_eq!(json["commands"][0]["awaits"]["subkind"], "clear");
        assert_eq!(json["commands"][0]["status"], "active");
        assert!(json["commands"][0].get("delivery").is_none());
    }

    #[test]
    fn reads_queue_written_with_command_field() {
        let json = r#"{
            "commands": [
                {"id": 1, "command": "/gsd:progress", "status": "active",
                 "awaits": {"kind": "turn-ended", "subkind": null},
                 "result": null, "completed_at": null}
            ]
        }"#;
        let queue: Queue = serde_json::from_str(json).unwrap();
        assert_eq!(queue.commands[0].text, "/gsd:progress");
        assert!(queue.commands[0].delivery.is_none());
    }

    #[test]
    fn store_round_trip_and_archive() {
        let tmp = tempfile::tempdir().unwrap();
        let store = QueueStore::new(StateLayout::new(tmp.path()));
        let queue = Queue::from_texts(&texts(&["a", "b"])).unwrap();

        assert!(store.load("w1").unwrap().is_none());
        store.save("w1", &queue).unwrap();
        assert_eq!(store.load("w1").unwrap().unwrap(), queue);

        assert!(store.archive("w1").unwrap());
        assert!(!store.exists("w1"));
        assert!(store.stale_path("w1").is_file());
        assert!(!store.archive("w1").unwrap());
    }

    #[test]
    fn update_active_skips_queues_without_active_command() {
        let tmp = tempfile::tempdir().unwrap();
        let store = QueueStore::new(StateLayout::new(tmp.path()));
        assert!(store.update_active("w1", |_| ()).unwrap().is_none());

        let mut queue = Queue::from_texts(&texts(&["a"])).unwrap();
        queue.commands[0].status = CommandStatus::Done;
        store.save("w1", &queue).unwrap();
        assert!(store.update_active("w1", |_| ()).unwrap().is_none());
    }

    #[test]
    fn confirmation_counts_done_or_stamped() {
        let mut queue = Queue::from_texts(&texts(&["a"])).unwrap();
        assert!(!queue.commands[0].is_confirmed());
        queue.commands[0].delivery = Some(Delivery {
            submit_confirmed_at: Some(Utc::now()),
            ..Delivery::default()
        });
        assert!(queue.commands[0].is_confirmed());
        queue.commands[0].delivery = None;
        queue.commands[0].status = CommandStatus::Done;
        assert!(queue.commands[0].is_confirmed());
    }
}
