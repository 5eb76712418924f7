//! Event-driven queue advancement.
//!
//! Each lifecycle event is matched against the active command's awaited
//! condition. A match completes that command and either activates and types
//! the next one or reports the queue complete. Anything else leaves the
//! file untouched.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{CommandStatus, Delivery, LifecycleKind, Queue, QueueStore, QueuedCommand};
use crate::log::{Journal, LogEvent};

/// Something that can deliver command text to a session's input line.
pub trait CommandInjector {
    fn inject(&self, session: &str, text: &str) -> Result<()>;
}

impl<T: CommandInjector + ?Sized> CommandInjector for &T {
    fn inject(&self, session: &str, text: &str) -> Result<()> {
        (**self).inject(session, text)
    }
}

/// Outcome of feeding one lifecycle event to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    NoQueue,
    NoActiveCommand,
    AwaitsMismatch,
    /// The next command was activated and handed to the injector.
    Advanced { command: String },
    QueueComplete { summary: QueueSummary },
}

impl Action {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoQueue => "no-queue",
            Self::NoActiveCommand => "no-active-command",
            Self::AwaitsMismatch => "awaits-mismatch",
            Self::Advanced { .. } => "advanced",
            Self::QueueComplete { .. } => "queue-complete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub id: u32,
    pub command: String,
    pub status: CommandStatus,
    pub result: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Payload sent to the owning agent when a queue finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    pub event: String,
    pub summary: String,
    pub total_count: usize,
    pub completed_count: usize,
    pub commands: Vec<CommandOutcome>,
}

impl QueueSummary {
    pub fn from_queue(queue: &Queue) -> Self {
        let total_count = queue.commands.len();
        let completed_count = queue.completed_count();
        Self {
            event: "queue-complete".to_string(),
            summary: format!("{completed_count}/{total_count} commands completed"),
            total_count,
            completed_count,
            commands: queue
                .commands
                .iter()
                .map(|c| CommandOutcome {
                    id: c.id,
                    command: c.text.clone(),
                    status: c.status,
                    result: c.result.clone(),
                    completed_at: c.completed_at,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CancelResult {
    pub completed_count: usize,
    pub total_count: usize,
    pub remaining_commands: Vec<QueuedCommand>,
}

pub struct QueueScheduler<'a, I> {
    store: &'a QueueStore,
    injector: I,
    journal: &'a Journal,
}

impl<'a, I: CommandInjector> QueueScheduler<'a, I> {
    pub fn new(store: &'a QueueStore, injector: I, journal: &'a Journal) -> Self {
        Self {
            store,
            injector,
            journal,
        }
    }

    pub fn process_event(
        &self,
        session: &str,
        kind: LifecycleKind,
        subkind: Option<&str>,
        result: Option<&str>,
    ) -> Result<Action> {
        let Some(mut queue) = self.store.load(session)? else {
            return Ok(Action::NoQueue);
        };
        let Some(index) = queue
            .commands
            .iter()
            .position(|c| c.status == CommandStatus::Active)
        else {
            return Ok(Action::NoActiveCommand);
        };
        if !queue.commands[index].awaits.matches(kind, subkind) {
            return Ok(Action::AwaitsMismatch);
        }

        let completed_id = {
            let active = &mut queue.commands[index];
            active.status = CommandStatus::Done;
            active.result = result.map(str::to_string);
            active.completed_at = Some(Utc::now());
            active.id
        };

        let next = queue.commands[index + 1..]
            .iter()
            .position(|c| c.status == CommandStatus::Pending)
            .map(|offset| index + 1 + offset);

        match next {
            Some(next) => {
                queue.commands[next].status = CommandStatus::Active;
                self.store.save(session, &queue)?;

                let command = queue.commands[next].text.clone();
                info!(
                    session = %session,
                    completed = completed_id,
                    next = queue.commands[next].id,
                    command = %command,
                    "queue advanced"
                );
                self.journal.record(LogEvent::QueueAdvanced {
                    completed_id,
                    next_id: queue.commands[next].id,
                    next_text: command.clone(),
                });

                self.injector
                    .inject(session, &command)
                    .with_context(|| format!("failed to inject queued command {command:?}"))?;
                Ok(Action::Advanced { command })
            }
            None => {
                self.store.save(session, &queue)?;
                info!(session = %session, total = queue.commands.len(), "queue complete");
                self.journal.record(LogEvent::QueueCompleted {
                    total: queue.commands.len(),
                });
                Ok(Action::QueueComplete {
                    summary: QueueSummary::from_queue(&queue),
                })
            }
        }
    }

    /// Archive the queue. `None` when there was nothing to cancel.
    pub fn cancel(&self, session: &str) -> Result<Option<CancelResult>> {
        let Some(queue) = self.store.load(session)? else {
            return Ok(None);
        };
        self.store.archive(session)?;

        let result = CancelResult {
            completed_count: queue.completed_count(),
            total_count: queue.commands.len(),
            remaining_commands: queue.remaining(),
        };
        info!(
            session = %session,
            completed = result.completed_count,
            total = result.total_count,
            "queue cancelled"
        );
        self.journal.record(LogEvent::QueueCancelled {
            completed: result.completed_count,
            total: result.total_count,
            remaining: result.remaining_commands.len(),
        });
        Ok(Some(result))
    }

    /// Archive a queue left behind by a previous host process.
    pub fn cleanup_stale(&self, session: &str) -> Result<bool> {
        let archived = self.store.archive(session)?;
        if archived {
            warn!(session = %session, "archived stale queue from previous run");
            self.journal.record(LogEvent::StaleQueueArchived {
                path: self.store.stale_path(session).display().to_string(),
            });
        }
        Ok(archived)
    }

    /// True when `submitted` is the active command's text, ignoring
    /// surrounding whitespace (the host appends a space after completion).
    pub fn is_injector_originated(&self, session: &str, submitted: &str) -> Result<bool> {
        let Some(queue) = self.store.load(session)? else {
            return Ok(false);
        };
        Ok(queue
            .active()
            .is_some_and(|active| active.text.trim() == submitted.trim()))
    }

    /// Stamp the active command as acknowledged by the host.
    pub fn confirm_submission(&self, session: &str) -> Result<Option<u32>> {
        let confirmed = self.store.update_active(session, |active| {
            let delivery = active.delivery.get_or_insert_with(Delivery::default);
            delivery.submit_confirmed_at = Some(Utc::now());
            active.id
        })?;
        if let Some(command_id) = confirmed {
            self.journal
                .record(LogEvent::SubmitAcknowledged { command_id });
        }
        Ok(confirmed)
    }
}
