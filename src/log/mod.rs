//! Structured per-session journal in JSON lines.
//!
//! Every hook invocation and driver run appends what it did to
//! `logs/<session>-events.jsonl`: queue transitions, typing and submit
//! attempts, question intents and reconciliation outcomes, gateway
//! deliveries. Each line is a self-contained JSON object with a timestamp,
//! so a session's history can be grepped or replayed after the fact.
//!
//! The journal never fails its caller. Open and write errors are reported
//! through `tracing` and otherwise ignored.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, warn};

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// A structured event in the journal.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    #[serde(flatten)]
    pub event: LogEvent,
}

/// All event types that can appear in the journal.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum LogEvent {
    /// A hook payload was accepted for this session.
    HookReceived { hook: String },
    /// A new queue replaced whatever was on disk.
    QueueCreated {
        commands: usize,
        replaced_active: bool,
    },
    /// The active command was acknowledged and the next one activated.
    QueueAdvanced {
        completed_id: u32,
        next_id: u32,
        next_text: String,
    },
    /// The last command was acknowledged.
    QueueCompleted { total: usize },
    /// The queue was archived because of external input or a manual cancel.
    QueueCancelled {
        completed: usize,
        total: usize,
        remaining: usize,
    },
    /// A queue left over from a previous host run was archived.
    StaleQueueArchived { path: String },
    /// Phase 1 saw the typed text on the prompt line.
    CommandTyped { text: String, attempts: u32 },
    /// Phase 2 sent the submit key.
    SubmitSent { attempt: u32 },
    /// Phase 2 observed the host acknowledging the submission.
    SubmitConfirmed { attempts: u32, optimistic: bool },
    /// The host reported a prompt that the injector typed.
    SubmitAcknowledged { command_id: u32 },
    /// A phase exhausted its retries.
    InjectionFailed { text: String, reason: String },
    /// The host asked a modal question.
    QuestionSaved {
        tool_use_id: String,
        questions: usize,
    },
    /// The navigator recorded its intent before sending keys.
    AnswerIntentSaved {
        tool_use_id: String,
        actions: Vec<String>,
    },
    /// Answer keystrokes were sent to the pane.
    KeystrokesSent { keys: usize },
    /// The host recorded the intended answer.
    AnswerVerified { tool_use_id: String },
    /// The host recorded something other than the intended answer.
    AnswerMismatch { tool_use_id: String, reason: String },
    /// The gateway accepted a message.
    GatewayDelivered { event: String, agent_id: String },
    /// The gateway rejected a message after every retry.
    GatewayFailed { event: String, reason: String },
}

/// Append-only writer for a JSON lines journal.
pub struct Journal {
    writer: Option<Mutex<BufWriter<File>>>,
    path: PathBuf,
}

impl Journal {
    /// Open a journal at the given path.
    ///
    /// Creates the file (and parent directories) if they don't exist.
    /// Appends to an existing file.
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file: {}", path.display()))?;

        Ok(Self {
            writer: Some(Mutex::new(BufWriter::new(file))),
            path: path.to_path_buf(),
        })
    }

    /// Like [`Journal::new`], but falls back to a journal that drops every
    /// entry when the file cannot be opened.
    pub fn open_or_disabled(path: &Path) -> Self {
        match Self::new(path) {
            Ok(journal) => journal,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "journal disabled");
                Self::disabled(path)
            }
        }
    }

    /// A journal that writes nothing.
    pub fn disabled(path: &Path) -> Self {
        Self {
            writer: None,
            path: path.to_path_buf(),
        }
    }

    /// Write an event, returning any I/O failure.
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let entry = LogEntry {
            timestamp: now_rfc3339(),
            event,
        };

        let json = serde_json::to_string(&entry).context("failed to serialize log entry")?;

        debug!(event = %json, "journal");

        let mut writer = writer
            .lock()
            .map_err(|_| anyhow!("journal writer lock poisoned"))?;
        writeln!(writer, "{json}").context("failed to write log entry")?;
        writer.flush().context("failed to flush log")?;

        Ok(())
    }

    /// Write an event; failures are reported and dropped.
    pub fn record(&self, event: LogEvent) {
        if let Err(e) = self.log(event) {
            warn!(path = %self.path.display(), error = %e, "journal write failed");
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_to_json() {
        let entry = LogEntry {
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            event: LogEvent::QueueAdvanced {
                completed_id: 1,
                next_id: 2,
                next_text: "/gsd:plan-phase 3".to_string(),
            },
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event\":\"queue_advanced\""));
        assert!(json.contains("\"next_id\":2"));
        assert!(json.contains("\"timestamp\":\"2026-01-01T00:00:00+00:00\""));
    }

    #[test]
    fn write_and_read_log_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("w1-events.jsonl");

        let journal = Journal::new(&log_path).unwrap();
        journal
            .log(LogEvent::QueueCreated {
                commands: 2,
                replaced_active: false,
            })
            .unwrap();
        journal.record(LogEvent::SubmitSent { attempt: 1 });
        journal.record(LogEvent::QueueCompleted { total: 2 });

        let content = std::fs::read_to_string(&log_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        for line in &lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(parsed.get("event").is_some());
            let ts = parsed["timestamp"].as_str().unwrap();
            assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        }

        assert!(lines[0].contains("\"event\":\"queue_created\""));
        assert!(lines[1].contains("\"event\":\"submit_sent\""));
        assert!(lines[2].contains("\"event\":\"queue_completed\""));
    }

    #[test]
    fn creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("deep").join("logs").join("run.jsonl");

        let journal = Journal::new(&log_path).unwrap();
        journal.record(LogEvent::HookReceived {
            hook: "stop".to_string(),
        });

        assert!(log_path.exists());
    }

    #[test]
    fn appends_to_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let log_path = tmp.path().join("append.jsonl");

        {
            let journal = Journal::new(&log_path).unwrap();
            journal.record(LogEvent::KeystrokesSent { keys: 3 });
        }
        {
            let journal = Journal::new(&log_path).unwrap();
            journal.record(LogEvent::AnswerVerified {
                tool_use_id: "toolu_1".to_string(),
            });
        }

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn unopenable_journal_swallows_writes() {
        let tmp = tempfile::tempdir().unwrap();
        // A directory where the file should be makes open fail.
        let log_path = tmp.path().join("taken");
        std::fs::create_dir_all(&log_path).unwrap();

        let journal = Journal::open_or_disabled(&log_path);
        journal.record(LogEvent::QueueCompleted { total: 1 });
        assert!(journal.log(LogEvent::QueueCompleted { total: 1 }).is_ok());
        assert_eq!(journal.path(), log_path);
    }
}
