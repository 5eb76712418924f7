//! Verified keystroke delivery into a host session.
//!
//! Typing into the host blind loses input: the prompt may not be drawn yet,
//! keystrokes may land while the UI is redrawing, and the submit key can be
//! swallowed. Delivery therefore runs as three closed-loop phases:
//!
//! 0. wait until the pane shows a fresh, empty prompt line;
//! 1. type the text and check it is visible, clearing and retyping on failure;
//! 2. press Enter and wait for the host to acknowledge the submission through
//!    the queue file, resending only Enter on timeout.
//!
//! Phase 2 never retypes: the text is presumed still in the input field, and
//! typing it again after a slow acknowledgement would duplicate it.

use std::fs::OpenOptions;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::InjectorConfig;
use crate::error::DriveError;
use crate::log::{Journal, LogEvent};
use crate::paths::StateLayout;
use crate::poll::poll_until;
use crate::probe::PromptProbe;
use crate::queue::scheduler::CommandInjector;
use crate::queue::{Delivery, QueueStore};
use crate::tmux::{Key, Pane};

/// What it took to get one command accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub type_attempts: u32,
    pub submit_attempts: u32,
    /// False when there was no queue to confirm against and Enter was sent
    /// once on trust.
    pub confirmed: bool,
}

pub struct TerminalInjector<'a, P> {
    pane: P,
    session: String,
    probe: PromptProbe,
    config: InjectorConfig,
    queues: &'a QueueStore,
    journal: &'a Journal,
}

impl<'a, P: Pane> TerminalInjector<'a, P> {
    pub fn new(
        pane: P,
        session: impl Into<String>,
        config: &InjectorConfig,
        queues: &'a QueueStore,
        journal: &'a Journal,
    ) -> Self {
        Self {
            pane,
            session: session.into(),
            probe: PromptProbe::new(config.prompt_glyph.clone(), config.tail_lines),
            config: config.clone(),
            queues,
            journal,
        }
    }

    pub fn deliver(&self, text: &str) -> Result<DeliveryReport> {
        let outcome = self.run_phases(text);
        if let Err(e) = &outcome {
            self.journal.record(LogEvent::InjectionFailed {
                text: text.to_string(),
                reason: e.to_string(),
            });
        }
        outcome
    }

    fn run_phases(&self, text: &str) -> Result<DeliveryReport> {
        self.wait_for_fresh_prompt()?;
        let type_attempts = self.type_and_verify(text)?;
        self.record_typed(text)?;
        let (submit_attempts, confirmed) = self.submit_and_confirm(text)?;
        info!(
            session = %self.session,
            command = %text,
            type_attempts,
            submit_attempts,
            confirmed,
            "command delivered"
        );
        Ok(DeliveryReport {
            type_attempts,
            submit_attempts,
            confirmed,
        })
    }

    fn wait_for_fresh_prompt(&self) -> Result<()> {
        let ready = poll_until(
            self.config.ready_poll(),
            self.config.ready_timeout(),
            || Ok(self.probe.has_fresh_prompt(&self.pane.capture()?).then_some(())),
        )?;
        match ready {
            Some(()) => Ok(()),
            None => Err(DriveError::ReadinessTimeout {
                waited: self.config.ready_timeout(),
            }
            .into()),
        }
    }

    fn text_visible(&self, text: &str) -> Result<bool> {
        Ok(self.probe.shows_command(&self.pane.capture()?, text))
    }

    /// Returns the attempt on which the text became visible.
    fn type_and_verify(&self, text: &str) -> Result<u32> {
        let attempts = 1 + self.config.retype_retries;
        for attempt in 1..=attempts {
            if attempt > 1 {
                // A slow probe may have missed text that did land.
                if self.text_visible(text)? {
                    debug!(session = %self.session, attempt, "text visible on recheck");
                    return Ok(attempt - 1);
                }
                warn!(session = %self.session, attempt, "typed text not visible; retyping");
                self.pane.send_key(Key::ClearLine)?;
            }
            self.pane.send_literal(text)?;

            let seen = poll_until(
                self.config.verify_poll(),
                self.config.verify_timeout(),
                || Ok(self.text_visible(text)?.then_some(())),
            )?;
            if seen.is_some() {
                self.journal.record(LogEvent::CommandTyped {
                    text: text.to_string(),
                    attempts: attempt,
                });
                return Ok(attempt);
            }
        }
        if self.text_visible(text)? {
            return Ok(attempts);
        }
        Err(DriveError::TextVerificationFailed {
            text: text.to_string(),
            attempts,
        }
        .into())
    }

    /// Stamp `typed_at` when the active queued command is the one being typed.
    fn record_typed(&self, text: &str) -> Result<()> {
        self.queues.update_active(&self.session, |active| {
            if active.text.trim() == text.trim() {
                active
                    .delivery
                    .get_or_insert_with(Delivery::default)
                    .typed_at = Some(Utc::now());
            }
        })?;
        Ok(())
    }

    fn submit_and_confirm(&self, text: &str) -> Result<(u32, bool)> {
        let tracked = self
            .queues
            .load(&self.session)?
            .and_then(|queue| queue.active().map(|c| c.id));

        let Some(command_id) = tracked else {
            self.pane.send_key(Key::Enter)?;
            self.journal.record(LogEvent::SubmitSent { attempt: 1 });
            self.journal.record(LogEvent::SubmitConfirmed {
                attempts: 1,
                optimistic: true,
            });
            return Ok((1, false));
        };

        let attempts = 1 + self.config.submit_retries;
        for attempt in 1..=attempts {
            if attempt > 1 {
                warn!(session = %self.session, attempt, "submission not confirmed; resending Enter");
            }
            // Stamped before the key goes out: the host's acknowledgement
            // rewrites the same file and must not be overwritten.
            self.record_enter(command_id)?;
            self.pane.send_key(Key::Enter)?;
            self.journal.record(LogEvent::SubmitSent { attempt });

            let confirmed = poll_until(
                self.config.confirm_poll(),
                self.config.confirm_timeout(),
                || self.submission_confirmed(command_id).map(|c| c.then_some(())),
            )?;
            if confirmed.is_some() {
                self.journal.record(LogEvent::SubmitConfirmed {
                    attempts: attempt,
                    optimistic: false,
                });
                return Ok((attempt, true));
            }
        }
        Err(DriveError::SubmissionNotConfirmed {
            text: text.to_string(),
            attempts,
        }
        .into())
    }

    fn record_enter(&self, command_id: u32) -> Result<()> {
        self.queues.update_active(&self.session, |active| {
            if active.id == command_id {
                let delivery = active.delivery.get_or_insert_with(Delivery::default);
                delivery.enter_sent_at = Some(Utc::now());
                delivery.enter_attempts += 1;
            }
        })?;
        Ok(())
    }

    /// A vanished queue counts as confirmed: something else consumed it.
    fn submission_confirmed(&self, command_id: u32) -> Result<bool> {
        let Some(queue) = self.queues.load(&self.session)? else {
            return Ok(true);
        };
        Ok(queue
            .commands
            .iter()
            .find(|c| c.id == command_id)
            .is_none_or(|c| c.is_confirmed()))
    }
}

/// Runs delivery in a detached `hookdrive type` child so the calling hook
/// can return and let the host draw its prompt.
#[derive(Debug, Clone)]
pub struct DetachedInjector {
    layout: StateLayout,
    program: PathBuf,
}

impl DetachedInjector {
    pub fn new(layout: StateLayout) -> Result<Self> {
        let program = std::env::current_exe().context("failed to locate hookdrive executable")?;
        Ok(Self { layout, program })
    }

    pub fn with_program(layout: StateLayout, program: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            program: program.into(),
        }
    }
}

impl CommandInjector for DetachedInjector {
    fn inject(&self, session: &str, text: &str) -> Result<()> {
        let log_path = self.layout.deferred_log_file(session);
        if let Some(dir) = log_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory: {}", dir.display()))?;
        }
        let stdout_log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("failed to open {}", log_path.display()))?;
        let stderr_log = stdout_log.try_clone()?;

        let child = std::process::Command::new(&self.program)
            .arg("type")
            .arg("--session")
            .arg(session)
            .arg("--command")
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_log))
            .stderr(Stdio::from(stderr_log))
            .process_group(0)
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.program.display()))?;

        info!(
            session = %session,
            command = %text,
            pid = child.id(),
            log = %log_path.display(),
            "deferred injection started"
        );
        Ok(())
    }
}
