//! Delivery of operator notifications to the owning agent.
//!
//! The gateway is an external CLI (`openclaw agent ...` by default) that is
//! treated as opaque: it either exits successfully or it does not. In-band
//! deliveries are retried with the fast policy; the question handler uses a
//! detached delivery so the host can render its modal without waiting.

use std::fs::OpenOptions;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{ChildStderr, Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::error::DriveError;
use crate::log::{Journal, LogEvent};
use crate::paths::StateLayout;
use crate::poll::poll_until;
use crate::registry::AgentEntry;
use crate::retry::RetryPolicy;

const EXIT_POLL: Duration = Duration::from_millis(100);
/// How long to wait for stderr after exit; grandchildren may hold the pipe.
const STDERR_GRACE: Duration = Duration::from_millis(500);
const STDERR_EXCERPT_CHARS: usize = 2000;

/// Read a child's stderr on its own thread so a chatty collaborator cannot
/// fill the pipe while we poll for its exit.
fn drain_stderr(pipe: Option<ChildStderr>) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    if let Some(mut pipe) = pipe {
        std::thread::spawn(move || {
            let mut bytes = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut bytes) {
                debug!(error = %e, "gateway stderr read ended early");
            }
            tx.send(String::from_utf8_lossy(&bytes).into_owned()).ok();
        });
    }
    rx
}

/// The trailing part of `text`, which is where CLIs put the actual error.
fn stderr_excerpt(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().rev().nth(STDERR_EXCERPT_CHARS - 1) {
        Some((start, _)) => &text[start..],
        None => text,
    }
}

/// A channel that can hand a message to an agent session.
pub trait Gateway {
    /// Deliver and wait for the collaborator to accept or reject.
    fn deliver(&self, agent_id: &str, session_id: &str, message: &str) -> Result<()>;
    /// Start a delivery and return without observing its outcome.
    fn deliver_detached(&self, agent_id: &str, session_id: &str, message: &str) -> Result<()>;
}

impl<T: Gateway + ?Sized> Gateway for &T {
    fn deliver(&self, agent_id: &str, session_id: &str, message: &str) -> Result<()> {
        (**self).deliver(agent_id, session_id, message)
    }

    fn deliver_detached(&self, agent_id: &str, session_id: &str, message: &str) -> Result<()> {
        (**self).deliver_detached(agent_id, session_id, message)
    }
}

/// Gateway backed by an external program.
#[derive(Debug, Clone)]
pub struct CliGateway {
    program: String,
    timeout: Duration,
    detached_log: Option<PathBuf>,
}

impl CliGateway {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout(),
            detached_log: None,
        }
    }

    /// Append the output of detached deliveries to `path` instead of
    /// discarding it.
    pub fn with_detached_log(mut self, path: PathBuf) -> Self {
        self.detached_log = Some(path);
        self
    }

    fn command(&self, agent_id: &str, session_id: &str, message: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["agent", "--agent", agent_id, "--session-id", session_id])
            .arg("--message")
            .arg(message)
            .stdin(Stdio::null());
        cmd
    }
}

impl Gateway for CliGateway {
    fn deliver(&self, agent_id: &str, session_id: &str, message: &str) -> Result<()> {
        let mut child = self
            .command(agent_id, session_id, message)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn gateway '{}'", self.program))?;
        let stderr = drain_stderr(child.stderr.take());

        let status = poll_until(EXIT_POLL, self.timeout, || {
            child
                .try_wait()
                .context("failed to wait for gateway process")
        })?;

        match status {
            Some(status) if status.success() => {
                debug!(agent = %agent_id, "gateway accepted message");
                Ok(())
            }
            Some(status) => {
                let output = stderr.recv_timeout(STDERR_GRACE).unwrap_or_default();
                match stderr_excerpt(&output) {
                    "" => bail!("gateway '{}' exited with {status}", self.program),
                    excerpt => bail!("gateway '{}' exited with {status}: {excerpt}", self.program),
                }
            }
            None => {
                if let Err(e) = child.kill() {
                    warn!(program = %self.program, error = %e, "failed to kill timed-out gateway");
                }
                if let Err(e) = child.wait() {
                    warn!(program = %self.program, error = %e, "failed to reap timed-out gateway");
                }
                bail!(
                    "gateway '{}' timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                )
            }
        }
    }

    fn deliver_detached(&self, agent_id: &str, session_id: &str, message: &str) -> Result<()> {
        let (stdout, stderr) = match &self.detached_log {
            Some(path) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir).with_context(|| {
                        format!("failed to create log directory: {}", dir.display())
                    })?;
                }
                let log = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("failed to open {}", path.display()))?;
                let err = log.try_clone()?;
                (Stdio::from(log), Stdio::from(err))
            }
            None => (Stdio::null(), Stdio::null()),
        };
        let child = self
            .command(agent_id, session_id, message)
            .stdout(stdout)
            .stderr(stderr)
            .process_group(0)
            .spawn()
            .with_context(|| format!("failed to spawn gateway '{}'", self.program))?;
        info!(agent = %agent_id, pid = child.id(), "detached gateway delivery started");
        Ok(())
    }
}

/// Instructions appended to every message for `event`.
///
/// `<home>/prompts/<event>.md` wins when present so operators can tune the
/// agent's behaviour without a rebuild.
pub fn instructions_for(layout: &StateLayout, event: &str) -> String {
    let path = layout.prompts_dir().join(format!("{event}.md"));
    match std::fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => return text.trim().to_string(),
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to read prompt file"),
    }
    default_instructions(event).to_string()
}

fn default_instructions(event: &str) -> &'static str {
    match event {
        "stop" => {
            "The session finished a turn. Decide what it should do next and queue the \
             commands with `hookdrive queue --session <session> '<json array>'`."
        }
        "session-start" => {
            "The session restarted. Check whether queued work was lost and requeue it \
             if it still matters."
        }
        "user-prompt-submit" => {
            "Someone typed into the session directly, so the command queue was \
             cancelled. Requeue the remaining commands only if they are still wanted."
        }
        "pre-tool-use" => {
            "Answer the question above with `hookdrive answer`. The modal is open and \
             waiting."
        }
        "post-tool-use" => {
            "The recorded answer differs from what you sent. Check the session and \
             correct course if the wrong answer was taken."
        }
        _ => "Review the message above and act on it.",
    }
}

/// Assemble the full message handed to the gateway.
pub fn compose_message(event: &str, session: &str, body: &str, instructions: &str) -> String {
    [
        "## Event Metadata".to_string(),
        format!("- Event: {event}"),
        format!("- Session: {session}"),
        format!("- Timestamp: {}", chrono::Utc::now().to_rfc3339()),
        String::new(),
        "## Message".to_string(),
        body.trim().to_string(),
        String::new(),
        "## Instructions".to_string(),
        instructions.to_string(),
    ]
    .join("\n")
}

/// Sends event notifications for one session to its owning agent.
pub struct Notifier<'a, G> {
    gateway: G,
    agent: &'a AgentEntry,
    layout: &'a StateLayout,
    retry: RetryPolicy,
    journal: &'a Journal,
    session: &'a str,
}

impl<'a, G: Gateway> Notifier<'a, G> {
    pub fn new(
        gateway: G,
        agent: &'a AgentEntry,
        layout: &'a StateLayout,
        retry: RetryPolicy,
        journal: &'a Journal,
        session: &'a str,
    ) -> Self {
        Self {
            gateway,
            agent,
            layout,
            retry,
            journal,
            session,
        }
    }

    fn message(&self, event: &str, body: &str) -> String {
        compose_message(
            event,
            self.session,
            body,
            &instructions_for(self.layout, event),
        )
    }

    /// Deliver with retries; exhaustion surfaces as [`DriveError::Delivery`].
    pub fn notify(&self, event: &str, body: &str) -> Result<()> {
        self.notify_with_sleeper(event, body, std::thread::sleep)
    }

    pub fn notify_with_sleeper(
        &self,
        event: &str,
        body: &str,
        sleep: impl FnMut(Duration),
    ) -> Result<()> {
        let message = self.message(event, body);
        let label = format!("notify-{event}");
        let result = self.retry.run_with_sleeper(
            &label,
            || {
                self.gateway.deliver(
                    &self.agent.agent_id,
                    &self.agent.gateway_session_id,
                    &message,
                )
            },
            sleep,
        );
        match result {
            Ok(()) => {
                info!(session = %self.session, event, agent = %self.agent.agent_id, "agent notified");
                self.journal.record(LogEvent::GatewayDelivered {
                    event: event.to_string(),
                    agent_id: self.agent.agent_id.clone(),
                });
                Ok(())
            }
            Err(e) => {
                let reason = format!("{e:#}");
                self.journal.record(LogEvent::GatewayFailed {
                    event: event.to_string(),
                    reason: reason.clone(),
                });
                Err(DriveError::Delivery(reason).into())
            }
        }
    }

    /// Fire and forget: no retry, no outcome.
    pub fn notify_detached(&self, event: &str, body: &str) -> Result<()> {
        let message = self.message(event, body);
        self.gateway.deliver_detached(
            &self.agent.agent_id,
            &self.agent.gateway_session_id,
            &message,
        )
    }
}
