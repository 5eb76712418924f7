//! tmux plumbing for hookdrive.
//!
//! Wraps the handful of tmux CLI commands the drivers need: literal text
//! and named-key injection via send-keys, pane capture, and session
//! lookup. The [`Pane`] trait is the seam the injector and navigator are
//! written against, so they can be exercised without a tmux server.

use std::process::{Command, Output};

use anyhow::{Context, Result, bail};
use tracing::debug;

/// Named keys the drivers send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Submit / confirm.
    Enter,
    /// Move the selection cursor one row down.
    Down,
    /// Toggle the highlighted multi-select option.
    Space,
    /// Advance to the next question tab.
    Tab,
    /// Clear the input line (readline kill-to-start).
    ClearLine,
}

impl Key {
    /// The key name as tmux `send-keys` understands it.
    pub fn tmux_name(self) -> &'static str {
        match self {
            Self::Enter => "Enter",
            Self::Down => "Down",
            Self::Space => "Space",
            Self::Tab => "Tab",
            Self::ClearLine => "C-u",
        }
    }
}

/// A terminal surface that accepts keystrokes and shows text.
pub trait Pane {
    /// Visible text, one terminal row per line.
    fn capture(&self) -> Result<String>;
    /// Type `text` verbatim; nothing in it is interpreted as a key name.
    fn send_literal(&self, text: &str) -> Result<()>;
    fn send_key(&self, key: Key) -> Result<()>;
}

impl<T: Pane + ?Sized> Pane for &T {
    fn capture(&self) -> Result<String> {
        (**self).capture()
    }

    fn send_literal(&self, text: &str) -> Result<()> {
        (**self).send_literal(text)
    }

    fn send_key(&self, key: Key) -> Result<()> {
        (**self).send_key(key)
    }
}

/// The active pane of a tmux session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxPane {
    target: String,
}

impl TmuxPane {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

impl Pane for TmuxPane {
    fn capture(&self) -> Result<String> {
        capture_pane(&self.target)
    }

    fn send_literal(&self, text: &str) -> Result<()> {
        send_literal(&self.target, text)
    }

    fn send_key(&self, key: Key) -> Result<()> {
        send_key(&self.target, key)
    }
}

fn run_tmux<I, S>(args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    Command::new("tmux")
        .args(args)
        .output()
        .context("failed to run tmux command")
}

fn ensure_success(output: &Output, what: &str) -> Result<()> {
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("tmux {what} failed: {}", stderr.trim());
    }
    Ok(())
}

/// Check if a tmux session exists.
pub fn session_exists(session: &str) -> bool {
    run_tmux(["has-session", "-t", session])
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Name of the session enclosing the calling process.
///
/// Returns `None` when the process is not running inside tmux (or tmux
/// reports nothing), which hook handlers treat as "not a managed session".
pub fn current_session() -> Result<Option<String>> {
    if std::env::var_os("TMUX").is_none() {
        return Ok(None);
    }
    let output = run_tmux(["display-message", "-p", "#S"])
        .context("failed to resolve current tmux session")?;
    ensure_success(&output, "display-message")?;
    let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Ok((!name.is_empty()).then_some(name))
}

/// Send literal text to a tmux target.
///
/// `-l` stops tmux from interpreting words like `Enter` or `Up` in the text
/// as key names; `--` protects text starting with a dash.
pub fn send_literal(target: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let output = run_tmux(["send-keys", "-t", target, "-l", "--", text])
        .with_context(|| format!("failed to send text to target '{target}'"))?;
    ensure_success(&output, "send-keys")?;
    debug!(target = target, text = text, "sent literal text");
    Ok(())
}

/// Send one named key to a tmux target.
pub fn send_key(target: &str, key: Key) -> Result<()> {
    let output = run_tmux(["send-keys", "-t", target, key.tmux_name()])
        .with_context(|| format!("failed to send {} to target '{target}'", key.tmux_name()))?;
    ensure_success(&output, "send-keys")?;
    debug!(target = target, key = key.tmux_name(), "sent key");
    Ok(())
}

/// Capture the current visible content of a tmux target.
pub fn capture_pane(target: &str) -> Result<String> {
    let output = run_tmux(["capture-pane", "-t", target, "-p"])
        .with_context(|| format!("failed to capture pane for target '{target}'"))?;
    ensure_success(&output, "capture-pane")?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}
