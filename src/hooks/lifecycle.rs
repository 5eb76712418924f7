//! Turn, session and prompt hooks: the events that drive the queue.

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info};

use super::HookContext;
use crate::gateway::Gateway;
use crate::queue::LifecycleKind;
use crate::queue::scheduler::{Action, CancelResult, CommandInjector};

const SUGGESTED_COMMAND_PATTERN: &str = r"/(?:gsd:[a-z-]+(?:\s+[^\s`]+)?|clear)";

/// Slash commands mentioned in `text`, first occurrence order, no repeats.
pub fn suggested_commands(text: &str) -> Result<Vec<String>> {
    let pattern =
        Regex::new(SUGGESTED_COMMAND_PATTERN).context("invalid suggested command pattern")?;
    let mut found: Vec<String> = Vec::new();
    for m in pattern.find_iter(text) {
        if !found.iter().any(|f| f == m.as_str()) {
            found.push(m.as_str().to_string());
        }
    }
    Ok(found)
}

fn fresh_wake_message(last_message: &str) -> Result<String> {
    let commands = suggested_commands(last_message)?;
    let list = if commands.is_empty() {
        "_No commands detected in response._".to_string()
    } else {
        commands
            .iter()
            .map(|c| format!("- `{c}`"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    Ok(format!("{last_message}\n\n## Suggested Commands\n{list}"))
}

fn cancel_message(result: &CancelResult) -> String {
    let remaining = result
        .remaining_commands
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Queue cancelled by manual input.\nCompleted: {}/{} commands.\nRemaining commands: {remaining}",
        result.completed_count, result.total_count
    )
}

pub(super) fn on_turn_ended<G: Gateway, I: CommandInjector>(
    ctx: &HookContext<'_, G, I>,
    last_message: Option<&str>,
    reentrant: bool,
) -> Result<()> {
    if reentrant {
        debug!(session = %ctx.session, "stop hook already active; ignoring");
        return Ok(());
    }
    let Some(last_message) = last_message.filter(|m| !m.trim().is_empty()) else {
        debug!(session = %ctx.session, "turn ended without a message");
        return Ok(());
    };

    let queues = ctx.queues();
    let action = ctx.scheduler(&queues).process_event(
        ctx.session,
        LifecycleKind::TurnEnded,
        None,
        Some(last_message),
    )?;
    debug!(session = %ctx.session, action = action.label(), "turn ended");

    match action {
        Action::QueueComplete { summary } => {
            let body =
                serde_json::to_string_pretty(&summary).context("failed to serialize summary")?;
            ctx.notifier().notify("stop", &body)
        }
        Action::NoQueue => {
            let body = fresh_wake_message(last_message)?;
            ctx.notifier().notify("stop", &body)?;
            info!(session = %ctx.session, "agent woken for finished turn");
            Ok(())
        }
        Action::Advanced { .. } | Action::AwaitsMismatch | Action::NoActiveCommand => Ok(()),
    }
}

pub(super) fn on_session_started<G: Gateway, I: CommandInjector>(
    ctx: &HookContext<'_, G, I>,
    source: Option<&str>,
) -> Result<()> {
    let queues = ctx.queues();
    let scheduler = ctx.scheduler(&queues);
    match source {
        Some("clear") => {
            let action = scheduler.process_event(
                ctx.session,
                LifecycleKind::SessionRestarted,
                Some("clear"),
                None,
            )?;
            debug!(session = %ctx.session, action = action.label(), "session cleared");
            if let Action::QueueComplete { summary } = action {
                let body = serde_json::to_string_pretty(&summary)
                    .context("failed to serialize summary")?;
                ctx.notifier().notify("session-start", &body)?;
            }
            Ok(())
        }
        Some("startup") => {
            if scheduler.cleanup_stale(ctx.session)? {
                ctx.notifier().notify(
                    "session-start",
                    "Previous session had unfinished queue. Stale queue archived.",
                )?;
            }
            Ok(())
        }
        other => {
            debug!(session = %ctx.session, source = ?other, "session start ignored");
            Ok(())
        }
    }
}

pub(super) fn on_prompt_submitted<G: Gateway, I: CommandInjector>(
    ctx: &HookContext<'_, G, I>,
    prompt: &str,
) -> Result<()> {
    let queues = ctx.queues();
    let scheduler = ctx.scheduler(&queues);
    if scheduler.is_injector_originated(ctx.session, prompt)? {
        let confirmed = scheduler.confirm_submission(ctx.session)?;
        debug!(session = %ctx.session, command = ?confirmed, "injected prompt acknowledged");
        return Ok(());
    }

    let Some(result) = scheduler.cancel(ctx.session)? else {
        return Ok(());
    };
    ctx.notifier()
        .notify("user-prompt-submit", &cancel_message(&result))?;
    info!(
        session = %ctx.session,
        completed = result.completed_count,
        total = result.total_count,
        "queue cancelled by manual input; agent notified"
    );
    Ok(())
}
