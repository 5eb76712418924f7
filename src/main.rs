mod cli;
mod config;
mod error;
mod gateway;
mod hooks;
mod injector;
mod log;
mod paths;
mod poll;
mod probe;
mod question;
mod queue;
mod registry;
mod retry;
mod shell_completion;
mod store;
mod tmux;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use cli::{Cli, Command};
use config::Config;
use error::{DriveError, exit_code_for};
use injector::{DetachedInjector, TerminalInjector};
use log::{Journal, LogEvent};
use paths::StateLayout;
use question::QuestionStore;
use question::navigator::{QuestionNavigator, parse_decisions};
use queue::scheduler::QueueScheduler;
use queue::{CommandStatus, Queue, QueueStore};
use tmux::TmuxPane;

/// Parse the queue driver's JSON argument into command texts.
fn parse_command_array(json: &str) -> Result<Vec<String>, DriveError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| DriveError::argument(format!("failed to parse commands JSON: {e}")))?;
    let Some(items) = value.as_array() else {
        return Err(DriveError::argument("commands must be a JSON array of strings"));
    };
    if items.is_empty() {
        return Err(DriveError::argument(
            "command array must contain at least one command",
        ));
    }
    items
        .iter()
        .enumerate()
        .map(|(index, item)| match item.as_str() {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            Some(_) => Err(DriveError::argument(format!(
                "command {index} is empty"
            ))),
            None => Err(DriveError::argument(format!(
                "command {index} is not a string: {item}"
            ))),
        })
        .collect()
}

fn require_session(session: &str) -> Result<(), DriveError> {
    if session.trim().is_empty() {
        return Err(DriveError::argument("--session must not be empty"));
    }
    Ok(())
}

fn require_live_session(session: &str) -> Result<()> {
    require_session(session)?;
    if !tmux::session_exists(session) {
        return Err(DriveError::argument(format!("tmux session '{session}' not found")).into());
    }
    Ok(())
}

fn session_journal(layout: &StateLayout, session: &str) -> Journal {
    Journal::open_or_disabled(&layout.journal_file(Some(session)))
}

fn type_command(layout: &StateLayout, config: &Config, session: &str, text: &str) -> Result<()> {
    let store = QueueStore::new(layout.clone());
    let journal = session_journal(layout, session);
    let injector = TerminalInjector::new(
        TmuxPane::new(session),
        session,
        &config.injector,
        &store,
        &journal,
    );
    injector.deliver(text)?;
    Ok(())
}

fn run_queue(layout: &StateLayout, config: &Config, session: &str, json: &str) -> Result<()> {
    require_session(session)?;
    let texts = parse_command_array(json)?;
    let queue = Queue::from_texts(&texts)?;
    require_live_session(session)?;

    let store = QueueStore::new(layout.clone());
    let replaced_active = match store.load(session) {
        Ok(Some(previous)) => previous.active().is_some(),
        Ok(None) => false,
        Err(e) => {
            warn!(session = %session, error = %e, "previous queue unreadable; replacing it");
            true
        }
    };
    if replaced_active {
        warn!(session = %session, "replacing a queue that still has an active command");
    }
    store.save(session, &queue)?;
    session_journal(layout, session).record(LogEvent::QueueCreated {
        commands: queue.commands.len(),
        replaced_active,
    });
    info!(session = %session, commands = queue.commands.len(), "queue created");

    type_command(layout, config, session, &texts[0])
}

fn run_answer(layout: &StateLayout, config: &Config, session: &str, json: &str) -> Result<()> {
    require_session(session)?;
    let decisions = parse_decisions(json)?;
    require_live_session(session)?;

    let store = QuestionStore::new(layout.clone());
    let journal = session_journal(layout, session);
    let navigator =
        QuestionNavigator::new(TmuxPane::new(session), &store, &config.navigator, &journal);
    navigator.dispatch(session, &decisions)?;
    Ok(())
}

fn run_cancel(layout: &StateLayout, session: &str) -> Result<()> {
    require_session(session)?;
    let store = QueueStore::new(layout.clone());
    let journal = session_journal(layout, session);
    let scheduler = QueueScheduler::new(&store, DetachedInjector::new(layout.clone())?, &journal);
    match scheduler.cancel(session)? {
        Some(result) => {
            let remaining: Vec<&str> = result
                .remaining_commands
                .iter()
                .map(|c| c.text.as_str())
                .collect();
            println!(
                "Cancelled queue for {session}: {}/{} completed",
                result.completed_count, result.total_count
            );
            if !remaining.is_empty() {
                println!("Remaining: {}", remaining.join(", "));
            }
        }
        None => println!("No queue for {session}"),
    }
    Ok(())
}

fn render_status(queue: &Queue) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Created {}  ({}/{} done)\n",
        queue.created_at.to_rfc3339(),
        queue.completed_count(),
        queue.commands.len()
    ));
    output.push_str(&format!(
        "  {:<3} {:<8} {:<24} {}\n",
        "#", "STATUS", "AWAITS", "COMMAND"
    ));
    for command in &queue.commands {
        let awaits = match &command.awaits.subkind {
            Some(sub) => format!("{}:{sub}", command.awaits.kind),
            None => command.awaits.kind.to_string(),
        };
        let marker = if command.status == CommandStatus::Active && command.is_confirmed() {
            " (submitted)"
        } else {
            ""
        };
        output.push_str(&format!(
            "  {:<3} {:<8} {:<24} {}{marker}\n",
            command.id, command.status, awaits, command.text
        ));
    }
    output
}

fn run_status(layout: &StateLayout, session: &str, json: bool) -> Result<()> {
    require_session(session)?;
    let store = QueueStore::new(layout.clone());
    match store.load(session)? {
        Some(queue) if json => println!(
            "{}",
            serde_json::to_string_pretty(&queue).context("failed to serialize queue")?
        ),
        Some(queue) => print!("{}", render_status(&queue)),
        None if json => println!("null"),
        None => println!("No queue for {session}"),
    }
    Ok(())
}

fn config_source_label(config_path: Option<&Path>) -> String {
    config_path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no config.toml found)".to_string())
}

fn push_kv(output: &mut String, key: &str, value: impl std::fmt::Display) {
    output.push_str(&format!("  {key:<26} {value}\n"));
}

fn render_config_human(
    config: &Config,
    config_path: Option<&Path>,
    state_root: &Path,
) -> String {
    let mut output = String::new();
    let injector = &config.injector;
    output.push_str("Injector\n");
    push_kv(&mut output, "prompt_glyph", &injector.prompt_glyph);
    push_kv(
        &mut output,
        "ready_poll / timeout",
        format!(
            "{}ms / {}ms",
            injector.ready_poll_millis, injector.ready_timeout_millis
        ),
    );
    push_kv(
        &mut output,
        "verify_poll / timeout",
        format!(
            "{}ms / {}ms",
            injector.verify_poll_millis, injector.verify_timeout_millis
        ),
    );
    push_kv(&mut output, "retype_retries", injector.retype_retries);
    push_kv(
        &mut output,
        "confirm_poll / timeout",
        format!(
            "{}ms / {}ms",
            injector.confirm_poll_millis, injector.confirm_timeout_millis
        ),
    );
    push_kv(&mut output, "submit_retries", injector.submit_retries);
    push_kv(&mut output, "tail_lines", injector.tail_lines);
    output.push('\n');

    output.push_str("Navigator\n");
    push_kv(
        &mut output,
        "pre_keystroke_delay",
        format!("{}ms", config.navigator.pre_keystroke_delay_millis),
    );
    push_kv(&mut output, "chat_offset", config.navigator.chat_offset);
    output.push('\n');

    output.push_str("Gateway\n");
    push_kv(&mut output, "program", &config.gateway.program);
    push_kv(
        &mut output,
        "timeout",
        format!("{}s", config.gateway.timeout_secs),
    );
    output.push('\n');

    output.push_str("Retry\n");
    push_kv(
        &mut output,
        "fast",
        format!(
            "{} attempts from {}ms",
            config.retry.fast_attempts, config.retry.fast_initial_delay_millis
        ),
    );
    push_kv(
        &mut output,
        "slow",
        format!(
            "{} attempts from {}ms",
            config.retry.slow_attempts, config.retry.slow_initial_delay_millis
        ),
    );
    output.push('\n');

    output.push_str("Source Path\n");
    push_kv(&mut output, "path", config_source_label(config_path));
    push_kv(&mut output, "state_root", state_root.display());

    output
}

fn render_config_json(
    config: &Config,
    config_path: Option<&Path>,
    state_root: &Path,
) -> Result<String> {
    let payload = serde_json::json!({
        "injector": &config.injector,
        "navigator": &config.navigator,
        "gateway": &config.gateway,
        "retry": &config.retry,
        "source_path": config_source_label(config_path),
        "state_root": state_root.display().to_string()
    });

    serde_json::to_string_pretty(&payload).context("failed to serialize config to JSON")
}

fn init_tracing(cli: &Cli) {
    let quiet = matches!(cli.command, Command::Hook { .. } | Command::Config { .. });
    let filter = match cli.verbose {
        0 if quiet => "hookdrive=warn",
        0 => "hookdrive=info",
        1 => "hookdrive=debug",
        _ => "hookdrive=trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Completions { shell } = cli.command {
        return shell_completion::print(shell);
    }

    let layout = StateLayout::new(paths::resolve_home()?);
    let (config, config_path) = Config::load(&layout)?;
    if cli.verbose > 0 {
        match config_path {
            Some(ref p) => info!("loaded config from {}", p.display()),
            None => info!("no config.toml found, using defaults"),
        }
    }

    match cli.command {
        Command::Queue { session, commands } => run_queue(&layout, &config, &session, &commands),
        Command::Answer { session, decisions } => {
            run_answer(&layout, &config, &session, &decisions)
        }
        Command::Type { session, command } => {
            require_live_session(&session)?;
            type_command(&layout, &config, &session, &command)
        }
        Command::Hook { kind } => hooks::run(kind, &layout, std::io::stdin().lock()),
        Command::Cancel { session } => run_cancel(&layout, &session),
        Command::Status { session, json } => run_status(&layout, &session, json),
        Command::Config { json } => {
            let source = config_path.as_deref();
            if json {
                println!("{}", render_config_json(&config, source, layout.root())?);
            } else {
                print!("{}", render_config_human(&config, source, layout.root()));
            }
            Ok(())
        }
        Command::Completions { .. } => Ok(()),
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version go to stdout and are not failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            std::process::exit(code);
        }
    };
    init_tracing(&cli);

    if let Err(e) = run(cli) {
        eprintln!("hookdrive: {e:#}");
        std::process::exit(exit_code_for(&e));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_array_accepts_strings_only() {
        assert_eq!(
            parse_command_array(r#"["/gsd:plan-phase 3", "/clear"]"#).unwrap(),
            vec!["/gsd:plan-phase 3", "/clear"]
        );
        for bad in ["", "not json", "{}", "[]", r#"["ok", 3]"#, r#"["  "]"#] {
            let err = parse_command_array(bad).unwrap_err();
            assert_eq!(err.exit_code(), 1, "input {bad:?}");
        }
    }

    #[test]
    fn empty_session_is_an_argument_error() {
        let err = require_session("  ").unwrap_err();
        assert!(matches!(err, DriveError::Argument(_)));
    }

    #[test]
    fn missing_tmux_session_is_an_argument_error() {
        let err = require_live_session("hookdrive-test-nonexistent-12345").unwrap_err();
        assert_eq!(exit_code_for(&err), 1);
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn status_table_shows_awaits_and_progress() {
        let texts = vec!["/gsd:plan-phase 1".to_string(), "/clear".to_string()];
        let queue = Queue::from_texts(&texts).unwrap();
        let rendered = render_status(&queue);
        assert!(rendered.contains("(0/2 done)"));
        assert!(rendered.contains("active"));
        assert!(rendered.contains("turn-ended"));
        assert!(rendered.contains("session-restarted:clear"));
        assert!(rendered.contains("/gsd:plan-phase 1"));
    }

    #[test]
    fn status_for_missing_queue_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        run_status(&StateLayout::new(tmp.path()), "w1", false).unwrap();
        run_status(&StateLayout::new(tmp.path()), "w1", true).unwrap();
    }

    #[test]
    fn cancel_without_queue_is_not_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        run_cancel(&StateLayout::new(tmp.path()), "w1").unwrap();
    }

    #[test]
    fn render_config_human_groups_sections() {
        let rendered = render_config_human(&Config::default(), None, Path::new("/s"));
        assert!(rendered.contains("Injector\n"));
        assert!(rendered.contains("Navigator\n"));
        assert!(rendered.contains("Gateway\n"));
        assert!(rendered.contains("Retry\n"));
        assert!(rendered.contains("chat_offset"));
        assert!(rendered.contains("3 attempts from 2000ms"));
        assert!(rendered.contains("(defaults, no config.toml found)"));
        assert!(rendered.contains("state_root"));
        assert!(rendered.contains("/s\n"));
    }

    #[test]
    fn render_config_json_is_valid_and_contains_expected_fields() {
        let json = render_config_json(
            &Config::default(),
            Some(Path::new("/s/config.toml")),
            Path::new("/s"),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["navigator"]["chat_offset"], 2);
        assert_eq!(value["gateway"]["program"], "openclaw");
        assert_eq!(value["retry"]["fast_attempts"], 3);
        assert_eq!(value["source_path"], "/s/config.toml");
        assert_eq!(value["state_root"], "/s");
    }
}
