//! Host lifecycle hooks.
//!
//! Every hook is a short-lived process: the host writes a JSON payload to
//! stdin, the handler mutates per-session state and possibly notifies the
//! owning agent, then exits. Sessions the registry does not know about are
//! skipped without a trace beyond a debug line.

mod ask;
mod lifecycle;
pub mod payload;

use std::io::Read;

use anyhow::Result;
use clap::ValueEnum;
use tracing::{debug, info};

use crate::config::Config;
use crate::gateway::{CliGateway, Gateway, Notifier};
use crate::injector::DetachedInjector;
use crate::log::{Journal, LogEvent};
use crate::paths::StateLayout;
use crate::queue::QueueStore;
use crate::queue::scheduler::{CommandInjector, QueueScheduler};
use crate::question::QuestionStore;
use crate::registry::{self, AgentEntry};
use crate::retry::RetryPolicy;
use crate::tmux;

pub use payload::{HookEvent, ToolCall};

/// The host hook being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum HookKind {
    Stop,
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
}

impl HookKind {
    /// Event name used in gateway messages and prompt file names.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::SessionStart => "session-start",
            Self::UserPromptSubmit => "user-prompt-submit",
            Self::PreToolUse => "pre-tool-use",
            Self::PostToolUse => "post-tool-use",
        }
    }
}

/// Everything a handler needs for one invocation.
pub struct HookContext<'a, G, I> {
    pub session: &'a str,
    pub agent: &'a AgentEntry,
    pub layout: &'a StateLayout,
    pub config: &'a Config,
    pub journal: &'a Journal,
    pub gateway: G,
    pub injector: I,
}

impl<'a, G: Gateway, I: CommandInjector> HookContext<'a, G, I> {
    fn queues(&self) -> QueueStore {
        QueueStore::new(self.layout.clone())
    }

    fn questions(&self) -> QuestionStore {
        QuestionStore::new(self.layout.clone())
    }

    fn scheduler<'s>(&'s self, store: &'s QueueStore) -> QueueScheduler<'s, &'s I> {
        QueueScheduler::new(store, &self.injector, self.journal)
    }

    fn notifier(&self) -> Notifier<'_, &G> {
        Notifier::new(
            &self.gateway,
            self.agent,
            self.layout,
            RetryPolicy::fast(&self.config.retry),
            self.journal,
            self.session,
        )
    }
}

type ToolHandler<G, I> = fn(&HookContext<'_, G, I>, &ToolCall) -> Result<()>;

struct ToolRoute<G, I> {
    tool: &'static str,
    requested: ToolHandler<G, I>,
    completed: ToolHandler<G, I>,
}

fn tool_routes<G: Gateway, I: CommandInjector>() -> [ToolRoute<G, I>; 1] {
    [ToolRoute {
        tool: ask::TOOL_NAME,
        requested: ask::on_requested::<G, I>,
        completed: ask::on_completed::<G, I>,
    }]
}

/// Route one typed event to its handler.
pub fn dispatch<G: Gateway, I: CommandInjector>(
    ctx: &HookContext<'_, G, I>,
    event: HookEvent,
) -> Result<()> {
    match event {
        HookEvent::TurnEnded {
            last_message,
            reentrant,
        } => lifecycle::on_turn_ended(ctx, last_message.as_deref(), reentrant),
        HookEvent::SessionStarted { source } => {
            lifecycle::on_session_started(ctx, source.as_deref())
        }
        HookEvent::PromptSubmitted { prompt } => lifecycle::on_prompt_submitted(ctx, &prompt),
        HookEvent::ToolRequested(call) => route_tool(ctx, &call, |r| r.requested),
        HookEvent::ToolCompleted(call) => route_tool(ctx, &call, |r| r.completed),
    }
}

fn route_tool<G: Gateway, I: CommandInjector>(
    ctx: &HookContext<'_, G, I>,
    call: &ToolCall,
    pick: impl Fn(&ToolRoute<G, I>) -> ToolHandler<G, I>,
) -> Result<()> {
    match tool_routes::<G, I>().iter().find(|r| r.tool == call.name) {
        Some(route) => pick(route)(ctx, call),
        None => {
            debug!(session = %ctx.session, tool = %call.name, "no handler for tool");
            Ok(())
        }
    }
}

/// Serve one hook invocation end to end.
///
/// Guard failures (no payload, not inside tmux, unmanaged session) return
/// `Ok` so the host sees a clean exit.
pub fn run(kind: HookKind, layout: &StateLayout, stdin: impl Read) -> Result<()> {
    let Some(payload) = payload::read_payload(stdin) else {
        return Ok(());
    };
    let session = match tmux::current_session() {
        Ok(Some(session)) => session,
        Ok(None) => {
            debug!(hook = kind.as_str(), "not inside a tmux session");
            return Ok(());
        }
        Err(e) => {
            debug!(hook = kind.as_str(), error = %e, "tmux session lookup failed");
            return Ok(());
        }
    };
    let Some(agent) = registry::lookup(layout, &session) else {
        debug!(hook = kind.as_str(), session = %session, "session not in agent registry");
        return Ok(());
    };

    let (config, _) = Config::load(layout)?;
    let journal = Journal::open_or_disabled(&layout.journal_file(Some(&session)));
    journal.record(LogEvent::HookReceived {
        hook: kind.as_str().to_string(),
    });
    info!(hook = kind.as_str(), session = %session, agent = %agent.agent_id, "hook received");

    let ctx = HookContext {
        session: &session,
        agent: &agent,
        layout,
        config: &config,
        journal: &journal,
        gateway: CliGateway::new(&config.gateway)
            .with_detached_log(layout.gateway_log_file(&session)),
        injector: DetachedInjector::new(layout.clone())?,
    };
    dispatch(&ctx, HookEvent::from_payload(kind, payload))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gateway::tests::{FakeGateway, agent};
    use crate::queue::scheduler::tests::RecordingInjector;

    pub(crate) struct Harness {
        pub(crate) _tmp: tempfile::TempDir,
        pub(crate) layout: StateLayout,
        pub(crate) config: Config,
        pub(crate) journal: Journal,
        pub(crate) agent: AgentEntry,
    }

    impl Harness {
        pub(crate) fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let layout = StateLayout::new(tmp.path());
            let journal = Journal::new(&layout.journal_file(Some("w1"))).unwrap();
            let mut config = Config::default();
            config.retry.fast_initial_delay_millis = 0;
            Self {
                _tmp: tmp,
                layout,
                config,
                journal,
                agent: agent(),
            }
        }

        pub(crate) fn context<'a>(
            &'a self,
            gateway: &'a FakeGateway,
            injector: &'a RecordingInjector,
        ) -> HookContext<'a, &'a FakeGateway, &'a RecordingInjector> {
            HookContext {
                session: "w1",
                agent: &self.agent,
                layout: &self.layout,
                config: &self.config,
                journal: &self.journal,
                gateway,
                injector,
            }
        }

        pub(crate) fn journal_text(&self) -> String {
            std::fs::read_to_string(self.journal.path()).unwrap_or_default()
        }
    }

    #[test]
    fn hook_kind_names_are_kebab_case() {
        assert_eq!(HookKind::UserPromptSubmit.as_str(), "user-prompt-submit");
        let parsed = HookKind::from_str("post-tool-use", false).unwrap();
        assert_eq!(parsed, HookKind::PostToolUse);
    }

    #[test]
    fn unknown_tools_are_ignored() {
        let h = Harness::new();
        let gateway = FakeGateway::default();
        let injector = RecordingInjector::default();
        let ctx = h.context(&gateway, &injector);
        let call = ToolCall {
            name: "Bash".into(),
            tool_use_id: "toolu_09".into(),
            input: serde_json::json!({"command": "ls"}),
            response: serde_json::Value::Null,
        };
        dispatch(&ctx, HookEvent::ToolRequested(call.clone())).unwrap();
        dispatch(&ctx, HookEvent::ToolCompleted(call)).unwrap();
        assert!(gateway.delivered.borrow().is_empty());
        assert!(gateway.detached.borrow().is_empty());
    }

    #[test]
    fn run_without_payload_exits_cleanly() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StateLayout::new(tmp.path());
        run(HookKind::Stop, &layout, "".as_bytes()).unwrap();
        run(HookKind::Stop, &layout, "not json".as_bytes()).unwrap();
        assert!(!layout.logs_dir().exists());
    }
}
