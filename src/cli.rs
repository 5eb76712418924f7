use clap::{Parser, Subcommand, ValueEnum};

use crate::hooks::HookKind;

#[derive(Parser, Debug)]
#[command(
    name = "hookdrive",
    about = "Hook-driven command queues and verified keystroke injection for tmux sessions",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replace the session's queue and type its first command
    Queue {
        /// tmux session that owns the queue
        #[arg(long)]
        session: String,

        /// JSON array of command strings, e.g. '["/gsd:plan-phase 3", "/clear"]'
        commands: String,
    },

    /// Answer the open question modal
    Answer {
        /// tmux session showing the modal
        #[arg(long)]
        session: String,

        /// JSON array with one decision per question,
        /// e.g. '[{"action": "select", "optionIndex": 1}]'
        decisions: String,
    },

    /// Type one command with the verified injection protocol
    #[command(name = "type")]
    Type {
        #[arg(long)]
        session: String,

        /// Text to type; may start with a dash
        #[arg(long, allow_hyphen_values = true)]
        command: String,
    },

    /// Serve a host lifecycle hook (payload on stdin)
    Hook {
        #[arg(value_enum)]
        kind: HookKind,
    },

    /// Cancel the session's queue
    Cancel {
        #[arg(long)]
        session: String,
    },

    /// Show the session's queue
    Status {
        #[arg(long)]
        session: String,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
