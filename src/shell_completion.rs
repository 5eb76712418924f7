//! Shell completion scripts for the hookdrive CLI.

use std::io;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::cli::{Cli, CompletionShell};

fn clap_shell(shell: CompletionShell) -> Shell {
    match shell {
        CompletionShell::Bash => Shell::Bash,
        CompletionShell::Zsh => Shell::Zsh,
        CompletionShell::Fish => Shell::Fish,
    }
}

pub fn print(shell: CompletionShell) -> Result<()> {
    write(shell, &mut io::stdout());
    Ok(())
}

fn write(shell: CompletionShell, out: &mut dyn io::Write) {
    let mut cmd = Cli::command();
    generate(clap_shell(shell), &mut cmd, "hookdrive", out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripts_name_the_binary_and_its_subcommands() {
        for shell in [
            CompletionShell::Bash,
            CompletionShell::Zsh,
            CompletionShell::Fish,
        ] {
            let mut out = Vec::new();
            write(shell, &mut out);
            let script = String::from_utf8(out).unwrap();
            assert!(script.contains("hookdrive"), "{shell:?}");
            assert!(script.contains("queue"), "{shell:?}");
        }
    }
}
