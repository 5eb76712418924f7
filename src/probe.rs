//! Predicates over captured pane text.
//!
//! Nothing here talks to tmux. The injector captures the pane and asks the
//! probe what it sees, so the heuristics can be tested against synthetic
//! captures and tuned without touching the typing protocol.

const NBSP: char = '\u{00A0}';

/// Collapse runs of whitespace (including non-breaking spaces) to a single
/// space, trim, and lowercase.
pub fn normalize(text: &str) -> String {
    text.replace(NBSP, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptProbe {
    glyph: String,
    tail_lines: usize,
}

impl PromptProbe {
    pub fn new(glyph: impl Into<String>, tail_lines: usize) -> Self {
        Self {
            glyph: glyph.into(),
            tail_lines,
        }
    }

    /// Text following the glyph on every line that starts with it.
    pub fn prompt_lines<'a>(&'a self, capture: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        capture
            .lines()
            .filter_map(move |line| line.strip_prefix(self.glyph.as_str()))
    }

    /// True when some prompt line holds nothing but whitespace.
    ///
    /// The host draws status rows below its input line, so the last line of
    /// the capture is not necessarily the prompt; any line may qualify.
    pub fn has_fresh_prompt(&self, capture: &str) -> bool {
        self.prompt_lines(capture)
            .any(|rest| rest.chars().all(|c| c.is_whitespace() || c == NBSP))
    }

    /// True when `command` appears to be sitting on the input line.
    ///
    /// Tries the whole normalized command on a prompt line first. The host
    /// may wrap or truncate long input, so it then accepts the command's
    /// last token as a whole word on a prompt line or on one of the
    /// `tail_lines` lines that continue it, up to the next rule or prompt.
    pub fn shows_command(&self, capture: &str, command: &str) -> bool {
        let wanted = normalize(command);
        if wanted.is_empty() {
            return false;
        }
        if self
            .prompt_lines(capture)
            .any(|rest| normalize(rest).contains(&wanted))
        {
            return true;
        }

        let Some(token) = wanted.split(' ').next_back() else {
            return false;
        };
        let lines: Vec<&str> = capture.lines().collect();
        lines.iter().enumerate().any(|(index, line)| {
            let Some(rest) = line.strip_prefix(self.glyph.as_str()) else {
                return false;
            };
            let continuation = lines[index + 1..]
                .iter()
                .take_while(|l| !is_rule(l) && !l.starts_with(self.glyph.as_str()))
                .filter(|l| !normalize(l).is_empty())
                .take(self.tail_lines)
                .copied();
            std::iter::once(rest)
                .chain(continuation)
                .any(|l| has_word(l, token))
        })
    }
}

fn has_word(line: &str, token: &str) -> bool {
    normalize(line).split(' ').any(|word| word == token)
}

/// A horizontal separator the host draws around its input box.
fn is_rule(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && trimmed.chars().all(|c| matches!(c, '─' | '━' | '═'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe() -> PromptProbe {
        PromptProbe::new("❯", 10)
    }

    const FRESH: &str = "\
╭─────────────────────────╮
│ Welcome back            │
╰─────────────────────────╯

❯\u{00A0}
─────────────────────────
  claude-opus · bypass permissions on";

    const USED: &str = "\
❯ /clear
  ⎿  (no content)
─────────────────────────
  claude-opus · bypass permissions on";

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(normalize("  Use\u{00A0}\u{00A0}Pattern   B \n"), "use pattern b");
        assert_eq!(normalize("\u{00A0}"), "");
    }

    #[test]
    fn fresh_prompt_ignores_status_rows_below() {
        assert!(probe().has_fresh_prompt(FRESH));
        assert!(probe().has_fresh_prompt("❯"));
    }

    #[test]
    fn used_prompt_is_not_fresh() {
        assert!(!probe().has_fresh_prompt(USED));
        assert!(!probe().has_fresh_prompt("> \n$ "));
        assert!(!probe().has_fresh_prompt(""));
    }

    #[test]
    fn indented_glyph_is_not_a_prompt_line() {
        assert!(!probe().has_fresh_prompt("   ❯ "));
    }

    #[test]
    fn command_matches_on_prompt_line() {
        let capture = "history\n❯ /gsd:plan-phase\u{00A0}3\n──────";
        assert!(probe().shows_command(capture, "/gsd:plan-phase 3"));
        assert!(!probe().shows_command(FRESH, "/gsd:plan-phase 3"));
    }

    #[test]
    fn wrapped_command_matches_on_last_token() {
        let capture = "❯ /gsd:discuss-phase with a very long argument that\n  wraps-onto-next-line\n──────";
        assert!(probe().shows_command(
            capture,
            "/gsd:discuss-phase with a very long argument that wraps-onto-next-line"
        ));
    }

    #[test]
    fn continuation_search_is_limited_to_tail() {
        let mut capture = String::from("❯ find\n");
        for i in 0..12 {
            capture.push_str(&format!("  part{i}\n"));
        }
        capture.push_str("  needle\n──────");
        assert!(!PromptProbe::new("❯", 10).shows_command(&capture, "find needle"));
        assert!(PromptProbe::new("❯", 20).shows_command(&capture, "find needle"));
    }

    #[test]
    fn status_bar_digits_do_not_verify_lost_text() {
        let capture = "history\n❯ \n──────\n  claude-opus-4-3 · 13 tasks";
        assert!(!probe().shows_command(capture, "/gsd:plan-phase 3"));
        // Below the rule even a whole-word hit is status text.
        let capture = "❯ \n──────\n  phase 3";
        assert!(!probe().shows_command(capture, "/gsd:plan-phase 3"));
    }

    #[test]
    fn last_token_must_be_a_whole_word() {
        let capture = "❯ /gsd:plan-phase 13\n──────";
        assert!(!probe().shows_command(capture, "/gsd:plan-phase 3"));
        let capture = "❯ /gsd:plan-ph… 3\n──────";
        assert!(probe().shows_command(capture, "/gsd:plan-phase 3"));
    }

    #[test]
    fn empty_command_never_matches() {
        assert!(!probe().shows_command(USED, "   "));
    }
}
