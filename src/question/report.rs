//! Operator-facing renderings of questions and reconciliation failures.

use serde_json::{Map, Value};

use super::{PendingAnswer, SubQuestion};

fn selection_mode(sub: &SubQuestion) -> &'static str {
    if sub.multi_select {
        "multi-select"
    } else {
        "single-select"
    }
}

fn header_or_default(sub: &SubQuestion, number: usize) -> String {
    match sub.header.as_deref() {
        Some(h) if !h.trim().is_empty() => h.to_string(),
        _ => format!("Question {number}"),
    }
}

fn push_options(lines: &mut Vec<String>, sub: &SubQuestion) {
    for (i, option) in sub.options.iter().enumerate() {
        if option.description.is_empty() {
            lines.push(format!("  {i}. {}", option.label));
        } else {
            lines.push(format!("  {i}. {} - {}", option.label, option.description));
        }
    }
}

/// Render a modal question for the remote operator, ending with the exact
/// `hookdrive answer` call that answers it.
pub fn format_questions_for_agent(questions: &[SubQuestion], session: &str) -> String {
    let blocks: Vec<String> = questions
        .iter()
        .enumerate()
        .map(|(i, sub)| {
            let number = i + 1;
            let mut lines = vec![format!(
                "### Question {number}: {} ({})",
                header_or_default(sub, number),
                selection_mode(sub)
            )];
            if !sub.question_text.is_empty() {
                lines.push(sub.question_text.clone());
            }
            push_options(&mut lines, sub);
            lines.join("\n")
        })
        .collect();

    [
        "## AskUserQuestion from Claude Code".to_string(),
        String::new(),
        format!("**Session:** {session}"),
        String::new(),
        blocks.join("\n\n"),
        String::new(),
        "## How to answer".to_string(),
        "Read each question and its option descriptions, then check them against the project context you already hold.".to_string(),
        String::new(),
        "For every question, decide:".to_string(),
        "- One option clearly fits the project direction -> select it".to_string(),
        "- An option is close but misses nuance -> type the right answer with your reasoning".to_string(),
        "- The first (recommended) option is only correct if the roadmap agrees; verify before accepting".to_string(),
        "- The question itself is wrong for the current state -> use chat to redirect".to_string(),
        "- Multi-select: pick only the items relevant to the current phase".to_string(),
        String::new(),
        "Answer format per question:".to_string(),
        r#"  Pick option:    { "action": "select", "optionIndex": N }"#.to_string(),
        r#"  Type answer:    { "action": "type", "text": "your reasoned answer" }"#.to_string(),
        r#"  Multi-select:   { "action": "multi-select", "selectedIndices": [0, 2] }"#.to_string(),
        r#"  Redirect:       { "action": "chat", "text": "explanation of what's wrong" }"#.to_string(),
        String::new(),
        "Call:".to_string(),
        format!("  hookdrive answer --session {session} '<json array>'"),
    ]
    .join("\n")
}

fn question_context(questions: Option<&[SubQuestion]>) -> String {
    let Some(questions) = questions.filter(|q| !q.is_empty()) else {
        return "(question data not available)".to_string();
    };
    questions
        .iter()
        .enumerate()
        .map(|(i, sub)| {
            let number = i + 1;
            let mut lines = vec![
                format!(
                    "**Question {number}: {} ({})**",
                    header_or_default(sub, number),
                    selection_mode(sub)
                ),
                sub.question_text.clone(),
            ];
            push_options(&mut lines, sub);
            lines.join("\n")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Render a failed reconciliation: what was intended, what the host
/// recorded, why they disagree, and the question that was asked.
pub fn mismatch_message(
    session: &str,
    pending: &PendingAnswer,
    recorded: &Map<String, Value>,
    reason: &str,
    questions: Option<&[SubQuestion]>,
) -> String {
    let intended = serde_json::to_string(&pending.answers).unwrap_or_else(|_| "{}".to_string());
    let received = serde_json::to_string(recorded).unwrap_or_else(|_| "{}".to_string());
    [
        "## AskUserQuestion Verification - MISMATCH".to_string(),
        String::new(),
        format!("**Session:** {session}"),
        format!("**tool_use_id:** {}", pending.tool_use_id),
        String::new(),
        format!(
            "**You intended:** action=\"{}\", answers={intended}",
            pending.action.labels().join(",")
        ),
        format!("**Claude Code received:** answers={received}"),
        format!("**Reason:** {reason}"),
        String::new(),
        "### Original Question".to_string(),
        question_context(questions),
    ]
    .join("\n")
}
