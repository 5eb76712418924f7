//! Compare the navigator's recorded intent with what the host recorded.

use serde_json::{Map, Value};
use tracing::debug;

use super::{ActionKind, AnswerValue, PendingAction, PendingAnswer, SubQuestion};
use crate::probe::normalize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Matched,
    Mismatched { reason: String },
}

impl Reconciliation {
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Matched)
    }

    fn mismatch(reason: String) -> Self {
        Self::Mismatched { reason }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Look up the host's answer for sub-question `index`.
///
/// The host has been seen keying answers both by the stringified index and
/// by the literal question text, so both are tried in that order.
fn recorded_answer(
    recorded: &Map<String, Value>,
    index: usize,
    questions: &[SubQuestion],
) -> Option<String> {
    if let Some(value) = recorded.get(&index.to_string()) {
        debug!(index, key_format = "index", "answer key resolved");
        return Some(value_text(value));
    }
    let text = questions.get(index).map(|q| q.question_text.as_str())?;
    let value = recorded.get(text)?;
    debug!(index, key_format = "text", "answer key resolved");
    Some(value_text(value))
}

fn option_label(questions: &[SubQuestion], index: usize, option: usize) -> Result<&str, String> {
    let question = questions
        .get(index)
        .ok_or_else(|| format!("Question index {index} not found in tool_input"))?;
    question
        .options
        .get(option)
        .map(|o| o.label.as_str())
        .ok_or_else(|| format!("Option index {option} not found in question {index}"))
}

pub fn reconcile(
    pending: &PendingAnswer,
    recorded: &Map<String, Value>,
    questions: &[SubQuestion],
) -> Reconciliation {
    if pending.action == PendingAction::Single(ActionKind::Chat) {
        return Reconciliation::Matched;
    }

    for (&index, intended) in &pending.answers {
        let Some(action) = pending.action.for_index(index) else {
            return Reconciliation::mismatch(format!("No action recorded for question {index}"));
        };
        if action == ActionKind::Chat {
            continue;
        }
        if let Err(reason) = check_one(action, index, intended, recorded, questions) {
            return Reconciliation::mismatch(reason);
        }
    }
    Reconciliation::Matched
}

fn check_one(
    action: ActionKind,
    index: usize,
    intended: &AnswerValue,
    recorded: &Map<String, Value>,
    questions: &[SubQuestion],
) -> Result<(), String> {
    // Option labels are resolved before the host answer so an impossible
    // intent is reported as such rather than as a missing answer.
    let labels: Vec<&str> = match (action, intended) {
        (ActionKind::Select, AnswerValue::Index(option)) => {
            vec![option_label(questions, index, *option)?]
        }
        (ActionKind::MultiSelect, AnswerValue::Indices(options)) => options
            .iter()
            .map(|o| option_label(questions, index, *o))
            .collect::<Result<_, _>>()?,
        (ActionKind::Type, AnswerValue::Text(_)) => Vec::new(),
        (action, value) => {
            return Err(format!(
                "Question {index}: intent {value:?} does not fit action {}",
                action.as_str()
            ));
        }
    };

    let received = recorded_answer(recorded, index, questions)
        .ok_or_else(|| format!("No answer found for question {index} in tool_response"))?;
    let normalized_received = normalize(&received);

    match (action, intended) {
        (ActionKind::Select, _) => {
            let label = labels[0];
            if normalize(label) != normalized_received {
                return Err(format!(
                    "Question {index}: intended \"{label}\" but received \"{received}\""
                ));
            }
        }
        (ActionKind::Type, AnswerValue::Text(text)) => {
            if !normalized_received.contains(&normalize(text)) {
                return Err(format!(
                    "Question {index}: intended text \"{text}\" not found in received \"{received}\""
                ));
            }
        }
        _ => {
            for label in labels {
                if !normalized_received.contains(&normalize(label)) {
                    return Err(format!(
                        "Question {index}: selected option \"{label}\" not found in received \"{received}\""
                    ));
                }
            }
        }
    }
    Ok(())
}
