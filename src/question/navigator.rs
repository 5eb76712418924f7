//! Answering the host's modal question by keystroke arithmetic.
//!
//! Each tab of the modal lists the question's options in order, then a
//! "type something" row, then (after a separator) a "chat about this" row.
//! The cursor starts on the first option. Answers are therefore a count of
//! Down presses followed by confirm, toggle or text entry.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use tracing::info;

use super::{ActionKind, AnswerValue, PendingAction, PendingAnswer, Question, QuestionStore};
use crate::config::NavigatorConfig;
use crate::error::DriveError;
use crate::log::{Journal, LogEvent};
use crate::tmux::{Key, Pane};

/// The operator's answer for one sub-question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Decision {
    Select {
        #[serde(rename = "optionIndex")]
        option_index: usize,
    },
    Type {
        text: String,
    },
    MultiSelect {
        #[serde(rename = "selectedIndices")]
        selected_indices: Vec<usize>,
    },
    Chat {
        text: String,
    },
}

impl Decision {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Select { .. } => ActionKind::Select,
            Self::Type { .. } => ActionKind::Type,
            Self::MultiSelect { .. } => ActionKind::MultiSelect,
            Self::Chat { .. } => ActionKind::Chat,
        }
    }

    fn intended_value(&self) -> AnswerValue {
        match self {
            Self::Select { option_index } => AnswerValue::Index(*option_index),
            Self::Type { text } | Self::Chat { text } => AnswerValue::Text(text.clone()),
            Self::MultiSelect { selected_indices } => {
                AnswerValue::Indices(selected_indices.clone())
            }
        }
    }
}

/// One unit of input sent to the pane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stroke {
    Key(Key),
    Text(String),
}

fn downs(count: usize) -> impl Iterator<Item = Stroke> {
    std::iter::repeat_n(Stroke::Key(Key::Down), count)
}

/// Keys that answer one tab holding `option_count` options.
pub fn strokes_for(decision: &Decision, option_count: usize, chat_offset: usize) -> Vec<Stroke> {
    let mut strokes = Vec::new();
    match decision {
        Decision::Select { option_index } => {
            strokes.extend(downs(*option_index));
            strokes.push(Stroke::Key(Key::Enter));
        }
        Decision::Type { text } => {
            strokes.extend(downs(option_count));
            strokes.push(Stroke::Key(Key::Enter));
            strokes.push(Stroke::Text(text.clone()));
            strokes.push(Stroke::Key(Key::Enter));
        }
        Decision::MultiSelect { selected_indices } => {
            let mut targets = selected_indices.clone();
            targets.sort_unstable();
            targets.dedup();
            let mut cursor = 0;
            for target in targets {
                strokes.extend(downs(target - cursor));
                strokes.push(Stroke::Key(Key::Space));
                cursor = target;
            }
            strokes.push(Stroke::Key(Key::Enter));
        }
        Decision::Chat { text } => {
            strokes.extend(downs(option_count + chat_offset));
            strokes.push(Stroke::Key(Key::Enter));
            strokes.push(Stroke::Text(text.clone()));
            strokes.push(Stroke::Key(Key::Enter));
        }
    }
    strokes
}

/// Keys for the whole modal, one Tab between consecutive tabs.
pub fn plan(decisions: &[Decision], question: &Question, chat_offset: usize) -> Vec<Stroke> {
    let mut strokes = Vec::new();
    for (index, (decision, sub)) in decisions.iter().zip(&question.questions).enumerate() {
        if index > 0 {
            strokes.push(Stroke::Key(Key::Tab));
        }
        strokes.extend(strokes_for(decision, sub.options.len(), chat_offset));
    }
    strokes
}

/// Parse the operator's JSON decision array.
pub fn parse_decisions(json: &str) -> Result<Vec<Decision>, DriveError> {
    let decisions: Vec<Decision> = serde_json::from_str(json).map_err(|e| {
        let valid: Vec<&str> = ActionKind::ALL.iter().map(|k| k.as_str()).collect();
        DriveError::argument(format!(
            "failed to parse decisions array: {e} (valid actions: {})",
            valid.join(", ")
        ))
    })?;
    if decisions.is_empty() {
        return Err(DriveError::argument("decisions must be a non-empty array"));
    }
    Ok(decisions)
}

/// Check the decisions fit the saved question before anything is sent.
pub fn validate(decisions: &[Decision], question: &Question) -> Result<(), DriveError> {
    if decisions.len() != question.questions.len() {
        return Err(DriveError::argument(format!(
            "decisions array length ({}) does not match questions array length ({}); one decision per question is required",
            decisions.len(),
            question.questions.len()
        )));
    }
    for (index, (decision, sub)) in decisions.iter().zip(&question.questions).enumerate() {
        let count = sub.options.len();
        match decision {
            Decision::Select { option_index } if *option_index >= count => {
                return Err(DriveError::argument(format!(
                    "decision {index}: optionIndex {option_index} out of range for {count} options"
                )));
            }
            Decision::MultiSelect { selected_indices } => {
                if selected_indices.is_empty() {
                    return Err(DriveError::argument(format!(
                        "decision {index}: multi-select requires at least one selected index"
                    )));
                }
                if let Some(bad) = selected_indices.iter().find(|i| **i >= count) {
                    return Err(DriveError::argument(format!(
                        "decision {index}: selected index {bad} out of range for {count} options"
                    )));
                }
            }
            Decision::Type { text } | Decision::Chat { text } if text.trim().is_empty() => {
                return Err(DriveError::argument(format!(
                    "decision {index}: {} requires non-empty text",
                    decision.kind().as_str()
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

/// The durable record of what is about to be typed.
pub fn pending_answer(decisions: &[Decision], question: &Question) -> PendingAnswer {
    let answers: BTreeMap<usize, AnswerValue> = decisions
        .iter()
        .enumerate()
        .map(|(index, d)| (index, d.intended_value()))
        .collect();
    let action = match decisions {
        [only] => PendingAction::Single(only.kind()),
        _ => PendingAction::PerQuestion(decisions.iter().map(Decision::kind).collect()),
    };
    PendingAnswer {
        tool_use_id: question.tool_use_id.clone(),
        saved_at: Utc::now(),
        session: question.session.clone(),
        answers,
        action,
    }
}

pub struct QuestionNavigator<'a, P> {
    pane: P,
    store: &'a QuestionStore,
    config: NavigatorConfig,
    journal: &'a Journal,
}

impl<'a, P: Pane> QuestionNavigator<'a, P> {
    pub fn new(
        pane: P,
        store: &'a QuestionStore,
        config: &NavigatorConfig,
        journal: &'a Journal,
    ) -> Self {
        Self {
            pane,
            store,
            config: config.clone(),
            journal,
        }
    }

    /// Validate, persist intent, wait for the modal to draw, then type.
    /// Returns the number of strokes sent.
    pub fn dispatch(&self, session: &str, decisions: &[Decision]) -> Result<usize> {
        self.dispatch_with_sleeper(session, decisions, std::thread::sleep)
    }

    pub fn dispatch_with_sleeper(
        &self,
        session: &str,
        decisions: &[Decision],
        sleep: impl FnOnce(Duration),
    ) -> Result<usize> {
        let Some(question) = self.store.load_question(session)? else {
            return Err(DriveError::argument(format!(
                "no question saved for session \"{session}\"; the question hook may not have run"
            ))
            .into());
        };
        validate(decisions, &question)?;

        let pending = pending_answer(decisions, &question);
        self.store.save_pending(&pending)?;
        self.journal.record(LogEvent::AnswerIntentSaved {
            tool_use_id: pending.tool_use_id.clone(),
            actions: pending.action.labels(),
        });

        // The modal's pre-render pane looks the same as "about to render",
        // so this is a fixed wait rather than a poll.
        sleep(self.config.pre_keystroke_delay());

        let strokes = plan(decisions, &question, self.config.chat_offset);
        for stroke in &strokes {
            match stroke {
                Stroke::Key(key) => self.pane.send_key(*key)?,
                Stroke::Text(text) => self.pane.send_literal(text)?,
            }
        }

        info!(
            session = %session,
            questions = decisions.len(),
            strokes = strokes.len(),
            "question navigation complete"
        );
        self.journal
            .record(LogEvent::KeystrokesSent { keys: strokes.len() });
        Ok(strokes.len())
    }
}
