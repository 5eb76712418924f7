//! The modal question tool: save it, hand it to the agent, and check the
//! answer the host recorded against what the navigator meant to send.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::{HookContext, ToolCall};
use crate::gateway::Gateway;
use crate::log::LogEvent;
use crate::queue::scheduler::CommandInjector;
use crate::question::reconcile::{Reconciliation, reconcile};
use crate::question::report::{format_questions_for_agent, mismatch_message};
use crate::question::Question;

pub(super) const TOOL_NAME: &str = "AskUserQuestion";

pub(super) fn on_requested<G: Gateway, I: CommandInjector>(
    ctx: &HookContext<'_, G, I>,
    call: &ToolCall,
) -> Result<()> {
    let Some(questions) = call.questions() else {
        warn!(session = %ctx.session, tool_use_id = %call.tool_use_id, "question payload without questions");
        return Ok(());
    };

    let question = Question {
        tool_use_id: call.tool_use_id.clone(),
        saved_at: Utc::now(),
        session: ctx.session.to_string(),
        questions,
    };
    ctx.questions().save_question(&question)?;
    ctx.journal.record(LogEvent::QuestionSaved {
        tool_use_id: question.tool_use_id.clone(),
        questions: question.questions.len(),
    });

    // The host renders the modal only after this process exits.
    let message = format_questions_for_agent(&question.questions, ctx.session);
    ctx.notifier().notify_detached("pre-tool-use", &message)?;
    info!(
        session = %ctx.session,
        tool_use_id = %question.tool_use_id,
        questions = question.questions.len(),
        "question handed to agent"
    );
    Ok(())
}

pub(super) fn on_completed<G: Gateway, I: CommandInjector>(
    ctx: &HookContext<'_, G, I>,
    call: &ToolCall,
) -> Result<()> {
    let store = ctx.questions();
    let Some(pending) = store.load_pending(ctx.session)? else {
        warn!(session = %ctx.session, tool_use_id = %call.tool_use_id, "no pending answer; skipping verification");
        store.delete_question(ctx.session)?;
        return Ok(());
    };
    let Some(recorded) = call.recorded_answers() else {
        warn!(session = %ctx.session, tool_use_id = %call.tool_use_id, "tool_response has no answers");
        store.clear(ctx.session)?;
        return Ok(());
    };
    if !call.tool_use_id.is_empty() && call.tool_use_id != pending.tool_use_id {
        warn!(
            session = %ctx.session,
            pending = %pending.tool_use_id,
            payload = %call.tool_use_id,
            "tool_use_id differs from pending answer; comparing anyway"
        );
    }

    let questions = match call.questions() {
        Some(questions) => Some(questions),
        None => store.load_question(ctx.session)?.map(|q| q.questions),
    };

    match reconcile(&pending, recorded, questions.as_deref().unwrap_or_default()) {
        Reconciliation::Matched => {
            info!(session = %ctx.session, tool_use_id = %pending.tool_use_id, "answer verified");
            ctx.journal.record(LogEvent::AnswerVerified {
                tool_use_id: pending.tool_use_id.clone(),
            });
            store.clear(ctx.session)
        }
        Reconciliation::Mismatched { reason } => {
            warn!(session = %ctx.session, tool_use_id = %pending.tool_use_id, reason = %reason, "answer mismatch");
            ctx.journal.record(LogEvent::AnswerMismatch {
                tool_use_id: pending.tool_use_id.clone(),
                reason: reason.clone(),
            });
            let message =
                mismatch_message(ctx.session, &pending, recorded, &reason, questions.as_deref());
            let delivered = ctx.notifier().notify("post-tool-use", &message);
            store.clear(ctx.session)?;
            delivered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::FakeGateway;
    use crate::hooks::tests::Harness;
    use crate::hooks::{HookEvent, dispatch};
    use crate::question::tests::{question, sub_question};
    use crate::question::{ActionKind, AnswerValue, PendingAction, PendingAnswer, QuestionStore};
    use crate::queue::scheduler::tests::RecordingInjector;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    fn question_input() -> Value {
        json!({"questions": [{
            "question": "Which pattern?",
            "header": "Pattern",
            "multiSelect": false,
            "options": [
                {"label": "Use pattern A", "description": "simple"},
                {"label": "Use pattern B", "description": "flexible"}
            ]
        }]})
    }

    fn call(input: Value, response: Value) -> ToolCall {
        ToolCall {
            name: TOOL_NAME.to_string(),
            tool_use_id: "toolu_01".to_string(),
            input,
            response,
        }
    }

    fn save_intent(store: &QuestionStore, option: usize) {
        store
            .save_question(&question(
                "w1",
                vec![sub_question(
                    "Which pattern?",
                    &["Use pattern A", "Use pattern B"],
                    false,
                )],
            ))
            .unwrap();
        store
            .save_pending(&PendingAnswer {
                tool_use_id: "toolu_01".into(),
                saved_at: Utc::now(),
                session: "w1".into(),
                answers: BTreeMap::from([(0, AnswerValue::Index(option))]),
                action: PendingAction::Single(ActionKind::Select),
            })
            .unwrap();
    }

    #[test]
    fn question_is_saved_and_sent_detached() {
        let h = Harness::new();
        let gateway = FakeGateway::default();
        let injector = RecordingInjector::default();
        dispatch(
            &h.context(&gateway, &injector),
            HookEvent::ToolRequested(call(question_input(), Value::Null)),
        )
        .unwrap();

        let saved = QuestionStore::new(h.layout.clone())
            .load_question("w1")
            .unwrap()
            .unwrap();
        assert_eq!(saved.tool_use_id, "toolu_01");
        assert_eq!(saved.questions[0].options.len(), 2);

        assert!(gateway.delivered.borrow().is_empty());
        let detached = gateway.detached.borrow();
        assert_eq!(detached.len(), 1);
        assert!(detached[0].contains("### Question 1: Pattern (single-select)"));
        assert!(detached[0].contains("hookdrive answer --session w1"));
    }

    #[test]
    fn matching_answer_clears_both_files() {
        let h = Harness::new();
        let store = QuestionStore::new(h.layout.clone());
        save_intent(&store, 1);
        let gateway = FakeGateway::default();
        let injector = RecordingInjector::default();
        dispatch(
            &h.context(&gateway, &injector),
            HookEvent::ToolCompleted(call(
                question_input(),
                json!({"answers": {"Which pattern?": "Use pattern B"}}),
            )),
        )
        .unwrap();

        assert!(store.load_pending("w1").unwrap().is_none());
        assert!(store.load_question("w1").unwrap().is_none());
        assert!(gateway.delivered.borrow().is_empty());
        assert!(h.journal_text().contains("answer_verified"));
    }

    #[test]
    fn mismatch_notifies_agent_then_clears() {
        let h = Harness::new();
        let store = QuestionStore::new(h.layout.clone());
        save_intent(&store, 1);
        let gateway = FakeGateway::default();
        let injector = RecordingInjector::default();
        dispatch(
            &h.context(&gateway, &injector),
            HookEvent::ToolCompleted(call(
                Value::Null,
                json!({"answers": {"0": "Use pattern A"}}),
            )),
        )
        .unwrap();

        let delivered = gateway.delivered.borrow();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].contains("MISMATCH"));
        assert!(delivered[0].contains(
            "**Reason:** Question 0: intended \"Use pattern B\" but received \"Use pattern A\""
        ));
        // Falls back to the saved question for context.
        assert!(delivered[0].contains("Which pattern?"));
        assert!(store.load_pending("w1").unwrap().is_none());
        assert!(h.journal_text().contains("answer_mismatch"));
    }

    #[test]
    fn missing_pending_answer_drops_question() {
        let h = Harness::new();
        let store = QuestionStore::new(h.layout.clone());
        store
            .save_question(&question("w1", vec![sub_question("Q", &["A"], false)]))
            .unwrap();
        let gateway = FakeGateway::default();
        let injector = RecordingInjector::default();
        dispatch(
            &h.context(&gateway, &injector),
            HookEvent::ToolCompleted(call(question_input(), json!({"answers": {"0": "A"}}))),
        )
        .unwrap();
        assert!(store.load_question("w1").unwrap().is_none());
        assert!(gateway.delivered.borrow().is_empty());
    }

    #[test]
    fn response_without_answers_drops_both() {
        let h = Harness::new();
        let store = QuestionStore::new(h.layout.clone());
        save_intent(&store, 0);
        let gateway = FakeGateway::default();
        let injector = RecordingInjector::default();
        dispatch(
            &h.context(&gateway, &injector),
            HookEvent::ToolCompleted(call(question_input(), json!({"error": "dismissed"}))),
        )
        .unwrap();
        assert!(store.load_pending("w1").unwrap().is_none());
        assert!(store.load_question("w1").unwrap().is_none());
        assert!(gateway.delivered.borrow().is_empty());
    }
}
