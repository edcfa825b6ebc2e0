//! End-to-end reconciler scenarios driven by wire-format events.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use oqto_stream::content::ContentBlock;
use oqto_stream::{Role, SessionRuntime};
use serde_json::json;

mod common;
use common::*;

#[test]
fn test_streamed_text_settles_into_one_message() {
    let mut rec = local_reconciler();

    rec.handle("s1", agent_start());
    rec.handle("s1", text_start(0));
    rec.handle("s1", text_delta(0, "Hi"));
    rec.handle("s1", text_delta(0, " there"));
    rec.handle("s1", agent_end());

    let session = rec.session("s1").unwrap();
    assert_eq!(session.messages().len(), 1);
    let message = &session.messages()[0];
    assert_eq!(message.role, Role::Assistant);
    assert_eq!(message.content, vec![ContentBlock::text("Hi there")]);
    assert!(!message.streaming);
    assert!(session.streaming_message_id().is_none());
    assert!(!session.is_loading());
    assert!(!rec.has_scheduled_frames());
}

#[test]
fn test_deltas_concatenate_across_frames() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());

    let fragments = ["The ", "quick ", "brown ", "fox ", "jumps"];
    for (i, fragment) in fragments.iter().enumerate() {
        rec.handle("s1", text_delta(0, fragment));
        if i % 2 == 0 {
            rec.on_frame();
        }
    }
    rec.flush_all();

    assert_eq!(
        last_content(&rec, "s1"),
        vec![ContentBlock::text("The quick brown fox jumps")]
    );
}

#[test]
fn test_one_commit_per_frame() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    for _ in 0..50 {
        rec.handle("s1", text_delta(0, "x"));
    }
    assert_eq!(rec.pending_deltas("s1"), 50);

    assert_eq!(rec.on_frame(), 1);
    assert_eq!(rec.on_frame(), 0);
    assert_eq!(rec.session("s1").unwrap().commit_count(), 1);
    assert_eq!(last_content(&rec, "s1"), vec![ContentBlock::text("x".repeat(50))]);
}

#[test]
fn test_text_end_replaces_instead_of_appending() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle("s1", text_delta(0, "Hel"));
    rec.handle("s1", text_end(0, "Hello"));

    assert_eq!(last_content(&rec, "s1"), vec![ContentBlock::text("Hello")]);
}

#[test]
fn test_thinking_and_text_blocks_stay_separate() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle("s1", thinking_delta(0, "let me "));
    rec.handle("s1", thinking_delta(0, "think"));
    rec.handle("s1", text_delta(1, "Answer"));
    rec.on_frame();

    assert_eq!(
        last_content(&rec, "s1"),
        vec![
            ContentBlock::thinking("let me think"),
            ContentBlock::text("Answer"),
        ]
    );
}

#[test]
fn test_message_end_content_wins_over_stragglers() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle("s1", text_delta(0, "draft"));
    rec.handle("s1", assistant_end(json!("final answer")));

    // The cancelled frame must not fire later.
    assert_eq!(rec.on_frame(), 0);
    assert_eq!(last_content(&rec, "s1"), vec![ContentBlock::text("final answer")]);
    assert_eq!(rec.session("s1").unwrap().commit_count(), 1);
}

#[test]
fn test_closing_one_session_leaves_other_untouched() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle("s2", agent_start());
    rec.handle("s1", text_delta(0, "alpha"));
    rec.handle("s2", text_delta(0, "beta"));

    let closed = rec.close_session("s2").unwrap();
    let revision = closed.revision();

    // In-flight events for the closed session.
    rec.handle("s2", text_delta(0, " more"));
    rec.handle("s2", agent_end());
    rec.handle("s2", agent_start());
    rec.on_frame();

    assert!(rec.session("s2").is_none());
    assert_eq!(closed.revision(), revision);
    assert_eq!(closed.commit_count(), 0);
    assert_eq!(rec.session_ids(), vec!["s1".to_string()]);
    assert_eq!(last_content(&rec, "s1"), vec![ContentBlock::text("alpha")]);
    assert_eq!(rec.session("s1").unwrap().commit_count(), 1);
}

#[test]
fn test_reopened_session_accepts_events() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.close_session("s1");
    rec.handle("s1", agent_start());
    assert!(rec.session("s1").is_none());

    rec.open_session("s1");
    rec.handle("s1", text_delta(0, "back"));
    rec.flush_all();
    assert_eq!(last_content(&rec, "s1"), vec![ContentBlock::text("back")]);
}

#[test]
fn test_non_assistant_message_end_finalizes_streaming_message() {
    for role in ["user", "toolResult"] {
        let mut rec = local_reconciler();
        rec.handle("s1", agent_start());
        rec.handle("s1", text_delta(0, "working"));
        assert!(rec.session("s1").unwrap().streaming_message_id().is_some());

        rec.handle(
            "s1",
            event(json!({
                "type": "message_end",
                "message": {"role": role, "content": "done", "toolCallId": "c9"}
            })),
        );

        let session = rec.session("s1").unwrap();
        assert!(session.streaming_message_id().is_none(), "role {role}");
        assert!(session.messages().iter().all(|m| !m.streaming), "role {role}");
        assert_eq!(last_content(&rec, "s1"), vec![ContentBlock::text("working")]);
        assert!(!rec.has_scheduled_frames());
    }
}

#[test]
fn test_tool_result_before_block_is_attached_later() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle(
        "s1",
        tool_execution_end("call_1", json!([{"type": "text", "text": "fn main() {}"}]), false),
    );
    assert_eq!(rec.parked_results("s1"), 1);

    rec.handle("s1", toolcall_end(0, "call_1", "read"));

    let content = last_content(&rec, "s1");
    let call = content[0].as_tool_call().unwrap();
    assert_eq!(call.name, "read");
    assert_eq!(call.result.as_deref(), Some("fn main() {}"));
    assert_eq!(call.is_error, Some(false));
    assert_eq!(rec.parked_results("s1"), 0);
}

#[test]
fn test_tool_result_before_message_end_is_attached() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle("s1", tool_execution_end("call_2", json!("boom"), true));
    rec.handle(
        "s1",
        assistant_end(json!([
            {"type": "text", "text": "Running it"},
            {"type": "toolCall", "id": "call_2", "name": "bash", "arguments": {}}
        ])),
    );

    let content = last_content(&rec, "s1");
    let call = content[1].as_tool_call().unwrap();
    assert_eq!(call.result.as_deref(), Some("boom"));
    assert_eq!(call.is_error, Some(true));
}

#[test]
fn test_later_tool_result_overwrites_earlier() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle("s1", toolcall_end(0, "call_3", "bash"));
    rec.handle("s1", tool_execution_end("call_3", json!("first"), true));
    rec.handle("s1", tool_execution_end("call_3", json!("second"), false));

    let content = last_content(&rec, "s1");
    let call = content[0].as_tool_call().unwrap();
    assert_eq!(call.result.as_deref(), Some("second"));
    assert_eq!(call.is_error, Some(false));
}

#[test]
fn test_multi_turn_conversation() {
    let mut rec = local_reconciler();
    rec.handle("s1", agent_start());
    rec.handle(
        "s1",
        event(json!({"type": "message_start", "message": {"role": "user", "content": "list files"}})),
    );
    rec.handle("s1", event(json!({"type": "turn_start"})));
    rec.handle("s1", toolcall_end(0, "c1", "ls"));
    rec.handle(
        "s1",
        assistant_end(json!([{"type": "toolCall", "id": "c1", "name": "ls", "arguments": {}}])),
    );
    rec.handle("s1", tool_execution_end("c1", json!({"content": [{"type": "text", "text": "a\nb"}]}), false));
    rec.handle("s1", event(json!({"type": "turn_end"})));
    rec.handle("s1", event(json!({"type": "turn_start"})));
    rec.handle("s1", text_delta(0, "Two files."));
    rec.handle("s1", assistant_end(json!([{"type": "text", "text": "Two files."}])));
    rec.handle("s1", event(json!({"type": "turn_end"})));
    rec.handle("s1", agent_end());

    let session = rec.session("s1").unwrap();
    let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Assistant]);
    assert!(session.messages().iter().all(|m| !m.streaming));

    let call = session.messages()[1].content[0].as_tool_call().unwrap();
    assert_eq!(call.result.as_deref(), Some("a\nb"));
    assert_eq!(
        session.messages()[2].content,
        vec![ContentBlock::text("Two files.")]
    );
}

#[tokio::test]
async fn test_failing_refresh_is_not_fatal() {
    let source = Arc::new(FailingStateSource::default());
    let mut rec = reconciler_with(source.clone());

    rec.handle("s1", agent_start());
    rec.handle("s1", text_delta(0, "done"));
    rec.handle("s1", agent_end());

    let refreshes = rec.take_refreshes();
    assert_eq!(refreshes.len(), 1);
    for refresh in refreshes {
        let outcome = refresh.future.await;
        assert!(outcome.is_err());
        rec.apply_refresh(&refresh.session_id, outcome);
    }

    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    assert_eq!(last_content(&rec, "s1"), vec![ContentBlock::text("done")]);

    // Still usable afterwards.
    rec.handle("s1", agent_start());
    assert!(rec.session("s1").unwrap().is_loading());
}

#[tokio::test]
async fn test_refresh_applies_snapshot() {
    let mut rec = reconciler_with(Arc::new(FixedStateSource("sonnet")));
    rec.handle("s1", agent_start());
    rec.handle("s1", agent_end());

    for refresh in rec.take_refreshes() {
        let outcome = refresh.future.await;
        rec.apply_refresh(&refresh.session_id, outcome);
    }
    assert_eq!(
        rec.session("s1").unwrap().agent().model.as_deref(),
        Some("sonnet")
    );
}
