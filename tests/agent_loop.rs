//! Reasoning-loop integration tests against a scripted completion provider.

mod common;

use serde_json::json;

use common::{
    assistant_reply, index_page, provider_config, start_scripted_provider, test_context,
    tool_call_reply,
};
use tabrecall::agent::{Agent, AgentConfig, AgentEvent};
use tabrecall::context::SearchContext;

fn with_provider(base_url: &str) -> std::sync::Arc<SearchContext> {
    test_context(Some(provider_config(base_url)))
}

#[tokio::test]
async fn direct_answer_terminates_on_step_one() {
    let provider =
        start_scripted_provider(vec![assistant_reply("No tools needed.")], false).await;
    let ctx = with_provider(&provider.base_url);

    let events = Agent::new(ctx).run("just say hi").collect().await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], AgentEvent::Thinking { step: 1, .. }));
    match &events[1] {
        AgentEvent::Answer {
            content,
            steps_used,
            truncated,
        } => {
            assert_eq!(content, "No tools needed.");
            assert_eq!(*steps_used, 1);
            assert!(!truncated);
        }
        other => panic!("expected answer, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_restores_collapse_into_one_action() {
    let provider = start_scripted_provider(
        vec![
            tool_call_reply(&[
                (
                    "call_1",
                    "batch_restore",
                    json!({"urls": ["a", "b"], "reason": "first batch"}),
                ),
                (
                    "call_2",
                    "batch_restore",
                    json!({"urls": ["b", "c"], "reason": "second batch"}),
                ),
            ]),
            assistant_reply("Restored your tabs."),
        ],
        false,
    )
    .await;
    let ctx = with_provider(&provider.base_url);

    let events = Agent::new(ctx).run("restore everything relevant").collect().await;

    let action = events
        .iter()
        .find_map(|event| match event {
            AgentEvent::Action { urls, count, action } => Some((urls, count, action)),
            _ => None,
        })
        .expect("expected one action event");
    assert_eq!(action.2, "batch_restore");
    assert_eq!(action.0, &vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    assert_eq!(*action.1, 3);

    let actions = events
        .iter()
        .filter(|event| matches!(event, AgentEvent::Action { .. }))
        .count();
    assert_eq!(actions, 1);

    match events.last().unwrap() {
        AgentEvent::Answer { steps_used, .. } => assert_eq!(*steps_used, 2),
        other => panic!("expected final answer, got {other:?}"),
    }
}

#[tokio::test]
async fn step_budget_exhaustion_yields_truncated_answer() {
    // The provider keeps asking for tools; the loop must give up cleanly.
    let provider = start_scripted_provider(
        vec![tool_call_reply(&[("call_1", "list_tabs", json!({}))])],
        true,
    )
    .await;
    let ctx = std::sync::Arc::new(
        common::build_context(Some(provider_config(&provider.base_url))).with_agent(AgentConfig {
            max_steps: 2,
            ..AgentConfig::default()
        }),
    );

    let events = Agent::new(ctx).run("loop forever").collect().await;

    match events.last().unwrap() {
        AgentEvent::Answer {
            steps_used,
            truncated,
            ..
        } => {
            assert_eq!(*steps_used, 2);
            assert!(truncated);
        }
        other => panic!("expected truncated answer, got {other:?}"),
    }

    let thinking_steps = events
        .iter()
        .filter(|event| matches!(event, AgentEvent::Thinking { .. }))
        .count();
    assert_eq!(thinking_steps, 2);
}

#[tokio::test]
async fn unknown_tool_feeds_error_back_and_loop_recovers() {
    let provider = start_scripted_provider(
        vec![
            tool_call_reply(&[("call_1", "open_teleporter", json!({}))]),
            assistant_reply("That tool does not exist; here is what I found instead."),
        ],
        false,
    )
    .await;
    let ctx = with_provider(&provider.base_url);

    let events = Agent::new(ctx).run("teleport my tabs").collect().await;

    let tool_result = events
        .iter()
        .find_map(|event| match event {
            AgentEvent::ToolResult { result, .. } => Some(result),
            _ => None,
        })
        .expect("expected a tool result event");
    assert_eq!(tool_result["status"], "error");

    assert!(matches!(events.last().unwrap(), AgentEvent::Answer { truncated: false, .. }));
}

#[tokio::test]
async fn malformed_arguments_degrade_to_empty_set() {
    let provider = start_scripted_provider(
        vec![
            json!({
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "list_tabs", "arguments": "{not json"}
                        }]
                    }
                }]
            }),
            assistant_reply("Done."),
        ],
        false,
    )
    .await;
    let ctx = with_provider(&provider.base_url);

    let events = Agent::new(ctx).run("list my tabs").collect().await;

    // The malformed arguments still dispatch; list_tabs needs none anyway.
    let tool_result = events
        .iter()
        .find_map(|event| match event {
            AgentEvent::ToolResult { result, tool, .. } if tool == "list_tabs" => Some(result),
            _ => None,
        })
        .expect("expected list_tabs result");
    assert_eq!(tool_result["status"], "success");
    assert!(matches!(events.last().unwrap(), AgentEvent::Answer { .. }));
}

#[tokio::test]
async fn search_and_read_flow_reports_summaries() {
    // The search tool itself expands keywords through the provider, so the
    // script interleaves that call between the two reasoning steps.
    let provider = start_scripted_provider(
        vec![
            tool_call_reply(&[(
                "call_1",
                "search_tabs",
                json!({"query": "redis locks", "top_k": 3}),
            )]),
            assistant_reply("{\"keywords\": [\"redis locks\", \"redlock\"]}"),
            tool_call_reply(&[(
                "call_2",
                "read_tab",
                json!({"url": "https://example.com/redis"}),
            )]),
            assistant_reply("The Redis article covers distributed locks."),
        ],
        false,
    )
    .await;
    let ctx = with_provider(&provider.base_url);
    index_page(
        &ctx,
        "https://example.com/redis",
        "Redis locks",
        "redis locks deep dive with plenty of detail about redlock",
    )
    .await;

    let events = Agent::new(ctx).run("what did the redis article say").collect().await;

    let summaries: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            AgentEvent::ToolResult { tool, result, .. } => Some((tool.clone(), result.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].0, "search_tabs");
    assert_eq!(summaries[0].1["status"], "success");
    // The stream shows a digest, never the raw result payload.
    assert!(summaries[0].1.get("results").is_none());
    assert_eq!(summaries[1].0, "read_tab");
    assert!(summaries[1].1["length"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn missing_configuration_fails_fast() {
    let ctx = common::test_context(None);

    let events = Agent::new(ctx).run("anything").collect().await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        AgentEvent::Error { message } => {
            assert!(message.contains("not configured"));
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn transport_failure_terminates_with_error_event() {
    // Nothing listens on this port; the connection is refused.
    let ctx = common::test_context(Some(provider_config("http://127.0.0.1:9")));

    let events = Agent::new(ctx).run("hello").collect().await;

    assert!(matches!(events[0], AgentEvent::Thinking { .. }));
    match events.last().unwrap() {
        AgentEvent::Error { message } => {
            assert!(message.contains("completion call failed"));
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn empty_choices_are_a_terminal_error() {
    let provider = start_scripted_provider(vec![], false).await;
    let ctx = with_provider(&provider.base_url);

    let events = Agent::new(ctx).run("hello").collect().await;

    assert!(matches!(events.last().unwrap(), AgentEvent::Error { .. }));
}
