//! The reasoning loop.
//!
//! A bounded ReAct loop: the model sees the conversation plus the static
//! tool schema, either requests tool calls (which are executed and fed back)
//! or produces the final answer. Every step is narrated through an
//! [`AgentEvent`] stream.
//!
//! The stream is a single-producer, single-consumer channel. The loop runs
//! in its own task and suspends on network calls; the consumer reads events
//! as they arrive. Dropping the consumer closes the channel: an in-flight
//! completion call is aborted, the next emit fails, and the loop returns,
//! releasing its HTTP and index handles. No work outlives an abandoned
//! stream.

pub mod events;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::context::SearchContext;
use crate::llm::CallOptions;
use crate::message::ChatMessage;

pub use events::AgentEvent;
pub use tools::{TOOL_SCHEMA, ToolInvocation};

const AGENT_SYSTEM_PROMPT: &str = "\
You are an action-oriented assistant for the user's archived browser tabs. \
You do not just search for information; your defining capability is taking \
action, reopening archived tabs in the user's browser.

Your tools:
1. search_tabs(query, top_k) - semantic search returning titles, URLs, \
similarity scores, and content previews
2. read_tab(url) - read one tab's full text (only when the content itself \
is needed)
3. list_tabs() - list every archived tab
4. batch_restore(urls, reason) - THE core capability: reopen a set of tabs \
in the user's browser

Behavioral rules, always observed:
1. You are an acting agent, not a search engine. When the user says \
'find X', 'show me X', or 'open X', search first and then call \
batch_restore on the relevant results instead of merely listing links.
2. Search results already include previews. Do not read_tab each hit; read \
at most 2-3 tabs, and only when the user explicitly wants content \
summarized or compared.
3. Answer concisely. Say what was found and which pages were restored; no \
long reports.
4. Answer in the user's language and cite page titles.

Typical flows:
- 'find my Golang articles' -> search_tabs(\"Golang\") -> \
batch_restore(matching urls) -> short confirmation
- 'what did that Redis article say' -> search_tabs(\"Redis\") -> \
read_tab(best url) -> summary
- 'list everything I saved' -> list_tabs() -> show the list";

const TRUNCATION_APOLOGY: &str = "Sorry, I reasoned through multiple steps \
but could not reach a final conclusion. Please try a more specific question.";

/// Step budget and per-call tuning for the loop.
#[derive(Clone, Copy, Debug)]
pub struct AgentConfig {
    /// Upper bound on reasoning steps before the loop gives up.
    pub max_steps: usize,
    /// Wall-clock timeout per completion call; a hard failure, not retried.
    pub llm_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 15,
            llm_timeout: Duration::from_secs(60),
            temperature: 0.3,
            max_tokens: 2048,
        }
    }
}

/// Handle to one query's event sequence.
///
/// Dropping this cancels the underlying loop: the producer observes the
/// closed channel, aborts any in-flight completion call, and winds down.
pub struct AgentStream {
    receiver: mpsc::UnboundedReceiver<AgentEvent>,
}

impl AgentStream {
    /// Receives the next event, or `None` once the loop has terminated.
    pub async fn next_event(&mut self) -> Option<AgentEvent> {
        self.receiver.recv().await
    }

    /// Adapts the stream for `futures`-style consumers.
    pub fn into_stream(self) -> impl futures_util::Stream<Item = AgentEvent> {
        futures_util::stream::unfold(self.receiver, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })
    }

    /// Drains every event until the loop terminates. Test helper, mostly.
    pub async fn collect(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.receiver.recv().await {
            events.push(event);
        }
        events
    }
}

/// Entry point for reasoning queries.
pub struct Agent {
    ctx: Arc<SearchContext>,
}

impl Agent {
    #[must_use]
    pub fn new(ctx: Arc<SearchContext>) -> Self {
        Self { ctx }
    }

    /// Starts the loop for `query` and returns its event stream.
    ///
    /// The loop runs in a spawned task; events arrive as reasoning
    /// progresses. Exactly one terminal event (`answer` or `error`) ends
    /// the sequence.
    pub fn run(&self, query: impl Into<String>) -> AgentStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::clone(&self.ctx);
        let query = query.into();
        let query_id = Uuid::new_v4();

        tokio::spawn(async move {
            tracing::debug!(query_id = %query_id, "agent query started");
            run_loop(&ctx, &query, &tx).await;
            tracing::debug!(query_id = %query_id, "agent query finished");
        });

        AgentStream { receiver: rx }
    }
}

/// Sends one event; a closed channel means the consumer is gone and the
/// loop should stop.
fn emit(tx: &mpsc::UnboundedSender<AgentEvent>, event: AgentEvent) -> bool {
    if tx.send(event).is_err() {
        tracing::debug!("event consumer dropped, cancelling agent loop");
        return false;
    }
    true
}

async fn run_loop(ctx: &SearchContext, query: &str, tx: &mpsc::UnboundedSender<AgentEvent>) {
    if !ctx.llm.is_configured() {
        emit(
            tx,
            AgentEvent::Error {
                message: "The completion provider is not configured; set the API details \
                          before using the agent."
                    .to_string(),
            },
        );
        return;
    }

    let config = ctx.agent;
    let options = CallOptions {
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        timeout: config.llm_timeout,
    };

    let mut messages = vec![
        ChatMessage::system(AGENT_SYSTEM_PROMPT),
        ChatMessage::user(query),
    ];
    let mut pending_restores: Vec<String> = Vec::new();

    for step in 1..=config.max_steps {
        let thinking = AgentEvent::Thinking {
            step,
            message: format!("Thinking (step {step}/{})...", config.max_steps),
        };
        if !emit(tx, thinking) {
            return;
        }

        // A dropped consumer aborts the in-flight completion call too.
        let call_result = tokio::select! {
            _ = tx.closed() => {
                tracing::debug!("event consumer dropped, aborting in-flight completion call");
                return;
            }
            result = ctx.llm.chat(&messages, Some(&*TOOL_SCHEMA), options) => result,
        };
        let response = match call_result {
            Ok(response) => response,
            Err(err) => {
                emit(
                    tx,
                    AgentEvent::Error {
                        message: format!("completion call failed: {err}"),
                    },
                );
                return;
            }
        };
        let message = match response.into_message() {
            Ok(message) => message,
            Err(err) => {
                emit(
                    tx,
                    AgentEvent::Error {
                        message: err.to_string(),
                    },
                );
                return;
            }
        };

        if message.has_tool_calls() {
            let calls = message.tool_calls.clone().unwrap_or_default();
            messages.push(message);

            for call in calls {
                let arguments: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));

                let tool_name = call.function.name.clone();
                let announced = AgentEvent::ToolCall {
                    step,
                    tool: tool_name.clone(),
                    arguments: arguments.clone(),
                };
                if !emit(tx, announced) {
                    return;
                }

                tracing::debug!(step, tool = %tool_name, "dispatching tool call");
                let result = match ToolInvocation::parse(&tool_name, &arguments) {
                    Ok(invocation) => tools::execute(invocation, ctx).await,
                    Err(unknown) => json!({"error": format!("unknown tool: {}", unknown.name)}),
                };

                if result.get("action").and_then(Value::as_str) == Some("batch_restore")
                    && let Some(urls) = result.get("urls").and_then(Value::as_array)
                {
                    pending_restores.extend(
                        urls.iter().filter_map(Value::as_str).map(str::to_string),
                    );
                }

                let reported = AgentEvent::ToolResult {
                    step,
                    tool: tool_name,
                    result: tools::summarize(&result),
                };
                if !emit(tx, reported) {
                    return;
                }

                messages.push(ChatMessage::tool_result(call.id, result.to_string()));
            }
        } else {
            let answer = message.content.unwrap_or_default();

            if !pending_restores.is_empty() {
                let urls = dedup_preserving_order(pending_restores);
                let action = AgentEvent::Action {
                    action: "batch_restore".to_string(),
                    count: urls.len(),
                    urls,
                };
                if !emit(tx, action) {
                    return;
                }
            }

            emit(
                tx,
                AgentEvent::Answer {
                    content: answer,
                    steps_used: step,
                    truncated: false,
                },
            );
            return;
        }
    }

    emit(
        tx,
        AgentEvent::Answer {
            content: TRUNCATION_APOLOGY.to_string(),
            steps_used: config.max_steps,
            truncated: true,
        },
    );
}

fn dedup_preserving_order(urls: Vec<String>) -> Vec<String> {
    let mut seen = rustc_hash::FxHashSet::default();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
