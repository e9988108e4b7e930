//! The agent's tool surface.
//!
//! Four capabilities, described once in [`TOOL_SCHEMA`] for the model and
//! mirrored by the closed [`ToolInvocation`] enum for dispatch. The enum
//! makes an unknown capability unrepresentable past the parse boundary;
//! names the model invents surface as an error payload fed back into the
//! conversation, never as a crash.

use std::sync::LazyLock;

use serde_json::{Value, json};

use crate::context::SearchContext;
use crate::pipeline;

/// Characters of chunk text included per search hit shown to the model.
const SEARCH_PREVIEW_CAP: usize = 200;
/// Default number of hits for `search_tabs`.
const DEFAULT_TOP_K: usize = 5;

/// Static tool schema advertised to the model, in OpenAI function-calling
/// shape. Immutable for the process lifetime.
pub static TOOL_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!([
        {
            "type": "function",
            "function": {
                "name": "search_tabs",
                "description": "Semantic search over the user's archived browser tabs. \
                    Takes a natural-language query and returns the most relevant tabs \
                    with similarity scores and content previews. Use when the user is \
                    looking for tabs about a topic or keyword.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Natural-language search query, e.g. 'redis distributed locks'"
                        },
                        "top_k": {
                            "type": "integer",
                            "description": "Number of results to return, default 5",
                            "default": 5
                        }
                    },
                    "required": ["query"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "read_tab",
                "description": "Read the full text of one archived tab. Obtain the URL \
                    from search_tabs or list_tabs first. Use only when the task needs \
                    the article's actual content, such as summarizing or comparing.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "url": {
                            "type": "string",
                            "description": "URL of the tab to read"
                        }
                    },
                    "required": ["url"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "list_tabs",
                "description": "List basic information (title, URL) for every archived \
                    tab. No text content; use for overviews and counting.",
                "parameters": {
                    "type": "object",
                    "properties": {}
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "batch_restore",
                "description": "Restore a set of archived tabs by reopening them in the \
                    user's browser. This is an ACTION tool with a real effect; search or \
                    confirm the targets before restoring, never restore blindly.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "urls": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "URLs of the tabs to restore"
                        },
                        "reason": {
                            "type": "string",
                            "description": "Short reason for restoring these tabs"
                        }
                    },
                    "required": ["urls", "reason"]
                }
            }
        }
    ])
});

/// A validated tool call, one variant per capability.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolInvocation {
    SearchTabs { query: String, top_k: usize },
    ReadTab { url: String },
    ListTabs,
    BatchRestore { urls: Vec<String>, reason: String },
}

/// The model asked for a capability that does not exist.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownTool {
    pub name: String,
}

impl ToolInvocation {
    /// Maps a `(name, arguments)` pair from the model onto a capability.
    ///
    /// Argument fields are read leniently: missing or mistyped fields fall
    /// back to defaults so a sloppy model call still dispatches. Only the
    /// tool name itself can fail resolution.
    pub fn parse(name: &str, arguments: &Value) -> Result<Self, UnknownTool> {
        match name {
            "search_tabs" => Ok(Self::SearchTabs {
                query: str_field(arguments, "query"),
                top_k: arguments
                    .get("top_k")
                    .and_then(Value::as_u64)
                    .map_or(DEFAULT_TOP_K, |k| k as usize),
            }),
            "read_tab" => Ok(Self::ReadTab {
                url: str_field(arguments, "url"),
            }),
            "list_tabs" => Ok(Self::ListTabs),
            "batch_restore" => Ok(Self::BatchRestore {
                urls: arguments
                    .get("urls")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default(),
                reason: str_field(arguments, "reason"),
            }),
            other => Err(UnknownTool {
                name: other.to_string(),
            }),
        }
    }

    /// The capability's wire name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchTabs { .. } => "search_tabs",
            Self::ReadTab { .. } => "read_tab",
            Self::ListTabs => "list_tabs",
            Self::BatchRestore { .. } => "batch_restore",
        }
    }
}

fn str_field(arguments: &Value, key: &str) -> String {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Executes a validated invocation against the context.
///
/// Always returns a JSON payload; failures become `{"error": ...}` objects
/// the model can read and recover from.
pub async fn execute(invocation: ToolInvocation, ctx: &SearchContext) -> Value {
    match invocation {
        ToolInvocation::SearchTabs { query, top_k } => search_tabs(ctx, &query, top_k).await,
        ToolInvocation::ReadTab { url } => read_tab(ctx, &url).await,
        ToolInvocation::ListTabs => list_tabs(ctx).await,
        ToolInvocation::BatchRestore { urls, reason } => batch_restore(urls, reason),
    }
}

async fn search_tabs(ctx: &SearchContext, query: &str, top_k: usize) -> Value {
    let outcome = match pipeline::retrieve(ctx, query, top_k).await {
        Ok(outcome) => outcome,
        Err(err) => return json!({"error": format!("search failed: {err}")}),
    };

    let results: Vec<Value> = outcome
        .candidates
        .into_iter()
        .take(top_k)
        .map(|hit| {
            let preview = hit
                .text
                .as_deref()
                .map(|text| {
                    let cut: String = text.chars().take(SEARCH_PREVIEW_CAP).collect();
                    format!("{cut}...")
                })
                .unwrap_or_default();
            json!({
                "title": hit.title,
                "url": hit.url,
                "score": hit.score,
                "text_preview": preview,
            })
        })
        .collect();

    if results.is_empty() {
        json!({"found": 0, "message": "no matching tabs", "results": []})
    } else {
        json!({"found": results.len(), "results": results})
    }
}

async fn read_tab(ctx: &SearchContext, url: &str) -> Value {
    match ctx.store.read_page(url).await {
        Ok(Some(page)) => json!({
            "url": page.url,
            "title": page.title,
            "total_chunks": page.total_chunks,
            "content": page.content,
            "truncated": page.truncated,
        }),
        Ok(None) => json!({"error": format!("no indexed content for url: {url}")}),
        Err(err) => json!({"error": format!("read failed: {err}")}),
    }
}

async fn list_tabs(ctx: &SearchContext) -> Value {
    let pages = match ctx.store.list_all().await {
        Ok(pages) => pages,
        Err(err) => return json!({"error": format!("listing failed: {err}")}),
    };

    if pages.is_empty() {
        return json!({"count": 0, "message": "no archived tabs yet", "tabs": []});
    }

    let tabs: Vec<Value> = pages
        .into_iter()
        .map(|page| {
            json!({
                "title": page.title,
                "url": page.url,
                "chunks": page.chunks,
            })
        })
        .collect();
    json!({"count": tabs.len(), "tabs": tabs})
}

/// Restoration is echoed back as a pending action; the browser-side executor
/// does the actual reopening.
fn batch_restore(urls: Vec<String>, reason: String) -> Value {
    if urls.is_empty() {
        return json!({"error": "no urls to restore"});
    }
    json!({
        "action": "batch_restore",
        "urls": urls,
        "count": urls.len(),
        "reason": reason,
    })
}

/// Client-facing digest of a tool result. The stream shows what happened,
/// not the entire payload the model received.
#[must_use]
pub fn summarize(result: &Value) -> Value {
    if let Some(error) = result.get("error") {
        return json!({"status": "error", "message": error});
    }
    if let Some(found) = result.get("found") {
        let titles: Vec<Value> = result
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .take(5)
                    .filter_map(|r| r.get("title").cloned())
                    .collect()
            })
            .unwrap_or_default();
        return json!({"status": "success", "found": found, "titles": titles});
    }
    if result.get("count").is_some() && result.get("tabs").is_some() {
        return json!({"status": "success", "count": result["count"]});
    }
    if let Some(content) = result.get("content").and_then(Value::as_str) {
        return json!({
            "status": "success",
            "title": result.get("title").cloned().unwrap_or_default(),
            "length": content.chars().count(),
        });
    }
    if let Some(action) = result.get("action") {
        return json!({
            "status": "action",
            "action": action,
            "count": result.get("count").cloned().unwrap_or(json!(0)),
        });
    }
    json!({"status": "success"})
}
