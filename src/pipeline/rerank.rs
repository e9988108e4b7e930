//! Candidate reranking.
//!
//! Two modes share one entry point. When a completion provider is
//! configured, the model judges each candidate against the query like a
//! cross-encoder and its score is fused with the embedding similarity.
//! Otherwise (or when the provider call fails) a structural heuristic
//! demotes table-of-contents-looking pages and rewards query-term hits.
//! Neither mode can fail the request: the worst case is the first `k`
//! candidates passed through unranked.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Deserialize;

use crate::llm::{CallOptions, LlmClient, extract_json_block};
use crate::message::ChatMessage;
use crate::store::SearchResult;

const RERANK_TIMEOUT: Duration = Duration::from_secs(60);
/// Characters of candidate text shown to the judging model.
const PREVIEW_CAP: usize = 500;
/// Score applied when the model forgot to grade a document.
const DEFAULT_JUDGE_SCORE: f64 = 50.0;

const RERANK_SYSTEM_PROMPT: &str = "\
You are a search-result reranking expert. The user gives you a search query \
and several candidate documents.

Your task:
1. Judge how relevant each document is to the query.
2. Weigh whether the document actually answers or solves the user's \
question, not whether it merely mentions the keywords.
3. Tables of contents, navigation pages, and link lists should be demoted: \
they name topics without developing them.
4. Grade each document from 0 to 100; higher means more relevant.

Answer strictly as JSON:
{\"scores\": [{\"index\": 0, \"score\": 85, \"reason\": \"short reason\"}, ...]}";

/// Weights fusing embedding similarity with the judge's grade.
///
/// Both are tuning knobs, not invariants; the defaults favor the judge.
#[derive(Clone, Copy, Debug)]
pub struct RerankWeights {
    pub embedding: f64,
    pub judge: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            embedding: 0.3,
            judge: 0.7,
        }
    }
}

#[derive(Deserialize)]
struct JudgeReply {
    #[serde(default)]
    scores: Vec<JudgeScore>,
}

#[derive(Deserialize)]
struct JudgeScore {
    index: usize,
    score: f64,
}

/// Reranks `candidates` for `query`, returning at most `k` results ordered
/// by final score descending.
pub async fn rerank(
    llm: &LlmClient,
    weights: &RerankWeights,
    query: &str,
    candidates: Vec<SearchResult>,
    k: usize,
) -> Vec<SearchResult> {
    if candidates.is_empty() {
        return Vec::new();
    }

    if llm.is_configured() {
        rerank_with_judge(llm, weights, query, candidates, k).await
    } else {
        rerank_by_heuristics(query, candidates, k)
    }
}

/// Model-judged rerank. Any transport or parse failure falls back to the
/// first `k` input candidates in their incoming order.
async fn rerank_with_judge(
    llm: &LlmClient,
    weights: &RerankWeights,
    query: &str,
    mut candidates: Vec<SearchResult>,
    k: usize,
) -> Vec<SearchResult> {
    let mut descriptions = Vec::with_capacity(candidates.len());
    for (i, doc) in candidates.iter().enumerate() {
        let preview: String = doc
            .text
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(PREVIEW_CAP)
            .collect();
        descriptions.push(format!(
            "[Document {i}]\nTitle: {}\nPreview: {preview}",
            doc.title
        ));
    }
    let user_message = format!(
        "Search query: {query}\n\nCandidate documents:\n{}\n\nGrade the relevance of all {} documents above.",
        descriptions.join("\n"),
        candidates.len()
    );

    let messages = [
        ChatMessage::system(RERANK_SYSTEM_PROMPT),
        ChatMessage::user(user_message),
    ];
    let options = CallOptions {
        temperature: 0.1,
        max_tokens: 2048,
        timeout: RERANK_TIMEOUT,
    };

    let content = match llm.chat(&messages, None, options).await {
        Ok(response) => match response.into_message() {
            Ok(message) => message.content.unwrap_or_default(),
            Err(err) => {
                tracing::warn!(error = %err, "reranker fell back to recall order");
                candidates.truncate(k);
                return candidates;
            }
        },
        Err(err) => {
            tracing::warn!(error = %err, "reranker fell back to recall order");
            candidates.truncate(k);
            return candidates;
        }
    };

    let reply = match serde_json::from_str::<JudgeReply>(extract_json_block(&content)) {
        Ok(reply) => reply,
        Err(err) => {
            tracing::warn!(error = %err, "unparseable judge reply, keeping recall order");
            candidates.truncate(k);
            return candidates;
        }
    };

    let grades: FxHashMap<usize, f64> = reply
        .scores
        .into_iter()
        .map(|s| (s.index, s.score))
        .collect();

    let mut fused: Vec<(f64, SearchResult)> = candidates
        .into_iter()
        .enumerate()
        .map(|(i, mut doc)| {
            let judge = grades.get(&i).copied().unwrap_or(DEFAULT_JUDGE_SCORE);
            let final_score = weights.embedding * (f64::from(doc.score) * 100.0)
                + weights.judge * judge;
            // Normalize the fused 0..100 scale back onto the 0..1 score field.
            doc.score = (final_score / 100.0) as f32;
            (final_score, doc)
        })
        .collect();

    fused.sort_by(|a, b| b.0.total_cmp(&a.0));
    fused.truncate(k);
    fused.into_iter().map(|(_, doc)| doc).collect()
}

static WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern"));
static LIST_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+\.|-|•|\*|\[)").expect("list marker pattern"));

/// Structural rerank used when no provider is configured.
pub fn rerank_by_heuristics(
    query: &str,
    candidates: Vec<SearchResult>,
    k: usize,
) -> Vec<SearchResult> {
    let query_terms: FxHashSet<String> = WORD_PATTERN
        .find_iter(&query.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect();

    let mut scored: Vec<(f64, SearchResult)> = candidates
        .into_iter()
        .map(|doc| {
            let score = {
                let text = doc
                    .text
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .unwrap_or(&doc.title);
                heuristic_score(&query_terms, f64::from(doc.score), text)
            };
            (score, doc)
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(score, mut doc)| {
            doc.score = score as f32;
            doc
        })
        .collect()
}

/// Applies the structural penalty and term-hit bonus to one candidate.
fn heuristic_score(query_terms: &FxHashSet<String>, similarity: f64, text: &str) -> f64 {
    similarity * toc_penalty(text) * term_bonus(query_terms, text)
}

/// Penalty multiplier for list-shaped content. Short average lines look like
/// a table of contents; a majority of list-marker lines compounds it.
fn toc_penalty(text: &str) -> f64 {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return 1.0;
    }

    let mut penalty = 1.0;

    let avg_len =
        lines.iter().map(|l| l.chars().count()).sum::<usize>() as f64 / lines.len() as f64;
    if avg_len < 20.0 {
        penalty *= 0.7;
    }

    let marker_lines = lines.iter().filter(|l| LIST_MARKER.is_match(l)).count();
    if marker_lines as f64 / lines.len() as f64 > 0.5 {
        penalty *= 0.6;
    }

    penalty
}

/// Bonus multiplier: 5% per distinct query term present in the text.
fn term_bonus(query_terms: &FxHashSet<String>, text: &str) -> f64 {
    let text_lower = text.to_lowercase();
    let hits = query_terms
        .iter()
        .filter(|term| text_lower.contains(term.as_str()))
        .count();
    1.0 + hits as f64 * 0.05
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, score: f32, text: &str) -> SearchResult {
        SearchResult {
            url: url.to_string(),
            title: format!("title {url}"),
            tab_id: 0,
            favicon: String::new(),
            score,
            text: Some(text.to_string()),
        }
    }

    fn terms(query: &str) -> FxHashSet<String> {
        WORD_PATTERN
            .find_iter(&query.to_lowercase())
            .map(|m| m.as_str().to_string())
            .collect()
    }

    #[test]
    fn numbered_list_majority_takes_both_penalties() {
        // Ten lines, six starting with a numbering marker, all short.
        let text = "1. intro\n2. setup\n3. usage\n4. api\n5. faq\n6. misc\nplain one\nplain two\nplain three\nplain four";
        let penalty = toc_penalty(text);
        assert!((penalty - 0.7 * 0.6).abs() < 1e-9);
    }

    #[test]
    fn long_prose_lines_take_no_penalty() {
        let text = "This is a reasonably long paragraph line about database internals.\n\
                    Another long line that keeps the average well above the threshold.";
        assert_eq!(toc_penalty(text), 1.0);
    }

    #[test]
    fn bullet_majority_without_short_lines_takes_single_penalty() {
        let line = "- a bullet entry that is definitely longer than twenty characters";
        let text = [line, line, line].join("\n");
        assert!((toc_penalty(&text) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn term_bonus_counts_distinct_hits() {
        let q = terms("rust async runtime");
        let bonus = term_bonus(&q, "a deep dive into the rust async story");
        assert!((bonus - 1.10).abs() < 1e-9);
    }

    #[test]
    fn heuristic_rerank_demotes_toc_pages() {
        let prose = doc(
            "https://a",
            0.80,
            "A long explanation of redis distributed locks and how the redlock algorithm behaves under partition.",
        );
        let toc = doc(
            "https://b",
            0.85,
            "1. redis\n2. locks\n3. intro\n4. faq\n5. misc\n6. more",
        );
        let ranked = rerank_by_heuristics("redis locks", vec![toc, prose], 2);
        assert_eq!(ranked[0].url, "https://a");
    }

    #[test]
    fn heuristic_rerank_truncates_to_k() {
        let docs = vec![
            doc("https://a", 0.9, "alpha"),
            doc("https://b", 0.8, "beta"),
            doc("https://c", 0.7, "gamma"),
        ];
        assert_eq!(rerank_by_heuristics("alpha", docs, 2).len(), 2);
    }

    #[test]
    fn judge_reply_defaults_unscored_documents() {
        let reply: JudgeReply = serde_json::from_str(
            "{\"scores\": [{\"index\": 0, \"score\": 90, \"reason\": \"direct answer\"}]}",
        )
        .unwrap();
        let grades: FxHashMap<usize, f64> =
            reply.scores.into_iter().map(|s| (s.index, s.score)).collect();
        assert_eq!(grades.get(&0), Some(&90.0));
        assert_eq!(
            grades.get(&1).copied().unwrap_or(DEFAULT_JUDGE_SCORE),
            50.0
        );
    }

    #[test]
    fn fusion_weights_apply_to_both_components() {
        let weights = RerankWeights::default();
        let similarity = 0.8f64;
        let judge = 90.0f64;
        let fused = weights.embedding * (similarity * 100.0) + weights.judge * judge;
        assert!((fused - (24.0 + 63.0)).abs() < 1e-9);
    }
}
