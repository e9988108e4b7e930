//! Sliding-window text chunker.
//!
//! Embedding models accept a bounded context, so page text is split into
//! overlapping windows before indexing. Cuts prefer sentence boundaries,
//! then weaker punctuation or whitespace, and only force-cut at the window
//! edge as a last resort. Overlap is a target, not a guarantee: a cut moved
//! to a nearby boundary shifts the effective overlap with it.
//!
//! All sizes are measured in characters, not bytes, so mixed CJK and Latin
//! content is sized consistently.

/// Window sizing for [`split`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Maximum chunk length.
    pub window: usize,
    /// Target overlap between consecutive chunks.
    pub overlap: usize,
    /// Chunks shorter than this are merged into their predecessor.
    pub min_chunk: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            window: 400,
            overlap: 100,
            min_chunk: 50,
        }
    }
}

/// How far back from the window edge to look for a sentence terminal.
const SENTENCE_LOOKBACK: usize = 80;
/// How far back from the window edge to look for weak separators.
const SEPARATOR_LOOKBACK: usize = 40;

fn is_sentence_terminal(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '.' | '!' | '?' | '\n')
}

fn is_weak_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | '，' | ';' | '；' | '、')
}

/// Splits `text` into ordered, non-empty chunks according to `config`.
///
/// Text no longer than the window is returned as a single chunk; empty text
/// yields no chunks. Every other chunk is at least `min_chunk` characters
/// long because short tails are merged into their predecessor.
pub fn split(text: &str, config: &ChunkerConfig) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= config.window {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut start = 0usize;
    let total = chars.len();

    while start < total {
        let end = start + config.window;

        if end >= total {
            let tail = collect_trimmed(&chars[start..]);
            if !tail.is_empty() {
                push_or_merge(&mut chunks, tail, config.min_chunk);
            }
            break;
        }

        let cut = find_cut(&chars, start, end);
        let segment = collect_trimmed(&chars[start..cut]);
        if !segment.is_empty() {
            push_or_merge(&mut chunks, segment, config.min_chunk);
        }

        // Slide back by the overlap, but never stall the window.
        let next = cut.saturating_sub(config.overlap);
        start = if next > start { next } else { cut };
    }

    if chunks.is_empty() {
        return vec![text.to_string()];
    }
    chunks
}

/// Picks the cut position for the window `[start, end)`.
///
/// Prefers the rightmost sentence terminal in the trailing
/// [`SENTENCE_LOOKBACK`] characters, then the rightmost weak separator in the
/// trailing [`SEPARATOR_LOOKBACK`] characters, and falls back to `end`.
/// The cut lands immediately after the boundary character.
fn find_cut(chars: &[char], start: usize, end: usize) -> usize {
    let sentence_from = start.max(end.saturating_sub(SENTENCE_LOOKBACK));
    if let Some(pos) = rightmost(chars, sentence_from, end, is_sentence_terminal) {
        return pos + 1;
    }

    let separator_from = start.max(end.saturating_sub(SEPARATOR_LOOKBACK));
    if let Some(pos) = rightmost(chars, separator_from, end, is_weak_separator) {
        return pos + 1;
    }

    end
}

fn rightmost(chars: &[char], from: usize, to: usize, pred: fn(char) -> bool) -> Option<usize> {
    chars[from..to]
        .iter()
        .rposition(|&c| pred(c))
        .map(|offset| from + offset)
}

fn collect_trimmed(chars: &[char]) -> String {
    chars.iter().collect::<String>().trim().to_string()
}

/// Appends `segment` as a new chunk, or folds it into the previous chunk when
/// it falls below `min_chunk` and a predecessor exists.
fn push_or_merge(chunks: &mut Vec<String>, segment: String, min_chunk: usize) {
    if segment.chars().count() >= min_chunk || chunks.is_empty() {
        chunks.push(segment);
    } else if let Some(last) = chunks.last_mut() {
        last.push(' ');
        last.push_str(&segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ChunkerConfig {
        ChunkerConfig::default()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split("", &config()).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let text = "A short note about Rust lifetimes.";
        assert_eq!(split(text, &config()), vec![text.to_string()]);
    }

    #[test]
    fn text_exactly_at_window_is_a_single_chunk() {
        let text = "x".repeat(400);
        assert_eq!(split(&text, &config()), vec![text]);
    }

    #[test]
    fn long_text_cuts_at_sentence_boundaries() {
        // Sentences of ~60 chars each; cuts should land after periods.
        let sentence = "The quick brown fox jumps over the lazy dog near a river. ";
        let text = sentence.repeat(20);
        let chunks = split(&text, &config());
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(
                chunk.ends_with('.'),
                "expected sentence-terminal cut, got: ...{:?}",
                &chunk[chunk.len().saturating_sub(12)..]
            );
        }
    }

    #[test]
    fn fullwidth_terminals_are_boundaries() {
        let sentence = "这是一个关于分布式系统一致性协议的较长句子，其中讨论了日志复制。";
        let text = sentence.repeat(30);
        let chunks = split(&text, &config());
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with('。'));
        }
    }

    #[test]
    fn no_chunk_below_minimum_except_possibly_the_sole_one() {
        let word = "alpha beta gamma delta epsilon zeta eta theta iota kappa ";
        let text = word.repeat(40);
        let chunks = split(&text, &config());
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() >= 50, "undersized chunk: {chunk:?}");
        }
    }

    #[test]
    fn short_tail_merges_into_previous_chunk() {
        let cfg = ChunkerConfig {
            window: 100,
            overlap: 10,
            min_chunk: 50,
        };
        // 130 unbroken chars: one forced cut at 100, then a 40-char tail that
        // falls below the minimum and folds back into the first chunk.
        let text = "a".repeat(130);
        let chunks = split(&text, &cfg);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chars().count(), 100 + 1 + 40);
    }

    #[test]
    fn unbroken_text_force_cuts_at_window() {
        let text = "x".repeat(1000);
        let chunks = split(&text, &config());
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].chars().count(), 400);
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "y".repeat(1000);
        let chunks = split(&text, &config());
        // Force cuts at 400 with overlap 100: windows begin every 300 chars.
        assert_eq!(chunks[0].chars().count(), 400);
        assert!(chunks.len() >= 3);
    }

    #[test]
    fn progress_is_guaranteed_when_overlap_would_stall() {
        let cfg = ChunkerConfig {
            window: 10,
            overlap: 10,
            min_chunk: 1,
        };
        let text = "abcdefghijklmnopqrstuvwxyz0123456789";
        let chunks = split(text, &cfg);
        assert!(!chunks.is_empty());
        let covered: usize = chunks.iter().map(|c| c.chars().count()).sum();
        assert!(covered >= text.len());
    }

    #[test]
    fn coverage_has_no_gaps() {
        // Boundary-free input takes the force-cut path only, so windows land
        // at deterministic offsets: every chunk starts window - overlap after
        // the previous one. Dropping each chunk's leading overlap region must
        // reconstruct the input exactly.
        let text: String = ('a'..='z').cycle().take(2000).collect();
        let cfg = config();
        let chunks = split(&text, &cfg);

        let stride = cfg.window - cfg.overlap;
        for (i, chunk) in chunks.iter().enumerate() {
            let start = i * stride;
            let expected: String = text.chars().skip(start).take(cfg.window).collect();
            assert_eq!(chunk, &expected);
        }

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(cfg.overlap));
        }
        assert_eq!(rebuilt, text);
    }
}
