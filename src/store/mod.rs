//! Vector storage: the index collaborator contract and the page-level
//! adapter on top of it.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ VectorIndex trait│
//!                  │ (chunk CRUD +    │
//!                  │  nearest query)  │
//!                  └────────┬─────────┘
//!                           │
//!              ┌────────────┼─────────────┐
//!              ▼                          ▼
//!      ┌───────────────┐         ┌────────────────┐
//!      │  sqlite-vec   │         │   in-memory    │
//!      └───────────────┘         └────────────────┘
//!
//!      TabStore (page-level adapter)
//!        write_page / query / delete_page / list_all / read_page
//! ```
//!
//! The index stores individual chunks keyed by opaque ids. [`TabStore`]
//! owns identity (page ids, chunk ids) and hides chunk-level storage behind
//! page-level operations: a page's chunks are always replaced together, and
//! query results are collapsed to at most one hit per URL.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::StoreError;

pub use memory::MemoryVectorIndex;
pub use sqlite::SqliteVecIndex;

/// Character cap applied when a whole page is read back for the agent.
pub const READ_CONTENT_CAP: usize = 5000;

/// Metadata carried by every chunk record in the index.
///
/// Legacy records written by earlier layouts may lack the trailing fields,
/// hence the serde defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub tab_id: i64,
    #[serde(default)]
    pub favicon: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default = "default_total_chunks")]
    pub total_chunks: usize,
    #[serde(default)]
    pub page_id: String,
}

fn default_total_chunks() -> usize {
    1
}

/// A chunk ready to be written to the index.
#[derive(Clone, Debug)]
pub struct ChunkUpsert {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub meta: ChunkMeta,
}

/// A chunk read back from the index. Content is only populated on request.
#[derive(Clone, Debug)]
pub struct IndexRecord {
    pub id: String,
    pub content: Option<String>,
    pub meta: ChunkMeta,
}

/// A nearest-neighbor hit: record plus cosine distance.
#[derive(Clone, Debug)]
pub struct IndexMatch {
    pub record: IndexRecord,
    pub distance: f32,
}

/// Exact-match record selection.
#[derive(Clone, Debug)]
pub enum IndexFilter {
    /// Every record in the index.
    All,
    /// Records whose metadata names this page id.
    PageId(String),
    /// Records with one of these exact ids.
    Ids(Vec<String>),
}

/// Contract the external vector index must satisfy.
///
/// Implementations do the nearest-neighbor math; everything page-shaped
/// lives in [`TabStore`].
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces chunk records.
    async fn upsert(&self, chunks: Vec<ChunkUpsert>) -> Result<(), StoreError>;

    /// Fetches records matching `filter`.
    async fn get(
        &self,
        filter: IndexFilter,
        include_content: bool,
    ) -> Result<Vec<IndexRecord>, StoreError>;

    /// Returns up to `n` nearest records by cosine distance, ascending.
    async fn query(
        &self,
        vector: &[f32],
        n: usize,
        include_content: bool,
    ) -> Result<Vec<IndexMatch>, StoreError>;

    /// Deletes records by id; returns how many existed.
    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError>;

    /// Total number of stored records.
    async fn count(&self) -> Result<usize, StoreError>;
}

/// Identity of a page being written.
#[derive(Clone, Debug, Deserialize)]
pub struct PageInput {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub tab_id: i64,
    #[serde(default)]
    pub favicon: String,
}

/// Receipt for a completed page write.
#[derive(Clone, Debug, Serialize)]
pub struct WriteReceipt {
    pub page_id: String,
    pub chunks: usize,
}

/// One page-level search hit. At most one per URL per query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub tab_id: i64,
    pub favicon: String,
    pub score: f32,
    /// Best-matching chunk's text, when the caller asked for it.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
}

/// One row of the page listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PageSummary {
    pub url: String,
    pub title: String,
    pub tab_id: i64,
    pub favicon: String,
    pub chunks: usize,
}

/// A page's text reassembled from its chunks.
#[derive(Clone, Debug, Serialize)]
pub struct PageDocument {
    pub url: String,
    pub title: String,
    pub total_chunks: usize,
    pub content: String,
    pub truncated: bool,
}

/// Where a page's records were found during lookup.
///
/// Current writes store one record per chunk, tied to the page via metadata.
/// An earlier layout stored a whole page as a single record keyed directly by
/// the page id; deletes still honor it on a best-effort basis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageLookup {
    /// Chunk records addressed through the page-id metadata field.
    Chunked(Vec<String>),
    /// A single record keyed by the bare page id.
    Legacy(String),
    /// Nothing stored for this page.
    Missing,
}

/// Page-level adapter over a [`VectorIndex`].
#[derive(Clone)]
pub struct TabStore {
    index: Arc<dyn VectorIndex>,
    /// Raw candidates fetched per nearest-neighbor query, as a multiple of
    /// the requested page count, to survive URL-level deduplication.
    dedup_oversample: usize,
}

impl TabStore {
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self {
            index,
            dedup_oversample: 5,
        }
    }

    #[must_use]
    pub fn with_dedup_oversample(mut self, factor: usize) -> Self {
        self.dedup_oversample = factor.max(1);
        self
    }

    /// Stable page id: hex SHA-256 of the URL, truncated to 16 characters.
    ///
    /// Hashing decouples storage identity from URL string formatting.
    #[must_use]
    pub fn page_id(url: &str) -> String {
        let digest = Sha256::digest(url.as_bytes());
        let mut hex = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            hex.push_str(&format!("{byte:02x}"));
        }
        hex
    }

    /// Deterministic chunk id for `(page, ordinal)`.
    #[must_use]
    pub fn chunk_id(page_id: &str, index: usize) -> String {
        format!("{page_id}_chunk_{index}")
    }

    /// Replaces all of a page's chunks with the given `chunks`/`vectors`.
    ///
    /// Existing records for the page (either layout) are purged first, so
    /// the operation behaves as a single logical replace and is idempotent
    /// when nothing is stored yet.
    pub async fn write_page(
        &self,
        page: &PageInput,
        chunks: Vec<String>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<WriteReceipt, StoreError> {
        let page_id = Self::page_id(&page.url);

        let stale = self.existing_ids(&page_id).await?;
        if !stale.is_empty() {
            self.index.delete(&stale).await?;
        }

        let total = chunks.len();
        let upserts: Vec<ChunkUpsert> = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (content, vector))| ChunkUpsert {
                id: Self::chunk_id(&page_id, i),
                vector,
                content,
                meta: ChunkMeta {
                    url: page.url.clone(),
                    title: page.title.clone(),
                    tab_id: page.tab_id,
                    favicon: page.favicon.clone(),
                    chunk_index: i,
                    total_chunks: total,
                    page_id: page_id.clone(),
                },
            })
            .collect();

        let written = upserts.len();
        if written > 0 {
            self.index.upsert(upserts).await?;
        }
        tracing::debug!(page_id = %page_id, chunks = written, title = %page.title, "indexed page");

        Ok(WriteReceipt {
            page_id,
            chunks: written,
        })
    }

    /// Nearest-page query with URL-level deduplication.
    ///
    /// Oversamples the raw chunk query, then collapses hits so each URL
    /// keeps only its highest-similarity chunk. Similarity is
    /// `1 - cosine distance`, rounded to four decimals.
    pub async fn query(
        &self,
        vector: &[f32],
        k: usize,
        want_text: bool,
    ) -> Result<Vec<SearchResult>, StoreError> {
        let total = self.index.count().await?;
        if total == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let fetch = (k * self.dedup_oversample).min(total).max(1);
        let matches = self.index.query(vector, fetch, want_text).await?;

        let mut best: FxHashMap<String, SearchResult> = FxHashMap::default();
        for hit in matches {
            let score = round4(1.0 - f64::from(hit.distance));
            let meta = hit.record.meta;
            let replace = best
                .get(&meta.url)
                .is_none_or(|existing| score > existing.score);
            if replace {
                best.insert(
                    meta.url.clone(),
                    SearchResult {
                        url: meta.url,
                        title: meta.title,
                        tab_id: meta.tab_id,
                        favicon: meta.favicon,
                        score,
                        text: if want_text { hit.record.content } else { None },
                    },
                );
            }
        }

        let mut results: Vec<SearchResult> = best.into_values().collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    /// Locates a page's records, preferring the current chunked layout.
    pub async fn locate(&self, url: &str) -> Result<PageLookup, StoreError> {
        let page_id = Self::page_id(url);

        let chunked = self
            .index
            .get(IndexFilter::PageId(page_id.clone()), false)
            .await?;
        if !chunked.is_empty() {
            return Ok(PageLookup::Chunked(
                chunked.into_iter().map(|r| r.id).collect(),
            ));
        }

        let legacy = self
            .index
            .get(IndexFilter::Ids(vec![page_id.clone()]), false)
            .await?;
        if !legacy.is_empty() {
            return Ok(PageLookup::Legacy(page_id));
        }

        Ok(PageLookup::Missing)
    }

    /// Removes a page under either storage layout. Returns whether anything
    /// was removed; deleting an unknown URL is not an error.
    pub async fn delete_page(&self, url: &str) -> Result<bool, StoreError> {
        match self.locate(url).await? {
            PageLookup::Chunked(ids) => {
                let removed = self.index.delete(&ids).await?;
                Ok(removed > 0)
            }
            PageLookup::Legacy(id) => {
                let removed = self.index.delete(&[id]).await?;
                Ok(removed > 0)
            }
            PageLookup::Missing => Ok(false),
        }
    }

    /// One summary per distinct URL, in first-seen order.
    pub async fn list_all(&self) -> Result<Vec<PageSummary>, StoreError> {
        let records = self.index.get(IndexFilter::All, false).await?;

        let mut seen: FxHashMap<String, ()> = FxHashMap::default();
        let mut pages = Vec::new();
        for record in records {
            let meta = record.meta;
            if seen.insert(meta.url.clone(), ()).is_none() {
                pages.push(PageSummary {
                    url: meta.url,
                    title: meta.title,
                    tab_id: meta.tab_id,
                    favicon: meta.favicon,
                    chunks: meta.total_chunks,
                });
            }
        }
        Ok(pages)
    }

    /// Reassembles a page's full text from its chunks, ordered by ordinal and
    /// capped at [`READ_CONTENT_CAP`] characters.
    pub async fn read_page(&self, url: &str) -> Result<Option<PageDocument>, StoreError> {
        let page_id = Self::page_id(url);
        let mut records = self
            .index
            .get(IndexFilter::PageId(page_id), true)
            .await?;
        if records.is_empty() {
            return Ok(None);
        }

        records.sort_by_key(|r| r.meta.chunk_index);
        let title = records
            .iter()
            .map(|r| r.meta.title.clone())
            .find(|t| !t.is_empty())
            .unwrap_or_default();
        let total_chunks = records.len();

        let full_text = records
            .into_iter()
            .filter_map(|r| r.content)
            .collect::<Vec<_>>()
            .join("\n");

        let truncated = full_text.chars().count() > READ_CONTENT_CAP;
        let content = if truncated {
            full_text.chars().take(READ_CONTENT_CAP).collect()
        } else {
            full_text
        };

        Ok(Some(PageDocument {
            url: url.to_string(),
            title,
            total_chunks,
            content,
            truncated,
        }))
    }

    async fn existing_ids(&self, page_id: &str) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .index
            .get(IndexFilter::PageId(page_id.to_string()), false)
            .await?
            .into_iter()
            .map(|r| r.id)
            .collect();

        let legacy = self
            .index
            .get(IndexFilter::Ids(vec![page_id.to_string()]), false)
            .await?;
        if !legacy.is_empty() {
            ids.push(page_id.to_string());
        }
        Ok(ids)
    }
}

fn round4(value: f64) -> f32 {
    ((value * 10_000.0).round() / 10_000.0) as f32
}
