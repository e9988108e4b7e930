//! In-memory [`VectorIndex`] backed by a brute-force scan.
//!
//! Intended for tests and small embedded archives; everything lives in one
//! vector guarded by a read-write lock. Distances match what the sqlite
//! backend computes, so the two are interchangeable in test suites.

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::errors::StoreError;

use super::{ChunkUpsert, IndexFilter, IndexMatch, IndexRecord, VectorIndex};

#[derive(Default)]
pub struct MemoryVectorIndex {
    rows: RwLock<Vec<ChunkUpsert>>,
}

impl MemoryVectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}

fn matches_filter(row: &ChunkUpsert, filter: &IndexFilter) -> bool {
    match filter {
        IndexFilter::All => true,
        IndexFilter::PageId(page_id) => row.meta.page_id == *page_id,
        IndexFilter::Ids(ids) => ids.iter().any(|id| *id == row.id),
    }
}

fn to_record(row: &ChunkUpsert, include_content: bool) -> IndexRecord {
    IndexRecord {
        id: row.id.clone(),
        content: include_content.then(|| row.content.clone()),
        meta: row.meta.clone(),
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, chunks: Vec<ChunkUpsert>) -> Result<(), StoreError> {
        let mut rows = self.rows.write();
        for chunk in chunks {
            if let Some(existing) = rows.iter_mut().find(|r| r.id == chunk.id) {
                *existing = chunk;
            } else {
                rows.push(chunk);
            }
        }
        Ok(())
    }

    async fn get(
        &self,
        filter: IndexFilter,
        include_content: bool,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        let rows = self.rows.read();
        Ok(rows
            .iter()
            .filter(|row| matches_filter(row, &filter))
            .map(|row| to_record(row, include_content))
            .collect())
    }

    async fn query(
        &self,
        vector: &[f32],
        n: usize,
        include_content: bool,
    ) -> Result<Vec<IndexMatch>, StoreError> {
        let rows = self.rows.read();
        let mut hits: Vec<IndexMatch> = rows
            .iter()
            .map(|row| IndexMatch {
                record: to_record(row, include_content),
                distance: cosine_distance(&row.vector, vector),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(n);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| !ids.iter().any(|id| *id == row.id));
        Ok(before - rows.len())
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkMeta;

    fn chunk(id: &str, page_id: &str, url: &str, vector: Vec<f32>) -> ChunkUpsert {
        ChunkUpsert {
            id: id.to_string(),
            vector,
            content: format!("content of {id}"),
            meta: ChunkMeta {
                url: url.to_string(),
                title: format!("title of {url}"),
                tab_id: 1,
                favicon: String::new(),
                chunk_index: 0,
                total_chunks: 1,
                page_id: page_id.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![chunk("c1", "p1", "u1", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(vec![chunk("c1", "p1", "u1", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_orders_by_distance() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                chunk("near", "p1", "u1", vec![1.0, 0.0]),
                chunk("far", "p2", "u2", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 2, false).await.unwrap();
        assert_eq!(hits[0].record.id, "near");
        assert!(hits[0].distance < hits[1].distance);
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn filters_select_by_page_and_id() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![
                chunk("a0", "pa", "ua", vec![1.0, 0.0]),
                chunk("a1", "pa", "ua", vec![1.0, 0.0]),
                chunk("b0", "pb", "ub", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let by_page = index
            .get(IndexFilter::PageId("pa".into()), false)
            .await
            .unwrap();
        assert_eq!(by_page.len(), 2);

        let by_id = index
            .get(IndexFilter::Ids(vec!["b0".into()]), true)
            .await
            .unwrap();
        assert_eq!(by_id.len(), 1);
        assert_eq!(by_id[0].content.as_deref(), Some("content of b0"));
    }

    #[tokio::test]
    async fn delete_reports_removed_count() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(vec![chunk("c1", "p1", "u1", vec![1.0])])
            .await
            .unwrap();
        assert_eq!(index.delete(&["c1".to_string()]).await.unwrap(), 1);
        assert_eq!(index.delete(&["c1".to_string()]).await.unwrap(), 0);
    }
}
