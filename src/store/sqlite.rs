//! SQLite-backed [`VectorIndex`] using the `sqlite-vec` extension.
//!
//! Chunk rows live in a plain `chunks` table; their vectors live in
//! `chunk_embeddings` as float32 blobs produced by `vec_f32`. Nearest
//! queries join the two and order by `vec_distance_cosine`.
//!
//! Opening the index performs a one-time dimensionality check: if the
//! persisted vectors were produced by a model with a different dimension,
//! both tables are dropped and recreated empty. That is a destructive
//! self-heal for model changes, not a migration.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::OnceLock;

use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use crate::errors::StoreError;

use super::{ChunkMeta, ChunkUpsert, IndexFilter, IndexMatch, IndexRecord, VectorIndex};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS chunks (
    id           TEXT PRIMARY KEY,
    page_id      TEXT NOT NULL DEFAULT '',
    url          TEXT NOT NULL,
    title        TEXT NOT NULL DEFAULT '',
    tab_id       INTEGER NOT NULL DEFAULT 0,
    favicon      TEXT NOT NULL DEFAULT '',
    chunk_index  INTEGER NOT NULL DEFAULT 0,
    total_chunks INTEGER NOT NULL DEFAULT 1,
    content      TEXT NOT NULL DEFAULT ''
);
CREATE INDEX IF NOT EXISTS idx_chunks_page_id ON chunks(page_id);
CREATE TABLE IF NOT EXISTS chunk_embeddings (
    id        TEXT PRIMARY KEY,
    embedding BLOB NOT NULL
);
";

const SELECT_COLUMNS: &str =
    "id, page_id, url, title, tab_id, favicon, chunk_index, total_chunks, content";

/// Builds an [`IndexRecord`] from a row selected with [`SELECT_COLUMNS`].
macro_rules! record_from_row {
    ($row:expr) => {
        IndexRecord {
            id: $row.get(0)?,
            meta: ChunkMeta {
                page_id: $row.get(1)?,
                url: $row.get(2)?,
                title: $row.get(3)?,
                tab_id: $row.get(4)?,
                favicon: $row.get(5)?,
                chunk_index: $row.get::<_, i64>(6)?.max(0) as usize,
                total_chunks: $row.get::<_, i64>(7)?.max(1) as usize,
            },
            content: Some($row.get::<_, String>(8)?),
        }
    };
}

/// Vector index persisted in a single SQLite database file.
#[derive(Clone)]
pub struct SqliteVecIndex {
    conn: Connection,
    dimension: usize,
}

impl SqliteVecIndex {
    /// Opens (or creates) the index at `path` for vectors of `dimension`.
    pub async fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        register_vec_extension()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;
        Self::initialize(conn, dimension).await
    }

    /// Opens a throwaway in-memory index, mainly for tests.
    pub async fn open_in_memory(dimension: usize) -> Result<Self, StoreError> {
        register_vec_extension()?;
        let conn = Connection::open_in_memory()
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;
        Self::initialize(conn, dimension).await
    }

    async fn initialize(conn: Connection, dimension: usize) -> Result<Self, StoreError> {
        let dim = dimension as i64;
        conn.call(move |conn| -> tokio_rusqlite::Result<()> {
            conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))?;
            conn.execute_batch(SCHEMA)?;

            let stored_dim: Option<i64> = conn
                .query_row(
                    "SELECT vec_length(embedding) FROM chunk_embeddings LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(stored) = stored_dim
                && stored != dim
            {
                tracing::warn!(
                    stored_dimension = stored,
                    expected_dimension = dim,
                    "embedding dimension changed, dropping persisted index"
                );
                conn.execute_batch(
                    "DROP TABLE IF EXISTS chunks; DROP TABLE IF EXISTS chunk_embeddings;",
                )?;
                conn.execute_batch(SCHEMA)?;
            }
            Ok(())
        })
        .await
        .map_err(|err| StoreError::Storage(err.to_string()))?;

        Ok(Self { conn, dimension })
    }

    /// Dimensionality this index was opened with.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait::async_trait]
impl VectorIndex for SqliteVecIndex {
    async fn upsert(&self, chunks: Vec<ChunkUpsert>) -> Result<(), StoreError> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut rows = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector_json = serde_json::to_string(&chunk.vector)
                .map_err(|err| StoreError::Rejected(err.to_string()))?;
            rows.push((chunk, vector_json));
        }

        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<()> {
                let tx = conn.transaction()?;
                for (chunk, vector_json) in rows {
                    tx.execute(
                        "INSERT OR REPLACE INTO chunks \
                         (id, page_id, url, title, tab_id, favicon, chunk_index, total_chunks, content) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                        (
                            &chunk.id,
                            &chunk.meta.page_id,
                            &chunk.meta.url,
                            &chunk.meta.title,
                            chunk.meta.tab_id,
                            &chunk.meta.favicon,
                            chunk.meta.chunk_index as i64,
                            chunk.meta.total_chunks as i64,
                            &chunk.content,
                        ),
                    )?;
                    tx.execute(
                        "INSERT OR REPLACE INTO chunk_embeddings (id, embedding) \
                         VALUES (?1, vec_f32(?2))",
                        (&chunk.id, &vector_json),
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| StoreError::Rejected(err.to_string()))
    }

    async fn get(
        &self,
        filter: IndexFilter,
        include_content: bool,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        let records: Vec<IndexRecord> = self
            .conn
            .call(move |conn| -> tokio_rusqlite::Result<Vec<IndexRecord>> {
                let mut records = Vec::new();
                match filter {
                    IndexFilter::All => {
                        let sql = format!("SELECT {SELECT_COLUMNS} FROM chunks");
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map([], |row| Ok(record_from_row!(row)))?;
                        for row in rows {
                            records.push(row?);
                        }
                    }
                    IndexFilter::PageId(page_id) => {
                        let sql = format!("SELECT {SELECT_COLUMNS} FROM chunks WHERE page_id = ?1");
                        let mut stmt = conn.prepare(&sql)?;
                        let rows = stmt
                            .query_map([&page_id], |row| Ok(record_from_row!(row)))?;
                        for row in rows {
                            records.push(row?);
                        }
                    }
                    IndexFilter::Ids(ids) => {
                        let sql = format!("SELECT {SELECT_COLUMNS} FROM chunks WHERE id = ?1");
                        let mut stmt = conn.prepare(&sql)?;
                        for id in ids {
                            let record = stmt
                                .query_row([&id], |row| Ok(record_from_row!(row)))
                                .optional()?;
                            if let Some(record) = record {
                                records.push(record);
                            }
                        }
                    }
                }
                Ok(records)
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;

        Ok(records
            .into_iter()
            .map(|mut r| {
                if !include_content {
                    r.content = None;
                }
                r
            })
            .collect())
    }

    async fn query(
        &self,
        vector: &[f32],
        n: usize,
        include_content: bool,
    ) -> Result<Vec<IndexMatch>, StoreError> {
        let vector_json =
            serde_json::to_string(vector).map_err(|err| StoreError::Storage(err.to_string()))?;

        let hits: Vec<IndexMatch> = self
            .conn
            .call(move |conn| -> tokio_rusqlite::Result<Vec<IndexMatch>> {
                let sql = format!(
                    "SELECT {SELECT_COLUMNS}, \
                     vec_distance_cosine(embedding, vec_f32(?1)) AS distance \
                     FROM chunks JOIN chunk_embeddings USING (id) \
                     ORDER BY distance ASC LIMIT {n}"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map([&vector_json], |row| {
                        let record = record_from_row!(row);
                        let distance: f64 = row.get(9)?;
                        Ok(IndexMatch {
                            record,
                            distance: distance as f32,
                        })
                    })?;

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|mut hit| {
                if !include_content {
                    hit.record.content = None;
                }
                hit
            })
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| -> tokio_rusqlite::Result<usize> {
                let mut removed = 0usize;
                for id in &ids {
                    conn.execute("DELETE FROM chunk_embeddings WHERE id = ?1", [id])?;
                    removed += conn
                        .execute("DELETE FROM chunks WHERE id = ?1", [id])?;
                }
                Ok(removed)
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.conn
            .call(|conn| -> tokio_rusqlite::Result<usize> {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
                Ok(count.max(0) as usize)
            })
            .await
            .map_err(|err| StoreError::Storage(err.to_string()))
    }
}

/// Registers `sqlite-vec` as an auto extension for every new connection.
///
/// SQLite auto extensions are process-global, so registration happens once
/// and the outcome is cached for later callers.
fn register_vec_extension() -> Result<(), StoreError> {
    static REGISTERED: OnceLock<Result<(), String>> = OnceLock::new();

    let outcome = REGISTERED.get_or_init(|| unsafe {
        type ExtensionInit = unsafe extern "C" fn(
            *mut ffi::sqlite3,
            *mut *mut c_char,
            *const ffi::sqlite3_api_routines,
        ) -> i32;

        let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
        let init_fn: ExtensionInit = transmute::<unsafe extern "C" fn(), ExtensionInit>(init);
        let rc = ffi::sqlite3_auto_extension(Some(init_fn));
        if rc == 0 {
            Ok(())
        } else {
            Err(format!(
                "failed to register sqlite-vec extension (code {rc})"
            ))
        }
    });

    outcome.clone().map_err(StoreError::Storage)
}
