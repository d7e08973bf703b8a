//! SQLite-backed [`Store`] using sqlx.
//!
//! Schema is created on connect with idempotent `CREATE TABLE IF NOT EXISTS`
//! statements. Embedding vectors are stored as little-endian f32 BLOBs.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use crate::chunk::ChunkingStrategy;
use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkingState, DocStatus, DocumentRecord};
use crate::provider::{blob_to_vec, vec_to_blob};

use super::{EmbeddingUpdate, IndexedChunk, Store};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `path` and runs
    /// migrations.
    pub async fn connect(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| Error::Storage(format!("invalid database path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        migrate(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            raw_hash TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunking_states (
            document_id TEXT NOT NULL,
            strategy TEXT NOT NULL,
            raw_hash TEXT NOT NULL,
            chunk_size INTEGER NOT NULL,
            chunk_overlap INTEGER NOT NULL,
            status TEXT NOT NULL,
            num_chunks INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (document_id, strategy),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            strategy TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            text_hash TEXT NOT NULL,
            token_len INTEGER NOT NULL,
            embedding BLOB,
            embedding_model TEXT,
            embedded_at INTEGER,
            UNIQUE(document_id, strategy, chunk_index),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_strategy ON chunks(strategy)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_text_hash ON chunks(text_hash)")
        .execute(pool)
        .await?;

    Ok(())
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let strategy_raw: String = row.get("strategy");
    let strategy = ChunkingStrategy::parse(&strategy_raw)
        .ok_or_else(|| Error::Storage(format!("unknown strategy '{strategy_raw}' in chunk row")))?;
    let blob: Option<Vec<u8>> = row.get("embedding");
    Ok(Chunk {
        id: row.get("id"),
        document_id: row.get("document_id"),
        strategy,
        chunk_index: row.get("chunk_index"),
        text: row.get("text"),
        text_hash: row.get("text_hash"),
        token_len: row.get("token_len"),
        embedding: blob.map(|b| blob_to_vec(&b)),
        embedding_model: row.get("embedding_model"),
        embedded_at: row.get("embedded_at"),
    })
}

fn row_to_state(row: &SqliteRow) -> Result<ChunkingState> {
    let status_raw: String = row.get("status");
    let status = DocStatus::parse(&status_raw)
        .ok_or_else(|| Error::Storage(format!("unknown status '{status_raw}' in state row")))?;
    Ok(ChunkingState {
        raw_hash: row.get("raw_hash"),
        chunk_size: row.get("chunk_size"),
        chunk_overlap: row.get("chunk_overlap"),
        status,
        num_chunks: row.get("num_chunks"),
        updated_at: row.get("updated_at"),
    })
}

const ERROR_STATUSES: &str = "('TEXT_EMPTY','COLLECTION_ERROR','CHUNKING_ERROR')";

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_document(&self, doc: &DocumentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, title, raw_hash, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                raw_hash = excluded.raw_hash,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(&doc.raw_hash)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentRecord>> {
        let row = sqlx::query(
            "SELECT id, title, raw_hash, updated_at FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| DocumentRecord {
            id: r.get("id"),
            title: r.get("title"),
            raw_hash: r.get("raw_hash"),
            updated_at: r.get("updated_at"),
        }))
    }

    async fn list_document_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM documents ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<u64> {
        let mut deleted = 0u64;
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunking_states WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            let result = sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(deleted)
    }

    async fn chunking_state(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
    ) -> Result<Option<ChunkingState>> {
        let row = sqlx::query(
            r#"
            SELECT raw_hash, chunk_size, chunk_overlap, status, num_chunks, updated_at
            FROM chunking_states WHERE document_id = ? AND strategy = ?
            "#,
        )
        .bind(document_id)
        .bind(strategy.name())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| row_to_state(&r)).transpose()
    }

    async fn set_chunking_state(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
        state: &ChunkingState,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO chunking_states
                (document_id, strategy, raw_hash, chunk_size, chunk_overlap,
                 status, num_chunks, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(document_id, strategy) DO UPDATE SET
                raw_hash = excluded.raw_hash,
                chunk_size = excluded.chunk_size,
                chunk_overlap = excluded.chunk_overlap,
                status = excluded.status,
                num_chunks = excluded.num_chunks,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(document_id)
        .bind(strategy.name())
        .bind(&state.raw_hash)
        .bind(state.chunk_size)
        .bind(state.chunk_overlap)
        .bind(state.status.as_str())
        .bind(state.num_chunks)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn chunks_for(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
    ) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            r#"
            SELECT id, document_id, strategy, chunk_index, text, text_hash,
                   token_len, embedding, embedding_model, embedded_at
            FROM chunks WHERE document_id = ? AND strategy = ?
            ORDER BY chunk_index
            "#,
        )
        .bind(document_id)
        .bind(strategy.name())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn replace_chunks(
        &self,
        document_id: &str,
        strategy: ChunkingStrategy,
        chunks: &[Chunk],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ? AND strategy = ?")
            .bind(document_id)
            .bind(strategy.name())
            .execute(&mut *tx)
            .await?;
        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks
                    (id, document_id, strategy, chunk_index, text, text_hash,
                     token_len, embedding, embedding_model, embedded_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(chunk.strategy.name())
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.text_hash)
            .bind(chunk.token_len)
            .bind(chunk.embedding.as_ref().map(|v| vec_to_blob(v)))
            .bind(&chunk.embedding_model)
            .bind(chunk.embedded_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn pending_chunks(&self, model: &str, dims: usize) -> Result<Vec<Chunk>> {
        let sql = format!(
            r#"
            SELECT c.id, c.document_id, c.strategy, c.chunk_index, c.text,
                   c.text_hash, c.token_len, c.embedding, c.embedding_model,
                   c.embedded_at
            FROM chunks c
            JOIN chunking_states s
              ON s.document_id = c.document_id AND s.strategy = c.strategy
            WHERE s.status NOT IN {ERROR_STATUSES}
              AND (c.embedding IS NULL
                   OR c.embedding_model IS NULL
                   OR c.embedding_model != ?
                   OR length(c.embedding) != ?)
            ORDER BY c.document_id, c.strategy, c.chunk_index
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(model)
            .bind((dims * 4) as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_chunk).collect()
    }

    async fn count_pending(&self, model: &str, dims: usize) -> Result<u64> {
        let sql = format!(
            r#"
            SELECT COUNT(*)
            FROM chunks c
            JOIN chunking_states s
              ON s.document_id = c.document_id AND s.strategy = c.strategy
            WHERE s.status NOT IN {ERROR_STATUSES}
              AND (c.embedding IS NULL
                   OR c.embedding_model IS NULL
                   OR c.embedding_model != ?
                   OR length(c.embedding) != ?)
            "#
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(model)
            .bind((dims * 4) as i64)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn write_embeddings(&self, updates: &[EmbeddingUpdate]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for update in updates {
            sqlx::query(
                "UPDATE chunks SET embedding = ?, embedding_model = ?, embedded_at = ? WHERE id = ?",
            )
            .bind(vec_to_blob(&update.vector))
            .bind(&update.model)
            .bind(update.embedded_at)
            .bind(&update.chunk_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn refresh_statuses(&self, model: &str, dims: usize) -> Result<()> {
        let sql = r#"
            UPDATE chunking_states SET status = 'PROCESSED', updated_at = ?
            WHERE status = 'PENDING_EMBEDDING'
              AND NOT EXISTS (
                SELECT 1 FROM chunks c
                WHERE c.document_id = chunking_states.document_id
                  AND c.strategy = chunking_states.strategy
                  AND (c.embedding IS NULL
                       OR c.embedding_model IS NULL
                       OR c.embedding_model != ?
                       OR length(c.embedding) != ?)
              )
        "#;
        sqlx::query(sql)
            .bind(chrono::Utc::now().timestamp())
            .bind(model)
            .bind((dims * 4) as i64)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn indexed_chunks(&self, strategy: ChunkingStrategy) -> Result<Vec<IndexedChunk>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.text, c.embedding, c.embedding_model, d.title
            FROM chunks c
            JOIN documents d ON d.id = c.document_id
            WHERE c.strategy = ?
            ORDER BY c.document_id, c.chunk_index
            "#,
        )
        .bind(strategy.name())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| {
                let blob: Option<Vec<u8>> = r.get("embedding");
                IndexedChunk {
                    chunk_id: r.get("id"),
                    document_id: r.get("document_id"),
                    source_label: r.get("title"),
                    text: r.get("text"),
                    embedding: blob.map(|b| blob_to_vec(&b)),
                    embedding_model: r.get("embedding_model"),
                }
            })
            .collect())
    }
}
