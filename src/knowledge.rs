//! Document indexer: source document → chunks → FTS entries → vectors.
//!
//! Runs once at startup. Loading is skipped when the collection already
//! holds chunks, matching the original tool's behavior; `--force` clears
//! the collection and re-indexes, which is the sanctioned way to pick up
//! document changes.

use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::embedding::{vec_to_blob, Embedder};
use crate::extract::{extract_text, ExtractError};
use crate::models::Chunk;
use crate::provider::ProviderError;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("document {0} contains no extractable text")]
    EmptyDocument(String),

    #[error("embedding failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("knowledge store error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Outcome of a [`load`] call.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// True when the collection was already populated and nothing was done.
    pub skipped: bool,
    pub chunks_written: u64,
    pub embeddings_written: u64,
}

/// Index the configured source document into the knowledge database.
pub async fn load(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    config: &Config,
    force: bool,
) -> Result<LoadReport, LoadError> {
    let collection = &config.knowledge.collection;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
        .bind(collection)
        .fetch_one(pool)
        .await?;

    if existing > 0 && !force {
        tracing::info!(
            collection,
            chunks = existing,
            "collection already loaded, skipping (use --force to re-index)"
        );
        return Ok(LoadReport {
            skipped: true,
            ..Default::default()
        });
    }

    if existing > 0 {
        clear_collection(pool, collection).await?;
    }

    let document = &config.knowledge.document;
    let text = extract_text(document)?;

    let source_id = Uuid::new_v4().to_string();
    let chunks = chunk_document(&source_id, collection, &text, config.chunking.max_tokens);
    if chunks.is_empty() {
        return Err(LoadError::EmptyDocument(document.display().to_string()));
    }

    let title = document
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();

    store_document(pool, &source_id, collection, document, &title, &chunks).await?;

    let mut report = LoadReport {
        skipped: false,
        chunks_written: chunks.len() as u64,
        embeddings_written: 0,
    };

    if config.embedding.is_enabled() {
        report.embeddings_written =
            embed_chunks(pool, embedder, &chunks, config.embedding.batch_size).await?;
    } else {
        tracing::warn!("embedding provider disabled, collection is keyword-only");
    }

    tracing::info!(
        collection,
        chunks = report.chunks_written,
        embeddings = report.embeddings_written,
        "knowledge base loaded"
    );

    Ok(report)
}

/// Remove every row belonging to `collection` ahead of a forced re-index.
async fn clear_collection(pool: &SqlitePool, collection: &str) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM chunk_vectors WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks_fts WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM chunks WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE collection = ?")
        .bind(collection)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

async fn store_document(
    pool: &SqlitePool,
    source_id: &str,
    collection: &str,
    path: &std::path::Path,
    title: &str,
    chunks: &[Chunk],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO documents (id, collection, path, title, indexed_at, chunk_count)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(source_id)
    .bind(collection)
    .bind(path.display().to_string())
    .bind(title)
    .bind(chrono::Utc::now().timestamp())
    .bind(chunks.len() as i64)
    .execute(&mut *tx)
    .await?;

    for chunk in chunks {
        sqlx::query(
            r#"
            INSERT INTO chunks (id, source_id, collection, chunk_index, text, hash)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&chunk.id)
        .bind(&chunk.source_id)
        .bind(&chunk.collection)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO chunks_fts (chunk_id, collection, text) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(&chunk.collection)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await
}

/// Embed `chunks` in batches and store the vectors. Every chunk must end
/// up with a vector; a provider failure aborts the load.
async fn embed_chunks(
    pool: &SqlitePool,
    embedder: &dyn Embedder,
    chunks: &[Chunk],
    batch_size: usize,
) -> Result<u64, LoadError> {
    let mut written = 0u64;

    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;

        for (chunk, vector) in batch.iter().zip(vectors.iter()) {
            let blob = vec_to_blob(vector);
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, collection, model, dims, embedding)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    model = excluded.model,
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.collection)
            .bind(embedder.model())
            .bind(embedder.dims() as i64)
            .bind(&blob)
            .execute(pool)
            .await
            .map_err(LoadError::Storage)?;
            written += 1;
        }
    }

    Ok(written)
}
