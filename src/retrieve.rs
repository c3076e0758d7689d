//! Keyword, vector, and hybrid retrieval over the knowledge database.
//!
//! Keyword search uses SQLite FTS5 (bm25 rank); vector search embeds the
//! query and cosine-ranks the stored blobs; hybrid min-max normalizes each
//! channel and fuses with an alpha weight over the union of candidates.
//! Because the union contains every keyword candidate, an exact lexical
//! match always survives into hybrid results.

use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::RetrievalConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, Embedder};
use crate::models::RetrievedPassage;
use crate::provider::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Keyword,
    Vector,
    Hybrid,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<SearchMode> {
        match s {
            "keyword" => Some(SearchMode::Keyword),
            "vector" => Some(SearchMode::Vector),
            "hybrid" => Some(SearchMode::Hybrid),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Keyword => "keyword",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// The collection holds no chunks at all. Callers may degrade to an
    /// empty context instead of failing the turn.
    #[error("knowledge index is empty")]
    EmptyIndex,

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("embedding failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("knowledge store error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Ranked retrieval over one knowledge collection.
pub struct Retriever {
    pool: SqlitePool,
    embedder: Arc<dyn Embedder>,
    collection: String,
    config: RetrievalConfig,
}

#[derive(Debug, Clone)]
struct ChunkCandidate {
    chunk_id: String,
    raw_score: f64,
}

impl Retriever {
    pub fn new(
        pool: SqlitePool,
        embedder: Arc<dyn Embedder>,
        collection: impl Into<String>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            pool,
            embedder,
            collection: collection.into(),
            config,
        }
    }

    /// Search the collection, returning at most `top_k` passages ranked by
    /// descending score.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        mode: SearchMode,
    ) -> Result<Vec<RetrievedPassage>, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery(
                "query text cannot be empty".to_string(),
            ));
        }

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;
        if total == 0 {
            return Err(SearchError::EmptyIndex);
        }

        let keyword_candidates = if mode != SearchMode::Vector {
            self.fetch_keyword_candidates(query, self.config.candidate_k_keyword)
                .await?
        } else {
            Vec::new()
        };

        let vector_candidates = if mode != SearchMode::Keyword {
            self.fetch_vector_candidates(query, self.config.candidate_k_vector)
                .await?
        } else {
            Vec::new()
        };

        if keyword_candidates.is_empty() && vector_candidates.is_empty() {
            return Ok(Vec::new());
        }

        let norm_keyword = normalize_scores(&keyword_candidates);
        let norm_vector = normalize_scores(&vector_candidates);

        let kw_map: HashMap<&str, f64> = norm_keyword
            .iter()
            .map(|(c, s)| (c.chunk_id.as_str(), *s))
            .collect();
        let vec_map: HashMap<&str, f64> = norm_vector
            .iter()
            .map(|(c, s)| (c.chunk_id.as_str(), *s))
            .collect();

        let alpha = match mode {
            SearchMode::Keyword => 0.0,
            SearchMode::Vector => 1.0,
            SearchMode::Hybrid => self.config.hybrid_alpha,
        };

        // Union of candidates from both channels.
        let mut fused: HashMap<String, f64> = HashMap::new();
        for c in keyword_candidates.iter().chain(vector_candidates.iter()) {
            fused.entry(c.chunk_id.clone()).or_insert_with(|| {
                let k = kw_map.get(c.chunk_id.as_str()).copied().unwrap_or(0.0);
                let v = vec_map.get(c.chunk_id.as_str()).copied().unwrap_or(0.0);
                (1.0 - alpha) * k + alpha * v
            });
        }

        let mut passages = self.hydrate(fused).await?;

        if self.config.min_score > 0.0 {
            passages.retain(|p| p.score >= self.config.min_score);
        }

        // Sort: score desc, chunk_index asc, id asc (deterministic)
        passages.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
                .then(a.chunk_id.cmp(&b.chunk_id))
        });
        passages.truncate(top_k);

        tracing::debug!(
            mode = mode.as_str(),
            results = passages.len(),
            "retrieval complete"
        );

        Ok(passages)
    }

    async fn fetch_keyword_candidates(
        &self,
        query: &str,
        candidate_k: i64,
    ) -> Result<Vec<ChunkCandidate>, SearchError> {
        let match_expr = fts_match_expr(query);
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT chunk_id, rank
            FROM chunks_fts
            WHERE collection = ? AND chunks_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&self.collection)
        .bind(&match_expr)
        .bind(candidate_k)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    raw_score: -rank, // bm25 rank is ascending-better; negate so higher = better
                }
            })
            .collect())
    }

    async fn fetch_vector_candidates(
        &self,
        query: &str,
        candidate_k: i64,
    ) -> Result<Vec<ChunkCandidate>, SearchError> {
        let query_vec = embed_query(self.embedder.as_ref(), query).await?;

        let rows = sqlx::query("SELECT chunk_id, embedding FROM chunk_vectors WHERE collection = ?")
            .bind(&self.collection)
            .fetch_all(&self.pool)
            .await?;

        let mut candidates: Vec<ChunkCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = blob_to_vec(&blob);
                ChunkCandidate {
                    chunk_id: row.get("chunk_id"),
                    raw_score: cosine_similarity(&query_vec, &vec) as f64,
                }
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.raw_score
                .partial_cmp(&a.raw_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(candidate_k as usize);

        Ok(candidates)
    }

    /// Attach text and provenance to the fused chunk ids.
    async fn hydrate(
        &self,
        fused: HashMap<String, f64>,
    ) -> Result<Vec<RetrievedPassage>, SearchError> {
        let mut passages = Vec::with_capacity(fused.len());

        for (chunk_id, score) in fused {
            let row = sqlx::query(
                r#"
                SELECT c.chunk_index, c.text, d.title
                FROM chunks c
                JOIN documents d ON d.id = c.source_id
                WHERE c.id = ?
                "#,
            )
            .bind(&chunk_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = row {
                passages.push(RetrievedPassage {
                    chunk_id,
                    source: row.get("title"),
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score,
                });
            }
        }

        Ok(passages)
    }
}

/// Build an FTS5 MATCH expression from free text: quoted alphanumeric
/// tokens joined with OR, so user punctuation never reaches the FTS parser
/// and partial matches still rank.
fn fts_match_expr(query: &str) -> String {
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();
    tokens.join(" OR ")
}

/// Min-max normalize raw scores to [0, 1] within one channel.
fn normalize_scores(candidates: &[ChunkCandidate]) -> Vec<(&ChunkCandidate, f64)> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let s_min = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::INFINITY, f64::min);
    let s_max = candidates
        .iter()
        .map(|c| c.raw_score)
        .fold(f64::NEG_INFINITY, f64::max);

    candidates
        .iter()
        .map(|c| {
            let norm = if (s_max - s_min).abs() < f64::EPSILON {
                1.0
            } else {
                (c.raw_score - s_min) / (s_max - s_min)
            };
            (c, norm)
        })
        .collect()
}
