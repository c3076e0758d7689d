//! Core data types shared across the indexing, retrieval, and chat pipeline.

use chrono::{DateTime, Utc};

/// A slice of the source document stored in the knowledge database.
///
/// Chunks are immutable once indexed; a forced re-load replaces the whole
/// collection rather than mutating rows in place.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// Identifier of the source document this chunk came from.
    pub source_id: String,
    /// Knowledge collection the chunk belongs to.
    pub collection: String,
    pub chunk_index: i64,
    pub text: String,
    /// SHA-256 content digest of `text`.
    pub hash: String,
}

/// A ranked passage returned by the retriever.
#[derive(Debug, Clone)]
pub struct RetrievedPassage {
    pub chunk_id: String,
    /// Source document title (falls back to the file name).
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub score: f64,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One persisted conversation turn.
///
/// Turns are append-only; `seq` is the only meaningful ordering within a
/// session.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub session_id: String,
    pub seq: i64,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
