//! Durable conversation history.
//!
//! Turns live in an append-only SQLite table keyed by `(store, session_id)`
//! and ordered by a per-session sequence number assigned transactionally.
//! A process restart followed by [`SessionStore::load`] returns every turn
//! previously appended, in original order.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use thiserror::Error;

use crate::db;
use crate::migrate;
use crate::models::{Role, Turn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session store error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("failed to open session store: {0}")]
    Open(String),

    #[error("corrupt turn row: {0}")]
    Corrupt(String),
}

/// Handle to the persistent session store.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    store: String,
}

impl SessionStore {
    /// Open (creating if necessary) the session database at `path` and
    /// scope all operations to `store`.
    pub async fn open(path: &Path, store: impl Into<String>) -> Result<Self, StoreError> {
        let pool = db::connect(path)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;
        migrate::ensure_session_schema(&pool)
            .await
            .map_err(|e| StoreError::Open(e.to_string()))?;

        Ok(Self {
            pool,
            store: store.into(),
        })
    }

    /// Wrap an already-open pool (tests).
    pub fn with_pool(pool: SqlitePool, store: impl Into<String>) -> Self {
        Self {
            pool,
            store: store.into(),
        }
    }

    /// Append one turn, assigning the next sequence number for the session.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let next_seq: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM turns WHERE store = ? AND session_id = ?",
        )
        .bind(&self.store)
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO turns (store, session_id, seq, role, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&self.store)
        .bind(session_id)
        .bind(next_seq)
        .bind(role.as_str())
        .bind(content)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Load every turn of the session in append order.
    pub async fn load(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT seq, role, content, created_at
            FROM turns
            WHERE store = ? AND session_id = ?
            ORDER BY seq
            "#,
        )
        .bind(&self.store)
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role_str: String = row.get("role");
                let role = Role::parse(&role_str)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown role '{}'", role_str)))?;
                let created_at: i64 = row.get("created_at");

                Ok(Turn {
                    session_id: session_id.to_string(),
                    seq: row.get("seq"),
                    role,
                    content: row.get("content"),
                    created_at: DateTime::<Utc>::from_timestamp(created_at, 0)
                        .unwrap_or_else(Utc::now),
                })
            })
            .collect()
    }
}
