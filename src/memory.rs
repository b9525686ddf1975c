//! Agentic memory: facts the agents themselves decide to keep about the user.
//!
//! Each store owns one table inside the shared sqlite file. The team leader
//! writes to `team_memories`, every member shares `agent_memories`.
use std::result::Result;
use std::str::FromStr;
use std::sync::Arc;

use adk_rust::prelude::*;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub const MEMORY_ADD_TOOL_NAME: &str = "memory_add";
pub const MEMORY_SEARCH_TOOL_NAME: &str = "memory_search";
pub const MEMORY_DELETE_TOOL_NAME: &str = "memory_delete";
pub const MEMORY_SEARCH_DEFAULT_LIMIT: usize = 5;
pub const MEMORY_SEARCH_MAX_LIMIT: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("invalid memory table name '{0}'")]
    InvalidTable(String),
    #[error("memory text cannot be empty")]
    EmptyText,
    #[error("memory '{0}' not found")]
    NotFound(String),
    #[error("memory database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub topics: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    pool: SqlitePool,
    table: String,
}

fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

fn memory_id(user_id: &str, text: &str) -> String {
    format!("{:x}", md5::compute(format!("{user_id}\u{0}{text}")))
}

fn normalize_topics(topics: &[String]) -> Vec<String> {
    let mut out = Vec::<String>::new();
    for topic in topics {
        let topic = topic.trim().to_lowercase();
        if !topic.is_empty() && !out.contains(&topic) {
            out.push(topic);
        }
    }
    out
}

/// Number of distinct query terms found in the memory text or its topics.
pub fn relevance_score(record: &MemoryRecord, query: &str) -> usize {
    let haystack = format!("{} {}", record.text, record.topics.join(" ")).to_lowercase();
    let mut terms = query
        .split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|term| term.len() > 2)
        .collect::<Vec<String>>();
    terms.sort();
    terms.dedup();
    terms.iter().filter(|term| haystack.contains(term.as_str())).count()
}

impl MemoryStore {
    pub async fn open(db_url: &str, table: &str) -> Result<Self, MemoryError> {
        let options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, table).await
    }

    pub async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self, MemoryError> {
        if !valid_table_name(table) {
            return Err(MemoryError::InvalidTable(table.to_string()));
        }

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL,
                topics TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )"
        ))
        .execute(&pool)
        .await?;

        tracing::debug!(table, "memory table ready");
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Stores a memory; remembering the same text twice refreshes it instead of duplicating.
    pub async fn remember(
        &self,
        user_id: &str,
        text: &str,
        topics: &[String],
    ) -> Result<String, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::EmptyText);
        }

        let id = memory_id(user_id, text);
        let now = Utc::now().to_rfc3339();
        let topics = serde_json::to_string(&normalize_topics(topics)).unwrap_or_else(|_| "[]".into());

        sqlx::query(&format!(
            "INSERT INTO {} (id, user_id, text, topics, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET topics = excluded.topics, updated_at = excluded.updated_at",
            self.table
        ))
        .bind(&id)
        .bind(user_id)
        .bind(text)
        .bind(&topics)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        tracing::debug!(table = %self.table, memory_id = %id, "memory stored");
        Ok(id)
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let rows = sqlx::query(&format!(
            "SELECT id, user_id, text, topics, created_at, updated_at
             FROM {} WHERE user_id = ?1 ORDER BY updated_at DESC, id ASC",
            self.table
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let topics: String = row.try_get("topics")?;
            records.push(MemoryRecord {
                id: row.try_get("id")?,
                user_id: row.try_get("user_id")?,
                text: row.try_get("text")?,
                topics: serde_json::from_str(&topics).unwrap_or_default(),
                created_at: row.try_get("created_at")?,
                updated_at: row.try_get("updated_at")?,
            });
        }
        Ok(records)
    }

    /// Returns memories ranked by term overlap with `query`. An empty query returns the most recent.
    pub async fn recall(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let records = self.list(user_id).await?;
        if query.trim().is_empty() {
            return Ok(records.into_iter().take(limit).collect());
        }

        let mut scored = records
            .into_iter()
            .map(|record| (relevance_score(&record, query), record))
            .filter(|(score, _)| *score > 0)
            .collect::<Vec<_>>();
        // list() is already newest first; a stable sort keeps that order within a score.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, r)| r).collect())
    }

    /// Rewrites one of `user_id`'s memories. The id follows the new text, so the
    /// returned id replaces `id`. Empty `topics` keeps the existing ones.
    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        text: &str,
        topics: &[String],
    ) -> Result<String, MemoryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(MemoryError::EmptyText);
        }

        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query(&format!(
            "SELECT topics, created_at FROM {} WHERE id = ?1 AND user_id = ?2",
            self.table
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(existing) = existing else {
            return Err(MemoryError::NotFound(id.to_string()));
        };
        let created_at: String = existing.try_get("created_at")?;
        let topics = if topics.is_empty() {
            existing.try_get::<String, _>("topics")?
        } else {
            serde_json::to_string(&normalize_topics(topics)).unwrap_or_else(|_| "[]".into())
        };

        sqlx::query(&format!(
            "DELETE FROM {} WHERE id = ?1 AND user_id = ?2",
            self.table
        ))
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        let new_id = memory_id(user_id, text);
        sqlx::query(&format!(
            "INSERT INTO {} (id, user_id, text, topics, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET topics = excluded.topics, updated_at = excluded.updated_at",
            self.table
        ))
        .bind(&new_id)
        .bind(user_id)
        .bind(text)
        .bind(&topics)
        .bind(&created_at)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(table = %self.table, old_id = %id, memory_id = %new_id, "memory updated");
        Ok(new_id)
    }

    /// Deletes one of `user_id`'s memories; other users' ids are reported as missing.
    pub async fn forget(&self, user_id: &str, id: &str) -> Result<(), MemoryError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE id = ?1 AND user_id = ?2",
            self.table
        ))
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(MemoryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn clear(&self, user_id: &str) -> Result<u64, MemoryError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?1", self.table))
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn string_list_arg(args: &Value, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn error_payload(err: impl std::fmt::Display) -> Value {
    json!({ "status": "error", "error": err.to_string() })
}

pub async fn memory_add_response(store: &MemoryStore, user_id: &str, args: &Value) -> Value {
    let text = args.get("memory").and_then(Value::as_str).unwrap_or_default();
    let topics = string_list_arg(args, "topics");
    let replaces = args.get("replaces_id").and_then(Value::as_str);

    let outcome = match replaces {
        Some(id) => store.update(user_id, id, text, &topics).await,
        None => store.remember(user_id, text, &topics).await,
    };
    match outcome {
        Ok(id) => json!({ "status": "ok", "id": id, "table": store.table() }),
        Err(err) => error_payload(err),
    }
}

pub async fn memory_search_response(store: &MemoryStore, user_id: &str, args: &Value) -> Value {
    let query = args.get("query").and_then(Value::as_str).unwrap_or_default();
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .map(|v| (v as usize).clamp(1, MEMORY_SEARCH_MAX_LIMIT))
        .unwrap_or(MEMORY_SEARCH_DEFAULT_LIMIT);

    match store.recall(user_id, query, limit).await {
        Ok(records) => json!({
            "status": "ok",
            "memories": records
                .iter()
                .map(|r| json!({ "id": r.id, "memory": r.text, "topics": r.topics }))
                .collect::<Vec<_>>(),
        }),
        Err(err) => error_payload(err),
    }
}

pub async fn memory_delete_response(store: &MemoryStore, user_id: &str, args: &Value) -> Value {
    let Some(id) = args.get("id").and_then(Value::as_str).map(str::trim) else {
        return error_payload("'id' is required for memory_delete");
    };
    match store.forget(user_id, id).await {
        Ok(()) => json!({ "status": "deleted", "id": id }),
        Err(err) => error_payload(err),
    }
}

/// Tools that let an agent curate its own memories for `user_id`.
pub fn build_memory_tools(store: Arc<MemoryStore>, user_id: &str) -> Vec<Arc<dyn Tool>> {
    let add_store = store.clone();
    let add_user = user_id.to_string();
    let memory_add = FunctionTool::new(
        MEMORY_ADD_TOOL_NAME,
        "Saves a durable fact about the user or their business. \
         Args: memory (required), topics ([string]), replaces_id (update an existing memory).",
        move |_ctx, args| {
            let store = add_store.clone();
            let user_id = add_user.clone();
            async move { Ok(memory_add_response(&store, &user_id, &args).await) }
        },
    );

    let search_store = store.clone();
    let search_user = user_id.to_string();
    let memory_search = FunctionTool::new(
        MEMORY_SEARCH_TOOL_NAME,
        "Looks up saved facts about the user. Args: query (empty lists recent memories), limit.",
        move |_ctx, args| {
            let store = search_store.clone();
            let user_id = search_user.clone();
            async move { Ok(memory_search_response(&store, &user_id, &args).await) }
        },
    );

    let delete_user = user_id.to_string();
    let memory_delete = FunctionTool::new(
        MEMORY_DELETE_TOOL_NAME,
        "Deletes a saved fact that is wrong or outdated. Args: id (required).",
        move |_ctx, args| {
            let store = store.clone();
            let user_id = delete_user.clone();
            async move { Ok(memory_delete_response(&store, &user_id, &args).await) }
        },
    );

    vec![
        Arc::new(memory_add),
        Arc::new(memory_search),
        Arc::new(memory_delete),
    ]
}
