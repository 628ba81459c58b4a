//! Task chain caching - store and recall proven tool sequences
//!
//! Successful tool chains are stored keyed by an embedding of the task
//! description. A new task that lands close enough to a stored one (cosine
//! similarity against an in-memory matrix of normalized embeddings) recalls
//! the chain and its realised cost. This is the mechanism behind tasks
//! getting cheaper over time.

mod embedder;

pub use embedder::{Embedder, HashEmbedder, EMBEDDING_DIMENSION};
#[cfg(feature = "fastembed")]
pub use embedder::FastEmbedder;

use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::trace::{EventType, TraceRecorder};
use crate::{Error, Result};

use embedder::{dot, l2_normalize};

/// One tool invocation within a cached chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSpec {
    pub name: String,
    pub input: serde_json::Value,
}

/// A cached tool chain from a previously successful task
#[derive(Debug, Clone)]
pub struct CachedChain {
    pub task_description: String,
    pub tool_chain: Vec<ToolCallSpec>,
    pub files_modified: Vec<String>,
    pub cost_usd: f64,
    pub hit_count: i64,
    pub similarity: f32,
}

/// In-memory search index; rows stay in lockstep with the table
struct EmbeddingIndex {
    ids: Vec<i64>,
    embeddings: Vec<Vec<f32>>,
}

/// Persistent similarity-keyed store of successful tool chains.
///
/// One cache per process. All store/lookup work holds the index lock for its
/// full duration, so there is exactly one writer at a time and readers always
/// see the matrix consistent with the table.
pub struct TaskCache {
    config: CacheConfig,
    embedder: Arc<dyn Embedder>,
    trace: Option<Arc<TraceRecorder>>,
    pool: SqlitePool,
    index: tokio::sync::Mutex<EmbeddingIndex>,
}

impl TaskCache {
    /// Open (or create) the cache database and rebuild the in-memory index
    pub async fn open(
        config: CacheConfig,
        embedder: Arc<dyn Embedder>,
        trace: Option<Arc<TraceRecorder>>,
    ) -> Result<Self> {
        if let Some(parent) = Path::new(&config.db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS task_chains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_description TEXT NOT NULL,
                tool_chain TEXT NOT NULL,
                files_modified TEXT NOT NULL,
                cost_usd REAL,
                hit_count INTEGER DEFAULT 0,
                embedding BLOB
            )",
        )
        .execute(&pool)
        .await?;

        // Crash-safety is best-effort: the index is rebuilt from the table
        let mut index = EmbeddingIndex {
            ids: Vec::new(),
            embeddings: Vec::new(),
        };
        let rows = sqlx::query("SELECT id, embedding FROM task_chains ORDER BY id")
            .fetch_all(&pool)
            .await?;
        for row in rows {
            let blob: Option<Vec<u8>> = row.get("embedding");
            if let Some(blob) = blob {
                index.ids.push(row.get("id"));
                index.embeddings.push(decode_embedding(&blob));
            }
        }
        info!(
            "Task cache open at {} ({} entries)",
            config.db_path,
            index.ids.len()
        );

        Ok(TaskCache {
            config,
            embedder,
            trace,
            pool,
            index: tokio::sync::Mutex::new(index),
        })
    }

    /// Search for a cached chain similar to the given task.
    ///
    /// Returns at most one chain. A hit bumps the stored hit count and emits
    /// a cache_hit event with the saved cost; anything else emits cache_miss.
    pub async fn lookup(&self, task: &str) -> Result<Option<CachedChain>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let query = self.embed(task).await?;
        let index = self.index.lock().await;

        if index.embeddings.is_empty() {
            self.record(
                EventType::CacheMiss,
                json!({"task": truncate(task, 100), "entries": 0}),
            );
            return Ok(None);
        }

        let (best_idx, best_score) = index
            .embeddings
            .iter()
            .map(|e| dot(e, &query))
            .enumerate()
            .fold((0, f32::MIN), |best, (i, score)| {
                if score > best.1 {
                    (i, score)
                } else {
                    best
                }
            });

        if best_score < self.config.similarity_threshold {
            self.record(
                EventType::CacheMiss,
                json!({
                    "task": truncate(task, 100),
                    "best_score": round3(best_score),
                    "threshold": self.config.similarity_threshold,
                }),
            );
            return Ok(None);
        }

        let chain_id = index.ids[best_idx];
        let Some(row) = sqlx::query(
            "SELECT task_description, tool_chain, files_modified, cost_usd, hit_count
             FROM task_chains WHERE id = ?",
        )
        .bind(chain_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        sqlx::query("UPDATE task_chains SET hit_count = hit_count + 1 WHERE id = ?")
            .bind(chain_id)
            .execute(&self.pool)
            .await?;

        let hit_count: i64 = row.get::<i64, _>("hit_count") + 1;
        let cached = CachedChain {
            task_description: row.get("task_description"),
            tool_chain: serde_json::from_str(row.get::<String, _>("tool_chain").as_str())?,
            files_modified: serde_json::from_str(row.get::<String, _>("files_modified").as_str())?,
            cost_usd: row.get::<Option<f64>, _>("cost_usd").unwrap_or(0.0),
            hit_count,
            similarity: best_score,
        };

        self.record(
            EventType::CacheHit,
            json!({
                "task": truncate(task, 100),
                "matched_task": truncate(&cached.task_description, 100),
                "similarity": round3(best_score),
                "hit_count": hit_count,
                "saved_cost": cached.cost_usd,
            }),
        );
        info!(
            "Cache hit ({:.2}): '{}' matched '{}'",
            best_score,
            truncate(task, 50),
            truncate(&cached.task_description, 50)
        );

        Ok(Some(cached))
    }

    /// Cache a successful tool chain for future reuse.
    ///
    /// At capacity, the entry with the lowest hit count (ties broken by
    /// lowest id) is evicted, and its index row is dropped in the same
    /// critical section.
    pub async fn store(
        &self,
        task: &str,
        tool_chain: &[ToolCallSpec],
        files_modified: &[String],
        cost_usd: f64,
    ) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        let embedding = self.embed(task).await?;
        let mut index = self.index.lock().await;

        let count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM task_chains")
            .fetch_one(&self.pool)
            .await?
            .get("n");

        if count >= self.config.max_entries {
            if let Some(row) =
                sqlx::query("SELECT id FROM task_chains ORDER BY hit_count ASC, id ASC LIMIT 1")
                    .fetch_optional(&self.pool)
                    .await?
            {
                let evict_id: i64 = row.get("id");
                sqlx::query("DELETE FROM task_chains WHERE id = ?")
                    .bind(evict_id)
                    .execute(&self.pool)
                    .await?;
                if let Some(pos) = index.ids.iter().position(|id| *id == evict_id) {
                    index.ids.remove(pos);
                    index.embeddings.remove(pos);
                }
                debug!("Evicted cached chain {}", evict_id);
            }
        }

        let result = sqlx::query(
            "INSERT INTO task_chains
                (task_description, tool_chain, files_modified, cost_usd, hit_count, embedding)
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(task)
        .bind(serde_json::to_string(tool_chain)?)
        .bind(serde_json::to_string(files_modified)?)
        .bind(cost_usd)
        .bind(encode_embedding(&embedding))
        .execute(&self.pool)
        .await?;

        index.ids.push(result.last_insert_rowid());
        index.embeddings.push(embedding);

        debug!("Cached tool chain for: {}", truncate(task, 80));
        Ok(())
    }

    /// Number of cached entries
    pub async fn size(&self) -> Result<i64> {
        Ok(sqlx::query("SELECT COUNT(*) AS n FROM task_chains")
            .fetch_one(&self.pool)
            .await?
            .get("n"))
    }

    /// Total cache hits across all entries
    pub async fn total_hits(&self) -> Result<i64> {
        Ok(
            sqlx::query("SELECT COALESCE(SUM(hit_count), 0) AS n FROM task_chains")
                .fetch_one(&self.pool)
                .await?
                .get("n"),
        )
    }

    /// Embed off the async thread and normalize so dot product = cosine
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = self.embedder.clone();
        let text = text.to_string();
        let v = tokio::task::spawn_blocking(move || embedder.embed(&text))
            .await
            .map_err(|e| Error::Internal(format!("Embedding task failed: {e}")))??;
        Ok(l2_normalize(v))
    }

    fn record(&self, event_type: EventType, data: serde_json::Value) {
        if let Some(trace) = &self.trace {
            trace.record(event_type, data);
        }
    }
}

fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn round3(x: f32) -> f64 {
    (x as f64 * 1000.0).round() / 1000.0
}
