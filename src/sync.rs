//! Deferred synchronization of mutations that failed while offline.
//!
//! Each sync tag owns one durable, position-ordered batch. The host
//! enqueues a failed cart/order write; a reconnect signal flushes the
//! batch to the tag's sync endpoint. A batch is cleared only after an ok
//! replay; on any failure it stays put and the next reconnect retries.
//! There is no self-managed backoff.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::http::Origin;

/// Identifier binding a reconnect signal to a pending mutation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTag {
  Cart,
  Order,
}

impl SyncTag {
  pub const ALL: [SyncTag; 2] = [SyncTag::Cart, SyncTag::Order];

  pub fn as_str(&self) -> &'static str {
    match self {
      SyncTag::Cart => "cart-sync",
      SyncTag::Order => "order-sync",
    }
  }

  /// Endpoint the batch is replayed to.
  pub fn endpoint(&self) -> &'static str {
    match self {
      SyncTag::Cart => "/api/cart/sync",
      SyncTag::Order => "/api/orders/sync",
    }
  }
}

/// Durable storage for pending mutation batches.
pub trait MutationStore: Send + Sync {
  /// Append an item to the tag's batch, preserving order.
  fn enqueue(&self, tag: SyncTag, item: &Value) -> Result<()>;

  /// Load the whole batch in enqueue order.
  fn load(&self, tag: SyncTag) -> Result<Vec<Value>>;

  /// Drop the batch after a confirmed replay.
  fn clear(&self, tag: SyncTag) -> Result<()>;

  /// Number of queued items for the tag.
  fn len(&self, tag: SyncTag) -> Result<usize>;
}

/// SQLite-backed mutation store.
pub struct SqliteQueue {
  conn: Mutex<Connection>,
}

/// Schema for the pending mutation table.
const QUEUE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS pending_mutations (
    tag TEXT NOT NULL,
    position INTEGER NOT NULL,
    payload TEXT NOT NULL,
    queued_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (tag, position)
);
"#;

impl SqliteQueue {
  /// Open or create the queue at a specific path. Shares the cache
  /// database file in the default layout; the tables are disjoint.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create queue directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open queue database at {}: {}", path.display(), e))?;

    let queue = Self {
      conn: Mutex::new(conn),
    };
    queue.run_migrations()?;

    Ok(queue)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(QUEUE_SCHEMA)
      .map_err(|e| eyre!("Failed to run queue migrations: {}", e))?;

    Ok(())
  }
}

impl MutationStore for SqliteQueue {
  fn enqueue(&self, tag: SyncTag, item: &Value) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let payload =
      serde_json::to_string(item).map_err(|e| eyre!("Failed to serialize mutation: {}", e))?;

    conn
      .execute(
        "INSERT INTO pending_mutations (tag, position, payload)
         VALUES (?1, (SELECT COALESCE(MAX(position) + 1, 0) FROM pending_mutations WHERE tag = ?1), ?2)",
        params![tag.as_str(), payload],
      )
      .map_err(|e| eyre!("Failed to enqueue mutation: {}", e))?;

    Ok(())
  }

  fn load(&self, tag: SyncTag) -> Result<Vec<Value>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT payload FROM pending_mutations WHERE tag = ? ORDER BY position")
      .map_err(|e| eyre!("Failed to prepare queue query: {}", e))?;

    let payloads: Vec<String> = stmt
      .query_map(params![tag.as_str()], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query queue: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    payloads
      .iter()
      .map(|p| serde_json::from_str(p).map_err(|e| eyre!("Failed to parse queued mutation: {}", e)))
      .collect()
  }

  fn clear(&self, tag: SyncTag) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM pending_mutations WHERE tag = ?",
        params![tag.as_str()],
      )
      .map_err(|e| eyre!("Failed to clear queue: {}", e))?;

    Ok(())
  }

  fn len(&self, tag: SyncTag) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM pending_mutations WHERE tag = ?",
        params![tag.as_str()],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count queue: {}", e))?;

    Ok(count as usize)
  }
}

/// Mutation store that keeps batches in process memory. Used in tests;
/// anything queued here does not survive a restart.
#[derive(Default)]
pub struct MemoryQueue {
  batches: Mutex<HashMap<SyncTag, Vec<Value>>>,
}

impl MemoryQueue {
  pub fn new() -> Self {
    Self::default()
  }
}

impl MutationStore for MemoryQueue {
  fn enqueue(&self, tag: SyncTag, item: &Value) -> Result<()> {
    let mut batches = self
      .batches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    batches.entry(tag).or_default().push(item.clone());
    Ok(())
  }

  fn load(&self, tag: SyncTag) -> Result<Vec<Value>> {
    let batches = self
      .batches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(batches.get(&tag).cloned().unwrap_or_default())
  }

  fn clear(&self, tag: SyncTag) -> Result<()> {
    let mut batches = self
      .batches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    batches.remove(&tag);
    Ok(())
  }

  fn len(&self, tag: SyncTag) -> Result<usize> {
    let batches = self
      .batches
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(batches.get(&tag).map(Vec::len).unwrap_or(0))
  }
}

/// Outcome of one flush attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
  /// Batch replayed and cleared
  Flushed(usize),
  /// Nothing pending for this tag
  Idle,
  /// Another flush for this tag is already running
  InFlight,
  /// Replay failed; batch kept for the next reconnect signal
  Deferred,
}

/// Replays pending batches against the origin's sync endpoints.
pub struct SyncEngine<Q, O> {
  queue: Arc<Q>,
  origin: O,
  in_flight: Mutex<HashSet<SyncTag>>,
}

impl<Q: MutationStore, O: Origin> SyncEngine<Q, O> {
  pub fn new(queue: Arc<Q>, origin: O) -> Self {
    Self {
      queue,
      origin,
      in_flight: Mutex::new(HashSet::new()),
    }
  }

  /// Record a mutation that failed while offline.
  pub fn enqueue(&self, tag: SyncTag, item: Value) -> Result<()> {
    self.queue.enqueue(tag, &item)?;
    info!(tag = tag.as_str(), "Queued offline mutation");
    Ok(())
  }

  /// Number of items awaiting replay for a tag.
  pub fn pending(&self, tag: SyncTag) -> Result<usize> {
    self.queue.len(tag)
  }

  /// Attempt to replay the tag's batch. Concurrent signals for the same
  /// tag collapse into one attempt.
  pub async fn flush(&self, tag: SyncTag) -> Result<FlushOutcome> {
    {
      let mut in_flight = self
        .in_flight
        .lock()
        .map_err(|e| eyre!("Lock poisoned: {}", e))?;
      if !in_flight.insert(tag) {
        return Ok(FlushOutcome::InFlight);
      }
    }

    let outcome = self.try_flush(tag).await;

    if let Ok(mut in_flight) = self.in_flight.lock() {
      in_flight.remove(&tag);
    }

    outcome
  }

  async fn try_flush(&self, tag: SyncTag) -> Result<FlushOutcome> {
    let batch = self.queue.load(tag)?;
    if batch.is_empty() {
      return Ok(FlushOutcome::Idle);
    }

    let items = batch.len();
    match self.origin.post_json(tag.endpoint(), &Value::Array(batch)).await {
      Ok(response) if response.is_ok() => {
        self.queue.clear(tag)?;
        info!(tag = tag.as_str(), items, "Replayed deferred mutations");
        Ok(FlushOutcome::Flushed(items))
      }
      Ok(response) => {
        warn!(
          tag = tag.as_str(),
          status = response.status,
          "Sync endpoint rejected batch, keeping it"
        );
        Ok(FlushOutcome::Deferred)
      }
      Err(error) => {
        warn!(tag = tag.as_str(), %error, "Sync replay failed, keeping batch");
        Ok(FlushOutcome::Deferred)
      }
    }
  }
}
