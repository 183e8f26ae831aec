//! Named cache tiers and their storage backends.
//!
//! This module provides:
//! - The closed set of recognized tiers (static, dynamic, api)
//! - A `TierStore` trait so the store is injected, never ambient
//! - A durable SQLite backend and an in-memory backend
//!
//! Entries are keyed by normalized request key, written only for ok
//! responses, overwritten in place by later writes, and deleted only when
//! a whole tier is swept.

mod memory;
mod sqlite;
mod store;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{Tier, TierStore};
