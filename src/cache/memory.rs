//! In-memory tier store.
//!
//! Non-persistent backend for tests and embedders that do not want a
//! database on disk. Per-tier maps keep tier deletion and concurrent puts
//! from stepping on each other.

use color_eyre::Result;
use dashmap::DashMap;

use super::store::{Tier, TierStore};
use crate::http::StoredResponse;

/// Tier store backed by nested concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
  tiers: DashMap<String, DashMap<String, StoredResponse>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl TierStore for MemoryStore {
  fn open_named(&self, name: &str) -> Result<()> {
    self.tiers.entry(name.to_string()).or_default();
    Ok(())
  }

  fn lookup(&self, tier: Tier, key: &str) -> Result<Option<StoredResponse>> {
    Ok(
      self
        .tiers
        .get(tier.name())
        .and_then(|entries| entries.get(key).map(|e| e.value().clone())),
    )
  }

  fn put(&self, tier: Tier, key: &str, response: &StoredResponse) -> Result<()> {
    self
      .tiers
      .entry(tier.name().to_string())
      .or_default()
      .insert(key.to_string(), response.clone());
    Ok(())
  }

  fn delete_tier(&self, name: &str) -> Result<bool> {
    Ok(self.tiers.remove(name).is_some())
  }

  fn tier_names(&self) -> Result<Vec<String>> {
    let mut names: Vec<String> = self.tiers.iter().map(|t| t.key().clone()).collect();
    names.sort();
    Ok(names)
  }

  fn len(&self, tier: Tier) -> Result<usize> {
    Ok(self.tiers.get(tier.name()).map(|e| e.len()).unwrap_or(0))
  }
}
