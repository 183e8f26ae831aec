//! Cache tier names and the tier store trait.

use color_eyre::Result;

use crate::http::StoredResponse;

/// The recognized cache tiers. Tier names are a closed, fixed set; any
/// named tier outside this set is obsolete and gets swept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
  /// Immutable shell assets prefetched at install
  Static,
  /// Pages and images
  Dynamic,
  /// API responses
  Api,
}

impl Tier {
  pub const ALL: [Tier; 3] = [Tier::Static, Tier::Dynamic, Tier::Api];

  /// Versioned on-disk name. Bumping the version obsoletes the old tier,
  /// which the sweep then reclaims.
  pub fn name(&self) -> &'static str {
    match self {
      Tier::Static => "static-v1",
      Tier::Dynamic => "dynamic-v1",
      Tier::Api => "api-v1",
    }
  }

  /// Whether a stored tier name belongs to the recognized set.
  pub fn recognized(name: &str) -> bool {
    Tier::ALL.iter().any(|t| t.name() == name)
  }
}

/// Trait for tier storage backends.
///
/// Entries are keyed `(tier, request_key)`. `put` is last-write-wins and
/// idempotent; concurrent puts to distinct keys must not corrupt each
/// other, and deleting a tier while a put into it is in flight must leave
/// the store consistent.
pub trait TierStore: Send + Sync {
  /// Ensure a named tier exists. Obsolete names can be opened too; the
  /// sweep is what keeps the set closed.
  fn open_named(&self, name: &str) -> Result<()>;

  /// Look up a cached response by key.
  fn lookup(&self, tier: Tier, key: &str) -> Result<Option<StoredResponse>>;

  /// Write a response under a key, overwriting any previous entry.
  fn put(&self, tier: Tier, key: &str, response: &StoredResponse) -> Result<()>;

  /// Delete a whole tier by name. Returns whether it existed.
  fn delete_tier(&self, name: &str) -> Result<bool>;

  /// Names of every tier currently present.
  fn tier_names(&self) -> Result<Vec<String>>;

  /// Number of entries in a tier.
  fn len(&self, tier: Tier) -> Result<usize>;

  /// Ensure a recognized tier exists.
  fn open_tier(&self, tier: Tier) -> Result<()> {
    self.open_named(tier.name())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_recognized_set_is_closed() {
    for tier in Tier::ALL {
      assert!(Tier::recognized(tier.name()));
    }
    assert!(!Tier::recognized("static-v0"));
    assert!(!Tier::recognized("dynamic-v2"));
    assert!(!Tier::recognized(""));
  }
}
