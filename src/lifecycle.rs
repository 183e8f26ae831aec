//! Tier provisioning, install-time prefetch, and obsolete-tier sweeping.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use url::Url;

use crate::cache::{Tier, TierStore};
use crate::http::{Origin, Request};
use crate::strategy::OFFLINE_PAGE_PATH;

/// Critical documents prefetched into the static tier at install.
pub const PRECACHE_MANIFEST: &[&str] = &[
  "/",
  "/index.html",
  OFFLINE_PAGE_PATH,
  "/manifest.json",
  "/icons/icon-192.png",
  "/icons/icon-512.png",
];

/// How often the resident sweep re-runs.
pub const SWEEP_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Prefetch the manifest into the static tier, all-or-nothing.
///
/// Every item is fetched before anything is written; one failed item
/// (transport or non-ok status) aborts the whole batch and leaves the
/// previous static cache authoritative. Re-running against a populated
/// tier overwrites in place.
pub async fn install<S: TierStore, O: Origin>(store: &S, origin: &O, base: &Url) -> Result<()> {
  let fetches = PRECACHE_MANIFEST.iter().map(|path| async move {
    let request = Request::get_on(base, path)?;
    let response = origin.fetch(&request).await?;
    if !response.is_ok() {
      return Err(eyre!(
        "Failed to prefetch {}: status {}",
        path,
        response.status
      ));
    }
    Ok((request.cache_key(), response))
  });

  let fetched = futures::future::try_join_all(fetches).await?;

  store.open_tier(Tier::Static)?;
  for (key, response) in &fetched {
    store.put(Tier::Static, key, response)?;
  }

  info!(items = fetched.len(), "Precached static shell");
  Ok(())
}

/// Provision the recognized tiers and sweep everything else. Runs at
/// activation; returns the number of tiers deleted.
pub fn activate<S: TierStore>(store: &S) -> Result<usize> {
  for tier in Tier::ALL {
    store.open_tier(tier)?;
  }
  sweep_obsolete(store)
}

/// Delete every tier whose name is outside the recognized set.
pub fn sweep_obsolete<S: TierStore>(store: &S) -> Result<usize> {
  let mut swept = 0;
  for name in store.tier_names()? {
    if !Tier::recognized(&name) && store.delete_tier(&name)? {
      info!(tier = %name, "Deleted obsolete cache tier");
      swept += 1;
    }
  }
  Ok(swept)
}

/// Spawn the recurring sweep. Resident only while this process lives; the
/// activation-time sweep covers whatever a recycled process missed.
pub fn spawn_sweep_task<S: TierStore + 'static>(
  store: Arc<S>,
  period: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    loop {
      tokio::time::sleep(period).await;
      match sweep_obsolete(&*store) {
        Ok(swept) if swept > 0 => info!(swept, "Periodic tier sweep completed"),
        Ok(_) => {}
        Err(error) => warn!(%error, "Periodic tier sweep failed"),
      }
    }
  })
}
