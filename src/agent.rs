//! The long-running half of the layer: lifecycle bootstrap, the periodic
//! tier sweep, and dispatch of reconnect/push/click events.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::TierStore;
use crate::config::Config;
use crate::event::{spawn_connectivity_watcher, Event, EventHandler};
use crate::gateway::{FetchOutcome, Gateway};
use crate::http::{Origin, Request};
use crate::lifecycle;
use crate::notify::{self, descriptor_from_push, NotificationSink};
use crate::sync::{MutationStore, SyncEngine};

/// Owns the serving gateway, the sync engine, and the event loop.
///
/// A host application embeds this, routes its GET requests through
/// [`Agent::handle`], reports failed offline mutations to
/// [`Agent::sync`], and injects push/click events via [`Agent::sender`].
pub struct Agent<S, Q, O, K> {
  config: Config,
  base: Url,
  store: Arc<S>,
  queue: Arc<Q>,
  origin: O,
  gateway: Gateway<S, O>,
  sync: Arc<SyncEngine<Q, O>>,
  sink: K,
  events: EventHandler,
}

impl<S, Q, O, K> Agent<S, Q, O, K>
where
  S: TierStore + 'static,
  Q: MutationStore + 'static,
  O: Origin + Clone + 'static,
  K: NotificationSink,
{
  pub fn new(config: Config, store: Arc<S>, queue: Arc<Q>, origin: O, sink: K) -> Result<Self> {
    let base = Url::parse(&config.origin.url)
      .map_err(|e| eyre!("Failed to parse origin URL {}: {}", config.origin.url, e))?;

    let gateway = Gateway::new(store.clone(), origin.clone());
    let sync = Arc::new(SyncEngine::new(queue.clone(), origin.clone()));

    Ok(Self {
      config,
      base,
      store,
      queue,
      origin,
      gateway,
      sync,
      sink,
      events: EventHandler::new(),
    })
  }

  /// Serve one intercepted request.
  pub async fn handle(&self, request: &Request) -> Result<FetchOutcome> {
    self.gateway.handle(request).await
  }

  /// The sync engine, for enqueueing failed offline mutations.
  pub fn sync(&self) -> &SyncEngine<Q, O> {
    &self.sync
  }

  /// Sender for injecting push and click events.
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.events.sender()
  }

  /// Bootstrap the caches, then process events until shutdown.
  pub async fn run(&mut self) -> Result<()> {
    self.bootstrap().await;

    let _watcher = spawn_connectivity_watcher(
      self.origin.clone(),
      self.queue.clone(),
      self.base.clone(),
      self.config.probe_period(),
      self.events.sender(),
    );

    while let Some(event) = self.events.next().await {
      self.dispatch(event).await;
    }

    Ok(())
  }

  /// Install and, on success, activate and start the recurring sweep.
  ///
  /// An install failure is logged and leaves the previous static cache
  /// authoritative; activation stays deferred until a future successful
  /// install.
  async fn bootstrap(&self) {
    match lifecycle::install(&*self.store, &self.origin, &self.base).await {
      Ok(()) => {
        match lifecycle::activate(&*self.store) {
          Ok(swept) => info!(swept, "Cache tiers activated"),
          Err(error) => warn!(%error, "Activation sweep failed"),
        }
        lifecycle::spawn_sweep_task(self.store.clone(), self.config.sweep_period());
      }
      Err(error) => {
        warn!(%error, "Install prefetch failed; previous static cache stays authoritative");
      }
    }
  }

  /// Exactly one handler per event kind.
  async fn dispatch(&self, event: Event) {
    match event {
      Event::Reconnected(tag) => match self.sync.flush(tag).await {
        Ok(outcome) => debug!(tag = tag.as_str(), ?outcome, "Flush attempt finished"),
        Err(error) => warn!(tag = tag.as_str(), %error, "Flush attempt failed"),
      },
      Event::Push(payload) => {
        let descriptor = descriptor_from_push(&payload);
        self.sink.display(&descriptor);
      }
      Event::NotificationClick(action) => notify::handle_click(&self.sink, action.as_deref()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryStore, Tier};
  use crate::http::testing::FakeOrigin;
  use crate::lifecycle::PRECACHE_MANIFEST;
  use crate::notify::{NotificationDescriptor, ACTION_CLOSE};
  use crate::sync::{MemoryQueue, SyncTag};
  use serde_json::json;
  use std::sync::Mutex;

  #[derive(Default)]
  struct RecordingSink {
    displayed: Mutex<Vec<NotificationDescriptor>>,
    opened: Mutex<u32>,
  }

  impl NotificationSink for RecordingSink {
    fn display(&self, notification: &NotificationDescriptor) {
      self.displayed.lock().unwrap().push(notification.clone());
    }

    fn open_root(&self) {
      *self.opened.lock().unwrap() += 1;
    }
  }

  fn config() -> Config {
    serde_yaml::from_str("origin:\n  url: http://origin.test\n").unwrap()
  }

  fn agent(
    origin: Arc<FakeOrigin>,
  ) -> Agent<MemoryStore, MemoryQueue, Arc<FakeOrigin>, RecordingSink> {
    Agent::new(
      config(),
      Arc::new(MemoryStore::new()),
      Arc::new(MemoryQueue::new()),
      origin,
      RecordingSink::default(),
    )
    .unwrap()
  }

  fn origin_with_full_manifest() -> Arc<FakeOrigin> {
    let origin = Arc::new(FakeOrigin::new());
    for path in PRECACHE_MANIFEST {
      origin.reply_ok(path, "text/html", "shell");
    }
    origin
  }

  #[tokio::test]
  async fn test_bootstrap_installs_and_activates() {
    let agent = agent(origin_with_full_manifest());

    agent.bootstrap().await;

    assert_eq!(
      agent.store.len(Tier::Static).unwrap(),
      PRECACHE_MANIFEST.len()
    );
    assert_eq!(agent.store.tier_names().unwrap().len(), Tier::ALL.len());
  }

  #[tokio::test]
  async fn test_failed_install_defers_activation() {
    let origin = Arc::new(FakeOrigin::new());
    origin.set_offline(true);
    let agent = agent(origin);

    agent.bootstrap().await;

    // Nothing precached, nothing provisioned: the previous cache (here,
    // empty) stays authoritative and the gateway still serves fallbacks
    assert_eq!(agent.store.tier_names().unwrap().len(), 0);

    let request = Request::get("http://origin.test/api/categories").unwrap();
    let served = agent.handle(&request).await.unwrap().into_response().unwrap();
    assert_eq!(served.status, 503);
  }

  #[tokio::test]
  async fn test_reconnect_event_flushes_pending_batch() {
    let origin = Arc::new(FakeOrigin::new());
    let agent = agent(origin.clone());
    agent.sync().enqueue(SyncTag::Cart, json!({"sku": "a"})).unwrap();

    agent.dispatch(Event::Reconnected(SyncTag::Cart)).await;

    assert_eq!(origin.posts().len(), 1);
    assert_eq!(agent.sync().pending(SyncTag::Cart).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_push_event_displays_notification() {
    let agent = agent(Arc::new(FakeOrigin::new()));

    agent.dispatch(Event::Push(b"Flash sale".to_vec())).await;

    let displayed = agent.sink.displayed.lock().unwrap();
    assert_eq!(displayed.len(), 1);
    assert_eq!(displayed[0].body, "Flash sale");
  }

  #[tokio::test]
  async fn test_click_events_route_through_sink() {
    let agent = agent(Arc::new(FakeOrigin::new()));

    agent.dispatch(Event::NotificationClick(None)).await;
    agent
      .dispatch(Event::NotificationClick(Some(ACTION_CLOSE.to_string())))
      .await;

    assert_eq!(*agent.sink.opened.lock().unwrap(), 1);
  }
}
