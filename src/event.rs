//! External signals driving the agent: reconnects, pushes, clicks.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use crate::http::{Origin, Request};
use crate::sync::{MutationStore, SyncTag};

/// Events the layer reacts to outside the request path.
#[derive(Debug)]
pub enum Event {
  /// Connectivity restored with a batch pending for this tag
  Reconnected(SyncTag),
  /// Inbound push payload (plain text body)
  Push(Vec<u8>),
  /// Click on a displayed notification, with its action if any
  NotificationClick(Option<String>),
}

/// Event source backed by an unbounded channel. The connectivity watcher
/// feeds it reconnect signals; the host feeds it pushes and clicks via
/// [`EventHandler::sender`].
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Sender for injecting events from outside the agent.
  pub fn sender(&self) -> mpsc::UnboundedSender<Event> {
    self.tx.clone()
  }

  /// Receive the next event.
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}

/// Probe the origin on a fixed period and emit a reconnect signal per
/// pending tag whenever connectivity comes back.
pub fn spawn_connectivity_watcher<Q, O>(
  origin: O,
  queue: Arc<Q>,
  base: Url,
  period: Duration,
  tx: mpsc::UnboundedSender<Event>,
) -> JoinHandle<()>
where
  Q: MutationStore + 'static,
  O: Origin + 'static,
{
  tokio::spawn(async move {
    let probe = match Request::get_on(&base, "/") {
      Ok(request) => request,
      Err(error) => {
        warn!(%error, "Connectivity watcher disabled");
        return;
      }
    };

    let mut online = true;
    loop {
      tokio::time::sleep(period).await;

      let now_online = origin.fetch(&probe).await.is_ok();
      if now_online && !online {
        debug!("Connectivity restored");
        for tag in SyncTag::ALL {
          match queue.len(tag) {
            Ok(0) => {}
            Ok(pending) => {
              debug!(tag = tag.as_str(), pending, "Signalling reconnect");
              if tx.send(Event::Reconnected(tag)).is_err() {
                return;
              }
            }
            Err(error) => warn!(tag = tag.as_str(), %error, "Failed to inspect pending queue"),
          }
        }
      }
      online = now_online;
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::http::testing::FakeOrigin;
  use crate::sync::MemoryQueue;
  use serde_json::json;

  #[tokio::test]
  async fn test_watcher_signals_pending_tags_on_reconnect() {
    let origin = Arc::new(FakeOrigin::new());
    origin.reply_ok("/", "text/html", "<html></html>");
    let queue = Arc::new(MemoryQueue::new());
    queue.enqueue(SyncTag::Cart, &json!({"sku": "a"})).unwrap();

    let mut events = EventHandler::new();
    let base = Url::parse("http://origin.test").unwrap();
    let handle = spawn_connectivity_watcher(
      origin.clone(),
      queue,
      base,
      Duration::from_millis(10),
      events.sender(),
    );

    // Go offline for at least one probe, then come back
    origin.set_offline(true);
    tokio::time::sleep(Duration::from_millis(40)).await;
    origin.set_offline(false);

    let event = tokio::time::timeout(Duration::from_millis(500), events.next())
      .await
      .expect("expected a reconnect signal");
    assert!(matches!(event, Some(Event::Reconnected(SyncTag::Cart))));

    handle.abort();
  }

  #[tokio::test]
  async fn test_watcher_is_silent_without_pending_batches() {
    let origin = Arc::new(FakeOrigin::new());
    origin.reply_ok("/", "text/html", "<html></html>");
    let queue = Arc::new(MemoryQueue::new());

    let mut events = EventHandler::new();
    let base = Url::parse("http://origin.test").unwrap();
    let handle = spawn_connectivity_watcher(
      origin.clone(),
      queue,
      base,
      Duration::from_millis(10),
      events.sender(),
    );

    origin.set_offline(true);
    tokio::time::sleep(Duration::from_millis(40)).await;
    origin.set_offline(false);

    let result = tokio::time::timeout(Duration::from_millis(100), events.next()).await;
    assert!(result.is_err(), "no event expected for empty queues");

    handle.abort();
  }
}
