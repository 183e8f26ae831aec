//! Push payloads turned into user-visible notifications, and click
//! routing back into the application.

use serde::Serialize;
use tracing::info;

/// Body used when a push payload arrives empty.
pub const DEFAULT_BODY: &str = "New updates are available in the store.";

pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

/// What gets displayed for one push event. Ephemeral; lives only for the
/// duration of display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationDescriptor {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibration: Vec<u32>,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// Build the descriptor for an inbound push payload. The payload is plain
/// text; anything non-text is rendered lossily rather than dropped.
pub fn descriptor_from_push(payload: &[u8]) -> NotificationDescriptor {
  let text = String::from_utf8_lossy(payload);
  let text = text.trim();
  let body = if text.is_empty() {
    DEFAULT_BODY.to_string()
  } else {
    text.to_string()
  };

  NotificationDescriptor {
    title: "Storefront".to_string(),
    body,
    icon: "/icons/icon-192.png".to_string(),
    badge: "/icons/icon-72.png".to_string(),
    vibration: vec![100, 50, 100],
    actions: vec![
      NotificationAction {
        action: ACTION_EXPLORE.to_string(),
        title: "Browse products".to_string(),
      },
      NotificationAction {
        action: ACTION_CLOSE.to_string(),
        title: "Close".to_string(),
      },
    ],
  }
}

/// Host-side surface for showing notifications and reopening the app.
pub trait NotificationSink: Send + Sync {
  fn display(&self, notification: &NotificationDescriptor);

  /// Open the application's root view.
  fn open_root(&self);
}

/// Sink that only logs. Default for the headless agent.
pub struct LogSink;

impl NotificationSink for LogSink {
  fn display(&self, notification: &NotificationDescriptor) {
    info!(body = %notification.body, "Displaying notification");
  }

  fn open_root(&self) {
    info!("Opening application root view");
  }
}

/// Route a notification click. The notification is already closed by the
/// time this runs; `close` does nothing further, `explore` and a default
/// tap both open the root view.
pub fn handle_click<K: NotificationSink>(sink: &K, action: Option<&str>) {
  match action {
    Some(ACTION_CLOSE) => {}
    _ => sink.open_root(),
  }
}
