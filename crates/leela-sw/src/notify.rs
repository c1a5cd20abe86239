//! Push payloads and shown notifications.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::{Result, ServiceWorkerError};

const ICON: &str = "/icon-192x192.png";
const BADGE: &str = "/icon-72x72.png";

/// Action id that opens the notification's URL.
pub const OPEN_ACTION: &str = "open";
pub const CLOSE_ACTION: &str = "close";

/// JSON body of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl PushPayload {
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| ServiceWorkerError::InvalidPayload(e.to_string()))
    }
}

/// Unique identifier for a shown notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NotificationId(u64);

impl NotificationId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
    pub icon: String,
}

/// A shown system notification.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// URL to open from the `open` action.
    pub data: Option<String>,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Build the notification shown for a push payload.
    pub fn from_push(payload: PushPayload) -> Self {
        let action = |action: &str, title: &str| NotificationAction {
            action: action.to_string(),
            title: title.to_string(),
            icon: ICON.to_string(),
        };

        Self {
            id: NotificationId::new(),
            title: payload.title,
            body: payload.body,
            icon: ICON.to_string(),
            badge: BADGE.to_string(),
            data: payload.url,
            actions: vec![action(OPEN_ACTION, "Open"), action(CLOSE_ACTION, "Close")],
        }
    }
}

/// Notifications currently on screen.
#[derive(Debug, Default)]
pub struct Notifications {
    shown: HashMap<NotificationId, Notification>,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, notification: Notification) -> NotificationId {
        let id = notification.id;
        self.shown.insert(id, notification);
        id
    }

    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.shown.get(&id)
    }

    /// Close a notification, returning it.
    pub fn close(&mut self, id: NotificationId) -> Option<Notification> {
        self.shown.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }
}
