//! The worker and its event dispatch.

use std::sync::Arc;

use bytes::Bytes;
use leela_net::{Fetcher, Request, Response};
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::background::BackgroundTasks;
use crate::cache::CacheStorage;
use crate::clients::{Client, Clients};
use crate::config::WorkerConfig;
use crate::janitor::spawn_janitor;
use crate::lifecycle::{self, ActivationReport, InstallReport, Lifecycle, ServiceWorkerState};
use crate::notify::{Notification, NotificationId, Notifications, PushPayload, OPEN_ACTION};
use crate::strategy::Strategies;
use crate::{Result, ServiceWorkerError};

/// Background sync tag for queued contact form submissions.
pub const CONTACT_FORM_SYNC: &str = "contact-form";

/// Control message that forces immediate activation.
pub const SKIP_WAITING_MESSAGE: &str = "SKIP_WAITING";

/// Lifecycle events delivered to the worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    Install,
    Activate,
    Fetch(Request),
    Sync {
        tag: String,
    },
    Push {
        data: Option<Bytes>,
    },
    NotificationClick {
        notification_id: NotificationId,
        action: Option<String>,
    },
    Message(JsonValue),
}

/// Result of handling one event.
#[derive(Debug)]
pub enum EventOutcome {
    Installed(InstallReport),
    Activated(ActivationReport),
    /// The fetch was not intercepted; the browser handles it natively.
    PassThrough,
    Response(Response),
    NotificationShown(NotificationId),
    WindowOpened(Client),
    Handled,
    Ignored,
}

/// The cache orchestration worker.
pub struct ServiceWorker<F> {
    config: Arc<WorkerConfig>,
    fetcher: Arc<F>,
    storage: CacheStorage,
    lifecycle: RwLock<Lifecycle>,
    clients: RwLock<Clients>,
    notifications: RwLock<Notifications>,
    background: BackgroundTasks,
    strategies: Strategies<F>,
    /// Periodic janitor, running while the worker is active.
    janitor: Mutex<Option<JoinHandle<()>>>,
}

impl<F: Fetcher> ServiceWorker<F> {
    /// Create a worker with fresh cache storage.
    pub fn new(config: WorkerConfig, fetcher: F) -> Result<Self> {
        Self::with_storage(config, fetcher, CacheStorage::new())
    }

    /// Create a worker over existing cache storage, e.g. the storage a
    /// previous worker version populated.
    pub fn with_storage(config: WorkerConfig, fetcher: F, storage: CacheStorage) -> Result<Self> {
        config.validate()?;

        let config = Arc::new(config);
        let fetcher = Arc::new(fetcher);
        let background = BackgroundTasks::new();
        let strategies = Strategies::new(
            Arc::clone(&fetcher),
            storage.clone(),
            Arc::clone(&config),
            background.clone(),
        );

        Ok(Self {
            config,
            fetcher,
            storage,
            lifecycle: RwLock::new(Lifecycle::new()),
            clients: RwLock::new(Clients::new()),
            notifications: RwLock::new(Notifications::new()),
            background,
            strategies,
            janitor: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn clients(&self) -> &RwLock<Clients> {
        &self.clients
    }

    pub fn notifications(&self) -> &RwLock<Notifications> {
        &self.notifications
    }

    pub fn strategies(&self) -> &Strategies<F> {
        &self.strategies
    }

    pub async fn state(&self) -> ServiceWorkerState {
        self.lifecycle.read().await.state
    }

    pub async fn skip_waiting_requested(&self) -> bool {
        self.lifecycle.read().await.skip_waiting
    }

    /// Route an event to its handler.
    pub async fn dispatch(&self, event: WorkerEvent) -> Result<EventOutcome> {
        match event {
            WorkerEvent::Install => self.install().await.map(EventOutcome::Installed),
            WorkerEvent::Activate => self.activate().await.map(EventOutcome::Activated),
            WorkerEvent::Fetch(request) => self.handle_fetch(request).await,
            WorkerEvent::Sync { tag } => Ok(self.handle_sync(&tag)),
            WorkerEvent::Push { data } => self.handle_push(data.as_deref()).await,
            WorkerEvent::NotificationClick {
                notification_id,
                action,
            } => {
                self.handle_notification_click(notification_id, action.as_deref())
                    .await
            }
            WorkerEvent::Message(message) => self.handle_message(&message).await,
        }
    }

    /// Install: pre-cache the manifest, then request skip-waiting.
    pub async fn install(&self) -> Result<InstallReport> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if lifecycle.state != ServiceWorkerState::Parsed {
                return Err(ServiceWorkerError::StateError(format!(
                    "cannot install from {:?}",
                    lifecycle.state
                )));
            }
            lifecycle.set_state(ServiceWorkerState::Installing);
        }

        let report = lifecycle::install(self.fetcher.as_ref(), &self.storage, &self.config).await;

        let mut lifecycle = self.lifecycle.write().await;
        lifecycle.set_state(ServiceWorkerState::Installed);
        lifecycle.skip_waiting = true;
        Ok(report)
    }

    /// Activate: drop other versions' partitions, claim all clients and start
    /// the janitor.
    pub async fn activate(&self) -> Result<ActivationReport> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            if lifecycle.state != ServiceWorkerState::Installed {
                return Err(ServiceWorkerError::StateError(format!(
                    "cannot activate from {:?}",
                    lifecycle.state
                )));
            }
            lifecycle.set_state(ServiceWorkerState::Activating);
        }

        let report = {
            let mut clients = self.clients.write().await;
            lifecycle::activate(&self.storage, &self.config, &mut clients).await
        };

        self.lifecycle
            .write()
            .await
            .set_state(ServiceWorkerState::Activated);
        self.start_janitor().await;
        Ok(report)
    }

    /// Mark this worker as replaced; it stops intercepting fetches and its
    /// janitor stops.
    pub async fn retire(&self) {
        self.lifecycle
            .write()
            .await
            .set_state(ServiceWorkerState::Redundant);
        if let Some(janitor) = self.janitor.lock().await.take() {
            janitor.abort();
            debug!("Janitor stopped");
        }
    }

    /// Classify and answer an intercepted request.
    pub async fn handle_fetch(&self, request: Request) -> Result<EventOutcome> {
        if self.lifecycle.read().await.is_redundant() {
            return Ok(EventOutcome::PassThrough);
        }

        match self.config.routes.classify(&request) {
            None => Ok(EventOutcome::PassThrough),
            Some(route) => self
                .strategies
                .respond(request, route)
                .await
                .map(EventOutcome::Response),
        }
    }

    /// Fetch and unwrap the response; a pass-through is an error here.
    pub async fn fetch(&self, request: Request) -> Result<Response> {
        let url = request.url.to_string();
        match self.handle_fetch(request).await? {
            EventOutcome::Response(response) => Ok(response),
            _ => Err(ServiceWorkerError::NotFound(format!(
                "{url} is not handled by the worker"
            ))),
        }
    }

    pub fn handle_sync(&self, tag: &str) -> EventOutcome {
        if tag == CONTACT_FORM_SYNC {
            info!(tag, "Syncing contact form data");
            EventOutcome::Handled
        } else {
            debug!(tag, "Ignoring unknown sync tag");
            EventOutcome::Ignored
        }
    }

    /// Show a notification for a push message. No payload, no notification.
    pub async fn handle_push(&self, data: Option<&[u8]>) -> Result<EventOutcome> {
        let Some(data) = data else {
            debug!("Push without payload ignored");
            return Ok(EventOutcome::Ignored);
        };

        let payload = PushPayload::from_slice(data)?;
        let notification = Notification::from_push(payload);
        info!(title = %notification.title, "Showing notification");

        let id = self.notifications.write().await.show(notification);
        Ok(EventOutcome::NotificationShown(id))
    }

    /// Close the notification; the `open` action opens its URL.
    pub async fn handle_notification_click(
        &self,
        id: NotificationId,
        action: Option<&str>,
    ) -> Result<EventOutcome> {
        let notification = self
            .notifications
            .write()
            .await
            .close(id)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("notification {id:?}")))?;

        if action != Some(OPEN_ACTION) {
            return Ok(EventOutcome::Handled);
        }

        let target = notification.data.as_deref().unwrap_or("/");
        let url = self
            .config
            .resolve(target)
            .map_err(|e| ServiceWorkerError::Client(e.to_string()))?;
        let client = self.clients.write().await.open_window(url);
        info!(url = %client.url, "Opened window from notification");
        Ok(EventOutcome::WindowOpened(client))
    }

    /// Handle a page message. `{"type": "SKIP_WAITING"}` activates an
    /// installed worker immediately.
    pub async fn handle_message(&self, message: &JsonValue) -> Result<EventOutcome> {
        if message.get("type").and_then(JsonValue::as_str) != Some(SKIP_WAITING_MESSAGE) {
            debug!(?message, "Ignoring unknown message");
            return Ok(EventOutcome::Ignored);
        }

        let installed = {
            let mut lifecycle = self.lifecycle.write().await;
            lifecycle.skip_waiting = true;
            lifecycle.state == ServiceWorkerState::Installed
        };

        if installed {
            self.activate().await.map(EventOutcome::Activated)
        } else {
            Ok(EventOutcome::Handled)
        }
    }

    async fn start_janitor(&self) {
        let handle = spawn_janitor(self.storage.clone(), self.config.janitor.clone());
        if let Some(previous) = self.janitor.lock().await.replace(handle) {
            previous.abort();
        }
        info!(interval_secs = self.config.janitor.interval_secs, "Janitor started");
    }

    /// Whether the periodic janitor is running.
    pub async fn janitor_running(&self) -> bool {
        self.janitor
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Background tasks still in flight.
    pub fn pending_background(&self) -> usize {
        self.background.pending()
    }

    /// Wait for detached revalidations to finish.
    pub async fn settle_background(&self) {
        self.background.settle().await;
        if self.background.pending() != 0 {
            warn!(pending = self.background.pending(), "Background tasks started while settling");
        }
    }
}

impl<F> Drop for ServiceWorker<F> {
    fn drop(&mut self) {
        if let Some(janitor) = self.janitor.get_mut().take() {
            janitor.abort();
        }
    }
}
