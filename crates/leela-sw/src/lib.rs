//! # Leela Service Worker
//!
//! Offline asset cache worker for the Leela site.
//!
//! ## Features
//!
//! - **Lifecycle**: install (manifest pre-caching), activate (old version
//!   cleanup, client claim), skip-waiting
//! - **Routing**: network-first, cache-first and stale-while-revalidate
//!   strategies chosen from URL patterns and the `Accept` header
//! - **Offline fallback**: cached shell document or a synthesized page
//! - **Janitor**: periodic size bounding of every partition
//! - **Push**: notifications and notification clicks
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorker::dispatch(WorkerEvent)
//!     │
//!     ├── Install ──────► lifecycle::install ──► Fetcher + CacheStorage
//!     ├── Activate ─────► lifecycle::activate ─► CacheStorage + Clients
//!     │                        └── spawn_janitor (until retire)
//!     ├── Fetch ────────► RouteRules::classify
//!     │                        └── Strategies (network-first, cache-first,
//!     │                            stale-while-revalidate, offline fallback)
//!     ├── Push / NotificationClick ──► Notifications + Clients
//!     └── Message (SKIP_WAITING)
//!
//! CacheStorage
//!     └── Cache (static-<v>, dynamic-<v>, images-<v>, fonts-<v>, api-<v>)
//!             └── CacheKey → Response (insertion ordered)
//! ```

use leela_net::NetError;
use thiserror::Error;

pub mod background;
pub mod cache;
pub mod clients;
pub mod config;
pub mod janitor;
pub mod lifecycle;
pub mod notify;
pub mod offline;
pub mod router;
pub mod strategy;
pub mod worker;

pub use background::BackgroundTasks;
pub use cache::{Cache, CacheEntry, CacheKey, CacheStorage};
pub use clients::{Client, Clients};
pub use config::{AssetManifest, CacheRole, JanitorConfig, OfflineConfig, WorkerConfig};
pub use janitor::{spawn_janitor, sweep, SweepReport};
pub use lifecycle::{ActivationReport, InstallReport, Lifecycle, ServiceWorkerState};
pub use notify::{Notification, NotificationAction, NotificationId, Notifications, PushPayload};
pub use router::{PatternType, Route, RouteRule, RouteRules, Strategy, UrlPattern};
pub use strategy::Strategies;
pub use worker::{EventOutcome, ServiceWorker, WorkerEvent};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug)]
pub enum ServiceWorkerError {
    /// A fetch rejected and nothing could stand in for it.
    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;
