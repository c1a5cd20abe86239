//! Install and activate phases.

use std::time::Instant;

use futures::future::join_all;
use leela_net::{CacheMode, Fetcher, Request, RequestMode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::CacheStorage;
use crate::clients::Clients;
use crate::config::{CacheRole, WorkerConfig};

// ==================== State ====================

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ServiceWorkerState {
    /// Initial state, nothing run yet.
    #[default]
    Parsed,
    /// Installing (install event).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (activate event).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Replaced by a newer worker.
    Redundant,
}

/// Lifecycle bookkeeping for one worker.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    pub state: ServiceWorkerState,
    /// Activate as soon as installed instead of waiting for pages to close.
    pub skip_waiting: bool,
    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: ServiceWorkerState::Parsed,
            skip_waiting: false,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        debug!(from = ?self.state, to = ?state, "Worker state change");
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== Install ====================

/// A manifest entry that made it into its partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedAsset {
    pub role: CacheRole,
    pub url: String,
}

/// A manifest entry that could not be cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAsset {
    pub role: CacheRole,
    pub url: String,
    pub reason: String,
}

/// Outcome of the install phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallReport {
    pub cached: Vec<CachedAsset>,
    pub failed: Vec<FailedAsset>,
}

impl InstallReport {
    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// URLs cached for one role.
    pub fn cached_for(&self, role: CacheRole) -> Vec<&str> {
        self.cached
            .iter()
            .filter(|a| a.role == role)
            .map(|a| a.url.as_str())
            .collect()
    }
}

/// HTTP cache and CORS options used to pre-fetch a role's manifest entries.
fn prefetch_options(role: CacheRole) -> (CacheMode, RequestMode) {
    match role {
        CacheRole::Static => (CacheMode::NoCache, RequestMode::SameOrigin),
        CacheRole::Images => (CacheMode::ForceCache, RequestMode::SameOrigin),
        CacheRole::Fonts => (CacheMode::ForceCache, RequestMode::Cors),
        CacheRole::Dynamic | CacheRole::Api => (CacheMode::Default, RequestMode::SameOrigin),
    }
}

/// Pre-populate the static, image and font partitions from the manifest.
///
/// Every entry is fetched concurrently. A failed entry is recorded and
/// skipped; the phase itself never fails.
pub async fn install<F: Fetcher>(
    fetcher: &F,
    storage: &CacheStorage,
    config: &WorkerConfig,
) -> InstallReport {
    info!(version = %config.version, assets = config.manifest.len(), "Installing");

    let mut attempts = Vec::with_capacity(config.manifest.len());
    for (role, assets) in config.manifest.entries() {
        let cache_name = config.cache_name(role);
        storage.open(&cache_name).await;

        for asset in assets {
            attempts.push(cache_asset(fetcher, storage, config, role, cache_name.clone(), asset));
        }
    }

    let mut report = InstallReport::default();
    for outcome in join_all(attempts).await {
        match outcome {
            Ok(asset) => report.cached.push(asset),
            Err(asset) => report.failed.push(asset),
        }
    }

    info!(
        cached = report.cached_count(),
        failed = report.failed_count(),
        "Installation completed"
    );
    report
}

async fn cache_asset<F: Fetcher>(
    fetcher: &F,
    storage: &CacheStorage,
    config: &WorkerConfig,
    role: CacheRole,
    cache_name: String,
    asset: &str,
) -> Result<CachedAsset, FailedAsset> {
    let failed = |reason: String| {
        warn!(role = ?role, url = %asset, reason = %reason, "Failed to cache asset");
        FailedAsset {
            role,
            url: asset.to_string(),
            reason,
        }
    };

    let url = config.resolve(asset).map_err(|e| failed(e.to_string()))?;
    let (cache_mode, mode) = prefetch_options(role);
    let request = Request::get(url).cache_mode(cache_mode).mode(mode);

    let response = fetcher
        .fetch(request.clone())
        .await
        .map_err(|e| failed(e.to_string()))?;
    if !response.ok() {
        return Err(failed(format!("status {}", response.status)));
    }

    if !storage.put(&cache_name, &request, &response).await {
        return Err(failed("response is not cacheable".to_string()));
    }
    debug!(role = ?role, url = %asset, "Cached asset");

    Ok(CachedAsset {
        role,
        url: asset.to_string(),
    })
}

// ==================== Activate ====================

/// Outcome of the activate phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ActivationReport {
    /// Partitions removed because they belong to another version.
    pub deleted: Vec<String>,
    /// Clients now controlled by this worker.
    pub claimed: usize,
}

/// Delete partitions outside the allow-list, then claim every client.
pub async fn activate(
    storage: &CacheStorage,
    config: &WorkerConfig,
    clients: &mut Clients,
) -> ActivationReport {
    let allow_list = config.allow_list();

    let stale: Vec<String> = storage
        .keys()
        .await
        .into_iter()
        .filter(|name| !allow_list.contains(name))
        .collect();

    let mut deleted = Vec::with_capacity(stale.len());
    for name in stale {
        if storage.delete(&name).await {
            info!(cache = %name, "Deleting old cache");
            deleted.push(name);
        }
    }

    let claimed = clients.claim();
    info!(deleted = deleted.len(), claimed, "Activated");

    ActivationReport { deleted, claimed }
}
