//! Worker configuration.
//!
//! Everything here is fixed for the lifetime of a worker. Bumping
//! [`WorkerConfig::version`] renames every partition, and the next
//! activation deletes the old ones.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::router::RouteRules;
use crate::{Result, ServiceWorkerError};

/// Logical role of a cache partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheRole {
    /// Core shell assets pre-cached at install.
    Static,
    /// Runtime-fetched responses.
    Dynamic,
    Images,
    Fonts,
    Api,
}

impl CacheRole {
    pub const ALL: [CacheRole; 5] = [
        CacheRole::Static,
        CacheRole::Dynamic,
        CacheRole::Images,
        CacheRole::Fonts,
        CacheRole::Api,
    ];

    /// Partition name prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheRole::Static => "static",
            CacheRole::Dynamic => "dynamic",
            CacheRole::Images => "images",
            CacheRole::Fonts => "fonts",
            CacheRole::Api => "api",
        }
    }
}

/// URLs pre-cached at install time, per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetManifest {
    pub static_assets: Vec<String>,
    pub image_assets: Vec<String>,
    pub font_assets: Vec<String>,
}

impl AssetManifest {
    /// Manifest entries grouped by the partition they populate.
    pub fn entries(&self) -> [(CacheRole, &[String]); 3] {
        [
            (CacheRole::Static, &self.static_assets),
            (CacheRole::Images, &self.image_assets),
            (CacheRole::Fonts, &self.font_assets),
        ]
    }

    pub fn len(&self) -> usize {
        self.static_assets.len() + self.image_assets.len() + self.font_assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AssetManifest {
    fn default() -> Self {
        Self {
            static_assets: strings(&["/", "/manifest.json"]),
            image_assets: strings(&[
                "/src/assets/images/thai-massage.webp",
                "/src/assets/images/thai-massage.avif",
                "/src/assets/images/logo.webp",
                "/src/assets/images/logo.avif",
                "/src/assets/images/face.webp",
                "/src/assets/images/foot.webp",
                "/src/assets/images/oil.webp",
            ]),
            font_assets: strings(&[
                "https://fonts.gstatic.com/s/notosansjp/v52/-F6jfjtqLzI2JPCgQBnw7HFyzSD-AsregP8VFBEj75vY0rw-oME.woff2",
                "https://fonts.gstatic.com/s/notosansthai/v20/iJWnBXeUZi_OHPqn4wq6hQ2_hbJ1xyN9wd43SofNWcd1MKVQt_So_9CdU5RtpzF-QRvn.woff2",
            ]),
        }
    }
}

/// Janitor schedule and watermarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// A partition holding more entries than this gets trimmed.
    pub high_watermark: usize,
    /// Entry count a trimmed partition is reduced to.
    pub low_watermark: usize,
}

impl JanitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 24 * 60 * 60,
            high_watermark: 100,
            low_watermark: 50,
        }
    }
}

/// Offline fallback settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineConfig {
    /// Shell documents looked up in the static partition, in order.
    pub shell_documents: Vec<String>,
    /// Title of the synthesized offline page.
    pub title: String,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            shell_documents: strings(&["/index.html", "/"]),
            title: "Offline - Thai Massage Leelawadee".to_string(),
        }
    }
}

/// Complete worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Origin the worker is registered for.
    pub origin: Url,
    /// Version suffix of every partition name.
    pub version: String,
    pub manifest: AssetManifest,
    pub routes: RouteRules,
    pub janitor: JanitorConfig,
    pub offline: OfflineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost/").expect("static origin URL is valid"),
            version: "2025-v2".to_string(),
            manifest: AssetManifest::default(),
            routes: RouteRules::default(),
            janitor: JanitorConfig::default(),
            offline: OfflineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Default configuration for another origin.
    pub fn for_origin(origin: Url) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Parse a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ServiceWorkerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ServiceWorkerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(ServiceWorkerError::Config(
                "cache version must not be empty".to_string(),
            ));
        }
        if self.janitor.low_watermark > self.janitor.high_watermark {
            return Err(ServiceWorkerError::Config(format!(
                "low watermark {} exceeds high watermark {}",
                self.janitor.low_watermark, self.janitor.high_watermark
            )));
        }
        if self.janitor.interval_secs == 0 {
            return Err(ServiceWorkerError::Config(
                "janitor interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Version-qualified partition name for a role.
    pub fn cache_name(&self, role: CacheRole) -> String {
        format!("{}-{}", role.prefix(), self.version)
    }

    /// Names of every partition the current version owns.
    pub fn allow_list(&self) -> Vec<String> {
        CacheRole::ALL
            .iter()
            .map(|role| self.cache_name(*role))
            .collect()
    }

    /// Resolve a manifest path or absolute URL against the origin.
    pub fn resolve(&self, path: &str) -> Result<Url> {
        self.origin
            .join(path)
            .map_err(|e| ServiceWorkerError::Config(format!("invalid URL '{path}': {e}")))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
