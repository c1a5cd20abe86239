//! Request classification.
//!
//! Rules are consulted in a fixed order: network-first patterns, then
//! cache-first patterns, then the `Accept` header (HTML documents get
//! stale-while-revalidate), then the network-first default.

use leela_net::Request;
use serde::{Deserialize, Serialize};
use tracing::trace;
use url::Url;

use crate::config::CacheRole;

/// Type of URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Substring of the full URL.
    Contains,
    /// Prefix of the full URL (e.g. a CDN host).
    Prefix,
    /// Prefix of the URL path.
    PathPrefix,
    /// Suffix of the URL path (e.g. a file extension).
    PathSuffix,
}

/// URL pattern for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlPattern {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub pattern: String,
}

impl UrlPattern {
    pub fn contains(substring: &str) -> Self {
        Self::new(PatternType::Contains, substring)
    }

    pub fn prefix(prefix: &str) -> Self {
        Self::new(PatternType::Prefix, prefix)
    }

    pub fn path_prefix(prefix: &str) -> Self {
        Self::new(PatternType::PathPrefix, prefix)
    }

    pub fn path_suffix(suffix: &str) -> Self {
        Self::new(PatternType::PathSuffix, suffix)
    }

    fn new(pattern_type: PatternType, pattern: &str) -> Self {
        Self {
            pattern_type,
            pattern: pattern.to_string(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        match self.pattern_type {
            PatternType::Contains => url.as_str().contains(&self.pattern),
            PatternType::Prefix => url.as_str().starts_with(&self.pattern),
            PatternType::PathPrefix => url.path().starts_with(&self.pattern),
            PatternType::PathSuffix => url.path().ends_with(&self.pattern),
        }
    }
}

/// A pattern plus the partition its responses are written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: UrlPattern,
    pub partition: CacheRole,
}

impl RouteRule {
    pub fn new(pattern: UrlPattern, partition: CacheRole) -> Self {
        Self { pattern, partition }
    }
}

/// Request-handling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    NetworkFirst,
    CacheFirst,
    StaleWhileRevalidate,
}

/// Routing decision for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub strategy: Strategy,
    /// Partition a successful network response is written to.
    pub partition: CacheRole,
}

/// The two ordered pattern lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteRules {
    pub network_first: Vec<RouteRule>,
    pub cache_first: Vec<RouteRule>,
}

impl Default for RouteRules {
    fn default() -> Self {
        Self {
            network_first: vec![
                RouteRule::new(UrlPattern::path_prefix("/api/"), CacheRole::Dynamic),
                RouteRule::new(
                    UrlPattern::prefix("https://fonts.googleapis.com"),
                    CacheRole::Dynamic,
                ),
                RouteRule::new(
                    UrlPattern::prefix("https://fonts.gstatic.com"),
                    CacheRole::Dynamic,
                ),
            ],
            cache_first: vec![
                RouteRule::new(
                    UrlPattern::prefix("https://images.pexels.com"),
                    CacheRole::Images,
                ),
                RouteRule::new(UrlPattern::path_suffix(".woff2"), CacheRole::Fonts),
                RouteRule::new(UrlPattern::path_suffix(".woff"), CacheRole::Fonts),
                RouteRule::new(UrlPattern::path_suffix(".ttf"), CacheRole::Fonts),
                RouteRule::new(UrlPattern::path_suffix(".css"), CacheRole::Dynamic),
                RouteRule::new(UrlPattern::path_suffix(".js"), CacheRole::Dynamic),
            ],
        }
    }
}

impl RouteRules {
    /// Decide how to handle a request. `None` means the request is not
    /// intercepted.
    pub fn classify(&self, request: &Request) -> Option<Route> {
        if request.method != http::Method::GET || !request.is_http() {
            trace!(url = %request.url, method = %request.method, "Not intercepted");
            return None;
        }

        let matching = |rules: &[RouteRule]| {
            rules
                .iter()
                .find(|rule| rule.pattern.matches(&request.url))
                .map(|rule| rule.partition)
        };

        let route = if let Some(partition) = matching(&self.network_first) {
            Route {
                strategy: Strategy::NetworkFirst,
                partition,
            }
        } else if let Some(partition) = matching(&self.cache_first) {
            Route {
                strategy: Strategy::CacheFirst,
                partition,
            }
        } else if request.accepts_html() {
            Route {
                strategy: Strategy::StaleWhileRevalidate,
                partition: CacheRole::Dynamic,
            }
        } else {
            Route {
                strategy: Strategy::NetworkFirst,
                partition: CacheRole::Dynamic,
            }
        };

        trace!(url = %request.url, strategy = ?route.strategy, partition = ?route.partition, "Classified");
        Some(route)
    }
}
