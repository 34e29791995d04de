//! Immutable cache configuration
//!
//! Built once at startup and shared by the interceptor and the lifecycle
//! manager. There is no process-wide mutable state.

use std::time::Duration;
use url::Url;

use crate::cache::FreshnessPolicy;
use crate::error::CoreError;
use crate::routing::UrlPattern;

/// Response header carrying the fetch time (epoch milliseconds) of dynamic data
pub const FETCHED_AT_HEADER: &str = "x-shellcache-fetched-at";

pub const DEFAULT_STATIC_NAMESPACE: &str = "weather-app-v2";
pub const DEFAULT_DYNAMIC_NAMESPACE: &str = "weather-data-v1";
pub const DEFAULT_DYNAMIC_MAX_AGE: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_DYNAMIC_PATTERNS: [&str; 2] = ["**/data/2.5/**", "**weatherapi.com**"];
pub const DEFAULT_OFFLINE_FALLBACK: &str = "/offline.html";

/// App shell installed into the static namespace, relative entries resolved
/// against the shell origin
pub const DEFAULT_SHELL_MANIFEST: [&str; 11] = [
    "/",
    "/index.html",
    "/offline.html",
    "/script.js",
    "/manifest.json",
    "/icons/icon-192.png",
    "/icons/icon-512.png",
    "https://cdn.tailwindcss.com",
    "https://cdn.jsdelivr.net/npm/chart.js",
    "https://unpkg.com/leaflet/dist/leaflet.css",
    "https://unpkg.com/leaflet/dist/leaflet.js",
];

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Origin the shell is served from
    pub origin: Url,
    /// Current-version namespace for static assets
    pub static_namespace: String,
    /// Current-version namespace for dynamic data
    pub dynamic_namespace: String,
    /// Freshness window for dynamic data
    pub dynamic_max_age: Duration,
    /// Glob patterns selecting dynamic-data requests
    pub dynamic_patterns: Vec<String>,
    /// Absolute URLs installed into the static namespace, in order
    pub shell_manifest: Vec<Url>,
    /// Static-namespace entry served when nothing better is available
    pub offline_fallback: Url,
}

impl CacheConfig {
    /// Default configuration for a shell served from `origin`
    pub fn for_origin(origin: Url) -> Result<Self, CoreError> {
        let shell_manifest = resolve_manifest(&origin, &DEFAULT_SHELL_MANIFEST)?;
        let offline_fallback = resolve(&origin, DEFAULT_OFFLINE_FALLBACK)?;

        Ok(Self {
            origin,
            static_namespace: DEFAULT_STATIC_NAMESPACE.to_string(),
            dynamic_namespace: DEFAULT_DYNAMIC_NAMESPACE.to_string(),
            dynamic_max_age: DEFAULT_DYNAMIC_MAX_AGE,
            dynamic_patterns: DEFAULT_DYNAMIC_PATTERNS.iter().map(|p| p.to_string()).collect(),
            shell_manifest,
            offline_fallback,
        })
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), CoreError> {
        for (label, name) in [
            ("static", &self.static_namespace),
            ("dynamic", &self.dynamic_namespace),
        ] {
            if name.trim().is_empty() {
                return Err(CoreError::InvalidConfig(format!(
                    "{} namespace name cannot be empty",
                    label
                )));
            }
        }

        if self.static_namespace == self.dynamic_namespace {
            return Err(CoreError::InvalidConfig(format!(
                "static and dynamic namespaces must differ (both '{}')",
                self.static_namespace
            )));
        }

        for pattern in &self.dynamic_patterns {
            UrlPattern::new(pattern)?;
        }

        if self.shell_manifest.is_empty() {
            return Err(CoreError::InvalidConfig("shell manifest is empty".to_string()));
        }

        if !self.shell_manifest.contains(&self.offline_fallback) {
            return Err(CoreError::InvalidConfig(format!(
                "offline fallback {} is not in the shell manifest",
                self.offline_fallback
            )));
        }

        Ok(())
    }

    /// Namespaces that survive activation
    pub fn retained_namespaces(&self) -> [&str; 2] {
        [self.static_namespace.as_str(), self.dynamic_namespace.as_str()]
    }

    pub fn static_freshness(&self) -> FreshnessPolicy {
        FreshnessPolicy::NoExpiry
    }

    pub fn dynamic_freshness(&self) -> FreshnessPolicy {
        FreshnessPolicy::MaxAge(self.dynamic_max_age)
    }
}

/// Resolve a manifest or request target against the origin
pub fn resolve(origin: &Url, target: &str) -> Result<Url, CoreError> {
    origin
        .join(target)
        .map_err(|e| CoreError::InvalidConfig(format!("invalid URL '{}': {}", target, e)))
}

/// Resolve every manifest entry, rejecting duplicates
pub fn resolve_manifest<S: AsRef<str>>(origin: &Url, entries: &[S]) -> Result<Vec<Url>, CoreError> {
    let mut urls: Vec<Url> = Vec::with_capacity(entries.len());
    for entry in entries {
        let url = resolve(origin, entry.as_ref())?;
        if urls.contains(&url) {
            return Err(CoreError::InvalidConfig(format!(
                "duplicate shell manifest entry {}",
                url
            )));
        }
        urls.push(url);
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://localhost:8080").unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = CacheConfig::for_origin(origin()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.shell_manifest.len(), 11);
        assert_eq!(config.shell_manifest[0].as_str(), "http://localhost:8080/");
        assert_eq!(
            config.shell_manifest[7].as_str(),
            "https://cdn.tailwindcss.com/"
        );
        assert_eq!(
            config.offline_fallback.as_str(),
            "http://localhost:8080/offline.html"
        );
        assert_eq!(config.retained_namespaces(), ["weather-app-v2", "weather-data-v1"]);
        assert_eq!(
            config.dynamic_freshness(),
            FreshnessPolicy::MaxAge(Duration::from_secs(600))
        );
    }

    #[test]
    fn test_fallback_must_be_in_manifest() {
        let mut config = CacheConfig::for_origin(origin()).unwrap();
        config.offline_fallback = Url::parse("http://localhost:8080/sorry.html").unwrap();
        assert!(matches!(config.validate(), Err(CoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_namespaces_must_differ() {
        let mut config = CacheConfig::for_origin(origin()).unwrap();
        config.dynamic_namespace = config.static_namespace.clone();
        assert!(config.validate().is_err());

        config.dynamic_namespace = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let mut config = CacheConfig::for_origin(origin()).unwrap();
        config.dynamic_patterns.push("https://api.example.com/**".to_string());
        assert!(matches!(config.validate(), Err(CoreError::InvalidPattern(_))));
    }

    #[test]
    fn test_resolve_manifest_rejects_duplicates() {
        let result = resolve_manifest(&origin(), &["/index.html", "http://localhost:8080/index.html"]);
        assert!(result.is_err());
    }
}
