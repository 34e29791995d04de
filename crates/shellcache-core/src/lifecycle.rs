//! Install and activate lifecycle
//!
//! Install pre-populates the static namespace with the shell manifest, all or
//! nothing. Activate deletes every namespace outside the retained set while
//! holding the phase gate exclusively, so eviction never overlaps request
//! handling.

use futures::future::join_all;
use parking_lot::Mutex;
use serde::Serialize;
use shellcache_proxy::{Fetcher, OutboundRequest};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{error, info, warn};

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::config::CacheConfig;
use crate::error::CoreError;
use crate::request::RequestIdentity;

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    Installing,
    Installed,
    Failed,
    Activating,
    Activated,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Failed => "failed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate separating request handling from namespace eviction
///
/// Interception cycles hold it shared, activation holds it exclusively.
#[derive(Clone, Default)]
pub struct PhaseGate(Arc<RwLock<()>>);

impl PhaseGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn request(&self) -> OwnedRwLockReadGuard<()> {
        self.0.clone().read_owned().await
    }

    pub async fn exclusive(&self) -> OwnedRwLockWriteGuard<()> {
        self.0.clone().write_owned().await
    }
}

/// Outcome of a successful install
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// Manifest resources fetched and written
    pub fetched: usize,
    /// The static namespace already held the whole manifest
    pub reused: bool,
}

/// Outcome of a successful activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    /// Namespaces deleted because they are not in the retained set
    pub deleted: Vec<String>,
}

/// Lifecycle manager
pub struct LifecycleManager {
    config: Arc<CacheConfig>,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    gate: PhaseGate,
    state: Mutex<LifecycleState>,
}

impl LifecycleManager {
    pub fn new(
        config: Arc<CacheConfig>,
        store: Arc<CacheStore>,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
        gate: PhaseGate,
    ) -> Self {
        Self {
            config,
            store,
            fetcher,
            clock,
            gate,
            state: Mutex::new(LifecycleState::Pending),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if !from.contains(&state) {
            return Err(CoreError::InvalidTransition { from: *state, to });
        }
        *state = to;
        Ok(())
    }

    fn set_state(&self, state: LifecycleState) {
        *self.state.lock() = state;
    }

    /// Populate the static namespace with the shell manifest
    ///
    /// Allowed from `Pending`, or from `Failed` as a retry.
    pub async fn install(&self) -> Result<InstallReport, CoreError> {
        self.transition(
            &[LifecycleState::Pending, LifecycleState::Failed],
            LifecycleState::Installing,
        )?;
        info!(
            "Installing shell into {} ({} resources)",
            self.config.static_namespace,
            self.config.shell_manifest.len()
        );

        match self.populate_shell().await {
            Ok(report) => {
                self.set_state(LifecycleState::Installed);
                info!(
                    "Install complete (fetched: {}, reused: {})",
                    report.fetched, report.reused
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(LifecycleState::Failed);
                error!("Install failed: {}", e);
                Err(e)
            }
        }
    }

    async fn populate_shell(&self) -> Result<InstallReport, CoreError> {
        let namespace = &self.config.static_namespace;
        self.store.open(namespace).await?;

        if self.shell_present().await? {
            info!("Shell already present in {}, skipping fetch", namespace);
            return Ok(InstallReport {
                fetched: 0,
                reused: true,
            });
        }

        let results = join_all(self.config.shell_manifest.iter().map(|url| async move {
            (url, self.fetcher.fetch(OutboundRequest::get(url.clone())).await)
        }))
        .await;

        let mut responses = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (url, result) in results {
            match result {
                Ok(response) if response.status.is_success() => responses.push((url, response)),
                Ok(response) => failures.push(format!("{} (HTTP {})", url, response.status.as_u16())),
                Err(e) => failures.push(format!("{} ({})", url, e)),
            }
        }
        if !failures.is_empty() {
            return Err(CoreError::InstallPopulation { failures });
        }

        let fetched_at = self.clock.now();
        for (url, response) in &responses {
            let identity = RequestIdentity::get((*url).clone());
            if let Err(e) = self.store.put(namespace, &identity, response, fetched_at).await {
                // Leave nothing half-installed behind
                let _exclusive = self.gate.exclusive().await;
                if let Err(cleanup) = self.store.delete_namespace(namespace).await {
                    warn!("Failed to discard partial install of {}: {}", namespace, cleanup);
                }
                return Err(e);
            }
        }

        Ok(InstallReport {
            fetched: responses.len(),
            reused: false,
        })
    }

    async fn shell_present(&self) -> Result<bool, CoreError> {
        for url in &self.config.shell_manifest {
            let identity = RequestIdentity::get(url.clone());
            if !self
                .store
                .contains(&self.config.static_namespace, &identity)
                .await?
            {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Delete every namespace outside the retained set
    ///
    /// Allowed only from `Installed`. A failed activation returns to
    /// `Installed` so it can be retried.
    pub async fn activate(&self) -> Result<ActivateReport, CoreError> {
        self.transition(&[LifecycleState::Installed], LifecycleState::Activating)?;

        match self.evict_stale_namespaces().await {
            Ok(report) => {
                self.set_state(LifecycleState::Activated);
                info!(
                    "Activated (retained: {:?}, deleted: {:?})",
                    self.config.retained_namespaces(),
                    report.deleted
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(LifecycleState::Installed);
                error!("Activation failed: {}", e);
                Err(e)
            }
        }
    }

    async fn evict_stale_namespaces(&self) -> Result<ActivateReport, CoreError> {
        let _exclusive = self.gate.exclusive().await;
        let retained = self.config.retained_namespaces();

        let mut deleted = Vec::new();
        for name in self.store.namespace_names().await? {
            if retained.contains(&name.as_str()) {
                continue;
            }
            self.store.delete_namespace(&name).await?;
            deleted.push(name);
        }

        self.store.open(&self.config.dynamic_namespace).await?;
        Ok(ActivateReport { deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::testing::{ScriptedFetcher, memory_store, ok_response, response};
    use chrono::{TimeZone, Utc};
    use http::StatusCode;
    use std::time::Duration;
    use url::Url;

    struct Harness {
        config: Arc<CacheConfig>,
        store: Arc<CacheStore>,
        fetcher: Arc<ScriptedFetcher>,
        gate: PhaseGate,
        lifecycle: LifecycleManager,
    }

    async fn harness() -> Harness {
        let config = Arc::new(CacheConfig {
            origin: Url::parse("http://localhost:8080").unwrap(),
            static_namespace: "weather-app-v2".to_string(),
            dynamic_namespace: "weather-data-v1".to_string(),
            dynamic_max_age: Duration::from_secs(600),
            dynamic_patterns: vec!["**/data/2.5/**".to_string()],
            shell_manifest: vec![
                Url::parse("http://localhost:8080/").unwrap(),
                Url::parse("http://localhost:8080/offline.html").unwrap(),
                Url::parse("https://cdn.jsdelivr.net/npm/chart.js").unwrap(),
            ],
            offline_fallback: Url::parse("http://localhost:8080/offline.html").unwrap(),
        });
        let (store, _) = memory_store().await;
        let store = Arc::new(store);
        let fetcher = Arc::new(ScriptedFetcher::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let gate = PhaseGate::new();
        let lifecycle = LifecycleManager::new(
            config.clone(),
            store.clone(),
            fetcher.clone(),
            clock,
            gate.clone(),
        );
        Harness {
            config,
            store,
            fetcher,
            gate,
            lifecycle,
        }
    }

    fn serve_shell(fetcher: &ScriptedFetcher) {
        fetcher.respond("http://localhost:8080/", ok_response("<html>index</html>"));
        fetcher.respond("http://localhost:8080/offline.html", ok_response("<html>offline</html>"));
        fetcher.respond("https://cdn.jsdelivr.net/npm/chart.js", ok_response("chart"));
    }

    async fn shell_entries(h: &Harness) -> i64 {
        h.store
            .list_namespaces()
            .await
            .unwrap()
            .into_iter()
            .find(|ns| ns.name == h.config.static_namespace)
            .map(|ns| ns.entry_count)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_install_populates_manifest() {
        let h = harness().await;
        serve_shell(&h.fetcher);

        let report = h.lifecycle.install().await.unwrap();

        assert_eq!(report, InstallReport { fetched: 3, reused: false });
        assert_eq!(h.lifecycle.state(), LifecycleState::Installed);
        assert_eq!(shell_entries(&h).await, 3);
        let offline = h
            .store
            .match_entry(
                "weather-app-v2",
                &RequestIdentity::get(h.config.offline_fallback.clone()),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(offline.body, "<html>offline</html>");
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let h = harness().await;
        serve_shell(&h.fetcher);
        h.fetcher.fail("https://cdn.jsdelivr.net/npm/chart.js");
        h.fetcher.respond(
            "http://localhost:8080/",
            response(StatusCode::NOT_FOUND, "missing"),
        );

        let err = h.lifecycle.install().await.unwrap_err();

        match err {
            CoreError::InstallPopulation { failures } => {
                assert_eq!(failures.len(), 2);
                assert!(failures.iter().any(|f| f.contains("chart.js")));
                assert!(failures.iter().any(|f| f.contains("HTTP 404")));
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(h.lifecycle.state(), LifecycleState::Failed);
        assert_eq!(shell_entries(&h).await, 0);
    }

    #[tokio::test]
    async fn test_install_retry_after_failure() {
        let h = harness().await;
        assert!(h.lifecycle.install().await.is_err());
        assert_eq!(h.lifecycle.state(), LifecycleState::Failed);

        serve_shell(&h.fetcher);
        h.lifecycle.install().await.unwrap();
        assert_eq!(h.lifecycle.state(), LifecycleState::Installed);
        assert_eq!(shell_entries(&h).await, 3);
    }

    #[tokio::test]
    async fn test_install_skips_when_shell_present() {
        let h = harness().await;
        serve_shell(&h.fetcher);
        h.lifecycle.install().await.unwrap();
        let calls = h.fetcher.call_count();

        // A second process over the same store, started offline
        h.fetcher.go_offline();
        let again = LifecycleManager::new(
            h.config.clone(),
            h.store.clone(),
            h.fetcher.clone(),
            Arc::new(crate::clock::SystemClock),
            h.gate.clone(),
        );
        let report = again.install().await.unwrap();

        assert_eq!(report, InstallReport { fetched: 0, reused: true });
        assert_eq!(h.fetcher.call_count(), calls);
    }

    #[tokio::test]
    async fn test_activate_deletes_unretained_namespaces() {
        let h = harness().await;
        serve_shell(&h.fetcher);
        let id = RequestIdentity::get(Url::parse("http://localhost:8080/script.js").unwrap());
        h.store.put("weather-app-v1", &id, &ok_response("old"), Utc::now()).await.unwrap();
        h.store.open("weather-data-v0").await.unwrap();

        h.lifecycle.install().await.unwrap();
        let report = h.lifecycle.activate().await.unwrap();

        assert_eq!(report.deleted, vec!["weather-app-v1", "weather-data-v0"]);
        assert_eq!(h.lifecycle.state(), LifecycleState::Activated);
        let names: Vec<String> = h.store.namespace_names().await.unwrap().into_iter().collect();
        assert_eq!(names, vec!["weather-app-v2", "weather-data-v1"]);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let h = harness().await;

        assert!(matches!(
            h.lifecycle.activate().await,
            Err(CoreError::InvalidTransition {
                from: LifecycleState::Pending,
                to: LifecycleState::Activating
            })
        ));

        serve_shell(&h.fetcher);
        h.lifecycle.install().await.unwrap();
        assert!(matches!(
            h.lifecycle.install().await,
            Err(CoreError::InvalidTransition { from: LifecycleState::Installed, .. })
        ));

        h.lifecycle.activate().await.unwrap();
        assert!(h.lifecycle.activate().await.is_err());
        assert!(h.lifecycle.install().await.is_err());
        assert_eq!(h.lifecycle.state(), LifecycleState::Activated);
    }

    #[tokio::test]
    async fn test_activation_waits_for_in_flight_requests() {
        let h = harness().await;
        serve_shell(&h.fetcher);
        h.lifecycle.install().await.unwrap();

        let in_flight = h.gate.request().await;
        let lifecycle = Arc::new(h.lifecycle);
        let activation = tokio::spawn({
            let lifecycle = lifecycle.clone();
            async move { lifecycle.activate().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(lifecycle.state(), LifecycleState::Activating);
        assert!(!activation.is_finished());

        drop(in_flight);
        activation.await.unwrap().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Activated);
    }
}
