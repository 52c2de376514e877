//! Lifecycle Controller
//!
//! Install and activation of one deployment version: precache population,
//! outdated-cache cleanup, skip-waiting and client takeover.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{is_precache_store, precache_store_name, ClientInfo, ClientRegistry, PrecacheManifest};
use crate::cache::{CacheStorage, CachedResponse};
use crate::error::{CacheError, Result};
use crate::network::NetworkFetcher;
use crate::request::AgentRequest;

// == Lifecycle State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Constructed, install not started
    Parsed,
    Installing,
    /// Installed, waiting to take over
    Waiting,
    Activating,
    Active,
    /// Install failed; this version will never activate
    Redundant,
}

#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Deployment version identifier
    pub version: String,
    /// Cache name prefix
    pub cache_prefix: String,
    /// Scope, normally the site origin with a trailing slash
    pub scope: String,
    /// Activate without waiting for older clients to go away
    pub skip_waiting: bool,
    /// Take control of open clients on activation
    pub clients_claim: bool,
    /// Delete precache stores from older formats on activation
    pub cleanup_outdated_caches: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub fetched: usize,
    /// Entries already present under their current revision
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    /// Old-revision entries removed from the precache store
    pub removed_entries: usize,
    pub deleted_stores: Vec<String>,
    pub claimed_clients: usize,
    /// Set when stale entries or stores could not all be removed
    pub cleanup_error: Option<String>,
}

// == Lifecycle Controller ==
pub struct LifecycleController {
    storage: Arc<CacheStorage>,
    fetcher: Arc<dyn NetworkFetcher>,
    manifest: PrecacheManifest,
    options: LifecycleOptions,
    precache_store: String,
    clients: Arc<ClientRegistry>,
    state: RwLock<LifecycleState>,
    activation: RwLock<Option<ActivationReport>>,
}

impl LifecycleController {
    pub fn new(
        storage: Arc<CacheStorage>,
        fetcher: Arc<dyn NetworkFetcher>,
        manifest: PrecacheManifest,
        options: LifecycleOptions,
        clients: Arc<ClientRegistry>,
    ) -> Self {
        let precache_store = precache_store_name(&options.cache_prefix, &options.scope);
        Self {
            storage,
            fetcher,
            manifest,
            options,
            precache_store,
            clients,
            state: RwLock::new(LifecycleState::Parsed),
            activation: RwLock::new(None),
        }
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Report of the activation, once this version is active.
    pub async fn activation(&self) -> Option<ActivationReport> {
        self.activation.read().await.clone()
    }

    pub fn version(&self) -> &str {
        &self.options.version
    }

    pub fn options(&self) -> &LifecycleOptions {
        &self.options
    }

    pub fn precache_store(&self) -> &str {
        &self.precache_store
    }

    pub fn manifest(&self) -> &PrecacheManifest {
        &self.manifest
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    async fn transition(&self, from: &[LifecycleState], to: LifecycleState) -> Result<()> {
        let mut state = self.state.write().await;
        if !from.contains(&*state) {
            return Err(CacheError::InvalidRequest(format!(
                "Cannot move from {:?} to {:?}",
                *state, to
            )));
        }
        debug!("Lifecycle {}: {:?} -> {:?}", self.options.version, *state, to);
        *state = to;
        Ok(())
    }

    async fn set_state(&self, to: LifecycleState) {
        *self.state.write().await = to;
    }

    // == Install ==
    /// Populates the precache store. Entries already stored under their
    /// current revision are skipped, so repeating an install is a no-op.
    ///
    /// Any failed fetch, or a status of 400 or above, makes this version
    /// redundant.
    pub async fn install(&self) -> Result<InstallReport> {
        self.transition(&[LifecycleState::Parsed], LifecycleState::Installing)
            .await?;
        info!(
            "Installing version {} ({} precache entries)",
            self.options.version,
            self.manifest.len()
        );

        match self.populate_precache().await {
            Ok(report) => {
                self.set_state(LifecycleState::Waiting).await;
                info!(
                    "Installed version {}: {} fetched, {} already cached",
                    self.options.version, report.fetched, report.skipped
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(LifecycleState::Redundant).await;
                error!("Install of version {} failed: {}", self.options.version, e);
                Err(e)
            }
        }
    }

    async fn populate_precache(&self) -> Result<InstallReport> {
        let mut report = InstallReport::default();

        for entry in self.manifest.entries() {
            if self
                .storage
                .get(&self.precache_store, &entry.cache_key)
                .await?
                .is_some()
            {
                report.skipped += 1;
                continue;
            }

            let response = self.fetcher.fetch(&AgentRequest::get(&entry.url)).await?;
            if response.status >= 400 {
                return Err(CacheError::NetworkError(format!(
                    "Precache fetch of {} returned {}",
                    entry.url, response.status
                )));
            }

            self.storage
                .put(&self.precache_store, entry.cache_key.clone(), response)
                .await?;
            report.fetched += 1;
        }

        Ok(report)
    }

    // == Activate ==
    /// Activates if allowed. Returns `None` while still waiting on clients
    /// controlled by another version.
    pub async fn try_activate(&self) -> Result<Option<ActivationReport>> {
        if self.state().await != LifecycleState::Waiting {
            return Err(CacheError::InvalidRequest(format!(
                "Version {} is not waiting to activate",
                self.options.version
            )));
        }

        if !self.options.skip_waiting {
            let blocking = self.clients.controlled_by_other(&self.options.version).await;
            if blocking > 0 {
                info!(
                    "Version {} waiting on {} client(s) of an older version",
                    self.options.version, blocking
                );
                return Ok(None);
            }
        }

        self.activate().await.map(Some)
    }

    async fn activate(&self) -> Result<ActivationReport> {
        self.transition(&[LifecycleState::Waiting], LifecycleState::Activating)
            .await?;

        let mut report = ActivationReport::default();
        // Leftovers are retried on the next activation
        if let Err(e) = self.cleanup(&mut report).await {
            warn!("Cache cleanup during activation failed: {}", e);
            report.cleanup_error = Some(e.to_string());
        }

        self.set_state(LifecycleState::Active).await;
        if self.options.clients_claim {
            report.claimed_clients = self.clients.claim_all(&self.options.version).await;
        }

        info!(
            "Version {} active: {} stale entries removed, {} stores deleted, {} clients claimed",
            self.options.version,
            report.removed_entries,
            report.deleted_stores.len(),
            report.claimed_clients
        );
        *self.activation.write().await = Some(report.clone());
        Ok(report)
    }

    async fn cleanup(&self, report: &mut ActivationReport) -> Result<()> {
        let current_keys = self.manifest.cache_keys();
        for key in self.storage.list_keys(&self.precache_store).await? {
            if !current_keys.contains(&key.to_string())
                && self.storage.delete(&self.precache_store, &key).await?
            {
                report.removed_entries += 1;
            }
        }

        if self.options.cleanup_outdated_caches {
            for name in self.storage.store_names().await? {
                if name != self.precache_store
                    && is_precache_store(&name, &self.options.scope)
                    && self.storage.delete_store(&name).await?
                {
                    report.deleted_stores.push(name);
                }
            }
        }
        Ok(())
    }

    /// Installs then activates if nothing is waiting on older clients.
    pub async fn start(&self) -> Result<LifecycleState> {
        self.install().await?;
        self.try_activate().await?;
        Ok(self.state().await)
    }

    // == Clients ==
    /// Registers a client; it is controlled by this version only once active.
    pub async fn connect_client(&self, id: &str) -> ClientInfo {
        let controller = match self.state().await {
            LifecycleState::Active => Some(self.options.version.clone()),
            _ => None,
        };
        self.clients.register(id, controller).await
    }

    /// Releases a client and retries a pending activation.
    pub async fn disconnect_client(&self, id: &str) -> Result<bool> {
        let released = self.clients.release(id).await;
        if released && self.state().await == LifecycleState::Waiting {
            self.try_activate().await?;
        }
        Ok(released)
    }

    /// Releases clients idle for longer than `max_idle` and retries a
    /// pending activation. Returns how many were released.
    pub async fn disconnect_idle_clients(&self, max_idle: Duration) -> Result<usize> {
        let released = self.clients.release_idle(max_idle).await;
        if !released.is_empty() {
            debug!("Released {} idle client(s)", released.len());
            if self.state().await == LifecycleState::Waiting {
                self.try_activate().await?;
            }
        }
        Ok(released.len())
    }

    // == Precache Lookup ==
    /// Stored precache response for a URL, if the URL is in the manifest and
    /// its entry is present.
    pub async fn match_precache(&self, url: &str) -> Result<Option<CachedResponse>> {
        let Some(key) = self.manifest.lookup(url) else {
            return Ok(None);
        };
        Ok(self
            .storage
            .get(&self.precache_store, key)
            .await?
            .map(|entry| entry.response))
    }

    /// Stores a network response for a manifest URL whose entry has gone
    /// missing. Returns whether anything was written.
    pub async fn store_precache(&self, url: &str, response: CachedResponse) -> Result<bool> {
        let Some(key) = self.manifest.lookup(url) else {
            return Ok(false);
        };
        if response.status >= 400 {
            return Ok(false);
        }
        self.storage
            .put(&self.precache_store, key.clone(), response)
            .await?;
        debug!("Restored precache entry {}", key);
        Ok(true)
    }

    /// Whether the URL maps onto a manifest entry.
    pub fn is_precached_url(&self, url: &str) -> bool {
        self.manifest.lookup(url).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;

    use crate::backend::{MemoryBackend, StorageBackend};
    use crate::cache::RequestKey;
    use crate::lifecycle::PrecacheEntry;
    use crate::network::StaticFetcher;

    const SCOPE: &str = "https://site.test/";

    struct Env {
        storage: Arc<CacheStorage>,
        fetcher: Arc<StaticFetcher>,
        clients: Arc<ClientRegistry>,
    }

    impl Env {
        fn new() -> Self {
            let fetcher = Arc::new(StaticFetcher::new());
            fetcher.respond("https://site.test/index.html", CachedResponse::new(200, "<h1>v1</h1>"));
            fetcher.respond("https://site.test/", CachedResponse::new(200, "<h1>root</h1>"));
            Self {
                storage: Arc::new(CacheStorage::in_memory()),
                fetcher,
                clients: Arc::new(ClientRegistry::new()),
            }
        }

        fn controller(&self, version: &str, entries: &[PrecacheEntry], skip_waiting: bool) -> LifecycleController {
            LifecycleController::new(
                self.storage.clone(),
                self.fetcher.clone(),
                PrecacheManifest::new(entries, SCOPE).unwrap(),
                LifecycleOptions {
                    version: version.to_string(),
                    cache_prefix: "site".to_string(),
                    scope: SCOPE.to_string(),
                    skip_waiting,
                    clients_claim: true,
                    cleanup_outdated_caches: true,
                },
                self.clients.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_install_then_activate() {
        let env = Env::new();
        let controller = env.controller("1", &[PrecacheEntry::new("/index.html", "1")], true);

        assert_eq!(controller.state().await, LifecycleState::Parsed);
        let report = controller.install().await.unwrap();
        assert_eq!(report, InstallReport { fetched: 1, skipped: 0 });
        assert_eq!(controller.state().await, LifecycleState::Waiting);

        assert!(controller.try_activate().await.unwrap().is_some());
        assert_eq!(controller.state().await, LifecycleState::Active);

        let body = controller
            .match_precache("https://site.test/index.html")
            .await
            .unwrap()
            .unwrap()
            .body;
        assert_eq!(body, "<h1>v1</h1>");
    }

    #[tokio::test]
    async fn test_reinstall_same_revision_is_noop() {
        let env = Env::new();
        let entries = [PrecacheEntry::new("/index.html", "1")];

        let first = env.controller("a", &entries, true);
        first.start().await.unwrap();
        let before = env.storage.entries(first.precache_store()).await.unwrap();

        let second = env.controller("b", &entries, true);
        let report = second.install().await.unwrap();
        assert_eq!(report, InstallReport { fetched: 0, skipped: 1 });
        assert_eq!(env.fetcher.calls("https://site.test/index.html"), 1);

        let after = env.storage.entries(second.precache_store()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_new_revision_replaces_old_after_activation() {
        let env = Env::new();
        let v1 = env.controller("1", &[PrecacheEntry::new("/index.html", "1")], true);
        v1.start().await.unwrap();

        env.fetcher
            .respond("https://site.test/index.html", CachedResponse::new(200, "<h1>v2</h1>"));
        let v2 = env.controller("2", &[PrecacheEntry::new("/index.html", "2")], true);
        v2.install().await.unwrap();

        // Both revisions exist until activation
        assert_eq!(env.storage.len(v2.precache_store()).await.unwrap(), 2);

        let report = v2.try_activate().await.unwrap().unwrap();
        assert_eq!(report.removed_entries, 1);

        let keys = env.storage.list_keys(v2.precache_store()).await.unwrap();
        assert_eq!(
            keys,
            vec![RequestKey::get("https://site.test/index.html?__WB_REVISION__=2")]
        );
        let body = v2
            .match_precache("https://site.test/index.html")
            .await
            .unwrap()
            .unwrap()
            .body;
        assert_eq!(body, "<h1>v2</h1>");
    }

    #[tokio::test]
    async fn test_failed_fetch_makes_version_redundant() {
        let env = Env::new();
        let controller = env.controller("1", &[PrecacheEntry::new("/missing.js", "1")], true);

        let result = controller.install().await;
        assert!(matches!(result, Err(CacheError::NetworkError(_))));
        assert_eq!(controller.state().await, LifecycleState::Redundant);
        assert!(controller.try_activate().await.is_err());
    }

    #[tokio::test]
    async fn test_offline_install_fails() {
        let env = Env::new();
        env.fetcher.set_online(false);
        let controller = env.controller("1", &[PrecacheEntry::new("/index.html", "1")], true);

        assert!(controller.install().await.is_err());
        assert_eq!(controller.state().await, LifecycleState::Redundant);
    }

    #[tokio::test]
    async fn test_waits_for_old_clients_without_skip_waiting() {
        let env = Env::new();
        env.clients.register("tab-1", Some("1".into())).await;

        let v2 = env.controller("2", &[PrecacheEntry::new("/index.html", "2")], false);
        v2.install().await.unwrap();
        assert!(v2.try_activate().await.unwrap().is_none());
        assert_eq!(v2.state().await, LifecycleState::Waiting);

        // Closing the last old client lets activation proceed
        assert!(v2.disconnect_client("tab-1").await.unwrap());
        assert_eq!(v2.state().await, LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_skip_waiting_and_claim() {
        let env = Env::new();
        env.clients.register("tab-1", Some("1".into())).await;
        env.clients.register("tab-2", None).await;

        let v2 = env.controller("2", &[PrecacheEntry::new("/index.html", "2")], true);
        v2.install().await.unwrap();
        let report = v2.try_activate().await.unwrap().unwrap();

        assert_eq!(report.claimed_clients, 2);
        assert_eq!(
            env.clients.get("tab-1").await.unwrap().controller.as_deref(),
            Some("2")
        );
    }

    #[tokio::test]
    async fn test_outdated_precache_stores_deleted() {
        let env = Env::new();
        let legacy = RequestKey::get("https://site.test/old.js");
        env.storage
            .put("site-precache-v1-https://site.test/", legacy.clone(), CachedResponse::new(200, ""))
            .await
            .unwrap();
        env.storage
            .put("site-assets", legacy, CachedResponse::new(200, ""))
            .await
            .unwrap();

        let controller = env.controller("1", &[PrecacheEntry::new("/index.html", "1")], true);
        controller.install().await.unwrap();
        let report = controller.try_activate().await.unwrap().unwrap();

        assert_eq!(report.deleted_stores, vec!["site-precache-v1-https://site.test/"]);
        let names = env.storage.store_names().await.unwrap();
        assert!(names.contains(&"site-assets".to_string()));
        assert!(names.contains(&controller.precache_store().to_string()));
    }

    #[tokio::test]
    async fn test_connect_client_controlled_only_when_active() {
        let env = Env::new();
        let controller = env.controller("1", &[], true);

        assert!(controller.connect_client("early").await.controller.is_none());
        controller.start().await.unwrap();
        assert_eq!(
            controller.connect_client("late").await.controller.as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_install_twice_on_same_controller_rejected() {
        let env = Env::new();
        let controller = env.controller("1", &[], true);
        controller.install().await.unwrap();
        assert!(matches!(
            controller.install().await,
            Err(CacheError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_clients_released_unblock_activation() {
        let env = Env::new();
        env.clients.register("tab-1", Some("1".into())).await;

        let v2 = env.controller("2", &[PrecacheEntry::new("/index.html", "2")], false);
        v2.install().await.unwrap();
        assert!(v2.try_activate().await.unwrap().is_none());

        assert_eq!(v2.disconnect_idle_clients(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(v2.state().await, LifecycleState::Waiting);

        assert_eq!(v2.disconnect_idle_clients(Duration::ZERO).await.unwrap(), 1);
        assert_eq!(v2.state().await, LifecycleState::Active);
        assert_eq!(env.clients.len().await, 0);
    }

    /// Memory backend that cannot enumerate its namespaces.
    #[derive(Default)]
    struct NoListingBackend {
        inner: MemoryBackend,
    }

    #[async_trait]
    impl StorageBackend for NoListingBackend {
        async fn read(&self, ns: &str, key: &str) -> Result<Option<Bytes>> {
            self.inner.read(ns, key).await
        }
        async fn write(&self, ns: &str, key: &str, value: Bytes) -> Result<()> {
            self.inner.write(ns, key, value).await
        }
        async fn remove(&self, ns: &str, key: &str) -> Result<bool> {
            self.inner.remove(ns, key).await
        }
        async fn list(&self, ns: &str) -> Result<Vec<String>> {
            self.inner.list(ns).await
        }
        async fn namespaces(&self) -> Result<Vec<String>> {
            Err(CacheError::StoreUnavailable("listing denied".into()))
        }
        async fn drop_namespace(&self, ns: &str) -> Result<bool> {
            self.inner.drop_namespace(ns).await
        }
    }

    #[tokio::test]
    async fn test_cleanup_failure_recorded_in_activation_report() {
        let env = Env {
            storage: Arc::new(CacheStorage::new(Arc::new(NoListingBackend::default()))),
            ..Env::new()
        };
        let controller = env.controller("1", &[PrecacheEntry::new("/index.html", "1")], true);
        assert!(controller.activation().await.is_none());

        controller.install().await.unwrap();
        let report = controller.try_activate().await.unwrap().unwrap();

        // Activation still completes
        assert_eq!(controller.state().await, LifecycleState::Active);
        assert!(report.cleanup_error.as_deref().unwrap().contains("listing denied"));
        assert_eq!(controller.activation().await, Some(report));
    }

    #[tokio::test]
    async fn test_clean_activation_has_no_cleanup_error() {
        let env = Env::new();
        let controller = env.controller("1", &[PrecacheEntry::new("/index.html", "1")], true);
        controller.start().await.unwrap();
        let report = controller.activation().await.unwrap();
        assert!(report.cleanup_error.is_none());
    }

    #[tokio::test]
    async fn test_store_precache_restores_missing_entry() {
        let env = Env::new();
        let controller = env.controller("1", &[PrecacheEntry::new("/index.html", "1")], true);
        controller.start().await.unwrap();
        env.storage.delete_store(controller.precache_store()).await.unwrap();

        assert!(!controller
            .store_precache("https://site.test/other.html", CachedResponse::new(200, "x"))
            .await
            .unwrap());
        assert!(!controller
            .store_precache("https://site.test/index.html", CachedResponse::new(500, "x"))
            .await
            .unwrap());
        assert!(controller
            .store_precache("https://site.test/index.html", CachedResponse::new(200, "back"))
            .await
            .unwrap());

        let body = controller
            .match_precache("https://site.test/index.html")
            .await
            .unwrap()
            .unwrap()
            .body;
        assert_eq!(body, "back");
    }
}
