//! ZooKeeper-backed service discovery: provider/configurator watches,
//! ephemeral consumer registration, and weighted-routing host selection.
//!
//! ZooKeeper watches are one-shot, so both the provider watcher and the
//! configurator watcher re-register themselves as part of their own
//! callback. The `zookeeper` crate's API is synchronous; its blocking
//! calls are bridged into the async `call()` path via
//! `tokio::task::spawn_blocking`, and its watcher callbacks — which run
//! on the ZK client's own dispatch thread — mutate the routing cache
//! directly through `parking_lot`, since no `.await` is ever held across
//! that lock.

pub mod url;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use zookeeper::{Acl, CreateMode, WatchedEvent, Watcher, ZkError, ZkState, ZooKeeper};

use crate::config::RegistryConfig;
use crate::error::{DubboError, DubboResult};
use crate::registry::url::ProviderUrl;

fn providers_path(interface: &str) -> String {
    format!("/dubbo/{interface}/providers")
}

fn configurators_path(interface: &str) -> String {
    format!("/dubbo/{interface}/configurators")
}

fn consumers_path(interface: &str) -> String {
    format!("/dubbo/{interface}/consumers")
}

/// A consistent, immutable snapshot of one interface's routing state.
/// Watchers replace the whole snapshot atomically so readers never
/// observe a partially-updated `hosts`/`weights` pair.
#[derive(Debug, Clone, Default)]
pub struct RoutingSnapshot {
    pub hosts: Vec<String>,
    pub weights: HashMap<String, u32>,
}

struct InterfaceEntry {
    snapshot: RwLock<Arc<RoutingSnapshot>>,
    consumer_group: Option<String>,
    consumer_version: Option<String>,
}

struct NoopWatcher;
impl Watcher for NoopWatcher {
    fn handle(&self, event: WatchedEvent) {
        tracing::trace!(?event, "zk session event");
    }
}

struct ProviderWatcher {
    registry: Arc<RegistryInner>,
    interface: String,
}

impl Watcher for ProviderWatcher {
    fn handle(&self, event: WatchedEvent) {
        tracing::debug!(interface = %self.interface, path = ?event.path, "provider watch fired");
        self.registry.clone().refresh_providers(&self.interface);
    }
}

struct ConfiguratorWatcher {
    registry: Arc<RegistryInner>,
    interface: String,
}

impl Watcher for ConfiguratorWatcher {
    fn handle(&self, event: WatchedEvent) {
        tracing::debug!(interface = %self.interface, path = ?event.path, "configurator watch fired");
        self.registry.clone().refresh_configurators(&self.interface);
    }
}

struct RegistryInner {
    zk: ZooKeeper,
    application_name: String,
    cache: parking_lot::Mutex<HashMap<String, Arc<InterfaceEntry>>>,
    /// Single mutex guarding first-discovery of a not-yet-cached
    /// interface, so concurrent first-callers for different interfaces
    /// don't race each other into duplicate ZK listing/registration work.
    discovery_lock: tokio::sync::Mutex<()>,
}

impl RegistryInner {
    fn list_and_filter_providers(
        self: Arc<Self>,
        interface: &str,
        consumer_group: Option<&str>,
        consumer_version: Option<&str>,
    ) -> DubboResult<Vec<ProviderUrl>> {
        let path = providers_path(interface);
        let watcher = ProviderWatcher {
            registry: self.clone(),
            interface: interface.to_string(),
        };
        let children = self.zk.get_children_w(&path, watcher).map_err(zk_err)?;

        let providers: Vec<ProviderUrl> = children
            .iter()
            .filter_map(|child| url::parse_provider_url(child).ok())
            .filter(|p| p.scheme == "dubbo")
            .filter(|p| matches_group_and_version(p, consumer_group, consumer_version))
            .collect();

        Ok(providers)
    }

    fn list_configurator_weights(self: Arc<Self>, interface: &str) -> DubboResult<HashMap<String, u32>> {
        let path = configurators_path(interface);
        let watcher = ConfiguratorWatcher {
            registry: self.clone(),
            interface: interface.to_string(),
        };
        let children = match self.zk.get_children_w(&path, watcher) {
            Ok(children) => children,
            Err(ZkError::NoNode) => return Ok(HashMap::new()),
            Err(e) => return Err(zk_err(e)),
        };

        let mut weights = HashMap::new();
        for child in &children {
            if let Ok(parsed) = url::parse_provider_url(child) {
                let weight = parsed
                    .field("weight")
                    .and_then(|w| w.parse::<u32>().ok())
                    .unwrap_or(100);
                weights.insert(parsed.host.clone(), weight);
            }
        }
        Ok(weights)
    }

    /// Called from the watcher dispatch thread on a provider-change
    /// event: re-list, re-filter by the criteria captured at first
    /// discovery, and atomically replace `hosts`.
    fn refresh_providers(self: Arc<Self>, interface: &str) {
        let entry = {
            let cache = self.cache.lock();
            match cache.get(interface) {
                Some(entry) => entry.clone(),
                None => return,
            }
        };

        match self.list_and_filter_providers(
            interface,
            entry.consumer_group.as_deref(),
            entry.consumer_version.as_deref(),
        ) {
            Ok(providers) => {
                let hosts: Vec<String> = providers.iter().map(|p| p.host.clone()).collect();
                if hosts.is_empty() {
                    tracing::debug!(interface, "no providers remain after filter");
                }
                let mut snapshot = entry.snapshot.read().as_ref().clone();
                snapshot.hosts = hosts;
                *entry.snapshot.write() = Arc::new(snapshot);
            }
            Err(e) => {
                tracing::warn!(interface, error = %e, "provider watch refresh failed; keeping last good snapshot");
            }
        }
    }

    fn refresh_configurators(self: Arc<Self>, interface: &str) {
        let entry = {
            let cache = self.cache.lock();
            match cache.get(interface) {
                Some(entry) => entry.clone(),
                None => return,
            }
        };

        match self.list_configurator_weights(interface) {
            Ok(weights) => {
                let mut snapshot = entry.snapshot.read().as_ref().clone();
                snapshot.weights = weights;
                *entry.snapshot.write() = Arc::new(snapshot);
            }
            Err(e) => {
                tracing::warn!(interface, error = %e, "configurator watch refresh failed; keeping last good snapshot");
            }
        }
    }

    fn register_consumer(&self, interface: &str, providers: &[ProviderUrl]) {
        let Some(provider) = providers.first() else {
            return;
        };

        let local_ip = match url::local_ip() {
            Ok(ip) => ip,
            Err(e) => {
                tracing::warn!(interface, error = %e, "could not determine local ip; skipping consumer registration");
                return;
            }
        };

        let mut fields: BTreeMap<String, String> = BTreeMap::new();
        fields.insert("application".to_string(), self.application_name.clone());
        fields.insert("category".to_string(), "consumers".to_string());
        fields.insert("check".to_string(), "false".to_string());
        fields.insert("connected".to_string(), "true".to_string());
        if let Some(v) = provider.field("dubbo") {
            fields.insert("dubbo".to_string(), v.to_string());
        }
        fields.insert("interface".to_string(), interface.to_string());
        if let Some(v) = provider.field("methods") {
            fields.insert("methods".to_string(), v.to_string());
        }
        fields.insert("pid".to_string(), std::process::id().to_string());
        fields.insert("side".to_string(), "consumer".to_string());
        fields.insert(
            "timestamp".to_string(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis().to_string())
                .unwrap_or_else(|_| "0".to_string()),
        );
        if let Some(v) = provider.field("revision") {
            fields.insert("revision".to_string(), v.to_string());
        }
        if let Some(v) = provider.field("version") {
            fields.insert("version".to_string(), v.to_string());
        }

        let consumer_url = url::build_consumer_url(&local_ip, &provider.path, &fields);
        let znode_name = url::encode_znode_name(&consumer_url);
        let parent = consumers_path(interface);

        if let Err(e) = self.zk.ensure_path(&parent) {
            tracing::warn!(interface, error = ?e, "failed to ensure consumers path; registration skipped");
            return;
        }

        let node_path = format!("{parent}/{znode_name}");
        // Fire-and-forget: failure is logged but never fails discovery.
        match self.zk.create(
            &node_path,
            Vec::new(),
            Acl::open_unsafe().clone(),
            CreateMode::Ephemeral,
        ) {
            Ok(_) => tracing::debug!(interface, "registered ephemeral consumer"),
            Err(e) => tracing::warn!(interface, error = ?e, "failed to register ephemeral consumer"),
        }
    }

    /// First discovery for `interface`: list providers, list
    /// configurators, register the ephemeral consumer, and build the
    /// initial snapshot. Called from within `discovery_lock` on the
    /// blocking thread pool.
    fn discover(
        self: Arc<Self>,
        interface: &str,
        consumer_group: Option<String>,
        consumer_version: Option<String>,
    ) -> DubboResult<Arc<InterfaceEntry>> {
        let path = providers_path(interface);
        match self.zk.exists(&path, false) {
            Ok(Some(_)) => {}
            Ok(None) => {
                return Err(DubboError::register(format!(
                    "no providers for interface {interface}"
                )))
            }
            Err(e) => return Err(zk_err(e)),
        }

        let providers = self
            .clone()
            .list_and_filter_providers(interface, consumer_group.as_deref(), consumer_version.as_deref())?;
        if providers.is_empty() {
            return Err(DubboError::register(format!(
                "no providers for interface {interface}"
            )));
        }

        self.register_consumer(interface, &providers);

        let weights = self.clone().list_configurator_weights(interface)?;
        let hosts: Vec<String> = providers.iter().map(|p| p.host.clone()).collect();

        let entry = Arc::new(InterfaceEntry {
            snapshot: RwLock::new(Arc::new(RoutingSnapshot { hosts, weights })),
            consumer_group,
            consumer_version,
        });

        self.cache.lock().insert(interface.to_string(), entry.clone());
        Ok(entry)
    }
}

fn matches_group_and_version(
    provider: &ProviderUrl,
    consumer_group: Option<&str>,
    consumer_version: Option<&str>,
) -> bool {
    group_matches(consumer_group, provider) && version_matches(consumer_version, provider)
}

fn group_matches(consumer_group: Option<&str>, provider: &ProviderUrl) -> bool {
    match consumer_group {
        None => true,
        Some("*") => true,
        Some(group) => {
            provider.field("group") == Some(group)
                || is_contained(group, provider.field("group"))
                || is_contained(group, provider.field("default.group"))
        }
    }
}

fn version_matches(consumer_version: Option<&str>, provider: &ProviderUrl) -> bool {
    match consumer_version {
        None => true,
        Some("*") => true,
        Some(version) => {
            provider.field("version") == Some(version) || is_contained(version, provider.field("version"))
        }
    }
}

/// True if `value` appears in `contains_value`'s comma-separated set.
fn is_contained(contains_value: &str, value: Option<&str>) -> bool {
    match value {
        Some(value) if !value.is_empty() => contains_value.split(',').any(|v| v == value),
        _ => false,
    }
}

fn zk_err(e: ZkError) -> DubboError {
    DubboError::register(format!("zookeeper error: {e:?}"))
}

/// The discovery/routing layer: owns the ZK session, the routing-entry
/// cache, and ephemeral consumer registration.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Registry {
    /// Connects to the ZK ensemble and installs the session-state
    /// listener. Blocking: the underlying `zookeeper` crate connects
    /// synchronously, so this is cheap to call from `spawn_blocking` if
    /// called from async code, or directly from a sync constructor.
    pub fn connect(config: RegistryConfig) -> DubboResult<Self> {
        let zk = ZooKeeper::connect(&config.zk_hosts, config.session_timeout, NoopWatcher)
            .map_err(|e| DubboError::register(format!("zookeeper connect failed: {e}")))?;

        zk.add_listener(|state: ZkState| match state {
            ZkState::Connected | ZkState::SaslAuthenticated => {
                tracing::debug!("zookeeper session connected")
            }
            ZkState::ConnectedReadOnly => tracing::debug!("zookeeper session connected (read-only)"),
            ZkState::Closed => tracing::debug!("zookeeper session closed"),
            ZkState::AuthFailed => tracing::warn!("zookeeper session auth failed"),
            ZkState::NotConnected => tracing::warn!("zookeeper session lost; ephemeral nodes will be re-created on next discovery"),
        });

        let inner = Arc::new(RegistryInner {
            zk,
            application_name: config.application_name,
            cache: parking_lot::Mutex::new(HashMap::new()),
            discovery_lock: tokio::sync::Mutex::new(()),
        });

        Ok(Self { inner })
    }

    /// Returns one provider host for `interface`, performing ZK discovery
    /// on the first call and routing against the in-memory snapshot on
    /// every subsequent call.
    pub async fn get_provider_host(
        &self,
        interface: &str,
        consumer_group: Option<&str>,
        consumer_version: Option<&str>,
    ) -> DubboResult<String> {
        let entry = self.entry_for(interface, consumer_group, consumer_version).await?;
        let snapshot = entry.snapshot.read().clone();
        crate::router::pick(interface, &snapshot.hosts, &snapshot.weights)
    }

    async fn entry_for(
        &self,
        interface: &str,
        consumer_group: Option<&str>,
        consumer_version: Option<&str>,
    ) -> DubboResult<Arc<InterfaceEntry>> {
        if let Some(entry) = self.inner.cache.lock().get(interface).cloned() {
            return Ok(entry);
        }

        let _guard = self.inner.discovery_lock.lock().await;
        if let Some(entry) = self.inner.cache.lock().get(interface).cloned() {
            return Ok(entry);
        }

        let inner = self.inner.clone();
        let interface_owned = interface.to_string();
        let group_owned = consumer_group.map(str::to_string);
        let version_owned = consumer_version.map(str::to_string);

        tokio::task::spawn_blocking(move || inner.discover(&interface_owned, group_owned, version_owned))
            .await
            .map_err(|e| DubboError::register(format!("discovery task panicked: {e}")))?
    }

    /// Closes the ZK session. Ephemeral consumer znodes are cleaned up by
    /// the server once the session expires.
    pub fn close(&self) -> DubboResult<()> {
        self.inner
            .zk
            .close()
            .map_err(|e| DubboError::register(format!("zookeeper close failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(host: &str, fields: &[(&str, &str)]) -> ProviderUrl {
        ProviderUrl {
            scheme: "dubbo".to_string(),
            host: host.to_string(),
            path: "/com.example.Svc".to_string(),
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn test_group_matches_wildcard_and_none() {
        let p = provider("A", &[("group", "g1")]);
        assert!(group_matches(None, &p));
        assert!(group_matches(Some("*"), &p));
    }

    #[test]
    fn test_group_matches_exact_and_set() {
        let p = provider("A", &[("group", "g1")]);
        assert!(group_matches(Some("g1"), &p));
        assert!(group_matches(Some("g0,g1,g2"), &p));
        assert!(!group_matches(Some("g2"), &p));
    }

    #[test]
    fn test_group_matches_default_group_fallback() {
        let p = provider("A", &[("default.group", "g1")]);
        assert!(group_matches(Some("g1"), &p));
    }

    #[test]
    fn test_version_matches_is_independent_of_group() {
        // §9's resolved open question: groupMatches AND versionMatches,
        // each evaluated independently.
        let p = provider("A", &[("group", "g1"), ("version", "1.0")]);
        assert!(!matches_group_and_version(&p, Some("other"), Some("1.0")));
        assert!(!matches_group_and_version(&p, Some("g1"), Some("2.0")));
        assert!(matches_group_and_version(&p, Some("g1"), Some("1.0")));
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained("a,b,c", Some("b")));
        assert!(!is_contained("a,b,c", Some("d")));
        assert!(!is_contained("a,b,c", None));
    }
}
