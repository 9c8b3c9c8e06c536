//! Plain configuration structures, each with a chained-setter builder.
//!
//! None of these parse a config *file*. They are in-memory structures
//! assembled by the embedding application and passed directly to the
//! constructors that need them.

use std::time::Duration;

/// Governs the [`crate::transport::ConnectionPool`]'s per-host connection
/// lifecycle: connect/acquire timeouts and idle bookkeeping.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub connect_timeout: Duration,
    pub acquire_timeout: Duration,
    /// Not actively enforced: this pool holds exactly one long-lived
    /// connection per host rather than a reclaimable set of idle ones,
    /// so there is nothing to evict on an idle timer.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Construction parameters for a [`crate::registry::Registry`].
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub zk_hosts: String,
    pub application_name: String,
    pub session_timeout: Duration,
}

impl RegistryConfig {
    pub fn new(zk_hosts: impl Into<String>, application_name: impl Into<String>) -> Self {
        Self {
            zk_hosts: zk_hosts.into(),
            application_name: application_name.into(),
            session_timeout: Duration::from_secs(15),
        }
    }

    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }
}

/// Assembled `{interface, version, group, dubbo_version, registry, host}`
/// for a [`crate::client::DubboClient`], built via [`DubboClientBuilder`].
#[derive(Clone)]
pub struct DubboClientConfig {
    pub interface: String,
    pub version: Option<String>,
    pub group: Option<String>,
    pub dubbo_version: String,
    pub host: Option<String>,
}

/// Builds a [`DubboClientConfig`]. Either [`DubboClientBuilder::host`] or
/// a registry handle (passed separately to
/// [`crate::client::DubboClient::new`]) must be supplied; the builder
/// itself doesn't enforce that since the registry is constructed
/// independently.
pub struct DubboClientBuilder {
    interface: String,
    version: Option<String>,
    group: Option<String>,
    dubbo_version: String,
    host: Option<String>,
}

impl DubboClientBuilder {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            version: None,
            group: None,
            dubbo_version: "2.6.1".to_string(),
            host: None,
        }
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn dubbo_version(mut self, dubbo_version: impl Into<String>) -> Self {
        self.dubbo_version = dubbo_version.into();
        self
    }

    /// Direct host, bypassing the registry.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn build(self) -> DubboClientConfig {
        DubboClientConfig {
            interface: self.interface,
            version: self.version,
            group: self.group,
            dubbo_version: self.dubbo_version,
            host: self.host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builder_defaults() {
        let cfg = DubboClientBuilder::new("com.example.Svc").build();
        assert_eq!(cfg.dubbo_version, "2.6.1");
        assert!(cfg.version.is_none());
        assert!(cfg.group.is_none());
        assert!(cfg.host.is_none());
    }

    #[test]
    fn test_client_builder_direct_host() {
        let cfg = DubboClientBuilder::new("com.example.Svc")
            .host("127.0.0.1:20880")
            .group("exchange")
            .build();
        assert_eq!(cfg.host.as_deref(), Some("127.0.0.1:20880"));
        assert_eq!(cfg.group.as_deref(), Some("exchange"));
    }
}
