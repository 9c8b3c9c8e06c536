//! The `DubboClient` facade: binds an interface/version/group and
//! dispatches `call()` through the registry (or a direct host) and the
//! connection pool, wrapping bare arguments into a list and logging
//! dispatch/elapsed time around each call.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{DubboClientConfig, PoolConfig};
use crate::error::{DubboError, DubboResult};
use crate::protocol::encoder::Invocation;
use crate::registry::Registry;
use crate::transport::ConnectionPool;
use crate::value::Value;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

enum HostSource {
    Registry(Registry),
    Direct(String),
}

/// Binds `{interface, version?, group?, dubbo_version}` and a way to
/// reach a provider (a [`Registry`] or a direct `host:port`), exposing a
/// single [`DubboClient::call`] entry point.
pub struct DubboClient {
    interface: String,
    version: String,
    group: Option<String>,
    dubbo_version: String,
    source: HostSource,
    pool: Arc<ConnectionPool>,
}

impl DubboClient {
    /// Construct a client routed through `registry`. Fails to construct
    /// only if `config.host` and a registry are both absent, per the
    /// public-surface contract — here that's expressed by requiring one
    /// of [`DubboClient::with_registry`] / [`DubboClient::with_host`].
    pub fn with_registry(config: DubboClientConfig, registry: Registry, pool: Arc<ConnectionPool>) -> Self {
        Self::new(config, HostSource::Registry(registry), pool)
    }

    pub fn with_host(config: DubboClientConfig, pool: Arc<ConnectionPool>) -> DubboResult<Self> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| DubboError::register("DubboClient requires either a registry or a direct host"))?;
        Ok(Self::new(config, HostSource::Direct(host), pool))
    }

    /// Constructs either form depending on whether `config.host` is set;
    /// fails with `RegisterException` if `registry` is `None` and
    /// `config.host` is also absent.
    pub fn new_auto(
        config: DubboClientConfig,
        registry: Option<Registry>,
        pool: Arc<ConnectionPool>,
    ) -> DubboResult<Self> {
        match (registry, config.host.clone()) {
            (Some(registry), _) => Ok(Self::with_registry(config, registry, pool)),
            (None, Some(_)) => Self::with_host(config, pool),
            (None, None) => Err(DubboError::register(
                "DubboClient requires either a registry or a direct host",
            )),
        }
    }

    fn new(config: DubboClientConfig, source: HostSource, pool: Arc<ConnectionPool>) -> Self {
        tracing::debug!(
            interface = %config.interface,
            version = ?config.version,
            "created client"
        );
        Self {
            interface: config.interface,
            version: config.version.unwrap_or_default(),
            group: config.group,
            dubbo_version: config.dubbo_version,
            source,
            pool,
        }
    }

    /// Executes a remote call. `args` is wrapped as a single-element
    /// sequence if the caller passes one bare value; `timeout` defaults
    /// to 10 seconds when not given.
    pub async fn call(&self, method: &str, args: impl Into<Args>, timeout: Option<Duration>) -> DubboResult<Value> {
        let arguments = args.into().0;
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);

        let host = match &self.source {
            HostSource::Registry(registry) => {
                let version = if self.version.is_empty() { None } else { Some(self.version.as_str()) };
                registry
                    .get_provider_host(&self.interface, self.group.as_deref(), version)
                    .await?
            }
            HostSource::Direct(host) => host.clone(),
        };

        let invocation = Invocation {
            dubbo_version: self.dubbo_version.clone(),
            path: self.interface.clone(),
            version: self.version.clone(),
            method: method.to_string(),
            arguments,
            group: self.group.clone(),
        };

        tracing::debug!(host = %host, interface = %self.interface, method, "dispatching request");
        let start = Instant::now();
        let result = self.pool.get(&host, &invocation, timeout).await;
        let elapsed_ms = start.elapsed().as_millis();
        tracing::debug!(
            host = %host,
            interface = %self.interface,
            method,
            elapsed_ms,
            ok = result.is_ok(),
            "request finished"
        );

        result
    }
}

/// An argument list for [`DubboClient::call`]. A bare value is wrapped as
/// a one-element list; an explicit `Vec<Value>` (or `()` for no
/// arguments) passes through unchanged.
pub struct Args(Vec<Value>);

impl From<()> for Args {
    fn from(_: ()) -> Self {
        Args(Vec::new())
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Args(values)
    }
}

impl From<Value> for Args {
    fn from(value: Value) -> Self {
        Args(vec![value])
    }
}

impl From<bool> for Args {
    fn from(value: bool) -> Self {
        Args(vec![value.into()])
    }
}

impl From<i32> for Args {
    fn from(value: i32) -> Self {
        Args(vec![value.into()])
    }
}

impl From<i64> for Args {
    fn from(value: i64) -> Self {
        Args(vec![value.into()])
    }
}

impl From<f64> for Args {
    fn from(value: f64) -> Self {
        Args(vec![value.into()])
    }
}

impl From<&str> for Args {
    fn from(value: &str) -> Self {
        Args(vec![value.into()])
    }
}

impl From<String> for Args {
    fn from(value: String) -> Self {
        Args(vec![value.into()])
    }
}

impl From<crate::value::Object> for Args {
    fn from(value: crate::value::Object) -> Self {
        Args(vec![value.into()])
    }
}
