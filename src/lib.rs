//! # Dubbo Client
//!
//! A client for invoking remote procedures exposed by servers speaking
//! the Dubbo 2.x wire protocol, using a ZooKeeper ensemble for service
//! discovery and a Hessian2-style binary encoding for the request
//! payload.
//!
//! ## Architecture
//!
//! ```text
//! DubboClient.call
//!   -> Registry.get_provider_host   (ZooKeeper discovery + weighted routing)
//!   -> Encoder.encode_body          (Hessian2-style request payload)
//!   -> ConnectionPool.get           (per-host TCP connection, request/response correlation)
//!   -> Decoder                      (Hessian2-style response payload)
//! ```
//!
//! ### Layer 2: Protocol (pure, sync)
//! - [`protocol::encoder::Encoder`] - compiles an [`Invocation`] to a frame body
//! - [`protocol::decoder::Decoder`] - parses a response frame body back into a [`Value`]
//! - [`protocol::wire`] - the 16-byte frame header
//!
//! ### Layer 3: Transport (async I/O)
//! - [`transport::Connection`] - one persistent TCP connection with request-id correlation
//! - [`transport::ConnectionPool`] - `host:port -> Connection`, opened at most once per host
//!
//! ### Layer 4: Discovery and facade
//! - [`registry::Registry`] - ZooKeeper-backed provider/configurator watching and ephemeral consumer registration
//! - [`router`] - weighted random host selection
//! - [`client::DubboClient`] - binds an interface and dispatches `call()`
//!
//! ## Example
//!
//! ```ignore
//! use dubbo_client::{DubboClientBuilder, DubboClient, ConnectionPool, PoolConfig};
//! use std::sync::Arc;
//!
//! # async fn run() -> dubbo_client::DubboResult<()> {
//! let config = DubboClientBuilder::new("com.example.EchoService")
//!     .host("127.0.0.1:20880")
//!     .build();
//! let pool = Arc::new(ConnectionPool::new(PoolConfig::default()));
//! let client = DubboClient::with_host(config, pool)?;
//! let result = client.call("echo", "hello", None).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod transport;
pub mod value;

pub use client::{Args, DubboClient};
pub use config::{DubboClientBuilder, DubboClientConfig, PoolConfig, RegistryConfig};
pub use error::{DubboError, DubboResult};
pub use protocol::encoder::Invocation;
pub use registry::Registry;
pub use transport::ConnectionPool;
pub use value::{Object, ToValue, Value};
