//! The Dubbo frame + invocation layer: framing, request/response
//! correlation, and the per-host connection pool.

pub mod connection;
pub mod pool;

pub use connection::Connection;
pub use pool::ConnectionPool;
