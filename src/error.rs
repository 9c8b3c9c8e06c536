//! Error types for the Dubbo client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DubboError {
    /// No providers available, or client/registry misconfigured.
    #[error("register error: {0}")]
    RegisterException(String),

    /// A value could not be represented in the Hessian2-style wire format.
    #[error("hessian type error: {0}")]
    HessianTypeError(String),

    /// Socket error, unexpected EOF, or malformed frame header.
    #[error("transport error: {0}")]
    TransportError(String),

    /// No response arrived before the call's deadline.
    #[error("timed out waiting for response to {method} on {interface} after {timeout_ms}ms")]
    TimeoutError {
        interface: String,
        method: String,
        timeout_ms: u64,
    },

    /// The peer returned a non-OK response status.
    #[error("dubbo exception (status={status}): {message}")]
    DubboException { status: u8, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid provider url: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl DubboError {
    pub fn register(message: impl Into<String>) -> Self {
        Self::RegisterException(message.into())
    }

    pub fn hessian_type(message: impl Into<String>) -> Self {
        Self::HessianTypeError(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError(message.into())
    }
}

pub type DubboResult<T> = Result<T, DubboError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DubboError::register("no providers for interface com.example.Svc");
        assert_eq!(
            err.to_string(),
            "register error: no providers for interface com.example.Svc"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = DubboError::TimeoutError {
            interface: "com.example.Svc".into(),
            method: "ping".into(),
            timeout_ms: 3000,
        };
        assert_eq!(
            err.to_string(),
            "timed out waiting for response to ping on com.example.Svc after 3000ms"
        );
    }
}
