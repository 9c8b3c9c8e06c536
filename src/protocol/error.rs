//! Protocol-level error: malformed frame headers and truncated bodies.
//!
//! Kept distinct from [`crate::error::DubboError`] because frame parsing
//! happens below the point where an interface/method name is known; the
//! transport layer wraps these into a `DubboError::TransportError` once it
//! has that context.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    BadMagic([u8; 2]),
    Truncated { expected: usize, got: usize },
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::BadMagic(bytes) => write!(f, "bad frame magic: {bytes:02x?}"),
            FrameError::Truncated { expected, got } => {
                write!(f, "truncated frame: expected {expected} bytes, got {got}")
            }
        }
    }
}

impl std::error::Error for FrameError {}
