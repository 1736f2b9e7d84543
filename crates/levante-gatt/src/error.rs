//! Errors surfaced by sessions, queries and commands

use levante_core::DecodeError;
use std::time::Duration;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Pin not set")]
    PinNotSet,
    #[error("Pin rejected by device")]
    PinRejected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GattError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Session timed out after {0:?}")]
    Timeout(Duration),
}
