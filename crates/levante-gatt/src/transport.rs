//! Transport abstraction over the fan's GATT link
//!
//! The radio stack lives outside this workspace. Anything that can open a
//! link to an address and read/write characteristics by UUID can drive a
//! fan through these two traits.

use async_trait::async_trait;
use levante_core::Attribute;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Unable to connect to {address}: {reason}")]
    Connect { address: String, reason: String },
    #[error("Characteristic {0} not found")]
    AttributeNotFound(Uuid),
    #[error("Read of {attribute} failed: {reason}")]
    Read {
        attribute: Attribute,
        reason: String,
    },
    #[error("Write of {attribute} failed: {reason}")]
    Write {
        attribute: Attribute,
        reason: String,
    },
    #[error("Write of {0} was not acknowledged")]
    NotAcknowledged(Attribute),
    #[error("Link is disconnected")]
    Disconnected,
}

/// Opens links to devices
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish a link to `address`
    ///
    /// `hint` is a human-readable name for logs and connection caches.
    async fn connect(
        &self,
        address: &str,
        hint: &str,
        timeout: Duration,
    ) -> Result<Arc<dyn Link>, TransportError>;
}

/// An established link to one device
#[async_trait]
pub trait Link: Send + Sync {
    async fn read(&self, characteristic: Uuid) -> Result<Vec<u8>, TransportError>;

    /// Write a value, returning whether the device acknowledged it
    async fn write(&self, characteristic: Uuid, value: &[u8]) -> Result<bool, TransportError>;

    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Characteristics the device exposes, for diagnostics
    async fn characteristics(&self) -> Result<Vec<Uuid>, TransportError> {
        Ok(Vec::new())
    }
}
