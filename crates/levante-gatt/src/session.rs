//! Scoped device sessions
//!
//! A session is one connection lifetime: connect, run a short protocol,
//! disconnect. [`SessionFactory::with_session`] is the only place that
//! opens links, so the deadline and the teardown live in one spot.

use levante_core::Attribute;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::error::GattError;
use crate::transport::{Link, Transport, TransportError};

/// Bound for one connect-and-run sequence
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum time a disconnect gets when the body ran up to the deadline
pub const DISCONNECT_GRACE: Duration = Duration::from_secs(1);

/// Handle to an open link, valid for the duration of a session body
#[derive(Clone)]
pub struct Session {
    link: Arc<dyn Link>,
    address: Arc<str>,
}

impl Session {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn read(&self, attribute: Attribute) -> Result<Vec<u8>, TransportError> {
        let value = self.link.read(attribute.uuid()).await?;
        trace!(address = %self.address, %attribute, len = value.len(), "Read attribute");
        Ok(value)
    }

    /// Write a value, returning whether the device acknowledged it
    pub async fn write(&self, attribute: Attribute, value: &[u8]) -> Result<bool, TransportError> {
        trace!(address = %self.address, %attribute, len = value.len(), "Writing attribute");
        self.link.write(attribute.uuid(), value).await
    }

    pub async fn characteristics(&self) -> Result<Vec<Uuid>, TransportError> {
        self.link.characteristics().await
    }
}

/// Opens sessions to one device address
#[derive(Clone)]
pub struct SessionFactory {
    transport: Arc<dyn Transport>,
    address: String,
    hint: String,
    timeout: Duration,
}

impl SessionFactory {
    pub fn new(transport: Arc<dyn Transport>, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            transport,
            hint: address.clone(),
            address,
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Name passed to the transport alongside the address
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connect, run `body`, and disconnect
    ///
    /// Connecting and the body share one deadline. The disconnect is bounded
    /// by the same deadline, or by [`DISCONNECT_GRACE`] when less than that
    /// remains. The link is released on every exit path: success, error,
    /// timeout, and the caller dropping the returned future. A disconnect
    /// that overruns is finished in the background.
    pub async fn with_session<T, F, Fut>(&self, body: F) -> Result<T, GattError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, GattError>>,
    {
        let deadline = Instant::now() + self.timeout;

        let link = match timeout_at(
            deadline,
            self.transport.connect(&self.address, &self.hint, self.timeout),
        )
        .await
        {
            Ok(link) => link?,
            Err(_) => {
                warn!(address = %self.address, timeout = ?self.timeout, "Connect timed out");
                return Err(GattError::Timeout(self.timeout));
            }
        };

        debug!(address = %self.address, "Session opened");
        let guard = LinkGuard::new(link.clone(), &self.address);
        let session = Session {
            link,
            address: Arc::from(self.address.as_str()),
        };

        let outcome = timeout_at(deadline, body(session)).await;
        guard.release(deadline.max(Instant::now() + DISCONNECT_GRACE)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(address = %self.address, timeout = ?self.timeout, "Session timed out");
                Err(GattError::Timeout(self.timeout))
            }
        }
    }
}

/// Disconnects its link exactly once
struct LinkGuard {
    link: Option<Arc<dyn Link>>,
    address: String,
}

impl LinkGuard {
    fn new(link: Arc<dyn Link>, address: &str) -> Self {
        Self {
            link: Some(link),
            address: address.to_string(),
        }
    }

    /// Disconnect before `release_by`, otherwise hand the link to `Drop`
    async fn release(mut self, release_by: Instant) {
        let Some(link) = self.link.take() else {
            return;
        };
        let outcome = timeout_at(release_by, link.disconnect()).await;
        match outcome {
            Ok(Ok(())) => debug!(address = %self.address, "Session closed"),
            Ok(Err(e)) => warn!(address = %self.address, error = %e, "Disconnect failed"),
            Err(_) => {
                warn!(address = %self.address, "Disconnect timed out, finishing in background");
                self.link = Some(link);
            }
        }
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        // Only reached with a link still held: the session future was dropped
        // or the disconnect overran
        if let Some(link) = self.link.take() {
            let address = std::mem::take(&mut self.address);
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = link.disconnect().await {
                        warn!(address = %address, error = %e, "Deferred disconnect failed");
                    }
                });
            } else {
                warn!(address = %address, "No runtime to release abandoned session");
            }
        }
    }
}
