use levante_gatt::{AuthError, GattError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("Pin not set")]
    PinNotSet,
    #[error("Unable to set pin")]
    PinRejected,
    #[error("Fan speed targets not available yet")]
    TargetsUnavailable,
    #[error("Update failed: {0}")]
    UpdateFailed(GattError),
}

impl CoordinatorError {
    /// Whether the failure is about the credential rather than the link
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::PinNotSet | Self::PinRejected)
    }
}

impl From<GattError> for CoordinatorError {
    fn from(err: GattError) -> Self {
        match err {
            GattError::Auth(AuthError::PinNotSet) => Self::PinNotSet,
            GattError::Auth(AuthError::PinRejected) => Self::PinRejected,
            other => Self::UpdateFailed(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Device {0} is already registered")]
    AlreadyRegistered(String),
    #[error("Device {address} is not ready: {source}")]
    NotReady {
        address: String,
        #[source]
        source: CoordinatorError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use levante_gatt::TransportError;

    #[test]
    fn test_auth_errors_map_to_coordinator_variants() {
        assert_eq!(
            CoordinatorError::from(GattError::Auth(AuthError::PinRejected)),
            CoordinatorError::PinRejected
        );
        assert!(CoordinatorError::from(GattError::Auth(AuthError::PinNotSet)).is_auth());

        let err = CoordinatorError::from(GattError::Transport(TransportError::Disconnected));
        assert!(!err.is_auth());
        assert!(matches!(err, CoordinatorError::UpdateFailed(_)));
    }
}
