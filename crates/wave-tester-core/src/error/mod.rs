use std::panic::Location;

use error_location::ErrorLocation;
use thiserror::Error;

/// Raw transport fault reported by a remote call.
///
/// Only ports produce this type. [`RemoteServiceHandle`](crate::RemoteServiceHandle)
/// converts it into a [`WaveError`] before it reaches any other component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// The channel to the service dropped before the call completed.
    #[error("remote service disconnected")]
    Disconnected,

    /// The call reached the service but failed there.
    #[error("remote call failed: {reason}")]
    Failed {
        /// Description reported by the transport.
        reason: String,
    },
}

/// Client errors with source location tracking.
#[derive(Error, Debug)]
pub enum WaveError {
    /// The service could not be found or started.
    #[error("Sensor service unavailable: {reason} {location}")]
    ServiceUnavailable {
        /// Description of the bind failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The connection to the service was lost, or never established.
    #[error("Lost connection to the sensor service {location}")]
    ConnectionLost {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// A remote call failed without losing the connection.
    #[error("Remote call {operation} failed: {reason} {location}")]
    RpcFailure {
        /// Name of the remote operation.
        operation: &'static str,
        /// Description reported by the transport.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The service declined to stream the recipe output.
    #[error("Service refused to stream recipe {recipe_id} {location}")]
    RegistrationRefused {
        /// Recipe whose registration was refused.
        recipe_id: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// An external authorization request is already in flight.
    #[error("Authorization already pending for recipe {recipe_id} {location}")]
    AuthorizationInProgress {
        /// Recipe of the request already in flight.
        recipe_id: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The external authorization flow could not be launched.
    #[error("Error launching authorization UI: {reason} {location}")]
    AuthorizationFlowUnavailable {
        /// Description of the launch failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Operation is not valid in the current state.
    #[error("Invalid state: {reason} {location}")]
    InvalidState {
        /// Description of the violated precondition.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

impl WaveError {
    /// Converts a transport fault raised by `operation` into the client taxonomy.
    #[track_caller]
    pub(crate) fn from_rpc(operation: &'static str, error: RpcError) -> Self {
        let location = ErrorLocation::from(Location::caller());
        match error {
            RpcError::Disconnected => WaveError::ConnectionLost { location },
            RpcError::Failed { reason } => WaveError::RpcFailure {
                operation,
                reason,
                location,
            },
        }
    }

    #[track_caller]
    pub(crate) fn connection_lost() -> Self {
        WaveError::ConnectionLost {
            location: ErrorLocation::from(Location::caller()),
        }
    }

    #[track_caller]
    pub(crate) fn invalid_state(reason: impl Into<String>) -> Self {
        WaveError::InvalidState {
            reason: reason.into(),
            location: ErrorLocation::from(Location::caller()),
        }
    }

    /// True when the error means the service connection is gone.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, WaveError::ConnectionLost { .. })
    }
}

/// Result type alias using [`WaveError`].
pub type Result<T> = std::result::Result<T, WaveError>;
