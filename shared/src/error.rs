use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{CameraError, HttpError, KvError};
use crate::model::{CorrectionField, ImageSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Network,
    Timeout,
    Authentication,
    SessionExpired,
    Validation,
    ServerRejection,
    Server,
    Deserialization,
    Storage,
    Camera,
    CameraPermissionDenied,
    Busy,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Authentication => "AUTH_ERROR",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Validation => "VALIDATION_ERROR",
            Self::ServerRejection => "CARD_NOT_MATCHED",
            Self::Server => "SERVER_ERROR",
            Self::Deserialization => "DESERIALIZATION_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Camera => "CAMERA_ERROR",
            Self::CameraPermissionDenied => "CAMERA_PERMISSION_DENIED",
            Self::Busy => "BUSY",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Network | Self::Timeout | Self::Server | Self::Storage | Self::Camera | Self::Busy => {
                ErrorSeverity::Transient
            }

            Self::Deserialization | Self::InvalidState | Self::Internal => ErrorSeverity::Fatal,

            Self::Authentication
            | Self::SessionExpired
            | Self::Validation
            | Self::ServerRejection
            | Self::CameraPermissionDenied => ErrorSeverity::Permanent,
        }
    }

    /// Whether the user can sensibly press "try again". Nothing in the crate
    /// retries on its own apart from the single refresh cycle.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Network | Self::Timeout | Self::Server | Self::Storage | Self::Camera | Self::Busy
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("the {slot} of the card has not been captured")]
    MissingImage { slot: ImageSlot },

    #[error("the {field} cannot be empty")]
    EmptyField { field: CorrectionField },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The access token was rejected. Recovered at most once by a refresh.
    #[error("access token rejected")]
    AuthFailure,

    #[error("session expired: {reason}")]
    SessionExpired { reason: String },

    #[error("login rejected")]
    InvalidCredentials,

    #[error("network error: {0}")]
    Network(#[from] HttpError),

    #[error("server responded with {status}: {message}")]
    Server { status: u16, message: String },

    /// The correction was received but the server still could not match the card.
    #[error("server could not match the corrected card")]
    ServerRejection,

    #[error("invalid server response: {reason}")]
    InvalidResponse { reason: String },

    #[error("camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("credential storage error: {0}")]
    Storage(#[from] KvError),

    #[error("another submission is already in flight")]
    Busy,

    #[error("cannot {action} while {state}")]
    InvalidState { state: String, action: String },
}

impl CaptureError {
    pub fn session_expired(reason: impl Into<String>) -> Self {
        Self::SessionExpired {
            reason: reason.into(),
        }
    }

    pub fn invalid_state(state: impl ToString, action: impl Into<String>) -> Self {
        Self::InvalidState {
            state: state.to_string(),
            action: action.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::AuthFailure | Self::InvalidCredentials => ErrorKind::Authentication,
            Self::SessionExpired { .. } => ErrorKind::SessionExpired,
            Self::Network(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Network(HttpError::InvalidResponse { .. }) => ErrorKind::Deserialization,
            Self::Network(e) if e.is_transport() => ErrorKind::Network,
            Self::Network(_) => ErrorKind::Internal,
            Self::Server { .. } => ErrorKind::Server,
            Self::ServerRejection => ErrorKind::ServerRejection,
            Self::InvalidResponse { .. } => ErrorKind::Deserialization,
            Self::Camera(e) if e.is_permission_error() => ErrorKind::CameraPermissionDenied,
            Self::Camera(_) => ErrorKind::Camera,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Busy => ErrorKind::Busy,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
        }
    }

    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Camera(e) => e.is_retryable(),
            Self::Storage(e) => e.is_retryable(),
            other => other.kind().is_retryable(),
        }
    }

    /// The shell should route to the login screen.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind() {
            ErrorKind::Network => {
                "Unable to connect. Please check your internet connection and try again.".into()
            }
            ErrorKind::Timeout => "The request timed out. Please try again.".into(),
            ErrorKind::Authentication => "Incorrect username or password.".into(),
            ErrorKind::SessionExpired => "Your session has expired. Please sign in again.".into(),
            ErrorKind::Validation => capitalize(&self.to_string()),
            ErrorKind::ServerRejection => {
                "We still couldn't match this card. Please check the name and number.".into()
            }
            ErrorKind::Server => "The server had a problem. Please try again shortly.".into(),
            ErrorKind::Deserialization => {
                "A data error occurred. Please contact support if this persists.".into()
            }
            ErrorKind::Storage => "Unable to access saved sign-in details.".into(),
            ErrorKind::Camera => "Camera error. Please close and reopen the camera.".into(),
            ErrorKind::CameraPermissionDenied => {
                "Camera access is required. Please enable camera permissions in Settings.".into()
            }
            ErrorKind::Busy => "Please wait for the current upload to finish.".into(),
            ErrorKind::InvalidState | ErrorKind::Internal => {
                "An unexpected error occurred. Please try again or contact support.".into()
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// Serializable projection handed to shells.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserFacingError {
    pub message: String,
    pub is_transient: bool,
    pub is_retryable: bool,
    pub requires_login: bool,
    pub error_code: String,
}

impl From<&CaptureError> for UserFacingError {
    fn from(e: &CaptureError) -> Self {
        Self {
            message: e.user_facing_message(),
            is_transient: e.kind().default_severity() == ErrorSeverity::Transient,
            is_retryable: e.is_retryable(),
            requires_login: e.requires_login(),
            error_code: e.code().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeouts_are_retryable_network_errors() {
        let err = CaptureError::from(HttpError::Timeout {
            timeout_ms: 120_000,
            request_id: "r1".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
        assert_eq!(err.code(), "TIMEOUT");
    }

    #[test]
    fn test_connection_errors_map_to_network() {
        let err = CaptureError::from(HttpError::ConnectionError {
            host: "api.example.com".into(),
            message: "refused".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_session_expired_is_fatal_for_the_flow() {
        let err = CaptureError::session_expired("refresh rejected");
        assert!(!err.is_retryable());
        assert!(err.requires_login());
        let view = UserFacingError::from(&err);
        assert_eq!(view.error_code, "SESSION_EXPIRED");
        assert!(view.requires_login);
        assert!(!view.is_transient);
    }

    #[test]
    fn test_validation_message_is_shown_verbatim() {
        let err = CaptureError::from(ValidationError::EmptyField {
            field: CorrectionField::Number,
        });
        assert_eq!(err.user_facing_message(), "The number cannot be empty");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_camera_retryability_follows_the_camera_error() {
        assert!(CaptureError::from(CameraError::Busy).is_retryable());
        let denied = CaptureError::from(CameraError::PermissionDenied);
        assert_eq!(denied.kind(), ErrorKind::CameraPermissionDenied);
        assert!(!denied.is_retryable());
    }

    #[test]
    fn test_invalid_state_names_state_and_action() {
        let err = CaptureError::invalid_state("uploading", "edit the form");
        assert_eq!(err.to_string(), "cannot edit the form while uploading");
        assert_eq!(err.kind().default_severity(), ErrorSeverity::Fatal);
    }
}
