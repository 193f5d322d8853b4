//! Centralized error types for the Tandem core library.
//!
//! This module provides a unified error handling system that:
//! - Defines structured error types using `thiserror`
//! - Maps errors to appropriate HTTP status codes
//! - Implements `IntoResponse` for automatic JSON error responses
//! - Rebuilds errors from JSON bodies on the client side

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::player::PlayerError;
use crate::session::SessionSnapshot;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths.
pub trait ErrorCode {
    /// Returns a machine-readable error code for API responses.
    fn code(&self) -> &'static str;
}

impl ErrorCode for PlayerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Load(_) => "player_load_failed",
            Self::Playback(_) => "player_playback_failed",
            Self::Unavailable => "player_unavailable",
        }
    }
}

/// Application-wide error type for Tandem.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum TandemError {
    /// The group does not exist (never created, or already torn down).
    ///
    /// Clients surface this as "session ended".
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// The command was based on an older state version.
    ///
    /// Carries the authoritative snapshot so the caller can resynchronize.
    #[error("Stale command: session is at version {}", .current.state_version)]
    StaleCommand { current: Box<SessionSnapshot> },

    /// The host is gone or has not re-anchored after a failover.
    #[error("Host unavailable: {0}")]
    HostUnavailable(String),

    /// A playback transition came from a member that is not the host.
    #[error("Member {0} is not the session host")]
    NotHost(String),

    /// The member is not part of the session.
    #[error("Member {0} is not part of the session")]
    NotMember(String),

    /// The command is not valid in the session's current phase.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Client sent an invalid or malformed request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The local player failed to load or play.
    #[error("Playback device error: {0}")]
    PlaybackDevice(String),

    /// A network call exceeded its advisory timeout.
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// Network-related error (connection refused, bad response).
    #[error("Network error: {0}")]
    Network(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error (invalid or missing settings).
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TandemError {
    /// Returns a machine-readable error code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::StaleCommand { .. } => "stale_command",
            Self::HostUnavailable(_) => "host_unavailable",
            Self::NotHost(_) => "not_host",
            Self::NotMember(_) => "not_member",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::InvalidRequest(_) => "invalid_request",
            Self::PlaybackDevice(_) => "playback_device_error",
            Self::NetworkTimeout(_) => "network_timeout",
            Self::Network(_) => "network_error",
            Self::Internal(_) => "internal_error",
            Self::Configuration(_) => "configuration_error",
        }
    }

    /// Maps the error to an appropriate HTTP status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::StaleCommand { .. } | Self::InvalidTransition(_) => StatusCode::CONFLICT,
            Self::NotHost(_) | Self::NotMember(_) => StatusCode::FORBIDDEN,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::HostUnavailable(_) | Self::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::NetworkTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Network(_) => StatusCode::BAD_GATEWAY,
            Self::PlaybackDevice(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns true for errors that clear up by themselves on a later cycle.
    ///
    /// Background loops log these and try again instead of surfacing them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout(_) | Self::Network(_) | Self::HostUnavailable(_)
        )
    }

    /// Rebuilds an error from a JSON error body returned by the API.
    pub fn from_body(body: ErrorBody) -> Self {
        let ErrorBody {
            error,
            message,
            snapshot,
            ..
        } = body;
        match (error.as_str(), snapshot) {
            ("stale_command", Some(current)) => Self::StaleCommand {
                current: Box::new(current),
            },
            ("session_not_found", _) => Self::SessionNotFound(message),
            ("host_unavailable", _) => Self::HostUnavailable(message),
            ("not_host", _) => Self::NotHost(message),
            ("not_member", _) => Self::NotMember(message),
            ("invalid_transition", _) => Self::InvalidTransition(message),
            ("invalid_request", _) => Self::InvalidRequest(message),
            ("network_timeout", _) => Self::NetworkTimeout(message),
            ("network_error", _) => Self::Network(message),
            ("playback_device_error", _) => Self::PlaybackDevice(message),
            ("configuration_error", _) => Self::Configuration(message),
            _ => Self::Internal(message),
        }
    }
}

/// Convenient Result alias for application-wide operations.
pub type TandemResult<T> = Result<T, TandemError>;

/// JSON body for error responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SessionSnapshot>,
}

impl IntoResponse for TandemError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.code().to_string(),
            message: self.to_string(),
            status: status.as_u16(),
            snapshot: match self {
                Self::StaleCommand { current } => Some(*current),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<PlayerError> for TandemError {
    fn from(err: PlayerError) -> Self {
        Self::PlaybackDevice(err.to_string())
    }
}

impl From<reqwest::Error> for TandemError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::NetworkTimeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_not_found_returns_correct_code() {
        let err = TandemError::SessionNotFound("grp:1".into());
        assert_eq!(err.code(), "session_not_found");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(TandemError::NetworkTimeout("x".into()).is_transient());
        assert!(TandemError::HostUnavailable("x".into()).is_transient());
        assert!(!TandemError::SessionNotFound("x".into()).is_transient());
        assert!(!TandemError::PlaybackDevice("x".into()).is_transient());
    }

    #[test]
    fn player_error_maps_to_playback_device() {
        let err: TandemError = PlayerError::Load("decode failed".into()).into();
        assert_eq!(err.code(), "playback_device_error");
        assert_eq!(PlayerError::Unavailable.code(), "player_unavailable");
    }

    #[test]
    fn error_body_keeps_network_and_device_classification() {
        let body = |code: &str| ErrorBody {
            error: code.into(),
            message: "upstream".into(),
            status: 502,
            snapshot: None,
        };
        let err = TandemError::from_body(body("network_error"));
        assert!(matches!(err, TandemError::Network(_)));
        assert!(err.is_transient());

        let err = TandemError::from_body(body("playback_device_error"));
        assert!(matches!(err, TandemError::PlaybackDevice(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn error_body_round_trips_known_codes() {
        let err = TandemError::from_body(ErrorBody {
            error: "not_host".into(),
            message: "Member m2 is not the session host".into(),
            status: 403,
            snapshot: None,
        });
        assert!(matches!(err, TandemError::NotHost(_)));

        let err = TandemError::from_body(ErrorBody {
            error: "something_new".into(),
            message: "boom".into(),
            status: 500,
            snapshot: None,
        });
        assert!(matches!(err, TandemError::Internal(_)));
    }
}
