use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use miette::{Diagnostic, Result};
use thiserror::Error;
use tracing::error;

/// Main error type for the application
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(gcal_relay::config))]
    Config(String),

    #[error("Authorization error: {0}")]
    #[diagnostic(code(gcal_relay::authorization))]
    Authorization(String),

    #[error("Authorization pending: visit {url} and submit the code to /auth/code")]
    #[diagnostic(
        code(gcal_relay::authorization_pending),
        help("submit the code with POST /auth/code or run the `authorize` binary")
    )]
    AuthorizationPending { url: String },

    #[error("Google Calendar API error: HTTP {status} - {body}")]
    #[diagnostic(code(gcal_relay::google_calendar))]
    Provider { status: u16, body: String },

    #[error("Google Calendar error: {0}")]
    #[diagnostic(code(gcal_relay::google_calendar))]
    GoogleCalendar(String),

    #[error("HTTP client error: {0}")]
    #[diagnostic(code(gcal_relay::http))]
    Http(#[from] reqwest::Error),

    #[error("Missing field: {0}")]
    #[diagnostic(code(gcal_relay::missing_field))]
    MissingField(String),

    #[error(transparent)]
    #[diagnostic(code(gcal_relay::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(gcal_relay::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(gcal_relay::other))]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self);

        let (status, message) = match &self {
            Error::AuthorizationPending { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Something went wrong: {}", self),
            ),
        };

        (status, message).into_response()
    }
}

/// Type alias for Result with our Error type
pub type RelayResult<T> = Result<T, Error>;

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create authorization errors
pub fn authorization_error(message: &str) -> Error {
    Error::Authorization(message.to_string())
}

/// Helper to create Google Calendar errors
pub fn google_calendar_error(message: &str) -> Error {
    Error::GoogleCalendar(message.to_string())
}

/// Helper to create missing field errors
pub fn missing_field(field: &str) -> Error {
    Error::MissingField(field.to_string())
}

/// Helper to create other errors
pub fn other_error(message: &str) -> Error {
    Error::Other(message.to_string())
}
