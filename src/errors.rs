use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// Main error type for the sparrow-live client
#[derive(Debug, Clone)]
pub enum SparrowError {
    // HTTP API errors
    BadRequest(String),
    NotFound(String),
    InternalServer(String),

    // Backend and transport errors
    BackendUnavailable(String),
    SubscriptionFailed(String),
    SubscriptionRevoked(String),
    FetchFailed(String),
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),
    InvalidFormat(String),

    // Domain errors
    InvalidGeofence(String),
    OrderNotFound(String),
    ChannelClosed,

    // Notification platform errors
    NotificationsUnsupported,
    WindowNotFound(String),
    WindowNavigation(String),

    // Configuration and setup errors
    InvalidConfiguration(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl fmt::Display for SparrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparrowError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            SparrowError::NotFound(msg) => write!(f, "Not found: {}", msg),
            SparrowError::InternalServer(msg) => write!(f, "Internal server error: {}", msg),

            SparrowError::BackendUnavailable(msg) => write!(f, "Backend unavailable: {}", msg),
            SparrowError::SubscriptionFailed(msg) => write!(f, "Subscription failed: {}", msg),
            SparrowError::SubscriptionRevoked(msg) => write!(f, "Subscription revoked: {}", msg),
            SparrowError::FetchFailed(msg) => write!(f, "Fetch failed: {}", msg),
            SparrowError::NetworkTimeout => write!(f, "Network request timed out"),
            SparrowError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            SparrowError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            SparrowError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            SparrowError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),
            SparrowError::InvalidFormat(msg) => write!(f, "Invalid format: {}", msg),

            SparrowError::InvalidGeofence(msg) => write!(f, "Invalid geofence: {}", msg),
            SparrowError::OrderNotFound(id) => write!(f, "Order not found: {}", id),
            SparrowError::ChannelClosed => write!(f, "Communication channel closed"),

            SparrowError::NotificationsUnsupported => {
                write!(f, "Notifications are not supported on this platform")
            }
            SparrowError::WindowNotFound(id) => write!(f, "Window not found: {}", id),
            SparrowError::WindowNavigation(msg) => write!(f, "Window navigation failed: {}", msg),

            SparrowError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for SparrowError {}

impl IntoResponse for SparrowError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            SparrowError::BadRequest(_)
            | SparrowError::InvalidFormat(_)
            | SparrowError::InvalidUrl(_)
            | SparrowError::JsonParsing(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            SparrowError::InvalidGeofence(_) => (StatusCode::BAD_REQUEST, "invalid_geofence"),
            SparrowError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            SparrowError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "order_not_found"),
            SparrowError::WindowNotFound(_) => (StatusCode::NOT_FOUND, "window_not_found"),
            SparrowError::NotificationsUnsupported => {
                (StatusCode::NOT_IMPLEMENTED, "notifications_unsupported")
            }
            SparrowError::NetworkTimeout => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            SparrowError::BackendUnavailable(_) | SparrowError::NetworkConnection(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable")
            }

            // All other errors are treated as internal server errors
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let error_response = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        (status, axum::Json(error_response)).into_response()
    }
}

// Convenience type alias for Results
pub type SparrowResult<T> = Result<T, SparrowError>;

impl From<reqwest::Error> for SparrowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SparrowError::NetworkTimeout
        } else if err.is_connect() {
            SparrowError::NetworkConnection(err.to_string())
        } else {
            SparrowError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SparrowError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() {
            SparrowError::JsonParsing(err.to_string())
        } else {
            SparrowError::InvalidFormat(err.to_string())
        }
    }
}

impl SparrowError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        SparrowError::BadRequest(msg.into())
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        SparrowError::NotFound(resource.into())
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        SparrowError::InternalServer(msg.into())
    }

    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        SparrowError::InvalidConfiguration(msg.into())
    }

    pub fn invalid_url(err: impl fmt::Display) -> Self {
        SparrowError::InvalidUrl(err.to_string())
    }

    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        SparrowError::OrderNotFound(order_id.into())
    }

    /// True for errors raised by the network or the backend rather than by
    /// local input.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SparrowError::BackendUnavailable(_)
                | SparrowError::SubscriptionFailed(_)
                | SparrowError::SubscriptionRevoked(_)
                | SparrowError::FetchFailed(_)
                | SparrowError::NetworkTimeout
                | SparrowError::NetworkConnection(_)
                | SparrowError::HttpClient(_)
        )
    }
}
