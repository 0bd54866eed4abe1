use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::{self, Debug, Display};

#[derive(Debug, Clone, PartialEq)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

pub const CONFIG_ERROR: i32 = 1;
pub const DATABASE_ERROR: i32 = 2;
pub const STORE_UNAVAILABLE: i32 = 3;
pub const BROKER_READ_FAILURE: i32 = 4;
pub const PUBLISH_FAILURE: i32 = 5;
pub const UNEXPECTED_ERROR: i32 = 6;
pub const INVALID_PARAMETERS: i32 = 101;
pub const MALFORMED_EVENT: i32 = 102;

impl Error {
    /// Errors in the 1..=99 range are internal and never shown to callers.
    pub fn is_internal(&self) -> bool {
        (1..=99).contains(&self.code)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        config_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        store_unavailable_error(err)
    }
}

impl From<rdkafka::error::KafkaError> for Error {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        broker_read_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub fn invalid_parameters_error(message: impl Into<String>) -> Error {
    Error {
        code: INVALID_PARAMETERS,
        message: message.into(),
    }
}

pub fn malformed_event_error(err: serde_json::Error) -> Error {
    Error {
        code: MALFORMED_EVENT,
        message: format!("malformed event: {}", err),
    }
}

pub fn config_error<T: Display>(err: T) -> Error {
    Error {
        code: CONFIG_ERROR,
        message: format!("configuration error: {}", err),
    }
}

pub fn database_error<T: Debug>(err: T) -> Error {
    Error {
        code: DATABASE_ERROR,
        message: format!("database error: {:?}", err),
    }
}

pub fn store_unavailable_error<T: Display>(err: T) -> Error {
    Error {
        code: STORE_UNAVAILABLE,
        message: format!("geo store unavailable: {}", err),
    }
}

pub fn broker_read_error<T: Display>(err: T) -> Error {
    Error {
        code: BROKER_READ_FAILURE,
        message: format!("broker read failure: {}", err),
    }
}

pub fn publish_error<T: Display>(err: T) -> Error {
    Error {
        code: PUBLISH_FAILURE,
        message: format!("publish failure: {}", err),
    }
}

pub fn unexpected_error<T: Display>(err: T) -> Error {
    Error {
        code: UNEXPECTED_ERROR,
        message: format!("unexpected error: {}", err),
    }
}

#[test]
fn internal_errors_are_not_leaked() {
    let err = store_unavailable_error("connection refused");
    assert!(err.is_internal());
    assert!(err.message.contains("connection refused"));

    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn client_errors_carry_their_message() {
    let response = invalid_parameters_error("lat and lon are required").into_response();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(!invalid_parameters_error("x").is_internal());
    assert!(broker_read_error("x").is_internal());
}
