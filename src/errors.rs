use crate::models::MetricSource;
use chrono::NaiveDate;
use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn bad_gateway(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: err.to_string(),
        }
    }
}

impl From<ProxyError> for AppError {
    fn from(err: ProxyError) -> Self {
        Self::bad_gateway(err)
    }
}

impl From<PartialSourceError> for AppError {
    fn from(err: PartialSourceError) -> Self {
        Self::bad_gateway(err)
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}

/// A metric row that could not be accepted. The row is dropped and the error
/// is handed back to the caller alongside the rows that did parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{metric} row {index}: expected a JSON object")]
    NotAnObject { metric: MetricSource, index: usize },

    #[error("{metric} row {index}: missing store name")]
    MissingStoreName { metric: MetricSource, index: usize },

    #[error("{metric} row {index}: missing order date")]
    MissingOrderDate { metric: MetricSource, index: usize },

    #[error("{metric} row {index}: invalid order date {value:?}")]
    InvalidOrderDate {
        metric: MetricSource,
        index: usize,
        value: String,
    },

    #[error("{metric} row {index}: field {field} is not numeric ({value})")]
    NonNumericValue {
        metric: MetricSource,
        index: usize,
        field: String,
        value: String,
    },

    #[error("{metric} row {index}: value {value} overflows the total for its store and day")]
    ValueOutOfRange {
        metric: MetricSource,
        index: usize,
        value: String,
    },

    #[error("{metric} row {index}: unknown cup category {category:?}")]
    UnknownCategory {
        metric: MetricSource,
        index: usize,
        category: String,
    },
}

#[derive(Debug, Error)]
#[error("{metric} query failed: {reason}")]
pub struct PartialSourceError {
    pub metric: MetricSource,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("proxy API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("proxy API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("authentication failed for all provided tokens")]
    Unauthorized,

    #[error("proxy API rejected the query: {0}")]
    QueryRejected(String),

    #[error("unexpected response format from proxy API: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("at least one store id must be provided for sales query")]
    NoStores,

    #[error("start_date {start} is after end_date {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("environment variable {0} is required but was not provided")]
    Missing(&'static str),

    #[error("environment variable {name} has an invalid value: {reason}")]
    Invalid { name: &'static str, reason: String },
}
