use core::error::Error;

use api_types::MetricError;
use api_types::RejectionClass;
use poem::http::StatusCode;

/// API errors
#[derive(Debug, derive_more::Display)]
pub enum ApiError {
    #[display("Server error: {message}")]
    ServerError { message: String },
    #[display("Invalid configuration: {message}")]
    Configuration { message: String },
    #[display("Malformed request: {reason}")]
    Malformed { reason: String },
    #[display("Invalid metric: {_0}")]
    InvalidMetric(MetricError),
    #[display("Metric not found: {kind}/{id}")]
    NotFound { kind: String, id: String },
    #[display("Untrusted client address: {ip}")]
    Untrusted { ip: String },
    #[display("Signature mismatch")]
    SignatureMismatch,
    #[display("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::ServerError { .. } | ApiError::Configuration { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Malformed { .. } | ApiError::SignatureMismatch => StatusCode::BAD_REQUEST,
            ApiError::InvalidMetric(err) => match err.class() {
                RejectionClass::Malformed => StatusCode::BAD_REQUEST,
                RejectionClass::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            },
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Untrusted { .. } => StatusCode::FORBIDDEN,
            ApiError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        ApiError::Malformed {
            reason: reason.into(),
        }
    }
}

impl From<MetricError> for ApiError {
    fn from(err: MetricError) -> Self {
        ApiError::InvalidMetric(err)
    }
}

impl Error for ApiError {}

/// Plain-text error response carrying the status of the error.
impl From<ApiError> for poem::Error {
    fn from(err: ApiError) -> Self {
        let status = err.status();
        poem::Error::from_string(err.to_string(), status)
    }
}

#[cfg(test)]
mod tests {
    use api_types::MetricKind;

    use super::*;

    #[test]
    fn api_error_display_formatting() {
        assert_eq!(
            ApiError::NotFound {
                kind: "gauge".into(),
                id: "Alloc".into()
            }
            .to_string(),
            "Metric not found: gauge/Alloc"
        );
        assert_eq!(
            ApiError::malformed("missing body").to_string(),
            "Malformed request: missing body"
        );
    }

    #[test]
    fn unknown_kind_maps_to_unprocessable() {
        let err = ApiError::from(MetricError::UnknownKind {
            kind: "histogram".into(),
        });

        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn bad_values_map_to_bad_request() {
        let err = ApiError::from(MetricError::InvalidValue {
            kind: MetricKind::Counter,
            raw: "1.5".into(),
        });

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::SignatureMismatch.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Untrusted { ip: "1.2.3.4".into() }.status(),
            StatusCode::FORBIDDEN
        );
    }
}
