//! Error types for metric delivery.

use core::error::Error;

use derive_more::Display;
use error_stack::Report;

/// Result type for delivery operations.
pub type CommResult<T> = Result<T, Report<CommError>>;

/// Errors that can occur while encoding or delivering metrics.
#[derive(Debug, Display)]
pub enum CommError {
    /// Connection could not be established or broke mid-exchange
    #[display("Network error: {message}")]
    Network { message: String },

    /// Attempt exceeded its timeout
    #[display("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Server answered with a non-success status
    #[display("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },

    /// Request failed for a reason other than connectivity, e.g. a bad redirect
    #[display("Request error: {message}")]
    Request { message: String },

    /// Serialization/compression errors
    #[display("Serialization error: {message}")]
    Serialization { message: String },

    /// Payload grew past the allowed size while inflating
    #[display("Payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// Configuration errors
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// RPC call was answered with an application error
    #[display("RPC error: {message}")]
    Rpc { message: String },

    /// Retry schedule exhausted on transient failures
    #[display("Connection failed after {attempts} attempts")]
    ConnectionFailed { attempts: usize },

    /// Delivery aborted by shutdown
    #[display("Delivery cancelled")]
    Cancelled,
}

impl CommError {
    /// Whether the failure is a connection/timeout condition worth retrying.
    ///
    /// Application-level rejections and encoding failures are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, CommError::Network { .. } | CommError::Timeout { .. })
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            CommError::Timeout {
                seconds: timeout_secs,
            }
        } else if err.is_connect() || err.is_request() || err.is_body() {
            // refused connects, resets and truncated exchanges
            CommError::Network {
                message: err.to_string(),
            }
        } else {
            CommError::Request {
                message: err.to_string(),
            }
        }
    }
}

impl Error for CommError {}
