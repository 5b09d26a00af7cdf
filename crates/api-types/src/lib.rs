//! Shared metric type definitions
//!
//! This crate contains the types exchanged between the metrics agent and the
//! metrics server: the validated [`MetricSample`], its JSON wire form
//! [`Metrics`], and the typed RPC messages carried over JSON-RPC.

use core::error::Error;
use core::fmt;
use core::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

pub mod rpc;

/// Series id of the agent's self-reported poll tally.
pub const POLL_COUNT: &str = "PollCount";
/// Series id of the random gauge refreshed on every poll.
pub const RANDOM_VALUE: &str = "RandomValue";

/// Header carrying the hex encoded HMAC-SHA256 of the request body.
pub const HASH_HEADER: &str = "HashSHA256";
/// Header carrying the client address checked against the trusted subnet.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Kind of a metric series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MetricKind {
    Gauge,
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            other => Err(MetricError::UnknownKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// Kind-specific payload of a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    /// Point-in-time reading; overwrites the stored value.
    Gauge(f64),
    /// Increment added to the stored total.
    Counter(i64),
}

impl MetricValue {
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricValue::Gauge(_) => MetricKind::Gauge,
            MetricValue::Counter(_) => MetricKind::Counter,
        }
    }

    /// Parse the textual value of a path-encoded update for the given kind.
    pub fn parse(kind: MetricKind, raw: &str) -> Result<Self, MetricError> {
        match kind {
            MetricKind::Gauge => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(MetricValue::Gauge(value)),
                _ => Err(MetricError::InvalidValue {
                    kind,
                    raw: raw.to_string(),
                }),
            },
            MetricKind::Counter => {
                raw.parse::<i64>()
                    .map(MetricValue::Counter)
                    .map_err(|_| MetricError::InvalidValue {
                        kind,
                        raw: raw.to_string(),
                    })
            }
        }
    }
}

/// Gauges are rendered with six fixed decimals, counters as plain integers.
impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Gauge(value) => write!(f, "{value:.6}"),
            MetricValue::Counter(delta) => write!(f, "{delta}"),
        }
    }
}

/// A validated metric sample.
///
/// Exactly one payload is carried, and it always matches the kind, so a
/// sample that reached this type can be applied to a store without further
/// checks. Deserializing goes through [`Metrics`] and rejects malformed input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Metrics", into = "Metrics")]
pub struct MetricSample {
    pub id: String,
    pub value: MetricValue,
}

impl MetricSample {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.value.kind()
    }
}

/// JSON wire form of a metric, as sent to `/update/`, `/updates/` and `/value/`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub id: String,
    #[serde(rename = "type")]
    pub mtype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metrics {
    /// Validate the series identity only, ignoring payload fields.
    ///
    /// Used by value queries, which name a series without carrying a value.
    pub fn series(&self) -> Result<(MetricKind, &str), MetricError> {
        if self.id.is_empty() {
            return Err(MetricError::EmptyId);
        }
        let kind = self.mtype.parse::<MetricKind>()?;
        Ok((kind, self.id.as_str()))
    }
}

impl From<MetricSample> for Metrics {
    fn from(sample: MetricSample) -> Self {
        let mtype = sample.kind().as_str().to_string();
        match sample.value {
            MetricValue::Gauge(value) => Metrics {
                id: sample.id,
                mtype,
                delta: None,
                value: Some(value),
            },
            MetricValue::Counter(delta) => Metrics {
                id: sample.id,
                mtype,
                delta: Some(delta),
                value: None,
            },
        }
    }
}

impl TryFrom<Metrics> for MetricSample {
    type Error = MetricError;

    fn try_from(wire: Metrics) -> Result<Self, Self::Error> {
        let (kind, _) = wire.series()?;
        let value = match (kind, wire.value, wire.delta) {
            (MetricKind::Gauge, Some(value), None) if value.is_finite() => {
                MetricValue::Gauge(value)
            }
            (MetricKind::Gauge, Some(value), None) => {
                return Err(MetricError::InvalidValue {
                    kind,
                    raw: value.to_string(),
                });
            }
            (MetricKind::Counter, None, Some(delta)) => MetricValue::Counter(delta),
            (MetricKind::Gauge, _, Some(_)) | (MetricKind::Counter, Some(_), _) => {
                return Err(MetricError::UnexpectedValue { kind });
            }
            (_, None, None) => return Err(MetricError::MissingValue { kind }),
        };
        Ok(MetricSample { id: wire.id, value })
    }
}

/// Coarse classification of a validation failure, used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionClass {
    /// The request is malformed (HTTP 400).
    Malformed,
    /// The request is well-formed but names an unsupported kind (HTTP 422).
    Unprocessable,
}

/// Validation errors for metric input.
#[derive(Debug, Clone, PartialEq, derive_more::Display)]
pub enum MetricError {
    #[display("metric id must not be empty")]
    EmptyId,
    #[display("unknown metric type: {kind}")]
    UnknownKind { kind: String },
    #[display("{kind} metric is missing its value")]
    MissingValue { kind: MetricKind },
    #[display("{kind} metric carries a value of the other kind")]
    UnexpectedValue { kind: MetricKind },
    #[display("invalid {kind} value: {raw}")]
    InvalidValue { kind: MetricKind, raw: String },
}

impl MetricError {
    pub fn class(&self) -> RejectionClass {
        match self {
            MetricError::UnknownKind { .. } => RejectionClass::Unprocessable,
            _ => RejectionClass::Malformed,
        }
    }
}

impl Error for MetricError {}
