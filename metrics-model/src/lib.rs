//! Wire format and validation rules shared by the agent and the server.
//!
//! A [`MetricPoint`] is the one data type that crosses the network boundary
//! in either direction: the agent serializes a batch of these, the server
//! deserializes, validates, and accumulates them. Keeping the type and its
//! invariants in one crate is what lets `agent` and `server` agree on wire
//! semantics without duplicating field names or the absent-vs-zero rule.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two metric shapes this system understands.
///
/// `rename_all = "lowercase"` makes the wire representation exactly
/// `"gauge"` / `"counter"`; any other string fails to deserialize, which is
/// indistinguishable on the wire from "unknown kind" and is rejected by
/// axum's `Json` extractor before a handler ever sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
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

impl std::str::FromStr for MetricKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(ValidationError::UnknownKind),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single metric observation.
///
/// Exactly one of `value` / `delta` is meaningful, selected by `kind`; the
/// other is `None` and is omitted entirely on the wire (never serialized as
/// `null`). That absent-vs-zero distinction is load-bearing: a counter
/// update with `delta: 0` is a legitimate no-op, not "field not set".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetricKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("metric id must not be empty")]
    EmptyId,
    #[error("unknown metric kind")]
    UnknownKind,
    #[error("gauge metric is missing a value")]
    MissingValue,
    #[error("counter metric is missing a delta")]
    MissingDelta,
    #[error("counter delta must be non-negative on ingest")]
    NegativeDelta,
}

impl MetricPoint {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
            hash: None,
        }
    }

    /// Enforces invariant 1: a gauge carries `value` and not `delta`,
    /// symmetrically for a counter. Also rejects the empty id and, for
    /// ingest paths, a negative counter delta (the server still accumulates
    /// whatever it's given internally, but an inbound negative delta from a
    /// client is a validation error per the operation matrix in §4.7).
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        match self.kind {
            MetricKind::Gauge => {
                if self.value.is_none() {
                    return Err(ValidationError::MissingValue);
                }
            }
            MetricKind::Counter => {
                match self.delta {
                    None => return Err(ValidationError::MissingDelta),
                    Some(d) if d < 0 => return Err(ValidationError::NegativeDelta),
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    /// Applies the counter accumulation rule: if `self` (the value already
    /// stored) and `incoming` are both counters, the stored delta becomes
    /// `self.delta + incoming.delta`. In every other case `incoming`
    /// overwrites wholesale (gauge replace-on-write, or a kind change).
    pub fn accumulate(&self, incoming: &MetricPoint) -> MetricPoint {
        match (self.kind, incoming.kind) {
            (MetricKind::Counter, MetricKind::Counter) => {
                let merged = self.delta.unwrap_or(0) + incoming.delta.unwrap_or(0);
                MetricPoint {
                    delta: Some(merged),
                    ..incoming.clone()
                }
            }
            _ => incoming.clone(),
        }
    }

    /// Formats the stored value for the plain-text `GET /value/...` route:
    /// shortest round-tripping decimal for a gauge, plain decimal integer
    /// for a counter. Rust's `Display` for `f64` already produces the
    /// shortest round-trip form, matching Go's `strconv.FormatFloat(v, 'f',
    /// -1, 64)`.
    pub fn format_value(&self) -> Option<String> {
        match self.kind {
            MetricKind::Gauge => self.value.map(|v| format!("{v}")),
            MetricKind::Counter => self.delta.map(|d| d.to_string()),
        }
    }
}
