//! Sample Model
//!
//! A sample is what one iteration of one measure produced: either the
//! measured value or the failure that prevented measuring it.

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Unit family of a measure, used by reporters for formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureKind {
    /// Durations in milliseconds
    Time,
    /// Sizes in bytes
    Size,
}

/// Cheaply cloneable error recorded for a failed iteration.
///
/// Every measure of a failed iteration records the same `Failure`, so the
/// underlying error is shared rather than copied.
#[derive(Clone)]
pub struct Failure(Arc<anyhow::Error>);

impl Failure {
    /// Wrap an error
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self(Arc::new(error.into()))
    }

    /// Build a failure from a plain message
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// The wrapped error
    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether two failures share the same underlying error
    pub fn ptr_eq(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `{:#}` keeps the context chain on one line
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

impl Serialize for Failure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Outcome of one measure for one iteration
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Sample {
    /// Measured value
    Value(f64),
    /// The iteration's action failed
    Failed(Failure),
}

impl Sample {
    /// Measured value, if the iteration succeeded
    pub fn value(&self) -> Option<f64> {
        match self {
            Sample::Value(v) => Some(*v),
            Sample::Failed(_) => None,
        }
    }

    /// Failure, if the iteration failed
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Sample::Value(_) => None,
            Sample::Failed(f) => Some(f),
        }
    }

    /// Whether this sample records a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Sample::Failed(_))
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Sample::Value(value)
    }
}

impl From<Failure> for Sample {
    fn from(failure: Failure) -> Self {
        Sample::Failed(failure)
    }
}
