//! Error types for ShEx matching.
//!
//! Non-conformance of a node is never an error: it is reported as `Ok(false)` together
//! with [`ReportItem`](crate::ReportItem)s. Errors are reserved for broken schemas and for
//! evaluations aborted by a configured [`MatchLimits`](crate::MatchLimits) budget.

use std::time::Duration;

/// Main error type for ShEx operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ShexError {
    /// The schema is malformed.
    #[error(transparent)]
    Schema(#[from] ShexSchemaError),

    /// The evaluation was aborted.
    #[error(transparent)]
    Validation(#[from] ShexValidationError),
}

/// Schema integrity error.
///
/// These are fatal: they indicate a broken schema, not a non-conforming node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ShexSchemaError {
    /// A triple expression reference has no target in the schema.
    #[error("Undefined triple expression reference: {label}")]
    UndefinedTripleExprRef { label: String },

    /// A shape reference has no target in the schema.
    #[error("Undefined shape reference: {label}")]
    UndefinedShapeRef { label: String },

    /// A cardinality whose maximum is lower than its minimum.
    #[error("Invalid cardinality: min={min}, max={max:?}")]
    InvalidCardinality { min: u32, max: Option<u32> },

    /// A pattern facet that is not a valid regular expression.
    #[error("Invalid regex pattern '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    /// Validation against the start shape was requested but the schema has none.
    #[error("The schema does not declare a start shape")]
    MissingStartShape,
}

/// Error raised when an evaluation exceeds its [`MatchLimits`](crate::MatchLimits).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ShexValidationError {
    /// Too many nested dispatcher or value shape calls.
    #[error(
        "Maximum recursion depth exceeded: reached {depth}, limit is {limit}. \
        This may indicate cyclic triple expression references."
    )]
    MaxRecursionDepth { depth: usize, limit: usize },

    /// Too many partitions or assignments tried.
    #[error("Maximum number of partitions exceeded: tried {count}, limit is {limit}")]
    MaxPartitions { count: usize, limit: usize },

    /// The evaluation ran for too long.
    #[error("Validation timeout exceeded: elapsed {elapsed:?}, limit is {limit:?}")]
    Timeout { elapsed: Duration, limit: Duration },
}

impl ShexSchemaError {
    /// Creates an undefined triple expression reference error.
    pub fn undefined_triple_expr_ref(label: impl ToString) -> Self {
        Self::UndefinedTripleExprRef {
            label: label.to_string(),
        }
    }

    /// Creates an undefined shape reference error.
    pub fn undefined_shape_ref(label: impl ToString) -> Self {
        Self::UndefinedShapeRef {
            label: label.to_string(),
        }
    }

    /// Creates an invalid cardinality error.
    pub fn invalid_cardinality(min: u32, max: Option<u32>) -> Self {
        Self::InvalidCardinality { min, max }
    }

    /// Creates an invalid regex error.
    pub fn invalid_regex(pattern: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidRegex {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }
}

impl ShexError {
    /// Returns true if the error comes from a malformed schema.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, Self::Schema(_))
    }
}
