//! Error types for the slo-rules crate.

use thiserror::Error;

/// Errors that can occur while building or compiling objectives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The objective is malformed, e.g. no or several indicators are set.
    #[error("invalid objective: {reason}")]
    InvalidObjective {
        /// The reason the objective is invalid.
        reason: String,
    },

    /// A label matcher could not be built.
    #[error("invalid label matcher {name}: {reason}")]
    InvalidMatcher {
        /// The label name of the matcher.
        name: String,
        /// The reason the matcher is invalid.
        reason: String,
    },

    /// A metric selector such as `http_requests_total{job="api"}` failed to parse.
    #[error("invalid metric selector {selector:?}: {reason}")]
    InvalidSelector {
        /// The selector text.
        selector: String,
        /// The reason parsing failed.
        reason: String,
    },

    /// A duration such as `4w` or `1h30m` failed to parse.
    #[error("invalid duration {input:?}: {reason}")]
    InvalidDuration {
        /// The duration text.
        input: String,
        /// The reason parsing failed.
        reason: String,
    },

    /// An internal PromQL template is malformed.
    ///
    /// Templates are fixed at compile time, so this is a defect in the crate
    /// rather than in the objective.
    #[error("internal template {template:?} is malformed: {reason}")]
    Template {
        /// The template source.
        template: String,
        /// The parser error.
        reason: String,
    },

    /// Generic rules were requested for an objective that groups its series.
    ///
    /// Callers should skip the generic group and carry on.
    #[error("generic rules are not supported for grouped objectives")]
    GroupingUnsupported,
}

impl RuleError {
    /// Returns true for the unsupported-feature signal rather than a real failure.
    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::GroupingUnsupported)
    }

    pub(crate) fn invalid_objective(reason: impl Into<String>) -> Self {
        Self::InvalidObjective {
            reason: reason.into(),
        }
    }
}

/// Result type for rule compilation.
pub type Result<T> = std::result::Result<T, RuleError>;
