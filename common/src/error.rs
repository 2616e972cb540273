//! Validation errors for the coordinate model.
//!
//! Each variant names the offending field or value and the constraint that
//! was violated, so a caller can report a malformed coordinate without
//! further context.

use thiserror::Error;

/// Errors arising from invalid coordinate, repository, relocation or digest
/// values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A required coordinate field was not supplied or was blank.
    #[error("missing required field `{field}`")]
    MissingField {
        /// Name of the absent field.
        field: &'static str,
    },

    /// A coordinate field contains characters that cannot appear in a
    /// repository path.
    #[error("invalid {field} \"{value}\": {reason}")]
    InvalidField {
        /// Name of the rejected field.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Description of the violated constraint.
        reason: String,
    },

    /// A repository base URL is not an absolute http(s) URL.
    #[error("invalid repository URL \"{url}\": {reason}")]
    InvalidRepository {
        /// The rejected URL.
        url: String,
        /// Description of the violated constraint.
        reason: String,
    },

    /// A relocation rule or rule set is not well formed.
    #[error("invalid relocation rule: {reason}")]
    InvalidRelocation {
        /// Description of the violated constraint.
        reason: String,
    },

    /// A digest string is not valid for its algorithm.
    #[error("invalid digest: {reason}")]
    InvalidDigest {
        /// Description of the violated constraint.
        reason: String,
    },
}

/// Result type alias using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;
