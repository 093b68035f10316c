//! Error types for the query compiler.
//!
//! Every failure is synchronous and final: the parser and the code
//! generators either produce a complete result or abort with one of these.

use thiserror::Error;

/// The main error type for compilation.
#[derive(Debug, Error)]
pub enum CompileError {
    /// Operator tag outside the recognized set, or a recognized tag in a
    /// position the parser cannot honour.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// `Skip`/`OFFSET` without an ordering to paginate over.
    #[error("Pagination requires an OrderBy: {0}")]
    MissingOrderByForPagination(String),

    /// Entity-instance update/delete against a type with no key member.
    #[error("Entity '{0}' declares no key member")]
    MissingKey(String),

    /// Navigation member used without a foreign-key descriptor.
    #[error("Navigation '{entity}.{member}' has no foreign key")]
    MissingForeignKey { entity: String, member: String },

    /// A projector that cannot be mapped onto output columns.
    #[error("Ambiguous binding: {0}")]
    AmbiguousBinding(String),

    /// Type token not present in the schema registry.
    #[error("Unknown entity type: '{0}'")]
    UnknownEntity(String),

    /// Member not declared on the entity it was accessed on.
    #[error("Unknown member '{member}' on '{entity}'")]
    UnknownMember { entity: String, member: String },

    /// Operator entry whose operands do not match its tag.
    #[error("Invalid operand for {kind}: {message}")]
    InvalidOperand { kind: String, message: String },

    /// Method call with no translation in the target dialect.
    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Schema text or JSON could not be loaded.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// Create an invalid-operand error for the given operator tag.
    pub fn operand(kind: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::InvalidOperand {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    /// Create an unknown-member error.
    pub fn member(entity: impl std::fmt::Display, member: impl Into<String>) -> Self {
        Self::UnknownMember {
            entity: entity.to_string(),
            member: member.into(),
        }
    }

    /// Create an ambiguous-binding error.
    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::AmbiguousBinding(message.into())
    }
}

/// Result type alias for compiler operations.
pub type CompileResult<T> = Result<T, CompileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CompileError::MissingForeignKey {
            entity: "Demo".into(),
            member: "Client".into(),
        };
        assert_eq!(err.to_string(), "Navigation 'Demo.Client' has no foreign key");

        let err = CompileError::operand("Skip", "expected an integer count");
        assert_eq!(
            err.to_string(),
            "Invalid operand for Skip: expected an integer count"
        );
    }
}
