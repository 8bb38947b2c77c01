use thiserror::Error;

pub type Result<T> = std::result::Result<T, InventoryError>;

#[derive(Error, Debug)]
pub enum InventoryError {
    /// A value failed the predicate's own validation (bad choice, out of range, unparsable date).
    #[error("Invalid value for <{predicate}>: {value:?} ({reason})")]
    InvalidValue {
        predicate: String,
        value: String,
        reason: String,
    },

    /// A referenced node has the wrong type, or a required predicate is missing.
    #[error("Constraint violated on <{predicate}>: {message}")]
    ConstraintViolation { predicate: String, message: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unknown predicate: {0}")]
    UnknownPredicate(String),

    /// The store rejected the mutation (conflict, aborted transaction, error response).
    #[error("Mutation failed: {0}")]
    StoreConflict(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl InventoryError {
    pub fn invalid(
        predicate: impl Into<String>,
        value: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        InventoryError::InvalidValue {
            predicate: predicate.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    pub fn constraint(predicate: impl Into<String>, message: impl Into<String>) -> Self {
        InventoryError::ConstraintViolation {
            predicate: predicate.into(),
            message: message.into(),
        }
    }

    /// Validation-time errors are raised before anything reaches the store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            InventoryError::InvalidValue { .. }
                | InventoryError::ConstraintViolation { .. }
                | InventoryError::PermissionDenied(_)
                | InventoryError::UnknownPredicate(_)
        )
    }
}

impl From<reqwest::Error> for InventoryError {
    fn from(err: reqwest::Error) -> Self {
        InventoryError::Store(format!("network error: {err}"))
    }
}

impl From<serde_json::Error> for InventoryError {
    fn from(err: serde_json::Error) -> Self {
        InventoryError::Store(format!("malformed store response: {err}"))
    }
}
