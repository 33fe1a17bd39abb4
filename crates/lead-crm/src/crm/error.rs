use std::borrow::Cow;

use super::repository::RepositoryError;

/// Failure surfaced by the lead pipeline components.
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("invalid {field}: {message}")]
    Validation {
        field: Cow<'static, str>,
        message: String,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl CrmError {
    pub fn not_found(entity: &'static str, id: u64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn validation(field: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}
