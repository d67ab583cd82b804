use axum::http::StatusCode;

use super::domain::{CheckId, CheckType};
use super::history::HistoryExportError;
use super::repository::RepositoryError;

/// Error raised by single-entity background check operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("cannot {action} {entity} {id} while it is {state}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        state: String,
        action: &'static str,
    },
    #[error("{check_type} was not requested for background check {check_id}")]
    InvalidResult {
        check_id: CheckId,
        check_type: CheckType,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Export(#[from] HistoryExportError),
}

impl WorkflowError {
    pub(crate) fn check_not_found(id: &CheckId) -> Self {
        Self::NotFound {
            entity: "background check",
            id: id.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            WorkflowError::NotFound { .. } | WorkflowError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            WorkflowError::InvalidTransition { .. }
            | WorkflowError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            WorkflowError::InvalidResult { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::Repository(RepositoryError::Unavailable(_))
            | WorkflowError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
