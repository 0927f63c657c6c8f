use tracing::{error, info, warn};
use uuid::Uuid;

/// Contract violations detected by the pure scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Invalid quality score {0}: must be between 0 and 5")]
    InvalidQuality(i32),

    #[error("Invalid confidence '{0}': expected low, medium or high")]
    InvalidConfidence(String),
}

/// Errors raised where the scheduler meets persistence.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("Flashcard not found: {0}")]
    UnknownFlashcard(Uuid),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("Flashcard {0} was modified concurrently and the review could not be applied")]
    WriteConflict(Uuid),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ReviewError {
    fn from(err: sqlx::Error) -> Self {
        ReviewError::DatabaseError(anyhow::Error::from(err))
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

impl ReviewError {
    /// Log the error at a level matching its cause and hand it back to the caller.
    pub fn log_with_context(self, context: ErrorContext) -> Self {
        match &self {
            ReviewError::UnknownFlashcard(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
            }
            ReviewError::Scheduler(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Validation error"
                );
            }
            ReviewError::WriteConflict(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Write conflict"
                );
            }
            ReviewError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
            }
        }
        self
    }

    /// True when the caller supplied bad input rather than the system failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ReviewError::UnknownFlashcard(_) | ReviewError::Scheduler(_)
        )
    }
}
