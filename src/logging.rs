// Macros file - tracing macros are imported within the macro definitions

/// Standardized logging macros so every component emits the same field names
/// (`service`, `operation`, `card_id`, `duration_ms`, ...).

// ============================================================================
// Service Layer Logging Macros
// ============================================================================

/// Log service operation start with context
#[macro_export]
macro_rules! log_service_start {
    ($service:expr, $operation:expr, card_id = $card_id:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            card_id = %$card_id,
            "Service operation started"
        );
    };
    ($service:expr, $operation:expr, learner_id = $learner_id:expr) => {
        tracing::debug!(
            service = $service,
            operation = $operation,
            learner_id = %$learner_id,
            "Service operation started"
        );
    };
}

/// Log service operation success
#[macro_export]
macro_rules! log_service_success {
    ($service:expr, $operation:expr, card_id = $card_id:expr, duration_ms = $duration:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            card_id = %$card_id,
            duration_ms = $duration,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, learner_id = $learner_id:expr, count = $count:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            learner_id = %$learner_id,
            count = $count,
            "Service operation completed successfully"
        );
    };
    ($service:expr, $operation:expr, $msg:expr) => {
        tracing::info!(
            service = $service,
            operation = $operation,
            "Service operation completed: {}", $msg
        );
    };
}

/// Log service operation errors
#[macro_export]
macro_rules! log_service_error {
    ($service:expr, $operation:expr, error = $error:expr) => {
        tracing::error!(
            service = $service,
            operation = $operation,
            error = %$error,
            "Service operation failed"
        );
    };
}

/// Log service warnings
#[macro_export]
macro_rules! log_service_warn {
    ($service:expr, $operation:expr, card_id = $card_id:expr, $msg:expr) => {
        tracing::warn!(
            service = $service,
            operation = $operation,
            card_id = %$card_id,
            "Service warning: {}",
            $msg
        );
    };
}

// ============================================================================
// Review Logging Macros
// ============================================================================

/// Log an applied review with the resulting schedule
#[macro_export]
macro_rules! log_review_event {
    (card_id = $card_id:expr, quality = $quality:expr, interval_days = $interval:expr, ease_factor = $ease:expr) => {
        tracing::info!(
            event_type = "review",
            card_id = %$card_id,
            quality = $quality,
            interval_days = $interval,
            ease_factor = $ease,
            "Review applied"
        );
    };
}

// ============================================================================
// Database Operation Logging Macros
// ============================================================================

/// Log database operation performance and results
#[macro_export]
macro_rules! log_db_operation {
    (debug, $operation:expr, card_id = $card_id:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            card_id = %$card_id,
            duration_ms = $duration,
            "Database operation completed"
        );
    };
    (debug, $operation:expr, count = $count:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            component = "database",
            operation = $operation,
            result_count = $count,
            duration_ms = $duration,
            "Database operation completed"
        );
    };
    (info, $operation:expr, $msg:expr) => {
        tracing::info!(
            component = "database",
            operation = $operation,
            "Database operation: {}", $msg
        );
    };
    (error, $operation:expr, error = $error:expr) => {
        tracing::error!(
            component = "database",
            operation = $operation,
            error = %$error,
            "Database operation failed"
        );
    };
}

// ============================================================================
// System Event Logging Macros
// ============================================================================

/// Log system startup and shutdown events
#[macro_export]
macro_rules! log_system_event {
    (startup, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "startup",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (shutdown, component = $component:expr, $msg:expr) => {
        tracing::info!(
            event_type = "shutdown",
            component = $component,
            "System event: {}",
            $msg
        );
    };
    (config, $msg:expr) => {
        tracing::info!(event_type = "configuration", "System event: {}", $msg);
    };
}

// ============================================================================
// Performance Logging Macros
// ============================================================================

/// Log performance metrics with consistent structure
#[macro_export]
macro_rules! log_performance {
    ($operation:expr, duration_ms = $duration:expr, count = $count:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            item_count = $count,
            "Performance metrics"
        );
    };
    ($operation:expr, duration_ms = $duration:expr) => {
        tracing::debug!(
            event_type = "performance",
            operation = $operation,
            duration_ms = $duration,
            "Performance metrics"
        );
    };
}

// ============================================================================
// Validation Logging Macros
// ============================================================================

/// Log validation results consistently
#[macro_export]
macro_rules! log_validation {
    (success, $component:expr, $msg:expr) => {
        tracing::debug!(
            event_type = "validation",
            component = $component,
            result = "success",
            "Validation completed: {}", $msg
        );
    };
    (failure, $component:expr, error = $error:expr) => {
        tracing::warn!(
            event_type = "validation",
            component = $component,
            result = "failure",
            error = %$error,
            "Validation failed"
        );
    };
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    #[test]
    fn test_logging_macros_compile() {
        let card_id = Uuid::new_v4();
        let error = anyhow::anyhow!("test error");

        log_service_start!("review_service", "review_flashcard", card_id = card_id);
        log_service_start!("review_service", "statistics", learner_id = "learner-1");

        log_service_success!("review_service", "review_flashcard", card_id = card_id, duration_ms = 3);
        log_service_success!("review_service", "due_flashcards", learner_id = "learner-1", count = 4);
        log_service_success!("review_service", "create_flashcard", "flashcard created");

        log_service_error!("review_service", "statistics", error = error);
        log_service_warn!("review_service", "review_flashcard", card_id = card_id, "retrying write");

        log_review_event!(card_id = card_id, quality = 4, interval_days = 6u32, ease_factor = 2.5);

        log_db_operation!(debug, "select_flashcard", card_id = card_id, duration_ms = 10);
        log_db_operation!(debug, "select_learner_flashcards", count = 3, duration_ms = 10);
        log_db_operation!(info, "migrate", "database initialized");
        log_db_operation!(error, "apply_review", error = error);

        log_system_event!(startup, component = "cli", "starting");
        log_system_event!(shutdown, component = "cli", "done");
        log_system_event!(config, "configuration loaded successfully");

        log_performance!("statistics", duration_ms = 25, count = 100);
        log_performance!("select_due", duration_ms = 5);

        log_validation!(success, "configuration", "configuration validated");
        log_validation!(failure, "configuration", error = error);
    }
}
