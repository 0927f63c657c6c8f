use anyhow::Result;
use chrono::{DateTime, Utc};
use std::time::Instant;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::database::Database;
use crate::errors::{ErrorContext, ReviewError};
use crate::models::*;
use crate::scheduler::ReviewScheduler;
use crate::{
    log_performance, log_review_event, log_service_error, log_service_start, log_service_success,
    log_service_warn,
};

const SERVICE: &str = "review_service";

/// Glue between the pure scheduler and the flashcard store.
///
/// Reviews are read-modify-write cycles guarded by the card's version, so two
/// concurrent reviews of one card are applied one after the other instead of
/// overwriting each other.
#[derive(Clone)]
pub struct ReviewService {
    db: Database,
    scheduler: ReviewScheduler,
    config: SchedulerConfig,
}

impl ReviewService {
    pub fn new(db: Database) -> Self {
        Self::with_config(db, SchedulerConfig::default())
    }

    pub fn with_config(db: Database, config: SchedulerConfig) -> Self {
        Self {
            db,
            scheduler: ReviewScheduler::new(),
            config,
        }
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    // Flashcard operations
    pub async fn create_flashcard(&self, request: CreateFlashcardRequest) -> Result<Flashcard> {
        log_service_start!(SERVICE, "create_flashcard", learner_id = request.learner_id);
        let flashcard = self.db.create_flashcard(request).await?;
        log_service_success!(SERVICE, "create_flashcard", "flashcard created");
        Ok(flashcard)
    }

    pub async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        self.db.get_flashcard(id).await
    }

    pub async fn delete_flashcard(&self, id: Uuid) -> Result<bool> {
        self.db.delete_flashcard(id).await
    }

    pub async fn get_flashcards_for_document(&self, document_id: &str) -> Result<Vec<Flashcard>> {
        self.db.get_flashcards_for_document(document_id).await
    }

    // Review operations
    pub async fn review_flashcard(&self, id: Uuid, quality: i32) -> Result<ReviewOutcome, ReviewError> {
        self.review_flashcard_at(id, quality, Utc::now()).await
    }

    pub async fn review_with_outcome(
        &self,
        id: Uuid,
        correct: bool,
        confidence: Confidence,
    ) -> Result<ReviewOutcome, ReviewError> {
        let quality = self.scheduler.quality_from_outcome(correct, confidence);
        self.review_flashcard(id, quality).await
    }

    pub async fn review_flashcard_at(
        &self,
        id: Uuid,
        quality: i32,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, ReviewError> {
        let context = || ErrorContext::new("review_flashcard", "flashcard").with_id(&id.to_string());
        let started = Instant::now();
        log_service_start!(SERVICE, "review_flashcard", card_id = id);

        // Reject bad input before touching storage
        ReviewScheduler::validate_quality(quality)
            .map_err(|e| ReviewError::from(e).log_with_context(context()))?;

        for attempt in 1..=self.config.max_write_attempts {
            let mut flashcard = self
                .db
                .get_flashcard(id)
                .await
                .map_err(|e| ReviewError::from(e).log_with_context(context()))?
                .ok_or_else(|| ReviewError::UnknownFlashcard(id).log_with_context(context()))?;

            let expected_version = flashcard.version;
            flashcard.schedule = self.scheduler.record_review(&flashcard.schedule, quality, now)?;

            let event = ReviewEvent {
                id: Uuid::new_v4(),
                flashcard_id: id,
                reviewed_at: now,
                quality,
                ease_factor: flashcard.schedule.ease_factor,
                interval_days: flashcard.schedule.interval_days,
            };

            let applied = self
                .db
                .apply_review(&flashcard, expected_version, &event)
                .await
                .map_err(|e| ReviewError::from(e).log_with_context(context()))?;

            if applied {
                log_review_event!(
                    card_id = id,
                    quality = quality,
                    interval_days = flashcard.schedule.interval_days,
                    ease_factor = flashcard.schedule.ease_factor
                );
                log_service_success!(
                    SERVICE,
                    "review_flashcard",
                    card_id = id,
                    duration_ms = started.elapsed().as_millis() as u64
                );

                return Ok(ReviewOutcome {
                    flashcard_id: id,
                    quality,
                    // record_review always sets the next review time
                    next_review_at: flashcard.schedule.next_review_at.unwrap_or(now),
                    interval_days: flashcard.schedule.interval_days,
                    ease_factor: flashcard.schedule.ease_factor,
                    repetition_count: flashcard.schedule.repetition_count,
                });
            }

            log_service_warn!(
                SERVICE,
                "review_flashcard",
                card_id = id,
                format!("version {} is stale, attempt {} lost the race", expected_version, attempt)
            );
        }

        Err(ReviewError::WriteConflict(id).log_with_context(context()))
    }

    /// Due cards for a learner, most overdue first.
    pub async fn due_flashcards(
        &self,
        learner_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<DueFlashcard>> {
        self.due_flashcards_at(learner_id, limit, Utc::now()).await
    }

    pub async fn due_flashcards_at(
        &self,
        learner_id: &str,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueFlashcard>> {
        log_service_start!(SERVICE, "due_flashcards", learner_id = learner_id);
        let flashcards = self.db.get_flashcards_for_learner(learner_id).await?;

        let started = Instant::now();
        let due: Vec<DueFlashcard> = self
            .scheduler
            .select_due(&flashcards, now, limit)
            .map(|due| DueFlashcard {
                flashcard: due.item.clone(),
                priority: due.priority,
            })
            .collect();
        log_performance!("select_due", duration_ms = started.elapsed().as_millis() as u64);

        log_service_success!(SERVICE, "due_flashcards", learner_id = learner_id, count = due.len());
        Ok(due)
    }

    /// The next study session: due cards capped at the configured session size.
    pub async fn next_session(&self, learner_id: &str) -> Result<Vec<DueFlashcard>> {
        self.due_flashcards(learner_id, Some(self.config.session_limit)).await
    }

    pub async fn statistics(&self, learner_id: &str) -> Result<StatisticsSnapshot> {
        self.statistics_at(learner_id, Utc::now()).await
    }

    /// Statistics over one snapshot of the learner's cards and review log,
    /// with "today" taken in the configured UTC offset.
    pub async fn statistics_at(
        &self,
        learner_id: &str,
        now: DateTime<Utc>,
    ) -> Result<StatisticsSnapshot> {
        let started = Instant::now();
        log_service_start!(SERVICE, "statistics", learner_id = learner_id);

        let day_boundary = self.config.day_boundary()?;
        let (flashcards, reviews) = self
            .db
            .get_learner_snapshot(learner_id)
            .await
            .inspect_err(|e| {
                log_service_error!(SERVICE, "statistics", error = e);
            })?;

        let snapshot = self.scheduler.compute_statistics(
            &flashcards,
            &reviews,
            now.with_timezone(&day_boundary),
        );

        log_performance!(
            "statistics",
            duration_ms = started.elapsed().as_millis() as u64,
            count = flashcards.len()
        );
        Ok(snapshot)
    }

    pub async fn review_history(&self, flashcard_id: Uuid) -> Result<Vec<ReviewEvent>> {
        self.db.get_reviews_for_flashcard(flashcard_id).await
    }
}
