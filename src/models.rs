use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Spaced-repetition state carried by every flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashcardSchedule {
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetition_count: u32,
    /// `None` means the card has never been scheduled and is due immediately.
    pub next_review_at: Option<DateTime<Utc>>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl Default for FlashcardSchedule {
    fn default() -> Self {
        Self {
            ease_factor: crate::scheduler::INITIAL_EASE_FACTOR,
            interval_days: 0,
            repetition_count: 0,
            next_review_at: None,
            last_reviewed_at: None,
        }
    }
}

/// Anything that owns a schedule and can be ranked or aggregated by the scheduler.
pub trait Scheduled {
    fn schedule(&self) -> &FlashcardSchedule;
}

impl Scheduled for FlashcardSchedule {
    fn schedule(&self) -> &FlashcardSchedule {
        self
    }
}

impl<T: Scheduled + ?Sized> Scheduled for &T {
    fn schedule(&self) -> &FlashcardSchedule {
        (**self).schedule()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flashcard {
    pub id: Uuid,
    pub learner_id: String,
    pub document_id: Option<String>,
    pub front: String,
    pub back: String,
    pub topic: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub schedule: FlashcardSchedule,
    /// Optimistic concurrency token, bumped on every review write.
    pub version: i64,
}

impl Scheduled for Flashcard {
    fn schedule(&self) -> &FlashcardSchedule {
        &self.schedule
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFlashcardRequest {
    pub learner_id: String,
    pub document_id: Option<String>,
    pub front: String,
    pub back: String,
    pub topic: Option<String>,
}

/// One entry of the append-only review log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEvent {
    pub id: Uuid,
    pub flashcard_id: Uuid,
    pub reviewed_at: DateTime<Utc>,
    pub quality: i32,
    /// Ease factor in effect after the review was applied.
    pub ease_factor: f64,
    pub interval_days: u32,
}

/// Self-reported confidence collected alongside a correct/incorrect answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl std::str::FromStr for Confidence {
    type Err = crate::errors::SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            _ => Err(crate::errors::SchedulerError::InvalidConfidence(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasteryLevel {
    New,
    Learning,
    Mastered,
}

/// A due record paired with its urgency; higher priority is reviewed first.
#[derive(Debug, Clone, Copy)]
pub struct DueCard<'a, T> {
    pub item: &'a T,
    pub priority: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DueFlashcard {
    #[serde(flatten)]
    pub flashcard: Flashcard,
    pub priority: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsSnapshot {
    pub total_cards: usize,
    pub due_count: usize,
    pub new_count: usize,
    pub learning_count: usize,
    pub mastered_count: usize,
    pub overdue_count: usize,
    /// Cards whose next review lands on today's calendar day, later today included.
    pub due_today_count: usize,
    pub reviewed_today_count: usize,
    pub average_ease_factor: f64,
}

/// Schedule fields handed back to the presentation layer after a review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub flashcard_id: Uuid,
    pub quality: i32,
    pub next_review_at: DateTime<Utc>,
    pub interval_days: u32,
    pub ease_factor: f64,
    pub repetition_count: u32,
}
