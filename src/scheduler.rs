use chrono::{DateTime, Duration, TimeZone, Utc};
use tracing::{debug, trace};

use crate::errors::SchedulerError;
use crate::models::{
    Confidence, DueCard, FlashcardSchedule, MasteryLevel, ReviewEvent, Scheduled,
    StatisticsSnapshot,
};

pub const INITIAL_EASE_FACTOR: f64 = 2.5;
pub const MINIMUM_EASE_FACTOR: f64 = 1.3;
pub const MIN_QUALITY: i32 = 0;
pub const MAX_QUALITY: i32 = 5;
pub const PASSING_QUALITY: i32 = 3;
pub const MASTERY_THRESHOLD_DAYS: u32 = 21;

const FIRST_INTERVAL_DAYS: u32 = 1;
const SECOND_INTERVAL_DAYS: u32 = 6;
const FAILED_INTERVAL_DAYS: u32 = 1;
// Keeps `now + interval` inside chrono's representable range.
const MAX_INTERVAL_DAYS: u32 = 36_500;
const INTERVAL_EPSILON: f64 = 1e-9;

/// Due cards in review order, highest priority first.
pub type DueQueue<'a, T> = std::iter::Take<std::vec::IntoIter<DueCard<'a, T>>>;

/// SM-2 review scheduler.
///
/// Every method is a pure function of its arguments: the scheduler holds
/// only its tuning parameters, never card state, so one instance can be
/// shared freely across tasks and learners.
#[derive(Debug, Clone)]
pub struct ReviewScheduler {
    initial_ease: f64,
    minimum_ease: f64,
    mastery_threshold_days: u32,
}

impl Default for ReviewScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl ReviewScheduler {
    pub fn new() -> Self {
        Self {
            initial_ease: INITIAL_EASE_FACTOR,
            minimum_ease: MINIMUM_EASE_FACTOR,
            mastery_threshold_days: MASTERY_THRESHOLD_DAYS,
        }
    }

    pub fn initial_ease(&self) -> f64 {
        self.initial_ease
    }

    /// Apply one review with SM-2 `quality` (0-5) at `now`.
    ///
    /// The ease factor is updated on every review, including failures, and
    /// never drops below the floor. A failing quality (< 3) resets the card
    /// to a one-day interval with zero repetitions.
    pub fn record_review(
        &self,
        schedule: &FlashcardSchedule,
        quality: i32,
        now: DateTime<Utc>,
    ) -> Result<FlashcardSchedule, SchedulerError> {
        Self::validate_quality(quality)?;

        let ease_factor = self.next_ease_factor(schedule.ease_factor, quality);

        let (repetition_count, interval_days) = if quality < PASSING_QUALITY {
            (0, FAILED_INTERVAL_DAYS)
        } else {
            let repetition_count = schedule.repetition_count.saturating_add(1);
            let interval_days = match repetition_count {
                1 => FIRST_INTERVAL_DAYS,
                2 => SECOND_INTERVAL_DAYS,
                _ => grow_interval(schedule.interval_days, ease_factor),
            };
            (repetition_count, interval_days)
        };

        let next_review_at = now + Duration::days(i64::from(interval_days));

        trace!(
            quality,
            previous_ease = schedule.ease_factor,
            ease_factor,
            previous_interval = schedule.interval_days,
            interval_days,
            repetition_count,
            "Review recorded"
        );

        Ok(FlashcardSchedule {
            ease_factor,
            interval_days,
            repetition_count,
            next_review_at: Some(next_review_at),
            last_reviewed_at: Some(now),
        })
    }

    pub fn validate_quality(quality: i32) -> Result<(), SchedulerError> {
        if (MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            Ok(())
        } else {
            Err(SchedulerError::InvalidQuality(quality))
        }
    }

    /// Map a correct/incorrect answer and self-reported confidence onto the SM-2 scale.
    pub fn quality_from_outcome(&self, correct: bool, confidence: Confidence) -> i32 {
        if !correct {
            return 0;
        }

        match confidence {
            Confidence::Low => 3,
            Confidence::Medium => 4,
            Confidence::High => 5,
        }
    }

    pub fn is_due(&self, schedule: &FlashcardSchedule, now: DateTime<Utc>) -> bool {
        match schedule.next_review_at {
            None => true,
            Some(next_review_at) => next_review_at <= now,
        }
    }

    /// Urgency of a due card: 1 for a never-scheduled card, N + 1 when N whole
    /// days overdue. `None` when the card is not due yet.
    pub fn due_priority(&self, schedule: &FlashcardSchedule, now: DateTime<Utc>) -> Option<i64> {
        match schedule.next_review_at {
            None => Some(1),
            Some(next_review_at) if next_review_at <= now => {
                Some((now - next_review_at).num_days() + 1)
            }
            Some(_) => None,
        }
    }

    /// Rank the due subset of `items`, most overdue first.
    ///
    /// Equal priorities keep their input order. The ranking is rebuilt from
    /// scratch on every call.
    pub fn select_due<'a, T: Scheduled>(
        &self,
        items: &'a [T],
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> DueQueue<'a, T> {
        let mut due: Vec<DueCard<'a, T>> = items
            .iter()
            .filter_map(|item| {
                self.due_priority(item.schedule(), now)
                    .map(|priority| DueCard { item, priority })
            })
            .collect();

        // sort_by is stable, which preserves input order among ties
        due.sort_by(|a, b| b.priority.cmp(&a.priority));

        debug!(
            candidates = items.len(),
            due = due.len(),
            limit = ?limit,
            "Selected due cards"
        );

        due.into_iter().take(limit.unwrap_or(usize::MAX))
    }

    /// New takes precedence over the interval check, so every card lands in
    /// exactly one bucket.
    pub fn mastery_level(&self, schedule: &FlashcardSchedule) -> MasteryLevel {
        if schedule.repetition_count == 0 {
            MasteryLevel::New
        } else if schedule.interval_days > self.mastery_threshold_days {
            MasteryLevel::Mastered
        } else {
            MasteryLevel::Learning
        }
    }

    /// Aggregate a learner's cards and review log as seen at `now`.
    ///
    /// "Today" is the calendar day of `now` in its own time zone; review
    /// timestamps are converted into that zone before comparison.
    pub fn compute_statistics<T: Scheduled, Tz: TimeZone>(
        &self,
        items: &[T],
        reviews: &[ReviewEvent],
        now: DateTime<Tz>,
    ) -> StatisticsSnapshot {
        let zone = now.timezone();
        let today = now.date_naive();
        let now_utc = now.with_timezone(&Utc);

        let mut snapshot = StatisticsSnapshot {
            total_cards: items.len(),
            due_count: 0,
            new_count: 0,
            learning_count: 0,
            mastered_count: 0,
            overdue_count: 0,
            due_today_count: 0,
            reviewed_today_count: 0,
            average_ease_factor: self.initial_ease,
        };

        let mut ease_sum = 0.0;
        for item in items {
            let schedule = item.schedule();
            ease_sum += schedule.ease_factor;

            match self.mastery_level(schedule) {
                MasteryLevel::New => snapshot.new_count += 1,
                MasteryLevel::Learning => snapshot.learning_count += 1,
                MasteryLevel::Mastered => snapshot.mastered_count += 1,
            }

            if self.is_due(schedule, now_utc) {
                snapshot.due_count += 1;
            }

            if let Some(next_review_at) = schedule.next_review_at {
                let review_day = next_review_at.with_timezone(&zone).date_naive();
                if review_day < today {
                    snapshot.overdue_count += 1;
                } else if review_day == today {
                    snapshot.due_today_count += 1;
                }
            }
        }

        if !items.is_empty() {
            snapshot.average_ease_factor = ease_sum / items.len() as f64;
        }

        snapshot.reviewed_today_count = reviews
            .iter()
            .filter(|review| review.reviewed_at.with_timezone(&zone).date_naive() == today)
            .count();

        debug!(
            total_cards = snapshot.total_cards,
            due_count = snapshot.due_count,
            due_today = snapshot.due_today_count,
            new_count = snapshot.new_count,
            mastered_count = snapshot.mastered_count,
            reviewed_today = snapshot.reviewed_today_count,
            "Computed study statistics"
        );

        snapshot
    }

    fn next_ease_factor(&self, ease_factor: f64, quality: i32) -> f64 {
        let missing = f64::from(MAX_QUALITY - quality);
        let updated = ease_factor + (0.1 - missing * (0.08 + missing * 0.02));
        round_hundredths(updated.max(self.minimum_ease))
    }
}

fn grow_interval(interval_days: u32, ease_factor: f64) -> u32 {
    let grown = (f64::from(interval_days) * ease_factor - INTERVAL_EPSILON).ceil();
    (grown as u32).clamp(1, MAX_INTERVAL_DAYS)
}

fn round_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use uuid::Uuid;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn schedule(ease: f64, interval: u32, reps: u32) -> FlashcardSchedule {
        FlashcardSchedule {
            ease_factor: ease,
            interval_days: interval,
            repetition_count: reps,
            next_review_at: None,
            last_reviewed_at: None,
        }
    }

    fn review_at(at: DateTime<Utc>) -> ReviewEvent {
        ReviewEvent {
            id: Uuid::new_v4(),
            flashcard_id: Uuid::new_v4(),
            reviewed_at: at,
            quality: 4,
            ease_factor: 2.5,
            interval_days: 1,
        }
    }

    #[test]
    fn test_new_card_first_pass() {
        let scheduler = ReviewScheduler::new();
        let now = fixed_now();

        let updated = scheduler
            .record_review(&FlashcardSchedule::default(), 4, now)
            .unwrap();

        assert_eq!(updated.repetition_count, 1);
        assert_eq!(updated.interval_days, 1);
        assert_eq!(updated.ease_factor, 2.5);
        assert_eq!(updated.last_reviewed_at, Some(now));
        assert_eq!(updated.next_review_at, Some(now + Duration::days(1)));
    }

    #[test]
    fn test_second_pass_uses_six_days() {
        let scheduler = ReviewScheduler::new();
        let updated = scheduler
            .record_review(&schedule(2.5, 1, 1), 5, fixed_now())
            .unwrap();

        assert_eq!(updated.repetition_count, 2);
        assert_eq!(updated.interval_days, 6);
    }

    #[test]
    fn test_third_pass_grows_by_ease() {
        let scheduler = ReviewScheduler::new();
        let updated = scheduler
            .record_review(&schedule(2.5, 6, 2), 5, fixed_now())
            .unwrap();

        assert!((updated.ease_factor - 2.6).abs() < 1e-9);
        assert_eq!(updated.interval_days, 16);
        assert_eq!(updated.repetition_count, 3);
    }

    #[test]
    fn test_failure_resets_and_degrades_ease() {
        let scheduler = ReviewScheduler::new();
        let updated = scheduler
            .record_review(&schedule(2.6, 16, 3), 1, fixed_now())
            .unwrap();

        assert_eq!(updated.repetition_count, 0);
        assert_eq!(updated.interval_days, 1);
        assert!((updated.ease_factor - 2.06).abs() < 1e-9);
    }

    #[test]
    fn test_ease_never_below_floor() {
        let scheduler = ReviewScheduler::new();
        let updated = scheduler
            .record_review(&schedule(1.3, 1, 0), 0, fixed_now())
            .unwrap();
        assert_eq!(updated.ease_factor, MINIMUM_EASE_FACTOR);
    }

    #[test]
    fn test_exact_products_are_not_rounded_up() {
        let scheduler = ReviewScheduler::new();
        // q=4 keeps ease at 2.5 and 10 * 2.5 is exactly 25
        let updated = scheduler
            .record_review(&schedule(2.5, 10, 3), 4, fixed_now())
            .unwrap();
        assert_eq!(updated.interval_days, 25);
    }

    #[test]
    fn test_invalid_quality_rejected() {
        let scheduler = ReviewScheduler::new();
        for quality in [-1, 6, 100, i32::MIN] {
            let result = scheduler.record_review(&FlashcardSchedule::default(), quality, fixed_now());
            assert_eq!(result, Err(SchedulerError::InvalidQuality(quality)));
        }
    }

    #[test]
    fn test_quality_from_outcome() {
        let scheduler = ReviewScheduler::new();
        assert_eq!(scheduler.quality_from_outcome(false, Confidence::High), 0);
        assert_eq!(scheduler.quality_from_outcome(false, Confidence::Low), 0);
        assert_eq!(scheduler.quality_from_outcome(true, Confidence::Low), 3);
        assert_eq!(scheduler.quality_from_outcome(true, Confidence::Medium), 4);
        assert_eq!(scheduler.quality_from_outcome(true, Confidence::High), 5);
    }

    #[test]
    fn test_confidence_parsing() {
        assert_eq!(" High ".parse::<Confidence>(), Ok(Confidence::High));
        assert_eq!("medium".parse::<Confidence>(), Ok(Confidence::Medium));
        assert!(matches!(
            "certain".parse::<Confidence>(),
            Err(SchedulerError::InvalidConfidence(_))
        ));
    }

    #[test]
    fn test_due_priority() {
        let scheduler = ReviewScheduler::new();
        let now = fixed_now();

        let mut card = FlashcardSchedule::default();
        assert_eq!(scheduler.due_priority(&card, now), Some(1));

        card.next_review_at = Some(now);
        assert_eq!(scheduler.due_priority(&card, now), Some(1));

        card.next_review_at = Some(now - Duration::hours(50));
        assert_eq!(scheduler.due_priority(&card, now), Some(3));

        card.next_review_at = Some(now + Duration::seconds(1));
        assert_eq!(scheduler.due_priority(&card, now), None);
        assert!(!scheduler.is_due(&card, now));
    }

    #[test]
    fn test_select_due_keeps_input_order_for_ties() {
        let scheduler = ReviewScheduler::new();
        let now = fixed_now();

        let mut cards = vec![FlashcardSchedule::default(); 3];
        cards[1].interval_days = 7;
        cards[2].interval_days = 9;

        let due: Vec<u32> = scheduler
            .select_due(&cards, now, None)
            .map(|due| due.item.interval_days)
            .collect();
        assert_eq!(due, vec![0, 7, 9]);
    }

    #[test]
    fn test_select_due_is_restartable() {
        let scheduler = ReviewScheduler::new();
        let now = fixed_now();
        let mut cards = vec![FlashcardSchedule::default(); 4];
        cards[3].next_review_at = Some(now - Duration::days(2));

        let first: Vec<i64> = scheduler.select_due(&cards, now, Some(2)).map(|d| d.priority).collect();
        let second: Vec<i64> = scheduler.select_due(&cards, now, Some(2)).map(|d| d.priority).collect();
        assert_eq!(first, vec![3, 1]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_mastery_level_prefers_new() {
        let scheduler = ReviewScheduler::new();
        assert_eq!(scheduler.mastery_level(&schedule(2.5, 40, 0)), MasteryLevel::New);
        assert_eq!(scheduler.mastery_level(&schedule(2.5, 21, 4)), MasteryLevel::Learning);
        assert_eq!(scheduler.mastery_level(&schedule(2.5, 22, 4)), MasteryLevel::Mastered);
    }

    #[test]
    fn test_statistics_day_boundary_follows_offset() {
        let scheduler = ReviewScheduler::new();
        // 23:30 on March 15th at UTC-5 is 04:30 UTC on March 16th
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let now = offset.with_ymd_and_hms(2024, 3, 15, 23, 30, 0).unwrap();

        let reviews = vec![
            review_at(Utc.with_ymd_and_hms(2024, 3, 15, 6, 0, 0).unwrap()),
            review_at(Utc.with_ymd_and_hms(2024, 3, 16, 4, 0, 0).unwrap()),
            review_at(Utc.with_ymd_and_hms(2024, 3, 15, 4, 0, 0).unwrap()),
        ];

        let cards: Vec<FlashcardSchedule> = Vec::new();
        let snapshot = scheduler.compute_statistics(&cards, &reviews, now);
        assert_eq!(snapshot.reviewed_today_count, 2);
    }

    #[test]
    fn test_statistics_overdue_count() {
        let scheduler = ReviewScheduler::new();
        let now = fixed_now();

        let mut due_earlier_today = schedule(2.5, 1, 1);
        due_earlier_today.next_review_at = Some(now - Duration::hours(2));
        let mut due_yesterday = schedule(2.5, 1, 1);
        due_yesterday.next_review_at = Some(now - Duration::days(1));
        let never_reviewed = FlashcardSchedule::default();

        let mut due_later_today = schedule(2.5, 1, 1);
        due_later_today.next_review_at = Some(now + Duration::hours(3));

        let cards = vec![due_earlier_today, due_yesterday, never_reviewed, due_later_today];
        let snapshot = scheduler.compute_statistics(&cards, &[], now);
        assert_eq!(snapshot.due_count, 3);
        assert_eq!(snapshot.overdue_count, 1);
        assert_eq!(snapshot.due_today_count, 2);
    }
}
