use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_max_connections(database_url, 5).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every in-memory connection is its own database, so pin the pool to one.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "database initialized");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flashcards (
                id TEXT PRIMARY KEY,
                learner_id TEXT NOT NULL,
                document_id TEXT,
                front TEXT NOT NULL,
                back TEXT NOT NULL,
                topic TEXT,
                created_at TEXT NOT NULL,
                ease_factor REAL NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 0,
                repetition_count INTEGER NOT NULL DEFAULT 0,
                next_review_at TEXT,
                last_reviewed_at TEXT,
                version INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_flashcards_learner ON flashcards (learner_id)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flashcard_reviews (
                id TEXT PRIMARY KEY,
                flashcard_id TEXT NOT NULL,
                learner_id TEXT NOT NULL,
                reviewed_at TEXT NOT NULL,
                quality INTEGER NOT NULL,
                ease_factor REAL NOT NULL,
                interval_days INTEGER NOT NULL,
                FOREIGN KEY (flashcard_id) REFERENCES flashcards(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_reviews_learner ON flashcard_reviews (learner_id, reviewed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // Flashcard operations
    pub async fn create_flashcard(&self, request: CreateFlashcardRequest) -> Result<Flashcard> {
        let flashcard = Flashcard {
            id: Uuid::new_v4(),
            learner_id: request.learner_id,
            document_id: request.document_id,
            front: request.front,
            back: request.back,
            topic: request.topic,
            created_at: Utc::now(),
            schedule: FlashcardSchedule::default(),
            version: 0,
        };

        sqlx::query(
            r#"
            INSERT INTO flashcards (id, learner_id, document_id, front, back, topic, created_at,
                                    ease_factor, interval_days, repetition_count,
                                    next_review_at, last_reviewed_at, version)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(flashcard.id.to_string())
        .bind(&flashcard.learner_id)
        .bind(&flashcard.document_id)
        .bind(&flashcard.front)
        .bind(&flashcard.back)
        .bind(&flashcard.topic)
        .bind(flashcard.created_at.to_rfc3339())
        .bind(flashcard.schedule.ease_factor)
        .bind(i64::from(flashcard.schedule.interval_days))
        .bind(i64::from(flashcard.schedule.repetition_count))
        .bind(flashcard.schedule.next_review_at.map(|d| d.to_rfc3339()))
        .bind(flashcard.schedule.last_reviewed_at.map(|d| d.to_rfc3339()))
        .bind(flashcard.version)
        .execute(&self.pool)
        .await?;

        Ok(flashcard)
    }

    pub async fn get_flashcard(&self, id: Uuid) -> Result<Option<Flashcard>> {
        let started = Instant::now();
        let row = sqlx::query("SELECT * FROM flashcards WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        log_db_operation!(
            debug,
            "select_flashcard",
            card_id = id,
            duration_ms = started.elapsed().as_millis() as u64
        );

        row.as_ref().map(row_to_flashcard).transpose()
    }

    pub async fn get_flashcards_for_learner(&self, learner_id: &str) -> Result<Vec<Flashcard>> {
        let started = Instant::now();
        let rows = sqlx::query(
            "SELECT * FROM flashcards WHERE learner_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(learner_id)
        .fetch_all(&self.pool)
        .await?;

        log_db_operation!(
            debug,
            "select_learner_flashcards",
            count = rows.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );

        rows.iter().map(row_to_flashcard).collect()
    }

    pub async fn get_flashcards_for_document(&self, document_id: &str) -> Result<Vec<Flashcard>> {
        let rows = sqlx::query(
            "SELECT * FROM flashcards WHERE document_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_flashcard).collect()
    }

    pub async fn delete_flashcard(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM flashcards WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Persist a reviewed schedule and its log entry atomically.
    ///
    /// The write only lands if the stored version still equals
    /// `expected_version`; returns `false` when another review got there first
    /// or the flashcard no longer exists.
    pub async fn apply_review(
        &self,
        flashcard: &Flashcard,
        expected_version: i64,
        event: &ReviewEvent,
    ) -> Result<bool> {
        self.write_review(flashcard, expected_version, event)
            .await
            .inspect_err(|e| {
                log_db_operation!(error, "apply_review", error = e);
            })
    }

    async fn write_review(
        &self,
        flashcard: &Flashcard,
        expected_version: i64,
        event: &ReviewEvent,
    ) -> Result<bool> {
        let started = Instant::now();
        let schedule = &flashcard.schedule;
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE flashcards
            SET ease_factor = ?1, interval_days = ?2, repetition_count = ?3,
                next_review_at = ?4, last_reviewed_at = ?5, version = version + 1
            WHERE id = ?6 AND version = ?7
            "#,
        )
        .bind(schedule.ease_factor)
        .bind(i64::from(schedule.interval_days))
        .bind(i64::from(schedule.repetition_count))
        .bind(schedule.next_review_at.map(|d| d.to_rfc3339()))
        .bind(schedule.last_reviewed_at.map(|d| d.to_rfc3339()))
        .bind(flashcard.id.to_string())
        .bind(expected_version)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            INSERT INTO flashcard_reviews (id, flashcard_id, learner_id, reviewed_at,
                                           quality, ease_factor, interval_days)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.flashcard_id.to_string())
        .bind(&flashcard.learner_id)
        .bind(event.reviewed_at.to_rfc3339())
        .bind(event.quality)
        .bind(event.ease_factor)
        .bind(i64::from(event.interval_days))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        log_db_operation!(
            debug,
            "apply_review",
            card_id = flashcard.id,
            duration_ms = started.elapsed().as_millis() as u64
        );

        Ok(true)
    }

    /// A learner's flashcards and review log read inside one transaction, so
    /// a review committed concurrently shows up in both or in neither.
    pub async fn get_learner_snapshot(
        &self,
        learner_id: &str,
    ) -> Result<(Vec<Flashcard>, Vec<ReviewEvent>)> {
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;

        let card_rows = sqlx::query(
            "SELECT * FROM flashcards WHERE learner_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )
        .bind(learner_id)
        .fetch_all(&mut *tx)
        .await?;

        let review_rows = sqlx::query(
            "SELECT * FROM flashcard_reviews WHERE learner_id = ?1 ORDER BY reviewed_at ASC",
        )
        .bind(learner_id)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        log_db_operation!(
            debug,
            "select_learner_snapshot",
            count = card_rows.len() + review_rows.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );

        let flashcards = card_rows.iter().map(row_to_flashcard).collect::<Result<Vec<_>>>()?;
        let reviews = review_rows
            .iter()
            .map(row_to_review_event)
            .collect::<Result<Vec<_>>>()?;
        Ok((flashcards, reviews))
    }

    pub async fn get_reviews_for_flashcard(&self, flashcard_id: Uuid) -> Result<Vec<ReviewEvent>> {
        let rows = sqlx::query(
            "SELECT * FROM flashcard_reviews WHERE flashcard_id = ?1 ORDER BY reviewed_at ASC",
        )
        .bind(flashcard_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_review_event).collect()
    }
}

fn row_to_flashcard(row: &SqliteRow) -> Result<Flashcard> {
    Ok(Flashcard {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        learner_id: row.get("learner_id"),
        document_id: row.get("document_id"),
        front: row.get("front"),
        back: row.get("back"),
        topic: row.get("topic"),
        created_at: parse_timestamp(&row.get::<String, _>("created_at"))?,
        schedule: FlashcardSchedule {
            ease_factor: row.get("ease_factor"),
            interval_days: to_days(row.get("interval_days"))?,
            repetition_count: to_days(row.get("repetition_count"))?,
            next_review_at: parse_optional_timestamp(row.get("next_review_at"))?,
            last_reviewed_at: parse_optional_timestamp(row.get("last_reviewed_at"))?,
        },
        version: row.get("version"),
    })
}

fn row_to_review_event(row: &SqliteRow) -> Result<ReviewEvent> {
    Ok(ReviewEvent {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        flashcard_id: Uuid::parse_str(&row.get::<String, _>("flashcard_id"))?,
        reviewed_at: parse_timestamp(&row.get::<String, _>("reviewed_at"))?,
        quality: row.get("quality"),
        ease_factor: row.get("ease_factor"),
        interval_days: to_days(row.get("interval_days"))?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .with_context(|| format!("invalid stored timestamp '{}'", value))?
        .with_timezone(&Utc))
}

fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_timestamp).transpose()
}

fn to_days(value: i64) -> Result<u32> {
    u32::try_from(value).with_context(|| format!("stored counter out of range: {}", value))
}
