use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS topics (
            id INTEGER PRIMARY KEY,
            course_id INTEGER,
            title TEXT NOT NULL,
            estimated_effort_minutes INTEGER NOT NULL CHECK (estimated_effort_minutes > 0),
            deadline TEXT,
            status TEXT NOT NULL CHECK (status IN ('pending', 'in_progress', 'done')),
            archived INTEGER NOT NULL DEFAULT 0 CHECK (archived IN (0, 1))
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS study_sessions (
            id INTEGER PRIMARY KEY,
            topic_id INTEGER NOT NULL,
            scheduled_date TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL CHECK (duration_minutes > 0),
            status TEXT NOT NULL CHECK (status IN ('planned', 'completed', 'missed')),
            FOREIGN KEY (topic_id) REFERENCES topics(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY,
            topic_id INTEGER,
            front TEXT NOT NULL,
            back TEXT NOT NULL,
            ease_factor REAL NOT NULL CHECK (ease_factor >= 1.3),
            interval_days INTEGER NOT NULL CHECK (interval_days >= 0),
            repetitions INTEGER NOT NULL CHECK (repetitions >= 0),
            due_date TEXT NOT NULL,
            last_reviewed_at TEXT
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attendance_records (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            date TEXT NOT NULL,
            present INTEGER NOT NULL CHECK (present IN (0, 1)),
            UNIQUE (course_id, date)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS grade_entries (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            score REAL NOT NULL CHECK (score >= 0),
            max_score REAL NOT NULL CHECK (max_score > 0),
            weight REAL NOT NULL CHECK (weight > 0 AND weight <= 1)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_cards_due_repetitions
            ON cards (due_date, repetitions, id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sessions_date
            ON study_sessions (scheduled_date, id);
    ",
];

/// Runs versioned migrations, each inside its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: topics, sessions, cards, attendance, grades.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
