use sqlx::{Sqlite, Transaction};
use study_core::model::{AttendanceRecord, Flashcard, GradeEntry, StudySession, Topic};

use super::SqliteRepository;
use super::mapping::{
    id_to_i64, map_attendance_row, map_card_row, map_grade_row, map_session_row, map_topic_row,
    map_write_error,
};
use crate::repository::{EngineState, StateDelta, StateStore, StorageError};

fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

async fn upsert_topic(tx: &mut Transaction<'_, Sqlite>, topic: &Topic) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO topics (
            id, course_id, title, estimated_effort_minutes, deadline, status, archived
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        ON CONFLICT(id) DO UPDATE SET
            course_id = excluded.course_id,
            title = excluded.title,
            estimated_effort_minutes = excluded.estimated_effort_minutes,
            deadline = excluded.deadline,
            status = excluded.status,
            archived = excluded.archived
        ",
    )
    .bind(id_to_i64("topic_id", topic.id().value())?)
    .bind(
        topic
            .course_id()
            .map(|c| id_to_i64("course_id", c.value()))
            .transpose()?,
    )
    .bind(topic.title())
    .bind(i64::from(topic.estimated_effort_minutes()))
    .bind(topic.deadline())
    .bind(topic.status().as_str())
    .bind(topic.is_archived())
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

async fn upsert_session(
    tx: &mut Transaction<'_, Sqlite>,
    session: &StudySession,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO study_sessions (id, topic_id, scheduled_date, duration_minutes, status)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ON CONFLICT(id) DO UPDATE SET
            topic_id = excluded.topic_id,
            scheduled_date = excluded.scheduled_date,
            duration_minutes = excluded.duration_minutes,
            status = excluded.status
        ",
    )
    .bind(id_to_i64("session_id", session.id.value())?)
    .bind(id_to_i64("topic_id", session.topic_id.value())?)
    .bind(session.scheduled_date)
    .bind(i64::from(session.duration_minutes))
    .bind(session.status.as_str())
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

async fn upsert_card(tx: &mut Transaction<'_, Sqlite>, card: &Flashcard) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO cards (
            id, topic_id, front, back, ease_factor, interval_days, repetitions,
            due_date, last_reviewed_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT(id) DO UPDATE SET
            topic_id = excluded.topic_id,
            front = excluded.front,
            back = excluded.back,
            ease_factor = excluded.ease_factor,
            interval_days = excluded.interval_days,
            repetitions = excluded.repetitions,
            due_date = excluded.due_date,
            last_reviewed_at = excluded.last_reviewed_at
        ",
    )
    .bind(id_to_i64("card_id", card.id().value())?)
    .bind(
        card.topic_id()
            .map(|t| id_to_i64("topic_id", t.value()))
            .transpose()?,
    )
    .bind(card.front())
    .bind(card.back())
    .bind(card.ease_factor())
    .bind(i64::from(card.interval_days()))
    .bind(i64::from(card.repetitions()))
    .bind(card.due_date())
    .bind(card.last_reviewed_at())
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

async fn insert_attendance(
    tx: &mut Transaction<'_, Sqlite>,
    record: &AttendanceRecord,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO attendance_records (id, course_id, date, present)
        VALUES (?1, ?2, ?3, ?4)
        ",
    )
    .bind(id_to_i64("record_id", record.id.value())?)
    .bind(id_to_i64("course_id", record.course_id.value())?)
    .bind(record.date)
    .bind(record.present)
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

async fn insert_grade(tx: &mut Transaction<'_, Sqlite>, entry: &GradeEntry) -> Result<(), StorageError> {
    sqlx::query(
        r"
        INSERT INTO grade_entries (id, course_id, name, score, max_score, weight)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ",
    )
    .bind(id_to_i64("grade_id", entry.id().value())?)
    .bind(id_to_i64("course_id", entry.course_id().value())?)
    .bind(entry.name())
    .bind(entry.score())
    .bind(entry.max_score())
    .bind(entry.weight())
    .execute(&mut **tx)
    .await
    .map_err(map_write_error)?;
    Ok(())
}

#[async_trait::async_trait]
impl StateStore for SqliteRepository {
    async fn load_state(&self) -> Result<EngineState, StorageError> {
        let topics = sqlx::query(
            r"
            SELECT id, course_id, title, estimated_effort_minutes, deadline, status, archived
            FROM topics
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?
        .iter()
        .map(map_topic_row)
        .collect::<Result<Vec<_>, _>>()?;

        let sessions = sqlx::query(
            r"
            SELECT id, topic_id, scheduled_date, duration_minutes, status
            FROM study_sessions
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?
        .iter()
        .map(map_session_row)
        .collect::<Result<Vec<_>, _>>()?;

        let cards = sqlx::query(
            r"
            SELECT
                id, topic_id, front, back, ease_factor, interval_days, repetitions,
                due_date, last_reviewed_at
            FROM cards
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?
        .iter()
        .map(map_card_row)
        .collect::<Result<Vec<_>, _>>()?;

        let attendance = sqlx::query(
            r"
            SELECT id, course_id, date, present
            FROM attendance_records
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?
        .iter()
        .map(map_attendance_row)
        .collect::<Result<Vec<_>, _>>()?;

        let grades = sqlx::query(
            r"
            SELECT id, course_id, name, score, max_score, weight
            FROM grade_entries
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?
        .iter()
        .map(map_grade_row)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(EngineState {
            topics,
            sessions,
            cards,
            attendance,
            grades,
        })
    }

    async fn save_state(&self, delta: &StateDelta) -> Result<(), StorageError> {
        if delta.is_empty() {
            return Ok(());
        }

        // Dropping the transaction on an early return rolls it back.
        let mut tx = self.pool.begin().await.map_err(conn)?;

        for topic in &delta.topics {
            upsert_topic(&mut tx, topic).await?;
        }
        for id in &delta.removed_sessions {
            sqlx::query("DELETE FROM study_sessions WHERE id = ?1")
                .bind(id_to_i64("session_id", id.value())?)
                .execute(&mut *tx)
                .await
                .map_err(map_write_error)?;
        }
        for session in &delta.sessions {
            upsert_session(&mut tx, session).await?;
        }
        for card in &delta.cards {
            upsert_card(&mut tx, card).await?;
        }
        for record in &delta.attendance {
            insert_attendance(&mut tx, record).await?;
        }
        for entry in &delta.grades {
            insert_grade(&mut tx, entry).await?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}
