use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use study_core::model::{
    AttendanceRecord, CardId, CourseId, Flashcard, GradeEntry, GradeId, RecordId, SessionId,
    SessionStatus, StudySession, Topic, TopicId, TopicStatus,
};

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn get_u64(row: &SqliteRow, field: &'static str) -> Result<u64, StorageError> {
    i64_to_u64(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

fn get_opt_u64(row: &SqliteRow, field: &'static str) -> Result<Option<u64>, StorageError> {
    row.try_get::<Option<i64>, _>(field)
        .map_err(ser)?
        .map(|v| i64_to_u64(field, v))
        .transpose()
}

fn get_u32(row: &SqliteRow, field: &'static str) -> Result<u32, StorageError> {
    i64_to_u32(field, row.try_get::<i64, _>(field).map_err(ser)?)
}

pub(crate) fn map_topic_row(row: &SqliteRow) -> Result<Topic, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let status: TopicStatus = status.parse().map_err(ser)?;

    Topic::from_persisted(
        TopicId::new(get_u64(row, "id")?),
        get_opt_u64(row, "course_id")?.map(CourseId::new),
        row.try_get("title").map_err(ser)?,
        get_u32(row, "estimated_effort_minutes")?,
        row.try_get::<Option<NaiveDate>, _>("deadline").map_err(ser)?,
        status,
        row.try_get::<bool, _>("archived").map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<StudySession, StorageError> {
    let status: String = row.try_get("status").map_err(ser)?;
    let status: SessionStatus = status.parse().map_err(ser)?;

    StudySession::from_persisted(
        SessionId::new(get_u64(row, "id")?),
        TopicId::new(get_u64(row, "topic_id")?),
        row.try_get("scheduled_date").map_err(ser)?,
        get_u32(row, "duration_minutes")?,
        status,
    )
    .map_err(ser)
}

pub(crate) fn map_card_row(row: &SqliteRow) -> Result<Flashcard, StorageError> {
    Flashcard::from_persisted(
        CardId::new(get_u64(row, "id")?),
        get_opt_u64(row, "topic_id")?.map(TopicId::new),
        row.try_get("front").map_err(ser)?,
        row.try_get("back").map_err(ser)?,
        row.try_get("ease_factor").map_err(ser)?,
        get_u32(row, "interval_days")?,
        get_u32(row, "repetitions")?,
        row.try_get("due_date").map_err(ser)?,
        row.try_get::<Option<DateTime<Utc>>, _>("last_reviewed_at")
            .map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attendance_row(row: &SqliteRow) -> Result<AttendanceRecord, StorageError> {
    Ok(AttendanceRecord::new(
        RecordId::new(get_u64(row, "id")?),
        CourseId::new(get_u64(row, "course_id")?),
        row.try_get("date").map_err(ser)?,
        row.try_get("present").map_err(ser)?,
    ))
}

pub(crate) fn map_grade_row(row: &SqliteRow) -> Result<GradeEntry, StorageError> {
    GradeEntry::from_persisted(
        GradeId::new(get_u64(row, "id")?),
        CourseId::new(get_u64(row, "course_id")?),
        row.try_get("name").map_err(ser)?,
        row.try_get("score").map_err(ser)?,
        row.try_get("max_score").map_err(ser)?,
        row.try_get("weight").map_err(ser)?,
    )
    .map_err(ser)
}

/// Unique-constraint violations become `Conflict`; everything else is a
/// connection failure.
pub(crate) fn map_write_error(e: sqlx::Error) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StorageError::Conflict(db.message().to_owned())
        }
        _ => StorageError::Connection(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_ids_are_rejected() {
        assert!(matches!(
            i64_to_u64("card_id", -1),
            Err(StorageError::Serialization(_))
        ));
        assert!(id_to_i64("card_id", u64::MAX).is_err());
        assert_eq!(id_to_i64("card_id", 7).unwrap(), 7);
    }
}
