use chrono::Duration;
use storage::repository::{StateDelta, StateStore, StorageError};
use storage::sqlite::SqliteRepository;
use study_core::model::{
    AttendanceRecord, CardDraft, CardId, CourseId, GradeDraft, GradeId, RecordId, SessionId,
    SessionStatus, StudySession, TopicDraft, TopicId, TopicStatus,
};
use study_core::scheduler::Scheduler;
use study_core::time::{fixed_now, fixed_today};

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_roundtrip_persists_every_family() {
    let repo = connect("memdb_roundtrip").await;

    let mut topic = TopicDraft::new("Linear algebra", 240)
        .with_deadline(fixed_today() + Duration::days(5))
        .with_course(CourseId::new(2))
        .into_topic(TopicId::new(1))
        .unwrap();
    topic.start();

    let card = CardDraft::new("det(I)?", "1")
        .for_topic(topic.id())
        .into_card(CardId::new(1), 2.5, fixed_today())
        .unwrap();
    let reviewed = Scheduler::new().review(&card, 4, fixed_now()).unwrap();

    let grade = GradeDraft {
        course_id: CourseId::new(2),
        name: "Quiz 1".into(),
        score: 18.0,
        max_score: 20.0,
        weight: 0.1,
    }
    .into_entry(GradeId::new(1))
    .unwrap();

    repo.save_state(&StateDelta {
        topics: vec![topic],
        sessions: vec![StudySession::planned(
            SessionId::new(1),
            TopicId::new(1),
            fixed_today(),
            60,
        )],
        cards: vec![reviewed.clone()],
        attendance: vec![AttendanceRecord::new(
            RecordId::new(1),
            CourseId::new(2),
            fixed_today(),
            true,
        )],
        grades: vec![grade],
        ..StateDelta::default()
    })
    .await
    .expect("save");

    let state = repo.load_state().await.expect("load");
    assert_eq!(state.topics.len(), 1);
    assert_eq!(state.topics[0].status(), TopicStatus::InProgress);
    assert_eq!(state.topics[0].course_id(), Some(CourseId::new(2)));
    assert_eq!(state.sessions[0].status, SessionStatus::Planned);
    assert_eq!(state.cards, vec![reviewed]);
    assert!(state.attendance[0].present);
    assert!((state.grades[0].percent() - 90.0).abs() < 1e-9);
}

#[tokio::test]
async fn sqlite_replaces_superseded_sessions() {
    let repo = connect("memdb_sessions").await;
    let topic = TopicDraft::new("Essay", 120)
        .into_topic(TopicId::new(1))
        .unwrap();

    repo.save_state(&StateDelta {
        topics: vec![topic],
        sessions: vec![
            StudySession::planned(SessionId::new(1), TopicId::new(1), fixed_today(), 60),
            StudySession::planned(SessionId::new(2), TopicId::new(1), fixed_today(), 60),
        ],
        ..StateDelta::default()
    })
    .await
    .unwrap();

    let completed = StudySession {
        status: SessionStatus::Completed,
        ..StudySession::planned(SessionId::new(1), TopicId::new(1), fixed_today(), 60)
    };
    repo.save_state(&StateDelta {
        sessions: vec![completed],
        removed_sessions: vec![SessionId::new(2)],
        ..StateDelta::default()
    })
    .await
    .unwrap();

    let state = repo.load_state().await.unwrap();
    assert_eq!(state.sessions.len(), 1);
    assert_eq!(state.sessions[0].status, SessionStatus::Completed);
}

#[tokio::test]
async fn sqlite_rejects_duplicate_attendance_atomically() {
    let repo = connect("memdb_attendance").await;
    let course = CourseId::new(4);

    repo.save_state(&StateDelta::attendance(AttendanceRecord::new(
        RecordId::new(1),
        course,
        fixed_today(),
        true,
    )))
    .await
    .unwrap();

    let card = CardDraft::new("Q", "A")
        .into_card(CardId::new(5), 2.5, fixed_today())
        .unwrap();
    let err = repo
        .save_state(&StateDelta {
            cards: vec![card],
            attendance: vec![AttendanceRecord::new(
                RecordId::new(2),
                course,
                fixed_today(),
                false,
            )],
            ..StateDelta::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict(_)));

    let state = repo.load_state().await.unwrap();
    assert!(state.cards.is_empty(), "card write must roll back");
    assert_eq!(state.attendance.len(), 1);
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = connect("memdb_migrate").await;
    repo.migrate().await.expect("second migrate");
    let state = repo.load_state().await.unwrap();
    assert!(state.topics.is_empty());
}
