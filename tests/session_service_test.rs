mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use common::{harness, TOPIC_CHOICE, TOPIC_DRAG};
use exam_session_backend::database::memory::{MemoryQuestionCatalog, MemorySessionStore};
use exam_session_backend::database::{AnswerRemoval, NewAnswer, SessionStore};
use exam_session_backend::dto::session_dto::CreateSessionRequest;
use exam_session_backend::error::{Error, Result};
use exam_session_backend::models::answer::Answer;
use exam_session_backend::models::session::{NewSession, Session, SessionFilter, SessionStatus};
use exam_session_backend::models::session_question::{SampledQuestion, SessionQuestion};
use exam_session_backend::services::session_service::SessionService;
use exam_session_backend::utils::time::ManualClock;

fn request(
    topic_id: Option<i64>,
    duration_minutes: i32,
    question_count: i32,
) -> CreateSessionRequest {
    CreateSessionRequest {
        subject_id: common::SUBJECT,
        level_id: common::LEVEL,
        topic_id,
        duration_minutes,
        question_count,
    }
}

#[tokio::test]
async fn deadline_is_start_plus_duration() {
    let h = harness().await;
    let svc = &h.state.session_service;
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(None, 45, 2)).await);
    assert_eq!(session.deadline - session.started_at, Duration::minutes(45));
    assert_eq!(session.status, SessionStatus::Ongoing);
    assert!(session.finished_at.is_none());

    let slots = assert_ok!(h.store.session_questions(session.id).await);
    let mut ids: Vec<i64> = slots.iter().map(|s| s.question_id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn zero_questions_is_invalid_input() {
    let h = harness().await;
    let err = assert_err!(
        h.state
            .session_service
            .create(Uuid::new_v4(), request(None, 30, 0))
            .await
    );
    assert!(matches!(err, Error::InvalidInput(_)));
}

#[tokio::test]
async fn insufficient_pool_reports_counts() {
    let h = harness().await;
    let err = assert_err!(
        h.state
            .session_service
            .create(Uuid::new_v4(), request(Some(TOPIC_DRAG), 30, 2))
            .await
    );
    assert!(matches!(
        err,
        Error::InsufficientPool {
            requested: 2,
            available: 1
        }
    ));
}

#[tokio::test]
async fn concurrent_completion_settles_on_one_result() {
    let h = harness().await;
    let svc = h.state.session_service.clone();
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(Some(TOPIC_CHOICE), 30, 2)).await);
    assert_ok!(svc.submit_answer(&session.token, 1, &json!("A")).await);

    let (a, b) = tokio::join!(svc.complete(&session.token), svc.complete(&session.token));
    let a = assert_ok!(a);
    let b = assert_ok!(b);
    assert_eq!(a.status, SessionStatus::Completed);
    assert_eq!(a.final_score, b.final_score);
    assert_eq!(a.finished_at, b.finished_at);
}

#[tokio::test]
async fn answers_after_completion_are_refused() {
    let h = harness().await;
    let svc = &h.state.session_service;
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(Some(TOPIC_CHOICE), 30, 2)).await);
    assert_ok!(svc.complete(&session.token).await);

    let err = assert_err!(svc.submit_answer(&session.token, 1, &json!("A")).await);
    assert!(matches!(err, Error::InvalidState(_)));
    let err = assert_err!(svc.clear_answer(&session.token, 1).await);
    assert!(matches!(err, Error::InvalidState(_)));
}

#[tokio::test]
async fn answer_exactly_at_deadline_is_accepted() {
    let h = harness().await;
    let svc = &h.state.session_service;
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(Some(TOPIC_CHOICE), 1, 1)).await);

    h.clock.set(session.deadline);
    assert_ok!(svc.submit_answer(&session.token, 1, &json!("B")).await);

    h.clock.advance(Duration::milliseconds(1));
    let err = assert_err!(svc.submit_answer(&session.token, 1, &json!("A")).await);
    assert!(matches!(err, Error::Timeout(_)));

    let stored = assert_ok!(h.store.find_by_id(session.id).await).expect("session");
    assert_eq!(stored.status, SessionStatus::Timeout);
    assert!(stored.final_score.is_none());
    assert!(stored.finished_at.is_some());
}

#[tokio::test]
async fn listing_times_out_expired_sessions() {
    let h = harness().await;
    let svc = &h.state.session_service;
    let user = Uuid::new_v4();
    assert_ok!(svc.create(user, request(None, 1, 1)).await);
    h.clock.advance(Duration::minutes(2));

    let filter = SessionFilter {
        user_id: Some(user),
        status: None,
        page: 1,
        per_page: 10,
    };
    let (sessions, total) = assert_ok!(svc.list(&filter).await);
    assert_eq!(total, 1);
    assert_eq!(sessions[0].status, SessionStatus::Timeout);
}

#[tokio::test]
async fn snapshot_counts_answers_and_remaining_time() {
    let h = harness().await;
    let svc = &h.state.session_service;
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(Some(TOPIC_CHOICE), 10, 2)).await);
    assert_ok!(svc.submit_answer(&session.token, 2, &json!("d")).await);
    h.clock.advance(Duration::seconds(90));

    let snapshot = assert_ok!(svc.get(&session.token).await);
    assert_eq!(snapshot.answered_count, 1);
    assert_eq!(snapshot.time_remaining_seconds, 510);
}

/// Memory store whose slot lookup stalls, so an answer write that already
/// passed its ongoing check lands after whatever ran in the meantime.
struct SlowSlotStore {
    inner: MemorySessionStore,
}

#[async_trait]
impl SessionStore for SlowSlotStore {
    async fn create_session(
        &self,
        session: NewSession,
        questions: &[SampledQuestion],
    ) -> Result<Session> {
        self.inner.create_session(session, questions).await
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        self.inner.find_by_token(token).await
    }

    async fn find_by_id(&self, session_id: i64) -> Result<Option<Session>> {
        self.inner.find_by_id(session_id).await
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<(Vec<Session>, i64)> {
        self.inner.list_sessions(filter).await
    }

    async fn mark_timed_out(
        &self,
        session_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<Session> {
        self.inner.mark_timed_out(session_id, finished_at).await
    }

    async fn complete_scored(
        &self,
        session_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        self.inner.complete_scored(session_id, finished_at).await
    }

    async fn delete_ongoing(&self, session_id: i64) -> Result<bool> {
        self.inner.delete_ongoing(session_id).await
    }

    async fn session_questions(&self, session_id: i64) -> Result<Vec<SessionQuestion>> {
        self.inner.session_questions(session_id).await
    }

    async fn session_question(
        &self,
        session_id: i64,
        sequence: i32,
    ) -> Result<Option<SessionQuestion>> {
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        self.inner.session_question(session_id, sequence).await
    }

    async fn answers(&self, session_id: i64) -> Result<Vec<Answer>> {
        self.inner.answers(session_id).await
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> Result<Option<Answer>> {
        self.inner.upsert_answer(answer).await
    }

    async fn delete_answer(
        &self,
        session_question_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AnswerRemoval> {
        self.inner.delete_answer(session_question_id, at).await
    }
}

async fn slow_service() -> (SessionService, Arc<SlowSlotStore>) {
    let store = Arc::new(SlowSlotStore {
        inner: MemorySessionStore::new(),
    });
    let catalog = Arc::new(MemoryQuestionCatalog::new());
    common::seed_catalog(&catalog).await;
    let svc = SessionService::new(store.clone(), catalog, Arc::new(ManualClock::default()));
    (svc, store)
}

#[tokio::test]
async fn answer_racing_completion_is_refused_and_not_scored() {
    let (svc, store) = slow_service().await;
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(Some(TOPIC_CHOICE), 30, 1)).await);

    let answer_a = json!("A");
    let (submitted, completed) = tokio::join!(
        svc.submit_answer(&session.token, 1, &answer_a),
        svc.complete(&session.token)
    );
    let err = assert_err!(submitted);
    assert!(matches!(err, Error::InvalidState(_)));
    let completed = assert_ok!(completed);
    assert_eq!(completed.correct_count, Some(0));
    assert_eq!(store.inner.answer_count(session.id).await, 0);

    let detail = assert_ok!(svc.detail(&session.token).await);
    assert!(!detail.items[0].is_answered);
}

#[tokio::test]
async fn clear_racing_completion_keeps_the_scored_answer() {
    let (svc, store) = slow_service().await;
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(Some(TOPIC_DRAG), 30, 1)).await);
    let full = json!({"1": 11, "2": 12, "3": 13, "4": 14});
    assert_ok!(svc.submit_answer(&session.token, 1, &full).await);

    let (cleared, completed) = tokio::join!(
        svc.clear_answer(&session.token, 1),
        svc.complete(&session.token)
    );
    let err = assert_err!(cleared);
    assert!(matches!(err, Error::InvalidState(_)));
    let completed = assert_ok!(completed);
    assert_eq!(completed.correct_count, Some(1));
    assert_eq!(completed.final_score, Some(100.0));
    assert_eq!(store.inner.answer_count(session.id).await, 1);

    let detail = assert_ok!(svc.detail(&session.token).await);
    assert!(detail.items[0].is_answered);
    assert!(detail.items[0].is_correct);
}

#[tokio::test]
async fn concurrent_submits_to_one_slot_leave_one_answer() {
    let (svc, store) = slow_service().await;
    let session = assert_ok!(svc.create(Uuid::new_v4(), request(Some(TOPIC_CHOICE), 30, 1)).await);

    let answer_a = json!("A");
    let answer_b = json!("B");
    let (first, second) = tokio::join!(
        svc.submit_answer(&session.token, 1, &answer_a),
        svc.submit_answer(&session.token, 1, &answer_b)
    );
    assert_ok!(first);
    assert_ok!(second);
    assert_eq!(store.inner.answer_count(session.id).await, 1);

    let completed = assert_ok!(svc.complete(&session.token).await);
    let correct = completed.correct_count.expect("scored");
    assert!(correct == 0 || correct == 1);
}
