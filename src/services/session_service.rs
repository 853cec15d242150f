use serde_json::Value as JsonValue;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::database::{QuestionCatalog, SessionStore};
use crate::dto::session_dto::{
    CreateSessionRequest, QuestionSheetResponse, SessionDetailResponse, SubmitAnswerResponse,
};
use crate::error::{Error, Result};
use crate::models::session::{NewSession, Session, SessionFilter, SessionStatus};
use crate::services::answer_service::AnswerService;
use crate::services::grading_service::GradingService;
use crate::services::result_service::ResultService;
use crate::services::sampler::QuestionSampler;
use crate::services::time_guard::TimeGuard;
use crate::utils::time::Clock;
use crate::utils::token::generate_session_token;

/// A session plus the live figures shown alongside it.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session: Session,
    pub answered_count: usize,
    pub time_remaining_seconds: i64,
}

/// Entry point for every session operation.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    catalog: Arc<dyn QuestionCatalog>,
    sampler: QuestionSampler,
    time_guard: TimeGuard,
    answers: AnswerService,
    grading: GradingService,
    results: ResultService,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn QuestionCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let time_guard = TimeGuard::new(clock, store.clone());
        Self {
            sampler: QuestionSampler::new(catalog.clone()),
            answers: AnswerService::new(store.clone(), catalog.clone(), time_guard.clone()),
            grading: GradingService::new(store.clone()),
            results: ResultService::new(store.clone(), catalog.clone(), time_guard.clone()),
            time_guard,
            store,
            catalog,
        }
    }

    pub fn time_guard(&self) -> &TimeGuard {
        &self.time_guard
    }

    async fn find(&self, token: &str) -> Result<Session> {
        self.store
            .find_by_token(token)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))
    }

    /// Creates a session with a freshly drawn question set. Nothing is
    /// persisted unless every check and the draw succeed.
    pub async fn create(&self, user_id: Uuid, payload: CreateSessionRequest) -> Result<Session> {
        payload.validate()?;

        if !self
            .catalog
            .scope_exists(payload.subject_id, payload.level_id)
            .await?
        {
            return Err(Error::InvalidInput(format!(
                "Level {} does not belong to subject {}",
                payload.level_id, payload.subject_id
            )));
        }

        let sampled = self
            .sampler
            .sample(
                payload.subject_id,
                payload.level_id,
                payload.topic_id,
                payload.question_count as usize,
            )
            .await?;

        let started_at = self.time_guard.now();
        let session = self
            .store
            .create_session(
                NewSession {
                    token: generate_session_token(),
                    user_id,
                    subject_id: payload.subject_id,
                    level_id: payload.level_id,
                    topic_id: payload.topic_id,
                    started_at,
                    duration_minutes: payload.duration_minutes,
                    deadline: TimeGuard::deadline_for(started_at, payload.duration_minutes),
                },
                &sampled,
            )
            .await?;

        tracing::info!(
            session_id = session.id,
            %user_id,
            total_questions = session.total_questions,
            deadline = %session.deadline,
            "session created"
        );
        Ok(session)
    }

    pub async fn get(&self, token: &str) -> Result<SessionSnapshot> {
        let session = self.find(token).await?;
        let session = self.time_guard.observe(session).await?;
        let answered_count = self.store.answers(session.id).await?.len();
        Ok(SessionSnapshot {
            time_remaining_seconds: self.time_guard.seconds_remaining(&session),
            answered_count,
            session,
        })
    }

    pub async fn questions(&self, token: &str) -> Result<QuestionSheetResponse> {
        self.results.question_sheet(token).await
    }

    pub async fn submit_answer(
        &self,
        token: &str,
        sequence: i32,
        payload: &JsonValue,
    ) -> Result<SubmitAnswerResponse> {
        self.answers.submit(token, sequence, payload).await
    }

    pub async fn clear_answer(&self, token: &str, sequence: i32) -> Result<()> {
        self.answers.clear(token, sequence).await
    }

    /// Ongoing -> Completed. Already-completed sessions return their stored
    /// result untouched; a passed deadline yields `Timeout` instead.
    pub async fn complete(&self, token: &str) -> Result<Session> {
        let session = self.find(token).await?;
        match session.status {
            SessionStatus::Completed => return Ok(session),
            SessionStatus::Ongoing => {}
            _ => return TimeGuard::ensure_ongoing(&session).map(|_| session),
        }

        let now = self.time_guard.now();
        if TimeGuard::is_expired(&session, now) {
            let expired = self.store.mark_timed_out(session.id, now).await?;
            tracing::info!(session_id = expired.id, "completion requested after deadline");
            return TimeGuard::ensure_ongoing(&expired).map(|_| expired);
        }

        if let Some(completed) = self.grading.complete(&session, now).await? {
            return Ok(completed);
        }

        // Lost a race with another terminal transition; report whatever won.
        let current = self
            .store
            .find_by_id(session.id)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
        let current = self.time_guard.observe(current).await?;
        match current.status {
            SessionStatus::Completed => Ok(current),
            _ => TimeGuard::ensure_ongoing(&current)
                .and_then(|_| Err(Error::Internal("Completion write was rejected".to_string()))),
        }
    }

    /// Ongoing -> Cancelled: removes the session and everything under it.
    pub async fn cancel(&self, token: &str) -> Result<()> {
        let session = self.find(token).await?;
        let session = self.time_guard.observe(session).await?;
        if session.status != SessionStatus::Ongoing {
            return Err(Error::InvalidState(format!(
                "Only ongoing sessions can be cancelled; this one is {}",
                session.status
            )));
        }

        if !self.store.delete_ongoing(session.id).await? {
            return Err(Error::InvalidState(
                "Session left the ongoing state before it could be cancelled".to_string(),
            ));
        }
        tracing::info!(session_id = session.id, user_id = %session.user_id, "session cancelled");
        Ok(())
    }

    pub async fn detail(&self, token: &str) -> Result<SessionDetailResponse> {
        self.results.detail(token).await
    }

    /// Admin listing. Expired sessions on the page are timed out on the way.
    pub async fn list(&self, filter: &SessionFilter) -> Result<(Vec<Session>, i64)> {
        let (sessions, total) = self.store.list_sessions(filter).await?;
        let mut observed = Vec::with_capacity(sessions.len());
        for session in sessions {
            observed.push(self.time_guard.observe(session).await?);
        }
        Ok((observed, total))
    }
}
