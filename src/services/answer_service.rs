use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::database::{AnswerRemoval, NewAnswer, QuestionCatalog, SessionStore};
use crate::dto::session_dto::SubmitAnswerResponse;
use crate::error::{Error, Result};
use crate::models::session::Session;
use crate::models::session_question::SessionQuestion;
use crate::services::answerable::answerable_for;
use crate::services::time_guard::TimeGuard;

/// Records, replaces and clears the single current answer of a slot.
#[derive(Clone)]
pub struct AnswerService {
    store: Arc<dyn SessionStore>,
    catalog: Arc<dyn QuestionCatalog>,
    time_guard: TimeGuard,
}

impl AnswerService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn QuestionCatalog>,
        time_guard: TimeGuard,
    ) -> Self {
        Self {
            store,
            catalog,
            time_guard,
        }
    }

    /// Loads the session behind `token`, applies the lazy timeout, and
    /// resolves `sequence` to its slot. Shared by submit and clear.
    async fn open_slot(&self, token: &str, sequence: i32) -> Result<(Session, SessionQuestion)> {
        let session = self
            .store
            .find_by_token(token)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
        let session = self.time_guard.observe(session).await?;
        TimeGuard::ensure_ongoing(&session)?;

        let slot = self
            .store
            .session_question(session.id, sequence)
            .await?
            .ok_or_else(|| {
                Error::NotFound(format!("Session has no question with sequence {}", sequence))
            })?;
        Ok((session, slot))
    }

    pub async fn submit(
        &self,
        token: &str,
        sequence: i32,
        payload: &JsonValue,
    ) -> Result<SubmitAnswerResponse> {
        let (session, slot) = self.open_slot(token, sequence).await?;

        let question = self.catalog.get(slot.question_id).await?;
        let answerable = answerable_for(&question, slot.kind)?;
        let value = answerable.validate(payload)?;
        let is_correct = answerable.is_correct(&value);

        let stored = self
            .store
            .upsert_answer(NewAnswer {
                session_question_id: slot.id,
                value,
                is_correct,
                answered_at: self.time_guard.now(),
            })
            .await?;

        match stored {
            Some(answer) => {
                tracing::debug!(session_id = session.id, sequence, is_correct, "answer recorded");
                Ok(SubmitAnswerResponse {
                    sequence,
                    is_correct: answer.is_correct,
                    answered_at: answer.answered_at,
                })
            }
            None => Err(self.rejection(session.id).await),
        }
    }

    /// Removes the slot's answer if there is one.
    pub async fn clear(&self, token: &str, sequence: i32) -> Result<()> {
        let (session, slot) = self.open_slot(token, sequence).await?;
        match self.store.delete_answer(slot.id, self.time_guard.now()).await? {
            AnswerRemoval::SessionClosed => Err(self.rejection(session.id).await),
            removal => {
                let removed = removal == AnswerRemoval::Removed;
                tracing::debug!(session_id = session.id, sequence, removed, "answer cleared");
                Ok(())
            }
        }
    }

    /// Explains why a guarded write found the session closed.
    async fn rejection(&self, session_id: i64) -> Error {
        let current = match self.store.find_by_id(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return Error::NotFound("Session not found".to_string()),
            Err(err) => return err,
        };
        let current = match self.time_guard.observe(current).await {
            Ok(session) => session,
            Err(err) => return err,
        };
        tracing::warn!(session_id, status = %current.status, "answer rejected, session closed");
        match TimeGuard::ensure_ongoing(&current) {
            Err(err) => err,
            Ok(()) => {
                Error::Internal("Answer write was rejected for an ongoing session".to_string())
            }
        }
    }
}
