use std::collections::HashMap;
use std::sync::Arc;

use crate::database::{QuestionCatalog, SessionStore};
use crate::dto::session_dto::{
    QuestionSheetItem, QuestionSheetResponse, ReviewItem, SessionDetailResponse,
};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::Question;
use crate::models::session::{Session, SessionStatus};
use crate::models::session_question::SessionQuestion;
use crate::services::answerable::answerable_for;
use crate::services::time_guard::TimeGuard;

/// Joins slots, catalog content and answers into ordered per-question views.
#[derive(Clone)]
pub struct ResultService {
    store: Arc<dyn SessionStore>,
    catalog: Arc<dyn QuestionCatalog>,
    time_guard: TimeGuard,
}

struct Joined {
    slots: Vec<SessionQuestion>,
    questions: HashMap<i64, Question>,
    answers: HashMap<i64, Answer>,
}

impl Joined {
    fn question_for(&self, slot: &SessionQuestion) -> Result<&Question> {
        self.questions.get(&slot.question_id).ok_or_else(|| {
            Error::Internal(format!(
                "question {} assigned at sequence {} is missing from the catalog",
                slot.question_id, slot.sequence
            ))
        })
    }
}

impl ResultService {
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

    async fn load(&self, token: &str) -> Result<Session> {
        let session = self
            .store
            .find_by_token(token)
            .await?
            .ok_or_else(|| Error::NotFound("Session not found".to_string()))?;
        self.time_guard.observe(session).await
    }

    async fn join(&self, session: &Session) -> Result<Joined> {
        let slots = self.store.session_questions(session.id).await?;
        let ids: Vec<i64> = slots.iter().map(|s| s.question_id).collect();
        let questions = self
            .catalog
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();
        let answers = self
            .store
            .answers(session.id)
            .await?
            .into_iter()
            .map(|a| (a.session_question_id, a))
            .collect();
        Ok(Joined {
            slots,
            questions,
            answers,
        })
    }

    /// Post-exam review. Only for completed or timed-out sessions.
    pub async fn detail(&self, token: &str) -> Result<SessionDetailResponse> {
        let session = self.load(token).await?;
        if !matches!(session.status, SessionStatus::Completed | SessionStatus::Timeout) {
            return Err(Error::InvalidState(
                "Results are available once the session is completed or timed out".to_string(),
            ));
        }

        let joined = self.join(&session).await?;
        let mut items = Vec::with_capacity(joined.slots.len());
        for slot in &joined.slots {
            let question = joined.question_for(slot)?;
            let answerable = answerable_for(question, slot.kind)?;
            let answer = joined.answers.get(&slot.id);

            items.push(ReviewItem {
                sequence: slot.sequence,
                kind: slot.kind,
                question: question.public_content(),
                student_answer: answer.map(|a| answerable.render(&a.value)),
                correct_answer: answerable.render(&answerable.correct_answer()),
                is_correct: answer.map(|a| a.is_correct).unwrap_or(false),
                is_answered: answer.is_some(),
                answered_at: answer.map(|a| a.answered_at),
            });
        }

        Ok(SessionDetailResponse {
            token: session.token,
            status: session.status,
            total_questions: session.total_questions,
            correct_count: session.correct_count,
            final_score: session.final_score,
            finished_at: session.finished_at,
            items,
        })
    }

    /// The exam paper while it is being taken: content without answer keys
    /// plus the student's current answers.
    pub async fn question_sheet(&self, token: &str) -> Result<QuestionSheetResponse> {
        let session = self.load(token).await?;
        TimeGuard::ensure_ongoing(&session)?;

        let joined = self.join(&session).await?;
        let mut questions = Vec::with_capacity(joined.slots.len());
        for slot in &joined.slots {
            let question = joined.question_for(slot)?;
            let answer = joined.answers.get(&slot.id);
            questions.push(QuestionSheetItem {
                sequence: slot.sequence,
                kind: slot.kind,
                content: question.public_content(),
                is_answered: answer.is_some(),
                current_answer: answer.map(|a| a.value.clone()),
            });
        }

        Ok(QuestionSheetResponse {
            time_remaining_seconds: self.time_guard.seconds_remaining(&session),
            token: session.token,
            deadline: session.deadline,
            questions,
        })
    }
}
