//! In-process implementations of the storage seams.
//!
//! Each table set sits behind one `RwLock`, so every trait method is atomic in
//! the same sense as a single Postgres statement or transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

use crate::database::question_catalog::QuestionCatalog;
use crate::database::session_store::{AnswerRemoval, NewAnswer, SessionStore};
use crate::error::{Error, Result};
use crate::models::answer::Answer;
use crate::models::question::{PoolEntry, Question};
use crate::models::session::{NewSession, Score, Session, SessionFilter, SessionStatus};
use crate::models::session_question::{SampledQuestion, SessionQuestion};

#[derive(Default)]
struct Tables {
    next_session_id: i64,
    next_session_question_id: i64,
    sessions: BTreeMap<i64, Session>,
    tokens: HashMap<String, i64>,
    session_questions: BTreeMap<i64, SessionQuestion>,
    answers: HashMap<i64, Answer>,
}

impl Tables {
    fn questions_of(&self, session_id: i64) -> impl Iterator<Item = &SessionQuestion> {
        self.session_questions
            .values()
            .filter(move |sq| sq.session_id == session_id)
    }

    fn accepts_answer_for(&self, session_question_id: i64, at: DateTime<Utc>) -> bool {
        self.session_questions
            .get(&session_question_id)
            .and_then(|sq| self.sessions.get(&sq.session_id))
            .map(|s| s.status == SessionStatus::Ongoing && at <= s.deadline)
            .unwrap_or(false)
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    tables: RwLock<Tables>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    pub async fn answer_count(&self, session_id: i64) -> usize {
        let tables = self.tables.read().await;
        tables
            .questions_of(session_id)
            .filter(|sq| tables.answers.contains_key(&sq.id))
            .count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_session(
        &self,
        session: NewSession,
        questions: &[SampledQuestion],
    ) -> Result<Session> {
        let mut tables = self.tables.write().await;
        if tables.tokens.contains_key(&session.token) {
            return Err(Error::Internal("duplicate session token".to_string()));
        }
        let mut seen = HashSet::new();
        if questions.iter().any(|q| !seen.insert(q.sequence)) {
            return Err(Error::Internal("duplicate sequence in session questions".to_string()));
        }

        tables.next_session_id += 1;
        let id = tables.next_session_id;
        let created = Session {
            id,
            token: session.token,
            user_id: session.user_id,
            subject_id: session.subject_id,
            level_id: session.level_id,
            topic_id: session.topic_id,
            status: SessionStatus::Ongoing,
            started_at: session.started_at,
            duration_minutes: session.duration_minutes,
            deadline: session.deadline,
            finished_at: None,
            total_questions: questions.len() as i32,
            correct_count: None,
            final_score: None,
        };

        for q in questions {
            tables.next_session_question_id += 1;
            let sq_id = tables.next_session_question_id;
            tables.session_questions.insert(
                sq_id,
                SessionQuestion {
                    id: sq_id,
                    session_id: id,
                    question_id: q.question_id,
                    sequence: q.sequence,
                    kind: q.kind,
                },
            );
        }
        tables.tokens.insert(created.token.clone(), id);
        tables.sessions.insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(token)
            .and_then(|id| tables.sessions.get(id))
            .cloned())
    }

    async fn find_by_id(&self, session_id: i64) -> Result<Option<Session>> {
        Ok(self.tables.read().await.sessions.get(&session_id).cloned())
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<(Vec<Session>, i64)> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&Session> = tables
            .sessions
            .values()
            .filter(|s| filter.user_id.map_or(true, |u| s.user_id == u))
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as i64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(usize::try_from(filter.per_page).unwrap_or(0))
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn mark_timed_out(
        &self,
        session_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<Session> {
        let mut tables = self.tables.write().await;
        let session = tables
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| Error::NotFound(format!("Session {} not found", session_id)))?;
        if session.status == SessionStatus::Ongoing {
            session.status = SessionStatus::Timeout;
            session.finished_at = Some(finished_at);
        }
        Ok(session.clone())
    }

    async fn complete_scored(
        &self,
        session_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let mut tables = self.tables.write().await;
        let total_questions = match tables.sessions.get(&session_id) {
            Some(s) if s.status == SessionStatus::Ongoing && finished_at <= s.deadline => {
                s.total_questions
            }
            _ => return Ok(None),
        };

        let flags: Vec<bool> = tables
            .questions_of(session_id)
            .filter_map(|sq| tables.answers.get(&sq.id).map(|a| a.is_correct))
            .collect();
        let score = Score::tally(flags, total_questions);

        let Some(session) = tables.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        session.status = SessionStatus::Completed;
        session.finished_at = Some(finished_at);
        session.correct_count = Some(score.correct_count);
        session.final_score = Some(score.final_score);
        Ok(Some(session.clone()))
    }

    async fn delete_ongoing(&self, session_id: i64) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let ongoing = tables
            .sessions
            .get(&session_id)
            .map(|s| s.status == SessionStatus::Ongoing)
            .unwrap_or(false);
        if !ongoing {
            return Ok(false);
        }

        if let Some(session) = tables.sessions.remove(&session_id) {
            tables.tokens.remove(&session.token);
        }
        let slot_ids: Vec<i64> = tables.questions_of(session_id).map(|sq| sq.id).collect();
        for sq_id in slot_ids {
            tables.session_questions.remove(&sq_id);
            tables.answers.remove(&sq_id);
        }
        Ok(true)
    }

    async fn session_questions(&self, session_id: i64) -> Result<Vec<SessionQuestion>> {
        let tables = self.tables.read().await;
        let mut questions: Vec<SessionQuestion> =
            tables.questions_of(session_id).cloned().collect();
        questions.sort_by_key(|sq| sq.sequence);
        Ok(questions)
    }

    async fn session_question(
        &self,
        session_id: i64,
        sequence: i32,
    ) -> Result<Option<SessionQuestion>> {
        let tables = self.tables.read().await;
        let found = tables
            .questions_of(session_id)
            .find(|sq| sq.sequence == sequence)
            .cloned();
        Ok(found)
    }

    async fn answers(&self, session_id: i64) -> Result<Vec<Answer>> {
        let tables = self.tables.read().await;
        let mut slots: Vec<&SessionQuestion> = tables.questions_of(session_id).collect();
        slots.sort_by_key(|sq| sq.sequence);
        Ok(slots
            .into_iter()
            .filter_map(|sq| tables.answers.get(&sq.id).cloned())
            .collect())
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> Result<Option<Answer>> {
        let mut tables = self.tables.write().await;
        if !tables.accepts_answer_for(answer.session_question_id, answer.answered_at) {
            return Ok(None);
        }
        let stored = Answer {
            session_question_id: answer.session_question_id,
            value: answer.value,
            is_correct: answer.is_correct,
            answered_at: answer.answered_at,
        };
        tables
            .answers
            .insert(answer.session_question_id, stored.clone());
        Ok(Some(stored))
    }

    async fn delete_answer(
        &self,
        session_question_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AnswerRemoval> {
        let mut tables = self.tables.write().await;
        if !tables.accepts_answer_for(session_question_id, at) {
            return Ok(AnswerRemoval::SessionClosed);
        }
        Ok(match tables.answers.remove(&session_question_id) {
            Some(_) => AnswerRemoval::Removed,
            None => AnswerRemoval::Absent,
        })
    }
}

#[derive(Default)]
struct CatalogTables {
    levels: HashSet<(i64, i64)>,
    questions: BTreeMap<i64, Question>,
}

/// Question bank held in memory; questions are added through [`insert`].
///
/// [`insert`]: MemoryQuestionCatalog::insert
#[derive(Default)]
pub struct MemoryQuestionCatalog {
    tables: RwLock<CatalogTables>,
}

impl MemoryQuestionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the question and registers its subject/level scope.
    pub async fn insert(&self, question: Question) {
        let mut tables = self.tables.write().await;
        tables.levels.insert((question.subject_id, question.level_id));
        tables.questions.insert(question.id, question);
    }
}

#[async_trait]
impl QuestionCatalog for MemoryQuestionCatalog {
    async fn scope_exists(&self, subject_id: i64, level_id: i64) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .levels
            .contains(&(subject_id, level_id)))
    }

    async fn pool_for(
        &self,
        subject_id: i64,
        level_id: i64,
        topic_id: Option<i64>,
    ) -> Result<Vec<PoolEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .values()
            .filter(|q| q.subject_id == subject_id && q.level_id == level_id)
            .filter(|q| topic_id.is_none() || q.topic_id == topic_id)
            .map(|q| PoolEntry {
                question_id: q.id,
                kind: q.kind(),
            })
            .collect())
    }

    async fn get(&self, question_id: i64) -> Result<Question> {
        self.tables
            .read()
            .await
            .questions
            .get(&question_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", question_id)))
    }

    async fn get_many(&self, question_ids: &[i64]) -> Result<Vec<Question>> {
        let tables = self.tables.read().await;
        Ok(question_ids
            .iter()
            .filter_map(|id| tables.questions.get(id).cloned())
            .collect())
    }
}
