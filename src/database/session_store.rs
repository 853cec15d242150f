use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::answer::{Answer, AnswerRow, AnswerValue};
use crate::models::session::{NewSession, Score, Session, SessionFilter, SessionRow};
use crate::models::session_question::{SampledQuestion, SessionQuestion, SessionQuestionRow};

/// An answer about to be written for one session question.
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub session_question_id: i64,
    pub value: AnswerValue,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Outcome of clearing one slot's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerRemoval {
    Removed,
    /// The slot had no answer; nothing changed.
    Absent,
    /// The session is no longer ongoing or the deadline has passed.
    SessionClosed,
}

/// Persistence seam for sessions, their assigned questions and answers.
///
/// Every method is a single atomic unit of work. Conditional writes return
/// `None`/`false` instead of erroring when the session has left the state the
/// write requires, so callers can re-read and report the real outcome.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session and all of its questions, or nothing.
    async fn create_session(
        &self,
        session: NewSession,
        questions: &[SampledQuestion],
    ) -> Result<Session>;

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>>;

    async fn find_by_id(&self, session_id: i64) -> Result<Option<Session>>;

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<(Vec<Session>, i64)>;

    /// Flips an ongoing session to timeout and returns the current row.
    async fn mark_timed_out(&self, session_id: i64, finished_at: DateTime<Utc>)
        -> Result<Session>;

    /// Tallies the recorded answers and writes `Completed` with the score in
    /// one unit of work, if the session is still ongoing and `finished_at` is
    /// within its deadline. Answer writes cannot interleave with it.
    async fn complete_scored(
        &self,
        session_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<Option<Session>>;

    /// Deletes an ongoing session together with its questions and answers.
    async fn delete_ongoing(&self, session_id: i64) -> Result<bool>;

    async fn session_questions(&self, session_id: i64) -> Result<Vec<SessionQuestion>>;

    async fn session_question(
        &self,
        session_id: i64,
        sequence: i32,
    ) -> Result<Option<SessionQuestion>>;

    async fn answers(&self, session_id: i64) -> Result<Vec<Answer>>;

    /// Inserts or replaces the answer row, only while the owning session is
    /// ongoing and `answer.answered_at` is within its deadline.
    async fn upsert_answer(&self, answer: NewAnswer) -> Result<Option<Answer>>;

    /// Removes the answer row under the same guard as `upsert_answer`.
    async fn delete_answer(
        &self,
        session_question_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AnswerRemoval>;
}

const SESSION_COLUMNS: &str = "id, token, user_id, subject_id, level_id, topic_id, status, \
     started_at, duration_minutes, deadline, finished_at, total_questions, \
     correct_count, final_score";

#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Share-locks the session owning the slot if it still accepts answers
    /// at `at`. Completion takes the row `FOR UPDATE`, so it waits for
    /// in-flight answer writes and they in turn see its result.
    async fn lock_open_slot(
        tx: &mut Transaction<'_, Postgres>,
        session_question_id: i64,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let open: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT s.id
            FROM session_questions sq
            JOIN sessions s ON s.id = sq.session_id
            WHERE sq.id = $1 AND s.status = 'ongoing' AND s.deadline >= $2
            FOR SHARE OF s
            "#,
        )
        .bind(session_question_id)
        .bind(at)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(open.is_some())
    }
}

type SplitAnswer = (Option<String>, Option<Json<BTreeMap<i64, i64>>>);

fn split_answer_value(value: &AnswerValue) -> SplitAnswer {
    match value {
        AnswerValue::Option(option) => (Some(option.as_str().to_string()), None),
        AnswerValue::Mapping(mapping) => (None, Some(Json(mapping.clone()))),
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create_session(
        &self,
        session: NewSession,
        questions: &[SampledQuestion],
    ) -> Result<Session> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO sessions (
                token, user_id, subject_id, level_id, topic_id, status,
                started_at, duration_minutes, deadline, total_questions
            ) VALUES ($1, $2, $3, $4, $5, 'ongoing', $6, $7, $8, $9)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(&session.token)
        .bind(session.user_id)
        .bind(session.subject_id)
        .bind(session.level_id)
        .bind(session.topic_id)
        .bind(session.started_at)
        .bind(session.duration_minutes)
        .bind(session.deadline)
        .bind(questions.len() as i32)
        .fetch_one(&mut *tx)
        .await?;

        let question_ids: Vec<i64> = questions.iter().map(|q| q.question_id).collect();
        let sequences: Vec<i32> = questions.iter().map(|q| q.sequence).collect();
        let kinds: Vec<String> = questions.iter().map(|q| q.kind.as_str().to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO session_questions (session_id, question_id, sequence, kind)
            SELECT $1, q, s, k
            FROM UNNEST($2::bigint[], $3::integer[], $4::text[]) AS t(q, s, k)
            "#,
        )
        .bind(row.id)
        .bind(&question_ids)
        .bind(&sequences)
        .bind(&kinds)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Session::try_from(row)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Session::try_from).transpose()
    }

    async fn find_by_id(&self, session_id: i64) -> Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Session::try_from).transpose()
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<(Vec<Session>, i64)> {
        let status = filter.status.map(|s| s.as_str().to_string());

        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {SESSION_COLUMNS} FROM sessions
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            ORDER BY started_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(filter.user_id)
        .bind(status.clone())
        .bind(filter.per_page)
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sessions
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(filter.user_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sessions = rows
            .into_iter()
            .map(Session::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((sessions, total))
    }

    async fn mark_timed_out(
        &self,
        session_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<Session> {
        let updated = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE sessions
            SET status = 'timeout', finished_at = $2
            WHERE id = $1 AND status = 'ongoing'
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(finished_at)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Session::try_from(row),
            None => self
                .find_by_id(session_id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Session {} not found", session_id))),
        }
    }

    async fn complete_scored(
        &self,
        session_id: i64,
        finished_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT total_questions FROM sessions
            WHERE id = $1 AND status = 'ongoing' AND deadline >= $2
            FOR UPDATE
            "#,
        )
        .bind(session_id)
        .bind(finished_at)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(total_questions) = locked else {
            return Ok(None);
        };

        let flags: Vec<bool> = sqlx::query_scalar(
            r#"
            SELECT a.is_correct
            FROM answers a
            JOIN session_questions sq ON sq.id = a.session_question_id
            WHERE sq.session_id = $1
            "#,
        )
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;
        let score = Score::tally(flags, total_questions);

        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE sessions
            SET status = 'completed', finished_at = $2, correct_count = $3, final_score = $4
            WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(finished_at)
        .bind(score.correct_count)
        .bind(score.final_score)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Session::try_from(row).map(Some)
    }

    async fn delete_ongoing(&self, session_id: i64) -> Result<bool> {
        let result = sqlx::query(r#"DELETE FROM sessions WHERE id = $1 AND status = 'ongoing'"#)
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn session_questions(&self, session_id: i64) -> Result<Vec<SessionQuestion>> {
        let rows = sqlx::query_as::<_, SessionQuestionRow>(
            r#"
            SELECT id, session_id, question_id, sequence, kind
            FROM session_questions
            WHERE session_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SessionQuestion::try_from).collect()
    }

    async fn session_question(
        &self,
        session_id: i64,
        sequence: i32,
    ) -> Result<Option<SessionQuestion>> {
        let row = sqlx::query_as::<_, SessionQuestionRow>(
            r#"
            SELECT id, session_id, question_id, sequence, kind
            FROM session_questions
            WHERE session_id = $1 AND sequence = $2
            "#,
        )
        .bind(session_id)
        .bind(sequence)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SessionQuestion::try_from).transpose()
    }

    async fn answers(&self, session_id: i64) -> Result<Vec<Answer>> {
        let rows = sqlx::query_as::<_, AnswerRow>(
            r#"
            SELECT a.session_question_id, a.selected_option, a.selected_mapping,
                   a.is_correct, a.answered_at
            FROM answers a
            JOIN session_questions sq ON sq.id = a.session_question_id
            WHERE sq.session_id = $1
            ORDER BY sq.sequence ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Answer::try_from).collect()
    }

    async fn upsert_answer(&self, answer: NewAnswer) -> Result<Option<Answer>> {
        let (selected_option, selected_mapping) = split_answer_value(&answer.value);

        let mut tx = self.pool.begin().await?;
        let open =
            Self::lock_open_slot(&mut tx, answer.session_question_id, answer.answered_at).await?;
        if !open {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, AnswerRow>(
            r#"
            INSERT INTO answers (
                session_question_id, selected_option, selected_mapping, is_correct, answered_at
            ) VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (session_question_id) DO UPDATE
            SET selected_option = EXCLUDED.selected_option,
                selected_mapping = EXCLUDED.selected_mapping,
                is_correct = EXCLUDED.is_correct,
                answered_at = EXCLUDED.answered_at
            RETURNING session_question_id, selected_option, selected_mapping,
                      is_correct, answered_at
            "#,
        )
        .bind(answer.session_question_id)
        .bind(selected_option)
        .bind(selected_mapping)
        .bind(answer.is_correct)
        .bind(answer.answered_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Answer::try_from(row).map(Some)
    }

    async fn delete_answer(
        &self,
        session_question_id: i64,
        at: DateTime<Utc>,
    ) -> Result<AnswerRemoval> {
        let mut tx = self.pool.begin().await?;
        if !Self::lock_open_slot(&mut tx, session_question_id, at).await? {
            return Ok(AnswerRemoval::SessionClosed);
        }

        let result = sqlx::query(r#"DELETE FROM answers WHERE session_question_id = $1"#)
            .bind(session_question_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(if result.rows_affected() > 0 {
            AnswerRemoval::Removed
        } else {
            AnswerRemoval::Absent
        })
    }
}
