use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::error::{Error, Result};
use crate::models::question::{PoolEntry, Question, QuestionDetails};

/// Read-only view onto the question bank, owned by the catalog service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionCatalog: Send + Sync {
    /// Whether `level_id` is a level of `subject_id`.
    async fn scope_exists(&self, subject_id: i64, level_id: i64) -> Result<bool>;

    /// Every eligible question for the scope, both kinds.
    async fn pool_for(
        &self,
        subject_id: i64,
        level_id: i64,
        topic_id: Option<i64>,
    ) -> Result<Vec<PoolEntry>>;

    /// Full question including its answer key.
    async fn get(&self, question_id: i64) -> Result<Question>;

    async fn get_many(&self, question_ids: &[i64]) -> Result<Vec<Question>>;
}

#[derive(Debug, FromRow)]
struct QuestionRow {
    id: i64,
    subject_id: i64,
    level_id: i64,
    topic_id: Option<i64>,
    prompt: String,
    details: Json<QuestionDetails>,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Question {
            id: row.id,
            subject_id: row.subject_id,
            level_id: row.level_id,
            topic_id: row.topic_id,
            prompt: row.prompt,
            details: row.details.0,
        }
    }
}

#[derive(Debug, FromRow)]
struct PoolRow {
    id: i64,
    kind: String,
}

#[derive(Clone)]
pub struct PgQuestionCatalog {
    pool: PgPool,
}

impl PgQuestionCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionCatalog for PgQuestionCatalog {
    async fn scope_exists(&self, subject_id: i64, level_id: i64) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (SELECT 1 FROM levels WHERE id = $1 AND subject_id = $2)"#,
        )
        .bind(level_id)
        .bind(subject_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn pool_for(
        &self,
        subject_id: i64,
        level_id: i64,
        topic_id: Option<i64>,
    ) -> Result<Vec<PoolEntry>> {
        let rows = sqlx::query_as::<_, PoolRow>(
            r#"
            SELECT id, kind FROM questions
            WHERE subject_id = $1
              AND level_id = $2
              AND ($3::bigint IS NULL OR topic_id = $3)
              AND is_active = TRUE
            ORDER BY id
            "#,
        )
        .bind(subject_id)
        .bind(level_id)
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PoolEntry {
                    question_id: row.id,
                    kind: row.kind.parse().map_err(Error::Internal)?,
                })
            })
            .collect()
    }

    async fn get(&self, question_id: i64) -> Result<Question> {
        let row = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, subject_id, level_id, topic_id, prompt, details
            FROM questions WHERE id = $1
            "#,
        )
        .bind(question_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Question {} not found", question_id)))?;
        Ok(row.into())
    }

    async fn get_many(&self, question_ids: &[i64]) -> Result<Vec<Question>> {
        let rows = sqlx::query_as::<_, QuestionRow>(
            r#"
            SELECT id, subject_id, level_id, topic_id, prompt, details
            FROM questions WHERE id = ANY($1)
            "#,
        )
        .bind(question_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Question::from).collect())
    }
}
