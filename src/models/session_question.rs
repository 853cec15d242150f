use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::question::QuestionKind;

/// One assigned slot of a session. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionQuestion {
    pub id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    pub kind: QuestionKind,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionQuestionRow {
    pub id: i64,
    pub session_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    pub kind: String,
}

impl TryFrom<SessionQuestionRow> for SessionQuestion {
    type Error = crate::error::Error;

    fn try_from(row: SessionQuestionRow) -> Result<Self, Self::Error> {
        Ok(SessionQuestion {
            id: row.id,
            session_id: row.session_id,
            question_id: row.question_id,
            sequence: row.sequence,
            kind: row.kind.parse().map_err(crate::error::Error::Internal)?,
        })
    }
}

/// Output of the sampler: a question pinned to its 1-based sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampledQuestion {
    pub sequence: i32,
    pub question_id: i64,
    pub kind: QuestionKind,
}
