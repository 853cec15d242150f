use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::models::question::ChoiceOption;

/// The value a student recorded for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Option(ChoiceOption),
    /// item id -> slot id
    Mapping(BTreeMap<i64, i64>),
}

/// The current answer for a session question. No row means unanswered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub session_question_id: i64,
    pub value: AnswerValue,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AnswerRow {
    pub session_question_id: i64,
    pub selected_option: Option<String>,
    pub selected_mapping: Option<Json<BTreeMap<i64, i64>>>,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

impl TryFrom<AnswerRow> for Answer {
    type Error = crate::error::Error;

    fn try_from(row: AnswerRow) -> Result<Self, Self::Error> {
        let value = match (row.selected_option, row.selected_mapping) {
            (Some(option), None) => AnswerValue::Option(
                option.parse().map_err(crate::error::Error::Internal)?,
            ),
            (None, Some(Json(mapping))) => AnswerValue::Mapping(mapping),
            _ => {
                return Err(crate::error::Error::Internal(format!(
                    "answer row for session question {} must hold exactly one selection",
                    row.session_question_id
                )))
            }
        };
        Ok(Answer {
            session_question_id: row.session_question_id,
            value,
            is_correct: row.is_correct,
            answered_at: row.answered_at,
        })
    }
}
