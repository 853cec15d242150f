use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;
use validator::Validate;

use crate::models::answer::AnswerValue;
use crate::models::question::{QuestionContent, QuestionKind};
use crate::models::session::{Session, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSessionRequest {
    pub subject_id: i64,
    pub level_id: i64,
    pub topic_id: Option<i64>,
    #[validate(range(min = 1, max = 480, message = "Duration must be between 1 and 480 minutes"))]
    pub duration_minutes: i32,
    #[validate(range(min = 1, message = "At least one question is required"))]
    pub question_count: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub status: SessionStatus,
    pub subject_id: i64,
    pub level_id: i64,
    pub topic_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub deadline: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_questions: i32,
    pub correct_count: Option<i32>,
    pub final_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answered_count: Option<usize>,
    pub time_remaining_seconds: i64,
}

impl SessionResponse {
    pub fn new(session: Session, time_remaining_seconds: i64) -> Self {
        Self {
            token: session.token,
            status: session.status,
            subject_id: session.subject_id,
            level_id: session.level_id,
            topic_id: session.topic_id,
            started_at: session.started_at,
            duration_minutes: session.duration_minutes,
            deadline: session.deadline,
            finished_at: session.finished_at,
            total_questions: session.total_questions,
            correct_count: session.correct_count,
            final_score: session.final_score,
            answered_count: None,
            time_remaining_seconds,
        }
    }

    pub fn with_answered_count(mut self, answered: usize) -> Self {
        self.answered_count = Some(answered);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerRequest {
    /// `"A".."D"` for single-choice, `{ "<item id>": <slot id> }` for drag-drop.
    pub answer: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAnswerResponse {
    pub sequence: i32,
    pub is_correct: bool,
    pub answered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
}

/// A question as the student sees it during the exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSheetItem {
    pub sequence: i32,
    pub kind: QuestionKind,
    pub content: QuestionContent,
    pub is_answered: bool,
    pub current_answer: Option<AnswerValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionSheetResponse {
    pub token: String,
    pub deadline: DateTime<Utc>,
    pub time_remaining_seconds: i64,
    pub questions: Vec<QuestionSheetItem>,
}

/// One row of the post-exam review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewItem {
    pub sequence: i32,
    pub kind: QuestionKind,
    pub question: QuestionContent,
    pub student_answer: Option<JsonValue>,
    pub correct_answer: JsonValue,
    pub is_correct: bool,
    pub is_answered: bool,
    pub answered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetailResponse {
    pub token: String,
    pub status: SessionStatus,
    pub total_questions: i32,
    pub correct_count: Option<i32>,
    pub final_score: Option<f64>,
    pub finished_at: Option<DateTime<Utc>>,
    pub items: Vec<ReviewItem>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ListSessionsQuery {
    pub user_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    #[validate(range(min = 1, max = 100000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListSessionsResponse {
    pub items: Vec<SessionResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}
