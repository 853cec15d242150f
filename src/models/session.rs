use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Ongoing,
    Completed,
    Timeout,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Ongoing => "ongoing",
            SessionStatus::Completed => "completed",
            SessionStatus::Timeout => "timeout",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Ongoing)
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ongoing" => Ok(SessionStatus::Ongoing),
            "completed" => Ok(SessionStatus::Completed),
            "timeout" => Ok(SessionStatus::Timeout),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One exam attempt.
///
/// `deadline` and `total_questions` are fixed at creation. `final_score` and
/// `correct_count` are only ever written together with `status = Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(skip_serializing)]
    pub id: i64,
    pub token: String,
    pub user_id: Uuid,
    pub subject_id: i64,
    pub level_id: i64,
    pub topic_id: Option<i64>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub deadline: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_questions: i32,
    pub correct_count: Option<i32>,
    pub final_score: Option<f64>,
}

/// Raw `sessions` row; status is stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub token: String,
    pub user_id: Uuid,
    pub subject_id: i64,
    pub level_id: i64,
    pub topic_id: Option<i64>,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub deadline: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_questions: i32,
    pub correct_count: Option<i32>,
    pub final_score: Option<f64>,
}

impl TryFrom<SessionRow> for Session {
    type Error = crate::error::Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<SessionStatus>()
            .map_err(crate::error::Error::Internal)?;
        Ok(Session {
            id: row.id,
            token: row.token,
            user_id: row.user_id,
            subject_id: row.subject_id,
            level_id: row.level_id,
            topic_id: row.topic_id,
            status,
            started_at: row.started_at,
            duration_minutes: row.duration_minutes,
            deadline: row.deadline,
            finished_at: row.finished_at,
            total_questions: row.total_questions,
            correct_count: row.correct_count,
            final_score: row.final_score,
        })
    }
}

/// Everything needed to insert a session; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub token: String,
    pub user_id: Uuid,
    pub subject_id: i64,
    pub level_id: i64,
    pub topic_id: Option<i64>,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub user_id: Option<Uuid>,
    pub status: Option<SessionStatus>,
    pub page: i64,
    pub per_page: i64,
}

impl SessionFilter {
    /// Row offset of the requested page; saturates instead of overflowing.
    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0).saturating_mul(self.per_page.max(0))
    }
}

/// Completion result derived from the recorded answers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub correct_count: i32,
    pub final_score: f64,
}

impl Score {
    /// Unanswered slots have no row and so contribute nothing. The divisor is
    /// the session's `total_questions`, never a recount of slot rows.
    pub fn tally<I>(correct_flags: I, total_questions: i32) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let correct_count = correct_flags.into_iter().filter(|c| *c).count() as i32;
        let final_score = if total_questions > 0 {
            100.0 * correct_count as f64 / total_questions as f64
        } else {
            0.0
        };
        Self {
            correct_count,
            final_score,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_counts_only_correct_rows() {
        let score = Score::tally([true, false], 2);
        assert_eq!(score.correct_count, 1);
        assert_eq!(score.final_score, 50.0);
    }

    #[test]
    fn missing_rows_count_as_wrong() {
        let score = Score::tally([true], 3);
        assert_eq!(score.correct_count, 1);
        assert!((score.final_score - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn no_answers_scores_zero() {
        let score = Score::tally(std::iter::empty(), 4);
        assert_eq!(score, Score { correct_count: 0, final_score: 0.0 });
    }

    #[test]
    fn offset_saturates_on_huge_pages() {
        let filter = SessionFilter {
            page: i64::MAX,
            per_page: 100,
            ..SessionFilter::default()
        };
        assert_eq!(filter.offset(), i64::MAX);
        let first = SessionFilter {
            page: 1,
            per_page: 20,
            ..SessionFilter::default()
        };
        assert_eq!(first.offset(), 0);
    }
}
