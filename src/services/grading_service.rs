use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::database::SessionStore;
use crate::error::Result;
use crate::models::session::Session;

/// Runs the Ongoing -> Completed transition. Scoring happens once, inside the
/// store's completion unit of work, so no answer can land between the tally
/// and the status write.
#[derive(Clone)]
pub struct GradingService {
    store: Arc<dyn SessionStore>,
}

impl GradingService {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// `None` means the session was no longer ongoing, or `finished_at` fell
    /// past its deadline.
    pub async fn complete(
        &self,
        session: &Session,
        finished_at: DateTime<Utc>,
    ) -> Result<Option<Session>> {
        let completed = self.store.complete_scored(session.id, finished_at).await?;
        if let Some(done) = &completed {
            tracing::info!(
                session_id = done.id,
                correct_count = done.correct_count,
                final_score = done.final_score,
                total_questions = done.total_questions,
                "session completed"
            );
        }
        Ok(completed)
    }
}
