use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::database::SessionStore;
use crate::error::{Error, Result};
use crate::models::session::{Session, SessionStatus};
use crate::utils::time::Clock;

/// Deadline arithmetic and the lazy Ongoing -> Timeout transition.
///
/// There is no background sweeper: every operation that touches a session
/// passes it through [`TimeGuard::observe`] first.
#[derive(Clone)]
pub struct TimeGuard {
    clock: Arc<dyn Clock>,
    store: Arc<dyn SessionStore>,
}

impl TimeGuard {
    pub fn new(clock: Arc<dyn Clock>, store: Arc<dyn SessionStore>) -> Self {
        Self { clock, store }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn deadline_for(started_at: DateTime<Utc>, duration_minutes: i32) -> DateTime<Utc> {
        started_at + Duration::minutes(duration_minutes as i64)
    }

    /// True only for an ongoing session strictly past its deadline.
    pub fn is_expired(session: &Session, now: DateTime<Utc>) -> bool {
        session.status == SessionStatus::Ongoing && now > session.deadline
    }

    /// Returns the session as it stands now, flipping it to `Timeout` first if
    /// its deadline has passed. The flip commits even if the caller goes on to
    /// fail the request.
    pub async fn observe(&self, session: Session) -> Result<Session> {
        let now = self.now();
        if !Self::is_expired(&session, now) {
            return Ok(session);
        }
        let expired = self.store.mark_timed_out(session.id, now).await?;
        tracing::info!(
            session_id = expired.id,
            deadline = %expired.deadline,
            "session timed out"
        );
        Ok(expired)
    }

    /// Rejects anything but an ongoing session.
    pub fn ensure_ongoing(session: &Session) -> Result<()> {
        match session.status {
            SessionStatus::Ongoing => Ok(()),
            SessionStatus::Timeout => Err(Error::Timeout(format!(
                "Session deadline passed at {}",
                session.deadline.to_rfc3339()
            ))),
            other => Err(Error::InvalidState(format!(
                "Session is {} and no longer accepts changes",
                other
            ))),
        }
    }

    pub fn seconds_remaining(&self, session: &Session) -> i64 {
        if session.status.is_terminal() {
            return 0;
        }
        crate::utils::time::seconds_until(session.deadline, self.now())
    }
}
