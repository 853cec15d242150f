use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::utils::time::Clock;

/// Gate consulted before a session may be created.
pub trait QuotaGuard: Send + Sync {
    fn allow_create(&self, user_id: Uuid) -> bool;
}

#[derive(Debug)]
struct WindowState {
    start: DateTime<Utc>,
    count: u32,
}

/// Fixed-window counter per user.
pub struct WindowQuota {
    limit: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    windows: Mutex<HashMap<Uuid, WindowState>>,
}

impl WindowQuota {
    pub fn new(limit: u32, window_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            limit: limit.max(1),
            window: Duration::seconds(window_secs.max(1) as i64),
            clock,
            windows: Mutex::new(HashMap::new()),
        }
    }
}

impl QuotaGuard for WindowQuota {
    fn allow_create(&self, user_id: Uuid) -> bool {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        windows.retain(|_, w| now - w.start < self.window);

        let state = windows.entry(user_id).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if state.count < self.limit {
            state.count += 1;
            true
        } else {
            tracing::warn!(%user_id, limit = self.limit, "session creation quota exhausted");
            false
        }
    }
}

/// Lets every request through.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl QuotaGuard for Unlimited {
    fn allow_create(&self, _user_id: Uuid) -> bool {
        true
    }
}
