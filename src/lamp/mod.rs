use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// LampEntity is the domain record every repository stores
///
/// Repositories hand out owned copies, never references into their own state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LampEntity {
    /// Unique lamp identifier, assigned by the caller at creation
    pub id: Uuid,

    /// On/off state
    pub status: bool,

    /// Creation timestamp (immutable)
    pub created_at: DateTime<Utc>,

    /// Last successful mutation
    pub updated_at: DateTime<Utc>,
}

impl LampEntity {
    /// Create a lamp with a fresh v4 id and both timestamps set to now
    pub fn new(status: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status change and stamp `updated_at`.
    ///
    /// `updated_at` never moves backwards, even if the wall clock does.
    pub fn update_status(&mut self, status: bool) {
        self.status = status;
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
