use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification published for every trigger fire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickEvent {
    /// Persisted trigger id (`T_<job id>` for managed triggers).
    pub trigger: String,
    /// The expression that fired.
    pub cron: String,
    /// Callback channel name, empty for the built-in path.
    pub callback: String,
    /// Fire instant.
    pub fired_at: DateTime<Utc>,
}
