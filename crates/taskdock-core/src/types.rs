use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::options::JobOptions;

/// Prefix of the persisted id for scheduler-managed triggers.
const MANAGED_PREFIX: &str = "T_";

/// A persisted job record.
///
/// Created and edited by the administrative surface; the scheduler only reads
/// it and writes back `last_runtime` / `last_run_use` through the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Primary key.
    pub id: i64,
    /// Human-readable label.
    pub name: String,
    /// Shell command text. Hook composition works on a per-invocation copy;
    /// the persisted value is never rewritten.
    pub shell: String,
    /// Cron expression (5 or 6 whitespace-separated fields).
    pub cron: String,
    /// Enable flag — anything <= 0 means disabled.
    pub active: i64,
    /// Optional JSON-encoded advanced options, see [`JobOptions`].
    pub config: Option<String>,
    /// Partition key for the dense `sort` ordering.
    pub kind: i64,
    /// Rank within the `kind` partition (dense, 1..N).
    pub sort: i64,
    /// Tag field — the bind group lives between the first and second `#`.
    pub bind: String,
    /// Start time of the most recent completed run.
    pub last_runtime: Option<DateTime<Utc>>,
    /// Duration of the most recent completed run, in seconds.
    pub last_run_use: Option<f64>,
}

impl JobDefinition {
    pub fn is_active(&self) -> bool {
        self.active > 0
    }

    /// Parse the advanced options once. Malformed JSON falls back to defaults.
    pub fn options(&self) -> JobOptions {
        JobOptions::parse(self.config.as_deref())
    }
}

/// Identifier of a trigger registration.
///
/// Scheduler-managed triggers carry the id of the job they fire; anything
/// else keeps its opaque string id. The persisted form stays `T_<job id>`
/// for managed triggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TriggerId {
    /// Trigger owned by the scheduler, bound to a job definition.
    Job(i64),
    /// Independently registered trigger with an opaque id.
    Named(String),
}

impl TriggerId {
    /// Interpret a persisted id string.
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix(MANAGED_PREFIX).and_then(|n| n.parse().ok()) {
            Some(job_id) => TriggerId::Job(job_id),
            None => TriggerId::Named(raw.to_string()),
        }
    }

    pub fn job_id(&self) -> Option<i64> {
        match self {
            TriggerId::Job(id) => Some(*id),
            TriggerId::Named(_) => None,
        }
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerId::Job(id) => write!(f, "{MANAGED_PREFIX}{id}"),
            TriggerId::Named(name) => f.write_str(name),
        }
    }
}

/// A persisted trigger registration.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEntry {
    pub id: TriggerId,
    pub cron: String,
    /// Empty string selects the built-in job-execution path for managed
    /// triggers; a non-empty string names an extra event-bus channel.
    pub callback: String,
}

impl TriggerEntry {
    /// Resolve the runtime action this entry selects when it fires.
    ///
    /// Never returns [`TriggerAction::Invoke`] — executable units only exist
    /// for in-process registrations and are never persisted.
    pub fn action(&self) -> TriggerAction {
        if !self.callback.is_empty() {
            return TriggerAction::Publish(self.callback.clone());
        }
        match self.id.job_id() {
            Some(job_id) => TriggerAction::RunJob(job_id),
            None => TriggerAction::NotifyOnly,
        }
    }
}

/// An in-process executable unit bound to a trigger.
pub type TickCallback = Arc<dyn Fn() + Send + Sync>;

/// What a trigger does when it fires, beyond the tick notification that is
/// always published under the trigger's own channel.
#[derive(Clone)]
pub enum TriggerAction {
    /// Built-in path: execute the managed job with this id.
    RunJob(i64),
    /// Additionally publish under `callback.<name>`.
    Publish(String),
    /// Tick notification only.
    NotifyOnly,
    /// Call an in-process executable unit. Never persisted.
    Invoke(TickCallback),
}

impl fmt::Debug for TriggerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerAction::RunJob(id) => write!(f, "RunJob({id})"),
            TriggerAction::Publish(name) => write!(f, "Publish({name:?})"),
            TriggerAction::NotifyOnly => f.write_str("NotifyOnly"),
            TriggerAction::Invoke(_) => f.write_str("Invoke(..)"),
        }
    }
}
