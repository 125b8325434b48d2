//! Thin wrapper over the external cron engine.
//!
//! The engine only knows uuids; this wrapper keeps the trigger-id → uuid map
//! so registrations can be replaced and removed by our own ids.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

/// Work performed on each tick of a registered trigger.
pub type TickTask = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct TriggerEngine {
    sched: JobScheduler,
    entries: Mutex<HashMap<String, Uuid>>,
}

impl TriggerEngine {
    pub async fn new() -> Result<Self> {
        let sched = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::Engine(e.to_string()))?;
        Ok(Self {
            sched,
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Begin firing registered triggers. Registration works before and after.
    pub async fn start(&self) -> Result<()> {
        self.sched
            .start()
            .await
            .map_err(|e| SchedulerError::Engine(e.to_string()))
    }

    /// Check an expression without registering anything: 5 or 6 whitespace
    /// fields, then the engine's own parser.
    pub fn validate(expr: &str) -> Result<()> {
        let fields = expr.split_whitespace().count();
        if !(5..=6).contains(&fields) {
            return Err(SchedulerError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("expected 5 or 6 fields, got {fields}"),
            });
        }
        Job::new(expr, |_uuid, _lock| {}).map_err(|e| SchedulerError::InvalidCron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    /// Register `task` under `id`, replacing any previous registration with
    /// the same id.
    pub async fn register(&self, id: &str, cron: &str, task: TickTask) -> Result<()> {
        let job = Job::new_async(cron, move |_uuid, _lock| task()).map_err(|e| {
            SchedulerError::InvalidCron {
                expr: cron.to_string(),
                reason: e.to_string(),
            }
        })?;
        let uuid = self
            .sched
            .add(job)
            .await
            .map_err(|e| SchedulerError::Engine(e.to_string()))?;

        let previous = self.entries.lock().unwrap().insert(id.to_string(), uuid);
        if let Some(old) = previous {
            if let Err(e) = self.sched.remove(&old).await {
                warn!(trigger = id, error = %e, "failed to drop replaced registration");
            }
        }
        debug!(trigger = id, %cron, "trigger registered");
        Ok(())
    }

    /// Unregister `id`. Unknown ids are a no-op.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let uuid = self.entries.lock().unwrap().remove(id);
        if let Some(uuid) = uuid {
            self.sched
                .remove(&uuid)
                .await
                .map_err(|e| SchedulerError::Engine(e.to_string()))?;
            debug!(trigger = id, "trigger unregistered");
        }
        Ok(())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.entries.lock().unwrap().contains_key(id)
    }

    pub fn registered_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}
