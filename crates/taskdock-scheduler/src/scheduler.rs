//! The scheduler facade: trigger administration, tick dispatch, and the
//! manual-run entry point.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use taskdock_bus::{EventBus, TickEvent};
use taskdock_core::{TickCallback, TriggerAction, TriggerEntry, TriggerId};
use taskdock_store::{BindGroup, JobStore, TriggerStore};

use crate::engine::{TickTask, TriggerEngine};
use crate::error::{Result, SchedulerError};
use crate::reconcile::RECONCILE_DELAY;
use crate::registry::RunRegistry;

pub struct Scheduler {
    jobs: Arc<JobStore>,
    triggers: Arc<TriggerStore>,
    engine: TriggerEngine,
    bus: Arc<EventBus>,
    registry: RunRegistry,
    app_root: String,
}

impl Scheduler {
    pub async fn new(
        jobs: Arc<JobStore>,
        triggers: Arc<TriggerStore>,
        bus: Arc<EventBus>,
        app_root: impl Into<String>,
    ) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            jobs,
            triggers,
            engine: TriggerEngine::new().await?,
            bus,
            registry: RunRegistry::new(),
            app_root: app_root.into(),
        }))
    }

    /// Start firing triggers and schedule the deferred reconciliation pass.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.engine.start().await?;
        let sched = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(RECONCILE_DELAY).await;
            sched.reconcile().await;
        });
        info!("scheduler started");
        Ok(())
    }

    // --- trigger administration -------------------------------------------

    /// Align each listed job's trigger with its current definition. Per-id
    /// failures are logged and do not stop the rest.
    pub async fn apply_many(self: &Arc<Self>, ids: &[i64]) {
        for &id in ids {
            if let Err(e) = self.apply(id).await {
                warn!(job_id = id, error = %e, "trigger apply failed");
            }
        }
    }

    /// Align job `id`'s trigger with its current definition: an existing job
    /// with a cron expression gets a validated registration (persisted and
    /// live); a missing or cronless job loses its trigger.
    pub async fn apply(self: &Arc<Self>, id: i64) -> Result<()> {
        let job = match self.jobs.get(id)? {
            Some(job) => job,
            None => return self.remove_trigger(id).await,
        };
        if job.cron.trim().is_empty() {
            return self.remove_trigger(id).await;
        }
        self.set_trigger(TriggerEntry {
            id: TriggerId::Job(id),
            cron: job.cron.clone(),
            callback: String::new(),
        })
        .await
    }

    /// Persist `entry` and register it with the engine, replacing any
    /// previous registration under the same id.
    pub async fn set_trigger(self: &Arc<Self>, entry: TriggerEntry) -> Result<()> {
        TriggerEngine::validate(&entry.cron)?;
        self.triggers.upsert(&entry)?;
        self.register_entry(&entry).await
    }

    /// Validate `entry` and register it with the engine exactly as given,
    /// without touching the store.
    pub(crate) async fn register_entry(self: &Arc<Self>, entry: &TriggerEntry) -> Result<()> {
        TriggerEngine::validate(&entry.cron)?;
        self.engine
            .register(&entry.id.to_string(), &entry.cron, self.tick_task(entry.clone()))
            .await
    }

    /// Drop job `id`'s trigger from the store and the engine. Idempotent.
    pub async fn remove_trigger(&self, id: i64) -> Result<()> {
        let trigger_id = TriggerId::Job(id);
        self.triggers.delete(&trigger_id)?;
        self.engine.remove(&trigger_id.to_string()).await
    }

    /// Register an in-process executable unit under an opaque trigger id.
    /// Never persisted; the registration is gone after a restart until the
    /// embedding code re-registers it.
    pub async fn register_callback(
        self: &Arc<Self>,
        name: &str,
        cron: &str,
        callback: TickCallback,
    ) -> Result<()> {
        TriggerEngine::validate(cron)?;
        let entry = TriggerEntry {
            id: TriggerId::Named(name.to_string()),
            cron: cron.to_string(),
            callback: String::new(),
        };
        let sched = Arc::clone(self);
        let task: TickTask = Arc::new(move || {
            let sched = Arc::clone(&sched);
            let entry = entry.clone();
            let callback = Arc::clone(&callback);
            Box::pin(async move {
                sched.dispatch(&entry, TriggerAction::Invoke(callback)).await;
            })
        });
        self.engine.register(name, cron, task).await
    }

    pub fn is_trigger_registered(&self, id: &TriggerId) -> bool {
        self.engine.is_registered(&id.to_string())
    }

    // --- tick dispatch ----------------------------------------------------

    pub(crate) fn tick_task(self: &Arc<Self>, entry: TriggerEntry) -> TickTask {
        let sched = Arc::clone(self);
        Arc::new(move || {
            let sched = Arc::clone(&sched);
            let entry = entry.clone();
            Box::pin(async move {
                let action = entry.action();
                sched.dispatch(&entry, action).await;
            })
        })
    }

    /// One trigger fire: the built-in job path runs first, then the tick
    /// notification on the trigger's own channel, then any extra callback
    /// channel or in-process unit.
    async fn dispatch(self: &Arc<Self>, entry: &TriggerEntry, action: TriggerAction) {
        let event = TickEvent {
            trigger: entry.id.to_string(),
            cron: entry.cron.clone(),
            callback: entry.callback.clone(),
            fired_at: Utc::now(),
        };
        if let TriggerAction::RunJob(job_id) = &action {
            self.tick_job(*job_id).await;
        }
        self.bus.publish(&event.trigger, &event);
        match action {
            TriggerAction::Publish(name) => {
                self.bus.publish(&format!("callback.{name}"), &event);
            }
            TriggerAction::Invoke(callback) => callback(),
            TriggerAction::RunJob(_) | TriggerAction::NotifyOnly => {}
        }
    }

    /// Scheduled start of a managed job. Problems skip the tick and log;
    /// the next fire gets a fresh chance.
    async fn tick_job(self: &Arc<Self>, id: i64) {
        let job = match self.jobs.get(id) {
            Ok(Some(job)) => job,
            Ok(None) => {
                // the job was deleted behind the trigger; lazy cleanup
                warn!(job_id = id, "trigger fired for missing job, dropping trigger");
                if let Err(e) = self.remove_trigger(id).await {
                    warn!(job_id = id, error = %e, "stale trigger cleanup failed");
                }
                return;
            }
            Err(e) => {
                warn!(job_id = id, error = %e, "reading job for tick failed");
                return;
            }
        };
        if !job.is_active() {
            debug!(job_id = id, "skipping tick, job disabled");
            return;
        }
        let opts = job.options();
        let started_at = Utc::now();
        if !self.registry.try_start(&job, started_at, opts.allow_concurrency) {
            info!(job_id = id, "skipping tick, job still running");
            return;
        }
        self.launch(job, &opts, started_at);
    }

    // --- manual run -------------------------------------------------------

    /// Run job `id` immediately. Always rejects while an instance is alive,
    /// even for jobs that allow concurrent scheduled runs.
    pub fn run_job(self: &Arc<Self>, id: i64) -> Result<()> {
        let job = self
            .jobs
            .get(id)?
            .ok_or(SchedulerError::JobNotFound { id })?;
        let opts = job.options();
        let started_at = Utc::now();
        if !self.registry.try_start(&job, started_at, false) {
            return Err(SchedulerError::AlreadyRunning { id });
        }
        self.launch(job, &opts, started_at);
        Ok(())
    }

    // --- order and grouping passthroughs ----------------------------------

    pub fn fix_order(&self) -> Result<()> {
        Ok(self.jobs.fix_order()?)
    }

    pub fn update_sort(&self, id: i64, new_order: i64) -> Result<()> {
        Ok(self.jobs.update_sort(id, new_order)?)
    }

    pub fn bind_groups(&self) -> Result<Vec<BindGroup>> {
        Ok(self.jobs.bind_groups()?)
    }

    // --- crate-internal accessors -----------------------------------------

    pub(crate) fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    pub(crate) fn triggers(&self) -> &TriggerStore {
        &self.triggers
    }

    pub(crate) fn engine(&self) -> &TriggerEngine {
        &self.engine
    }

    pub(crate) fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub(crate) fn app_root(&self) -> &str {
        &self.app_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use taskdock_core::JobDefinition;
    use taskdock_store::init_db;

    fn job(id: i64, active: i64, shell: &str) -> JobDefinition {
        JobDefinition {
            id,
            name: format!("job-{id}"),
            shell: shell.into(),
            cron: "*/5 * * * *".into(),
            active,
            config: None,
            kind: 0,
            sort: id,
            bind: String::new(),
            last_runtime: None,
            last_run_use: None,
        }
    }

    async fn sched() -> (Arc<Scheduler>, Arc<JobStore>, Arc<TriggerStore>) {
        let jobs_conn = Connection::open_in_memory().unwrap();
        init_db(&jobs_conn).unwrap();
        let triggers_conn = Connection::open_in_memory().unwrap();
        init_db(&triggers_conn).unwrap();
        let jobs = Arc::new(JobStore::new(jobs_conn));
        let triggers = Arc::new(TriggerStore::new(triggers_conn));
        let sched = Scheduler::new(
            Arc::clone(&jobs),
            Arc::clone(&triggers),
            Arc::new(EventBus::new()),
            "/tmp",
        )
        .await
        .unwrap();
        (sched, jobs, triggers)
    }

    #[tokio::test]
    async fn tick_skips_disabled_job() {
        let (sched, jobs, _) = sched().await;
        jobs.insert(&job(1, 0, "echo hi")).unwrap();
        sched.tick_job(1).await;
        assert!(!sched.is_running(1));
    }

    #[tokio::test]
    async fn tick_on_missing_job_drops_trigger() {
        let (sched, _, triggers) = sched().await;
        sched
            .set_trigger(TriggerEntry {
                id: TriggerId::Job(9),
                cron: "*/5 * * * *".into(),
                callback: String::new(),
            })
            .await
            .unwrap();

        sched.tick_job(9).await;
        assert!(triggers.get(&TriggerId::Job(9)).unwrap().is_none());
        assert!(!sched.is_trigger_registered(&TriggerId::Job(9)));
    }

    #[tokio::test]
    async fn tick_guard_blocks_overlap_without_concurrency() {
        let (sched, jobs, _) = sched().await;
        jobs.insert(&job(1, 1, "sleep 2")).unwrap();

        sched.tick_job(1).await;
        assert!(sched.is_running(1));
        sched.tick_job(1).await;
        assert_eq!(sched.running_jobs(), vec![1]);
    }
}
