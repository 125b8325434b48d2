//! Startup reconciliation between the trigger store and the job store.
//!
//! Engine registrations are process-local, so every boot replays the
//! persisted triggers. The pass also deletes triggers orphaned by jobs
//! removed out of band and back-fills a trigger for any job whose row went
//! missing. Orphan deletion and back-fill are the only store mutations;
//! surviving entries register exactly as persisted.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::scheduler::Scheduler;

/// Grace period before the startup pass; lets the embedding process finish
/// wiring subscribers before triggers replay.
pub(crate) const RECONCILE_DELAY: Duration = Duration::from_secs(1);

impl Scheduler {
    /// Run one reconciliation pass. Per-entry problems are logged and
    /// skipped so a single bad row never blocks the rest.
    ///
    /// Disabled jobs register like any other; the tick path is where the
    /// `active` flag is enforced, so re-enabling a job takes effect on its
    /// next fire without another pass.
    pub async fn reconcile(self: &Arc<Self>) {
        let entries = match self.triggers().list() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "listing triggers for reconciliation failed");
                return;
            }
        };

        let mut covered = HashSet::new();
        for entry in entries {
            if let Some(job_id) = entry.id.job_id() {
                let job = match self.jobs().get(job_id) {
                    Ok(job) => job,
                    Err(e) => {
                        warn!(trigger = %entry.id, error = %e, "reading job failed");
                        continue;
                    }
                };
                if job.is_none() {
                    info!(trigger = %entry.id, "dropping orphan trigger");
                    if let Err(e) = self.triggers().delete(&entry.id) {
                        warn!(trigger = %entry.id, error = %e, "orphan delete failed");
                    }
                    continue;
                }
                covered.insert(job_id);
            }
            if let Err(e) = self.register_entry(&entry).await {
                warn!(trigger = %entry.id, error = %e, "trigger registration failed");
            }
        }

        // Back-fill: cron-bearing jobs whose trigger row disappeared.
        match self.jobs().list() {
            Ok(jobs) => {
                for job in jobs {
                    if !job.cron.trim().is_empty() && !covered.contains(&job.id) {
                        info!(job_id = job.id, "back-filling missing trigger");
                        if let Err(e) = self.apply(job.id).await {
                            warn!(job_id = job.id, error = %e, "back-fill failed");
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "listing jobs for back-fill failed"),
        }

        info!(registered = self.engine().registered_count(), "reconciliation complete");
    }
}
