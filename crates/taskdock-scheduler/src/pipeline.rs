//! The invocation pipeline: hook composition, spawn, and completion
//! bookkeeping for one run of a managed job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use taskdock_core::{JobDefinition, JobOptions};

use crate::runner::{self, ExitReport};
use crate::scheduler::Scheduler;

/// Build the final shell text for one invocation.
///
/// Hooks wrap the job's own command: the before hook runs first from the app
/// root, the after hook last, joined with `;` so a failing stage never stops
/// the rest. The persisted `shell` column is untouched.
pub(crate) fn compose_command(shell: &str, opts: &JobOptions, app_root: &str) -> String {
    let mut command = shell.to_string();
    if let Some(before) = &opts.before_shell {
        command = format!("bash -c \"cd {app_root} ; {before}\" ; {command}");
    }
    if let Some(after) = &opts.after_shell {
        command = format!("{command} ; bash -c \"cd {app_root} ; {after}\"");
    }
    command
}

impl Scheduler {
    /// Spawn the composed command for a run already admitted into the
    /// registry, wiring completion bookkeeping to the process exit.
    pub(crate) fn launch(
        self: &Arc<Self>,
        job: JobDefinition,
        opts: &JobOptions,
        started_at: DateTime<Utc>,
    ) {
        let command = compose_command(&job.shell, opts, self.app_root());
        info!(job_id = job.id, name = %job.name, "starting job");

        let sched = Arc::clone(self);
        let job_id = job.id;
        let allow_concurrency = opts.allow_concurrency;
        let handle = runner::spawn_shell(&command, move |report| {
            sched.finish_run(job_id, started_at, allow_concurrency, report);
        });
        // A fast exit may have finished (and removed the entry) already; the
        // attach is then a no-op.
        self.registry().attach_handle(job_id, handle);
    }

    /// Completion bookkeeping, called exactly once per spawned run.
    ///
    /// Without concurrency the registry entry is cleared and the timings
    /// persisted unconditionally. With concurrency allowed the completion
    /// first has to win the overlap race: only while the persisted
    /// `last_runtime` does not postdate this run's start does it clear the
    /// entry — even one recorded by a newer run — and persist. A stale
    /// completion changes nothing; the newer run's own completion owns the
    /// removal.
    pub(crate) fn finish_run(
        &self,
        job_id: i64,
        started_at: DateTime<Utc>,
        allow_concurrency: bool,
        report: &ExitReport,
    ) {
        let elapsed_secs = (Utc::now() - started_at).num_milliseconds() as f64 / 1000.0;

        let won = if allow_concurrency {
            match self.jobs().get(job_id) {
                Ok(Some(job)) => job.last_runtime.map_or(true, |t| t <= started_at),
                Ok(None) => false,
                Err(e) => {
                    warn!(job_id, error = %e, "reading job for completion check failed");
                    false
                }
            }
        } else {
            true
        };
        if won {
            self.registry().remove(job_id);
            if let Err(e) = self.jobs().update_last_run(job_id, started_at, elapsed_secs) {
                warn!(job_id, error = %e, "persisting run timings failed");
            }
        } else {
            debug!(job_id, "stale overlapping completion discarded");
        }
        info!(
            job_id,
            code = ?report.code,
            signal = ?report.signal,
            elapsed_secs,
            "job finished"
        );
    }
}
