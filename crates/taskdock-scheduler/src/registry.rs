//! In-memory authority on which jobs are currently executing.
//!
//! Process-local and rebuilt empty on every restart: a restart means all
//! previously running shells are gone or orphaned, and the live process
//! handle is the only trustworthy signal.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use taskdock_core::JobDefinition;

use crate::runner::ProcessHandle;

/// One live run: the job snapshot active for it plus the process handle.
#[derive(Debug, Clone)]
pub struct RunningEntry {
    pub job: JobDefinition,
    pub started_at: DateTime<Utc>,
    pub handle: Option<ProcessHandle>,
}

/// Registry of running jobs, keyed by job id.
///
/// All mutation goes through the atomic operations below; the invocation
/// pipeline and the terminator are the only writers.
#[derive(Default)]
pub struct RunRegistry {
    running: Mutex<HashMap<i64, RunningEntry>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self, job_id: i64) -> bool {
        self.running.lock().unwrap().contains_key(&job_id)
    }

    /// Record a run unless the job is already running and concurrency is not
    /// allowed. With concurrency allowed the entry is replaced — the registry
    /// tracks only the newest run of a job.
    pub fn try_start(
        &self,
        job: &JobDefinition,
        started_at: DateTime<Utc>,
        allow_concurrency: bool,
    ) -> bool {
        let mut running = self.running.lock().unwrap();
        if running.contains_key(&job.id) && !allow_concurrency {
            return false;
        }
        running.insert(
            job.id,
            RunningEntry {
                job: job.clone(),
                started_at,
                handle: None,
            },
        );
        true
    }

    /// Attach the spawned process handle. No-op if the run already finished
    /// (fast exits can complete before the handle is recorded).
    pub fn attach_handle(&self, job_id: i64, handle: ProcessHandle) {
        if let Some(entry) = self.running.lock().unwrap().get_mut(&job_id) {
            entry.handle = Some(handle);
        }
    }

    pub fn handle(&self, job_id: i64) -> Option<ProcessHandle> {
        self.running
            .lock()
            .unwrap()
            .get(&job_id)
            .and_then(|entry| entry.handle.clone())
    }

    pub fn remove(&self, job_id: i64) -> Option<RunningEntry> {
        self.running.lock().unwrap().remove(&job_id)
    }

    pub fn running_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.running.lock().unwrap().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.running.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.running.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: i64) -> JobDefinition {
        JobDefinition {
            id,
            name: String::new(),
            shell: "echo hi".into(),
            cron: "* * * * *".into(),
            active: 1,
            config: None,
            kind: 0,
            sort: 1,
            bind: String::new(),
            last_runtime: None,
            last_run_use: None,
        }
    }

    #[test]
    fn second_start_blocked_without_concurrency() {
        let reg = RunRegistry::new();
        assert!(reg.try_start(&job(7), Utc::now(), false));
        assert!(!reg.try_start(&job(7), Utc::now(), false));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn concurrent_start_replaces_entry() {
        let reg = RunRegistry::new();
        let first = Utc::now();
        assert!(reg.try_start(&job(7), first, true));
        let second = Utc::now();
        assert!(reg.try_start(&job(7), second, true));
        assert_eq!(reg.len(), 1);
        let entry = reg.remove(7).unwrap();
        assert_eq!(entry.started_at, second);
    }

    #[test]
    fn remove_clears_running_state() {
        let reg = RunRegistry::new();
        reg.try_start(&job(3), Utc::now(), false);
        assert!(reg.is_running(3));
        assert!(reg.remove(3).is_some());
        assert!(!reg.is_running(3));
        assert!(reg.remove(3).is_none());
    }

    #[test]
    fn attach_handle_after_removal_is_noop() {
        let reg = RunRegistry::new();
        reg.attach_handle(9, ProcessHandle::already_finished());
        assert!(reg.handle(9).is_none());
    }

    #[test]
    fn running_ids_sorted() {
        let reg = RunRegistry::new();
        reg.try_start(&job(5), Utc::now(), false);
        reg.try_start(&job(2), Utc::now(), false);
        assert_eq!(reg.running_ids(), vec![2, 5]);
    }
}
