//! Escalating termination of a running job: SIGTERM first, then a 1-second
//! poll loop that sends SIGKILL on every tick the process survives, up to a
//! 30-second ceiling.

use std::time::Duration;

use tracing::{info, warn};

use crate::runner::{SIGKILL, SIGTERM};
use crate::scheduler::Scheduler;

/// Ceiling on the post-SIGTERM poll loop.
const TERMINATE_TIMEOUT_SECS: u64 = 30;

/// How a termination attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// No live process handle for the job; nothing was signalled.
    NotRunning,
    /// The process exited after SIGTERM alone.
    Terminated,
    /// The process survived the first tick and needed SIGKILL.
    Killed,
    /// Still alive when the ceiling elapsed. The registry entry stays; a
    /// later completion or restart cleans it up.
    TimedOut,
}

/// Phases of one termination attempt.
#[derive(Debug, Clone, Copy)]
enum State {
    Signaled,
    Escalated,
    Exited { escalated: bool },
    TimedOut,
}

impl Scheduler {
    /// Stop the running instance of job `id`.
    ///
    /// Returns [`TerminationOutcome::NotRunning`] when the job has no live
    /// process, including the brief window before a fresh run's handle is
    /// attached.
    pub async fn terminate_job(&self, id: i64) -> TerminationOutcome {
        let Some(handle) = self.registry().handle(id) else {
            return TerminationOutcome::NotRunning;
        };
        info!(job_id = id, pid = ?handle.pid(), "terminating job");
        handle.signal(SIGTERM);
        let mut state = State::Signaled;

        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.tick().await;
        for _ in 0..TERMINATE_TIMEOUT_SECS {
            interval.tick().await;
            if handle.is_finished() {
                state = State::Exited {
                    escalated: matches!(state, State::Escalated),
                };
                break;
            }
            handle.signal(SIGKILL);
            state = State::Escalated;
        }
        // a process that died on the final kill still counts as exited
        if matches!(state, State::Signaled | State::Escalated) {
            state = if handle.is_finished() {
                State::Exited {
                    escalated: matches!(state, State::Escalated),
                }
            } else {
                State::TimedOut
            };
        }

        match state {
            State::TimedOut => {
                warn!(job_id = id, "job survived termination window");
                TerminationOutcome::TimedOut
            }
            State::Exited { escalated } => {
                // Only a signal-killed process leaves the registry here. An
                // exit that raced the signals goes through normal completion
                // bookkeeping.
                if matches!(handle.exit_signal(), Some(sig) if sig == SIGTERM || sig == SIGKILL) {
                    self.registry().remove(id);
                }
                if escalated {
                    TerminationOutcome::Killed
                } else {
                    TerminationOutcome::Terminated
                }
            }
            State::Signaled | State::Escalated => unreachable!("loop resolves the state"),
        }
    }

    pub fn is_running(&self, id: i64) -> bool {
        self.registry().is_running(id)
    }

    pub fn running_jobs(&self) -> Vec<i64> {
        self.registry().running_ids()
    }
}
