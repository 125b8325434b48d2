//! `taskdock-scheduler` — the scheduling core.
//!
//! # Overview
//!
//! A [`Scheduler`] owns the trigger-engine wrapper, the run-state registry,
//! and handles on the persisted job and trigger stores. Startup runs a single
//! reconciliation pass that aligns the trigger store with the job store
//! (orphan cleanup, validation, registration, and back-filling triggers for
//! jobs that lost theirs). Each engine tick flows through the invocation
//! pipeline: concurrency guard, hook composition, `sh -c` spawn, and
//! completion bookkeeping.
//!
//! # Administrative surface
//!
//! | Operation        | Behaviour                                              |
//! |------------------|--------------------------------------------------------|
//! | `run_job`        | Manual run; errors on missing or already-running jobs  |
//! | `terminate_job`  | SIGTERM, then escalating SIGKILL; no-op if not running |
//! | `apply`          | (Re)create triggers from job cron fields, per id       |
//! | `remove_trigger` | Drop a job's trigger from store and engine             |
//! | `fix_order`      | Repair the dense per-partition rank sequence           |
//! | `update_sort`    | Transactional rank move within a partition             |
//! | `bind_groups`    | Distinct bind-tag aggregation                          |

pub mod engine;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod terminate;

pub use engine::{TickTask, TriggerEngine};
pub use error::{Result, SchedulerError};
pub use registry::{RunRegistry, RunningEntry};
pub use runner::{ExitReport, ProcessHandle};
pub use scheduler::Scheduler;
pub use terminate::TerminationOutcome;
