//! Typed advanced options from a job's `config` JSON column.
//!
//! The original ad-hoc parsing treated every problem as "no options"; this
//! keeps that tolerance (absence, garbage, or a wrong-typed field never fail
//! a run) but surfaces parse problems as a debug diagnostic.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Recognised advanced options. Unknown keys are ignored; a field of the
/// wrong JSON type falls back to its default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Hook command prefixed to the job's shell, run from the app root.
    pub before_shell: Option<String>,
    /// Hook command suffixed to the job's shell, run from the app root.
    pub after_shell: Option<String>,
    /// When true, a tick may start a run while a previous one is alive.
    pub allow_concurrency: bool,
}

impl JobOptions {
    /// Parse the `config` column. Never fails.
    pub fn parse(config: Option<&str>) -> Self {
        let Some(raw) = config else {
            return Self::default();
        };
        if raw.trim().is_empty() {
            return Self::default();
        }
        let value: serde_json::Value = match serde_json::from_str(raw) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "ignoring malformed job config");
                return Self::default();
            }
        };
        Self {
            before_shell: string_field(&value, "before_task_shell"),
            after_shell: string_field(&value, "after_task_shell"),
            allow_concurrency: value
                .get("allow_concurrency")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
        }
    }
}

/// Non-empty string field, or None on absence / wrong type / empty value.
fn string_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
