//! SQLite persistence for job definitions and trigger registrations.

pub mod db;
pub mod error;
pub mod jobs;
pub mod triggers;

pub use db::init_db;
pub use error::{Result, StoreError};
pub use jobs::{BindGroup, JobStore};
pub use triggers::TriggerStore;
