pub mod config;
pub mod error;
pub mod options;
pub mod types;

pub use config::TaskdockConfig;
pub use error::{CoreError, Result};
pub use options::JobOptions;
pub use types::{JobDefinition, TickCallback, TriggerAction, TriggerEntry, TriggerId};
