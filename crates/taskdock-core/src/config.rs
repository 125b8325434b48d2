use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (taskdock.toml + TASKDOCK_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TaskdockConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory hook commands change into before running.
    #[serde(default = "default_app_root")]
    pub app_root: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            app_root: default_app_root(),
        }
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.taskdock/taskdock.db")
}

fn default_app_root() -> String {
    std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| ".".to_string())
}

impl TaskdockConfig {
    /// Load config from a TOML file with TASKDOCK_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.taskdock/taskdock.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TaskdockConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TASKDOCK_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.taskdock/taskdock.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_into_home() {
        let config = TaskdockConfig::default();
        assert!(config.database.path.ends_with("taskdock.db"));
        assert!(!config.runtime.app_root.is_empty());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = TaskdockConfig::load(Some("/nonexistent/taskdock.toml"))
            .expect("missing file is not an error");
        assert!(config.database.path.ends_with("taskdock.db"));
    }
}
