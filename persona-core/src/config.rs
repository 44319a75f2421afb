//! Run configuration read from the environment.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from reading the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Where the simulation lives and which models drive it.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Folder holding all simulations
    pub simulation_dir: PathBuf,
    /// Folder holding all mazes
    pub maze_dir: PathBuf,
    pub backup_dir: PathBuf,

    /// Simulation to load and continue
    pub simulation_name: String,
    /// Maze name written into environment files
    pub simulation_maze: String,

    pub text_model_url: Option<String>,
    pub text_model_key: Option<String>,
    pub text_model: Option<String>,

    pub embedding_url: Option<String>,
    pub embedding_key: Option<String>,
    pub embedding_model: Option<String>,

    /// Back up every this many steps; 0 disables backups
    pub backup_interval: u32,
    /// Steps to run before exiting
    pub steps: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            simulation_dir: PathBuf::from("simulations"),
            maze_dir: PathBuf::from("mazes"),
            backup_dir: PathBuf::from("backups"),
            simulation_name: "base_the_ville_isabella_maria_klaus".to_string(),
            simulation_maze: "the_ville".to_string(),
            text_model_url: None,
            text_model_key: None,
            text_model: None,
            embedding_url: None,
            embedding_key: None,
            embedding_model: None,
            backup_interval: 0,
            steps: 720,
        }
    }
}

impl RunConfig {
    /// Read the configuration from environment variables.
    ///
    /// Unset or empty variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let number = |name: &'static str, default: u32| match get(name) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { name, value }),
            None => Ok(default),
        };

        let defaults = Self::default();
        Ok(Self {
            simulation_dir: get("SIMULATION_DIR").map_or(defaults.simulation_dir, PathBuf::from),
            maze_dir: get("MAZE_DIR").map_or(defaults.maze_dir, PathBuf::from),
            backup_dir: get("BACKUP_DIR").map_or(defaults.backup_dir, PathBuf::from),
            simulation_name: get("SIMULATION_NAME").unwrap_or(defaults.simulation_name),
            simulation_maze: get("SIMULATION_MAZE").unwrap_or(defaults.simulation_maze),
            text_model_url: get("TEXT_MODEL_URL"),
            text_model_key: get("TEXT_MODEL_KEY"),
            text_model: get("TEXT_MODEL_LLM"),
            embedding_url: get("EMBEDDING_URL"),
            embedding_key: get("EMBEDDING_KEY"),
            embedding_model: get("EMBEDDING_MODEL"),
            backup_interval: number("BACKUP_INTERVAL", defaults.backup_interval)?,
            steps: number("SIMULATION_STEPS", defaults.steps)?,
        })
    }

    pub fn with_simulation(mut self, name: impl Into<String>) -> Self {
        self.simulation_name = name.into();
        self
    }

    pub fn with_simulation_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.simulation_dir = dir.into();
        self
    }

    pub fn with_maze_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.maze_dir = dir.into();
        self
    }

    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    pub fn with_backup_interval(mut self, interval: u32) -> Self {
        self.backup_interval = interval;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    /// Folder of the configured simulation.
    pub fn simulation_path(&self) -> PathBuf {
        self.simulation_dir.join(&self.simulation_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = RunConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.steps, 720);
    }

    #[test]
    fn test_reads_variables() {
        let config = RunConfig::from_lookup(lookup(&[
            ("SIMULATION_DIR", "/data/sims"),
            ("SIMULATION_NAME", "july"),
            ("TEXT_MODEL_LLM", "gpt-4o-mini"),
            ("EMBEDDING_URL", "http://localhost:8080/v1"),
            ("BACKUP_INTERVAL", " 50 "),
            ("SIMULATION_STEPS", "10"),
            ("TEXT_MODEL_KEY", ""),
        ]))
        .unwrap();

        assert_eq!(config.simulation_path(), PathBuf::from("/data/sims/july"));
        assert_eq!(config.text_model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.embedding_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(config.text_model_key, None);
        assert_eq!(config.backup_interval, 50);
        assert_eq!(config.steps, 10);
    }

    #[test]
    fn test_malformed_number() {
        let err = RunConfig::from_lookup(lookup(&[("BACKUP_INTERVAL", "often")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "BACKUP_INTERVAL must be a non-negative integer, got \"often\""
        );
    }

    #[test]
    fn test_builders() {
        let config = RunConfig::default().with_steps(3).with_backup_interval(1);
        assert_eq!((config.steps, config.backup_interval), (3, 1));
    }
}
