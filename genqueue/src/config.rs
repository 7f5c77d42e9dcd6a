//! Application configuration assembled from environment variables.
//!
//! Supported env vars (all optional):
//! - `QUEUE_CAPACITY` - maximum queued jobs (default 20)
//! - `API_BIND_ADDRESS`, `API_PORT`, `API_ENABLE_CORS`
//! - `LOG_DIR` - directory for rotated log files
//! - `PIPELINE_PROGRAM`, `PIPELINE_ARGS` (whitespace separated), `PIPELINE_OUTPUT`,
//!   `PIPELINE_TIMEOUT_SECS`
//! - `JOB_RETENTION_SECS`, `JOB_PURGE_INTERVAL_SECS`

use std::str::FromStr;

use crate::api::server::ApiServerConfig;
use crate::queue::{CommandExecutorConfig, JobQueueConfig, RetentionConfig};
use crate::{Error, Result};

/// Default log directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

/// Top-level application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub queue: JobQueueConfig,
    pub api: ApiServerConfig,
    pub pipeline: CommandExecutorConfig,
    pub retention: RetentionConfig,
    pub log_dir: Option<String>,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut config = Self::default();

        if let Some(capacity) = get("QUEUE_CAPACITY") {
            config.queue.capacity = parse("QUEUE_CAPACITY", &capacity)?;
            if config.queue.capacity == 0 {
                return Err(Error::config("QUEUE_CAPACITY must be at least 1"));
            }
        }

        if let Some(bind_address) = get("API_BIND_ADDRESS") {
            config.api.bind_address = bind_address.trim().to_string();
        }
        if let Some(port) = get("API_PORT") {
            config.api.port = parse("API_PORT", &port)?;
        }
        if let Some(enable_cors) = get("API_ENABLE_CORS") {
            config.api.enable_cors = parse("API_ENABLE_CORS", &enable_cors)?;
        }

        config.log_dir = get("LOG_DIR").map(|dir| dir.trim().to_string());

        if let Some(program) = get("PIPELINE_PROGRAM") {
            config.pipeline.program = program.trim().to_string();
        }
        if let Some(args) = lookup("PIPELINE_ARGS") {
            config.pipeline.args = args.split_whitespace().map(String::from).collect();
        }
        if let Some(output) = get("PIPELINE_OUTPUT") {
            config.pipeline.output_template = output.trim().to_string();
        }
        if let Some(timeout) = get("PIPELINE_TIMEOUT_SECS") {
            config.pipeline.timeout_secs = Some(parse("PIPELINE_TIMEOUT_SECS", &timeout)?);
        }

        if let Some(retention) = get("JOB_RETENTION_SECS") {
            config.retention.retention_secs = parse("JOB_RETENTION_SECS", &retention)?;
        }
        if let Some(interval) = get("JOB_PURGE_INTERVAL_SECS") {
            config.retention.check_interval_secs = parse("JOB_PURGE_INTERVAL_SECS", &interval)?;
        }

        Ok(config)
    }

    pub fn log_dir(&self) -> &str {
        self.log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR)
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("Invalid {} '{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.queue.capacity, 20);
        assert_eq!(config.api.port, 8000);
        assert_eq!(config.log_dir(), "logs");
        assert_eq!(config.retention.retention_secs, 0);
        assert!(config.pipeline.timeout_secs.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("QUEUE_CAPACITY", "5"),
            ("API_PORT", "9000"),
            ("API_ENABLE_CORS", "false"),
            ("LOG_DIR", "/var/log/genqueue"),
            ("PIPELINE_PROGRAM", "python3"),
            ("PIPELINE_ARGS", "-m pipeline --job {job_id}"),
            ("PIPELINE_TIMEOUT_SECS", "1800"),
            ("JOB_RETENTION_SECS", "86400"),
        ])
        .unwrap();

        assert_eq!(config.queue.capacity, 5);
        assert_eq!(config.api.port, 9000);
        assert!(!config.api.enable_cors);
        assert_eq!(config.log_dir(), "/var/log/genqueue");
        assert_eq!(config.pipeline.program, "python3");
        assert_eq!(
            config.pipeline.args,
            vec!["-m", "pipeline", "--job", "{job_id}"]
        );
        assert_eq!(config.pipeline.timeout_secs, Some(1800));
        assert!(config.retention.is_enabled());
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = load(&[("QUEUE_CAPACITY", "  "), ("API_PORT", "")]).unwrap();
        assert_eq!(config.queue.capacity, 20);
        assert_eq!(config.api.port, 8000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("QUEUE_CAPACITY", "many")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            load(&[("QUEUE_CAPACITY", "0")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            load(&[("API_PORT", "70000")]),
            Err(Error::Configuration(_))
        ));
    }
}
