//! Process configuration, read from the environment at startup.

use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

pub const LOG_VAR: &str = "PLANNERD_LOG";
pub const WORKSPACE_VAR: &str = "PLANNERD_WORKSPACE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SidecarConfig {
    /// `tracing` filter directive, e.g. `info` or `plannerd=debug`.
    pub log_filter: String,
    /// Workspace opened before the first request, if any.
    pub workspace: Option<PathBuf>,
}

impl SidecarConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_filter = lookup(LOG_VAR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "info".to_string());
        EnvFilter::try_new(&log_filter)
            .map_err(|e| ConfigError::InvalidValue(LOG_VAR.to_string(), e.to_string()))?;

        let workspace = lookup(WORKSPACE_VAR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            log_filter,
            workspace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = SidecarConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(cfg.log_filter, "info");
        assert_eq!(cfg.workspace, None);
    }

    #[test]
    fn reads_both_variables() {
        let cfg = SidecarConfig::from_lookup(lookup(&[
            (LOG_VAR, "plannerd=debug"),
            (WORKSPACE_VAR, " /tmp/ws "),
        ]))
        .expect("config");
        assert_eq!(cfg.log_filter, "plannerd=debug");
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/ws")));
    }

    #[test]
    fn rejects_bad_filter() {
        let res = SidecarConfig::from_lookup(lookup(&[(LOG_VAR, "plannerd=loud")]));
        assert!(matches!(res, Err(ConfigError::InvalidValue(_, _))));
    }
}
