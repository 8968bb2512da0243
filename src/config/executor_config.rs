//! Executor-wide configuration: worker count, timeouts, fail-fast, and the
//! environment variables a run (and its worker subprocesses) honor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::executor::ExecutorConfig;
use crate::util::duration::parse_go_duration;

/// `uds:<path>` or `tcp:<host>:<port>` — where a worker subprocess connects
/// back to report resource-pool state, when out-of-process pooling is used.
pub const RESOURCE_POOL_ADDR_VAR: &str = "TESTRIG_RESOURCE_POOL_ADDR";
/// Path to the JSON configuration snapshot a worker subprocess reads at
/// startup.
pub const CONFIG_FILE_VAR: &str = "TESTRIG_CONFIG_FILE";
/// Set (to any value) to disable interactive stdin polling, e.g. for CI
/// invocations or a batch runner's own child invocations.
pub const DISABLE_KEYBOARD_VAR: &str = "TESTRIG_DISABLE_KB";

/// Serializable snapshot of [`ExecutorConfig`], written to the path named by
/// [`CONFIG_FILE_VAR`] so a worker subprocess can recover the run's policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfigFile {
    /// See [`ExecutorConfig::max_workers`].
    pub max_workers: usize,
    /// Busy-wait interval, as a Go-style duration string.
    pub busy_wait: String,
    /// Session timeout, as a Go-style duration string, or `None` for
    /// unbounded.
    pub session_timeout: Option<String>,
    /// See [`ExecutorConfig::timeout_multiplier`].
    pub timeout_multiplier: f64,
    /// See [`ExecutorConfig::fail_fast`].
    pub fail_fast: bool,
    /// See [`ExecutorConfig::interactive`].
    pub interactive: bool,
}

impl ExecutorConfigFile {
    /// Snapshot a live [`ExecutorConfig`] for serialization.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            busy_wait: format!("{}ms", config.busy_wait.as_millis()),
            session_timeout: config.session_timeout.map(|d| format!("{}s", d.as_secs_f64())),
            timeout_multiplier: config.timeout_multiplier,
            fail_fast: config.fail_fast,
            interactive: config.interactive,
        }
    }

    /// Expand back into an [`ExecutorConfig`], parsing the duration strings.
    pub fn into_config(self) -> Result<ExecutorConfig, String> {
        let busy_wait = parse_go_duration(&self.busy_wait)?;
        let session_timeout =
            self.session_timeout.as_deref().map(parse_go_duration).transpose()?;
        Ok(ExecutorConfig {
            max_workers: self.max_workers,
            busy_wait,
            session_timeout,
            timeout_multiplier: self.timeout_multiplier,
            fail_fast: self.fail_fast,
            interactive: self.interactive,
        })
    }
}

/// Load the snapshot named by [`CONFIG_FILE_VAR`], if that variable is set
/// and the file can be read and parsed.
pub fn load_from_env() -> Result<Option<ExecutorConfig>, String> {
    let Ok(path) = std::env::var(CONFIG_FILE_VAR) else {
        return Ok(None);
    };
    let contents = std::fs::read_to_string(&path).map_err(|e| format!("reading `{path}`: {e}"))?;
    let file: ExecutorConfigFile =
        serde_json::from_str(&contents).map_err(|e| format!("parsing `{path}`: {e}"))?;
    Ok(Some(file.into_config()?))
}

/// Whether interactive keyboard polling should be disabled, per
/// [`DISABLE_KEYBOARD_VAR`].
pub fn keyboard_disabled_by_env() -> bool {
    std::env::var(DISABLE_KEYBOARD_VAR).is_ok()
}

/// Apply a timeout-multiplier override: an explicit CLI argument always
/// wins, otherwise fall back to the value from the config file, otherwise
/// `1.0`.
pub fn resolve_timeout_multiplier(cli_override: Option<f64>, config_value: Option<f64>) -> f64 {
    cli_override.or(config_value).unwrap_or(1.0)
}

/// Resolve a session timeout from a Go-style duration string, treating an
/// absent or negative value as "no session limit".
pub fn resolve_session_timeout(raw: Option<&str>) -> Result<Option<Duration>, String> {
    match raw {
        None => Ok(None),
        Some(s) => parse_go_duration(s).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = ExecutorConfig { max_workers: 4, ..Default::default() };
        let file = ExecutorConfigFile::from_config(&config);
        let json = serde_json::to_string(&file).unwrap();
        let restored: ExecutorConfigFile = serde_json::from_str(&json).unwrap();
        let restored = restored.into_config().unwrap();
        assert_eq!(restored.max_workers, 4);
    }

    #[test]
    fn cli_override_wins_over_config() {
        assert_eq!(resolve_timeout_multiplier(Some(2.0), Some(1.5)), 2.0);
        assert_eq!(resolve_timeout_multiplier(None, Some(1.5)), 1.5);
        assert_eq!(resolve_timeout_multiplier(None, None), 1.0);
    }

    #[test]
    fn session_timeout_parses_duration_string() {
        assert_eq!(resolve_session_timeout(Some("2h")).unwrap(), Some(Duration::from_secs(7200)));
        assert_eq!(resolve_session_timeout(None).unwrap(), None);
    }
}
