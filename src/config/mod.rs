//! Configuration models: resource-pool spec files and executor policy.

pub mod executor_config;
pub mod pool_spec;

pub use executor_config::{
    keyboard_disabled_by_env, load_from_env, resolve_session_timeout, resolve_timeout_multiplier,
    ExecutorConfigFile, CONFIG_FILE_VAR, DISABLE_KEYBOARD_VAR, RESOURCE_POOL_ADDR_VAR,
};
pub use pool_spec::PoolSpec;
