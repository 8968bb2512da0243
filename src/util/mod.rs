//! Shared utilities: duration parsing, exit-code aggregation, interactive
//! keyboard control, and structured logging setup.

pub mod duration;
pub mod exit_code;
pub mod keyboard;
pub mod telemetry;

pub use duration::parse_go_duration;
pub use exit_code::{compute_exit_code, ExitCode};
pub use keyboard::{Key, KeyboardWatcher};
pub use telemetry::init_tracing;
