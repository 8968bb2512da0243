//! Shared fixtures for the executor/worker integration tests: builds the
//! on-disk framed-message files a fixture subprocess (`cat <file>`) can
//! emit on stdout, so the executor sees the exact same wire format a real
//! worker process would produce.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use testrig::core::worker::write_framed_message;
use testrig::core::{JobState, WorkerMessage};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write a framed [`WorkerMessage`] to a fresh temp file and return its
/// path; a fixture job's command is simply `cat` of this path.
pub fn framed_message_file(state: JobState, reason: Option<&str>, runtime_secs: f64) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("testrig-fixture-{}-{n}.bin", std::process::id()));
    let message = WorkerMessage { state, reason: reason.map(str::to_string), runtime_secs };
    let mut file = std::fs::File::create(&path).expect("creating fixture file");
    write_framed_message(&mut file, &message).expect("writing framed message");
    path
}
