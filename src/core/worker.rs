//! Subprocess wrapper: spawns a job in its own OS process, samples its
//! resource usage while it runs, and receives its final result over a
//! length-prefixed message stream on its stdout pipe.

use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, System};

use crate::config::executor_config::CONFIG_FILE_VAR;
use crate::core::job::{Job, Measurement, MeasurementBag};
use crate::core::status::JobState;

/// Builds the `Command` that runs a job. Implementors own how a job's
/// payload maps to an executable invocation; this crate only drives the
/// resulting process.
pub trait JobRunner: Send + Sync {
    /// Build (but do not spawn) the command for `job`. The command's stdout
    /// will be piped and read as a framed [`WorkerMessage`] stream, so
    /// implementors must arrange for the child to write one there on exit.
    fn command_for(&self, job: &dyn Job) -> Command;
}

/// The single message a worker process sends back before exiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerMessage {
    /// Terminal state the job reached.
    pub state: JobState,
    /// Optional human-readable explanation.
    pub reason: Option<String>,
    /// Measured wall-clock runtime, in seconds.
    pub runtime_secs: f64,
}

/// Write one length-prefixed JSON message: a 4-byte little-endian length
/// followed by that many bytes of UTF-8 JSON. Intended for use by whatever
/// produces a [`WorkerMessage`] inside a job's own process.
pub fn write_framed_message<W: io::Write>(writer: &mut W, message: &WorkerMessage) -> io::Result<()> {
    let payload = serde_json::to_vec(message).map_err(io::Error::other)?;
    let len = u32::try_from(payload.len()).map_err(io::Error::other)?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()
}

/// Block until one length-prefixed message is fully read, or `EOF` is hit
/// before any bytes arrive (`Ok(None)`).
fn read_framed_message<R: Read>(reader: &mut R) -> io::Result<Option<WorkerMessage>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    let message = serde_json::from_slice(&payload).map_err(io::Error::other)?;
    Ok(Some(message))
}

/// A spawned job process plus the channel its background reader thread
/// delivers the final [`WorkerMessage`] on. The channel outlives the
/// process: if the process is killed before writing anything, `recv` simply
/// never yields and the channel disconnects when the reader thread exits.
pub struct MeasuredChild {
    child: Child,
    pid: Pid,
    started: Instant,
    result_rx: crossbeam_channel::Receiver<WorkerMessage>,
}

impl MeasuredChild {
    /// Spawn `job` via `runner`, wiring stdout to a background reader
    /// thread. When `config_path` is set, it is exported to the child alone
    /// (via [`Command::env`], never the parent's own environment) as
    /// [`CONFIG_FILE_VAR`] so the worker can reconstruct identical policy.
    pub fn spawn(runner: &dyn JobRunner, job: &dyn Job, config_path: Option<&Path>) -> io::Result<Self> {
        let mut command = runner.command_for(job);
        if let Some(path) = config_path {
            command.env(CONFIG_FILE_VAR, path);
        }
        command.stdout(Stdio::piped());
        let mut child = command.spawn()?;
        let stdout = child.stdout.take().expect("stdout was piped");
        let pid = Pid::from_u32(child.id());

        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::Builder::new()
            .name(format!("worker-reader-{}", child.id()))
            .spawn(move || {
                let mut stdout = stdout;
                if let Ok(Some(message)) = read_framed_message(&mut stdout) {
                    let _ = tx.send(message);
                }
            })
            .expect("spawning worker reader thread");

        Ok(Self { child, pid, started: Instant::now(), result_rx: rx })
    }

    /// OS process id.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Wall-clock time since this process was spawned.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Non-blocking check for process exit.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Non-blocking check for the final result message, if the process has
    /// already written and exited.
    pub fn try_result(&self) -> Option<WorkerMessage> {
        self.result_rx.try_recv().ok()
    }

    /// Sample this process's current CPU/memory usage. Returns `None` if the
    /// process has already exited or the OS denies access.
    pub fn sample(&self, system: &mut System) -> Option<Measurement> {
        system.refresh_process_specifics(self.pid, ProcessRefreshKind::everything());
        let process = system.process(self.pid)?;
        Some(Measurement {
            cpu_percent: process.cpu_usage(),
            rss_mb: process.memory() as f64 / (1024.0 * 1024.0),
            vms_mb: process.virtual_memory() as f64 / (1024.0 * 1024.0),
            threads: None,
        })
    }

    /// Send `SIGTERM` (Unix) for a graceful shutdown. No-op on platforms
    /// without a portable graceful-signal equivalent; callers should follow
    /// up with [`Self::kill`] after a grace period regardless.
    pub fn terminate(&self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid as NixPid;
            let _ = kill(NixPid::from_raw(self.pid() as i32), Signal::SIGTERM);
        }
    }

    /// Force-kill the process.
    pub fn kill(&mut self) -> io::Result<()> {
        self.child.kill()
    }

    /// Block until the process exits.
    pub fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait()
    }
}

/// Build a fresh, all-processes-refreshed [`System`] for sampling.
pub fn new_sampling_system() -> System {
    System::new_with_specifics(RefreshKind::everything())
}

/// Fold a single completed [`WorkerMessage`] into a job: set its terminal
/// status and record its measured runtime.
pub fn apply_worker_message(job: &dyn Job, message: &WorkerMessage) {
    job.set_status(message.state, message.reason.clone());
    job.set_runtime(Duration::from_secs_f64(message.runtime_secs));
}

/// Fold a fresh measurement sample into a job's running bag.
pub fn record_sample(job: &dyn Job, sample: Measurement) {
    let mut bag = MeasurementBag::new();
    bag.add_measurement(sample);
    job.add_measurements(&bag);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framed_message_round_trips() {
        let mut buf = Vec::new();
        let message =
            WorkerMessage { state: JobState::Success, reason: None, runtime_secs: 1.5 };
        write_framed_message(&mut buf, &message).unwrap();
        let mut cursor = io::Cursor::new(buf);
        let decoded = read_framed_message(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded.state, JobState::Success);
        assert_eq!(decoded.runtime_secs, 1.5);
    }

    #[test]
    fn empty_stream_yields_none() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        assert!(read_framed_message(&mut cursor).unwrap().is_none());
    }
}
