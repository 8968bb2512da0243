//! Non-blocking single-key interactive control.
//!
//! Reads stdin a byte at a time on a dedicated OS thread and forwards each
//! key through a single-slot channel, so the executor's main loop can poll
//! for `s`/`q` without ever blocking on terminal input.

use std::io::Read;

use crossbeam_channel::{Receiver, TrySendError};

/// A key the interactive control surface recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// `s`/`S` — print a status summary.
    Status,
    /// `q`/`Q` — cancel the run.
    Quit,
}

/// Owns the background stdin-reading thread. Dropping this does not join
/// the thread (stdin reads block indefinitely); the thread is daemon-like
/// and exits with the process.
pub struct KeyboardWatcher {
    rx: Receiver<Key>,
}

impl KeyboardWatcher {
    /// Spawn the reader thread.
    pub fn spawn() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::Builder::new()
            .name("keyboard-watcher".to_string())
            .spawn(move || {
                let mut byte = [0u8; 1];
                let mut stdin = std::io::stdin();
                loop {
                    match stdin.read(&mut byte) {
                        Ok(0) => break,
                        Ok(_) => {
                            let key = match byte[0] {
                                b's' | b'S' => Some(Key::Status),
                                b'q' | b'Q' => Some(Key::Quit),
                                _ => None,
                            };
                            if let Some(key) = key {
                                // A single outstanding slot is enough: the
                                // executor drains it every loop iteration,
                                // and dropping a rapid repeat is fine.
                                if let Err(TrySendError::Disconnected(_)) = tx.try_send(key) {
                                    break;
                                }
                            }
                        }
                        Err(_) => break,
                    }
                }
            })
            .expect("spawning keyboard watcher thread");
        Self { rx }
    }

    /// Non-blocking poll for the most recently pressed recognized key.
    pub fn poll(&self) -> Option<Key> {
        self.rx.try_recv().ok()
    }
}
