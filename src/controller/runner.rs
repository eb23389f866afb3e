//! Background polling loop.
//!
//! Runs one task periodically on a dedicated thread. The thread waits on a
//! stop channel between iterations, so `shutdown()` wakes it immediately
//! instead of waiting out the interval.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a running polling thread.
pub struct PollingLoop {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    handle: JoinHandle<()>,
}

impl PollingLoop {
    /// Spawns the worker. The task runs once immediately, then once per
    /// `interval` until shutdown.
    pub fn spawn<F>(interval: Duration, mut task: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("polling-loop".to_string())
            .spawn(move || {
                crate::log("Polling loop started");
                loop {
                    task();
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        // Stop requested or the handle was dropped
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                crate::log("Polling loop stopped");
                let _ = done_tx.send(());
            })
            .context("Failed to spawn polling thread")?;

        Ok(Self {
            stop_tx,
            done_rx,
            handle,
        })
    }

    /// Returns true once the worker thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the worker to stop and waits up to `grace` for it.
    ///
    /// Returns `true` if the worker finished in time. Otherwise the thread is
    /// detached and `false` is returned.
    pub fn shutdown(self, grace: Duration) -> bool {
        let _ = self.stop_tx.send(());

        match self.done_rx.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    crate::log("Polling thread panicked");
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                crate::log(&format!(
                    "Polling thread did not stop within {} ms; detaching",
                    grace.as_millis()
                ));
                false
            }
        }
    }
}
