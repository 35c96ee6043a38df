//! Repeating background tick for a mounted view.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Sender};
use tracing::debug;

/// Handle to a running tick thread.
///
/// The thread stops when [`Ticker::cancel`] is called or the handle is
/// dropped; no tick callback runs after either returns.
#[derive(Debug)]
pub struct Ticker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Call `on_tick` every `interval` on a background thread.
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let handle = thread::spawn(move || {
            let ticks = channel::tick(interval);
            loop {
                crossbeam::select! {
                    recv(stop_rx) -> _ => break,
                    recv(ticks) -> _ => on_tick(),
                }
            }
            debug!("ticker stopped");
        });
        Self {
            stop: Some(stop_tx),
            handle: Some(handle),
        }
    }

    /// Stop ticking and wait for the thread to exit.
    pub fn cancel(mut self) {
        self.shutdown();
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    fn shutdown(&mut self) {
        // Disconnecting the stop channel wakes the select.
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
