//! Single-threaded cooperative executor that stands in for the host
//! application's UI thread. Handlers flagged `runs_on_main_thread` are
//! trampolined here; the serving worker blocks on a oneshot reply with a
//! timeout, never on the executor's internal queue directly.

use std::cell::Cell;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send>;

thread_local! {
    static IS_MAIN_THREAD: Cell<bool> = const { Cell::new(false) };
}

pub struct MainThread {
    sender: Sender<Job>,
}

impl MainThread {
    /// Spawn the dedicated executor thread. The thread runs until the
    /// `MainThread` handle (and its sender) is dropped.
    pub fn spawn() -> Self {
        let (sender, receiver): (Sender<Job>, Receiver<Job>) = std::sync::mpsc::channel();

        std::thread::Builder::new()
            .name("xplorer-ui-thread".into())
            .spawn(move || {
                IS_MAIN_THREAD.with(|flag| flag.set(true));
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .expect("failed to spawn main-thread executor");

        Self { sender }
    }

    /// True when called from the UI execution context itself.
    pub fn is_current(&self) -> bool {
        IS_MAIN_THREAD.with(|flag| flag.get())
    }

    /// Run `job` on the UI thread and wait up to `timeout` for it to finish.
    /// Returns `None` on timeout; the job keeps running to completion on the
    /// UI thread regardless; it is not preemptible.
    pub async fn run_with_timeout<F, T>(&self, timeout: Duration, job: F) -> Option<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        let sent = self.sender.send(Box::new(move || {
            let _ = reply_tx.send(job());
        }));

        if sent.is_err() {
            log::error!("main-thread executor is not running");
            return None;
        }

        tokio::time::timeout(timeout, reply_rx).await.ok()?.ok()
    }
}
