//! Background workers
//!
//! Flush and compaction each run on one dedicated thread fed by a channel,
//! so request threads never perform either inline.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error};

use crate::error::Result;
use crate::LsmError;

use super::Inner;

/// Work sent to a background thread
pub(crate) enum Job {
    /// Flush every frozen memtable, oldest first
    Flush(Option<Sender<Result<()>>>),
    /// Merge the live SSTables; `None` reply = automatic trigger
    Compact(Option<Sender<Result<()>>>),
    Shutdown,
}

impl Job {
    /// Send a job that carries a reply channel and wait for its result
    pub(crate) fn run(
        tx: &Sender<Job>,
        make: impl FnOnce(Sender<Result<()>>) -> Job,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = channel::bounded(1);
        tx.send(make(reply_tx))
            .map_err(|_| LsmError::Storage("background worker is not running".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| LsmError::Storage("background worker exited before replying".to_string()))?
    }
}

/// Handle on one background thread
pub(crate) struct Worker {
    name: &'static str,
    tx: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(
        name: &'static str,
        inner: Arc<Inner>,
        tx: Sender<Job>,
        rx: Receiver<Job>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(name, inner, rx))?;
        Ok(Self {
            name,
            tx,
            handle: Some(handle),
        })
    }

    /// Finish the current job, then stop the thread
    pub(crate) fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = self.tx.send(Job::Shutdown);
        if handle.join().is_err() {
            error!(worker = self.name, "background worker panicked");
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(name: &'static str, inner: Arc<Inner>, rx: Receiver<Job>) {
    debug!(worker = name, "background worker started");

    for job in rx.iter() {
        match job {
            Job::Flush(reply) => {
                let result = inner.flush_frozen().map(|_| ());
                respond(name, reply, result);
            }
            Job::Compact(reply) => {
                let result = if reply.is_none() && !inner.needs_compaction() {
                    Ok(())
                } else {
                    inner.compact()
                };
                respond(name, reply, result);
            }
            Job::Shutdown => break,
        }
    }

    debug!(worker = name, "background worker stopped");
}

/// Hand the result to a waiting caller, or log it for background jobs
fn respond(name: &'static str, reply: Option<Sender<Result<()>>>, result: Result<()>) {
    match reply {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => {
            if let Err(e) = result {
                error!(worker = name, error = %e, "background job failed; will retry on next trigger");
            }
        }
    }
}
