//! # Chirp Runtime Module
//!
//! Pieces browsers and publishers are assembled from.
//!
//! ## Key Types
//!
//! - [`ExecutionContext`] - Where listener callbacks run
//! - [`CallbackThread`] - Default ordered callback worker
//! - [`MulticastPermit`] - Host permission held while started
//! - [`config::NetworkConfig`], [`config::BrowserConfig`], [`config::PublisherConfig`]
//!
//! ## Lifecycle
//!
//! 1. Build: `chirp::browse("*")` or `chirp::publish("name")`, then `build()`
//! 2. Start: `start()` acquires the permit and spawns the worker threads
//! 3. Stop: `stop()` cancels every worker, closes sockets, releases the permit

pub mod config;
pub mod executor;
pub mod permit;

pub use config::{BrowserConfig, ChirpConfig, NetworkConfig, PublisherConfig};
pub use executor::*;
pub use permit::*;

use crossbeam::channel::{self, Receiver, Sender};
use std::io;
use std::thread::{self, JoinHandle};

/// Cancellation signal: dropping the [`Shutdown`] disconnects every
/// [`ShutdownSignal`], which is observed by `select!` in each worker.
pub(crate) struct Shutdown {
    _sender: Sender<()>,
}

#[derive(Clone)]
pub(crate) struct ShutdownSignal {
    receiver: Receiver<()>,
}

impl ShutdownSignal {
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

pub(crate) fn shutdown_pair() -> (Shutdown, ShutdownSignal) {
    let (sender, receiver) = channel::bounded(0);
    (Shutdown { _sender: sender }, ShutdownSignal { receiver })
}

pub(crate) fn spawn_worker<F>(name: String, f: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name).spawn(f)
}

/// Join worker threads, logging any that panicked. The calling thread is
/// skipped if it is one of them.
pub(crate) fn join_workers(workers: Vec<JoinHandle<()>>) {
    let current = thread::current().id();
    for worker in workers {
        if worker.thread().id() == current {
            continue;
        }
        let name = worker.thread().name().unwrap_or("worker").to_string();
        if worker.join().is_err() {
            log::error!("{} panicked", name);
        }
    }
}
