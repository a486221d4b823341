// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Worker tasks and their coordinated shutdown

use std::{future::Future, io};

use tokio::{
    signal::unix::{signal, Signal, SignalKind},
    sync::watch,
    task::JoinHandle,
};

/// Receiving end of the shutdown broadcast.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Wait until shutdown has been requested.
    ///
    /// Dropping the [`Supervisor`] counts as a request.
    pub async fn wait(&mut self) {
        // An error means the sender is gone.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Owns the worker tasks of a daemon.
#[derive(Debug)]
pub struct Supervisor {
    tx: watch::Sender<bool>,
    workers: Vec<(String, JoinHandle<()>)>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            tx,
            workers: Vec::new(),
        }
    }

    #[must_use]
    pub fn shutdown_signal(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }

    /// Spawn a worker that must return once its [`Shutdown`] fires.
    pub fn spawn<F, Fut>(&mut self, name: impl Into<String>, worker: F)
    where
        F: FnOnce(Shutdown) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        log::debug!("Starting worker {name}");
        let handle = tokio::spawn(worker(self.shutdown_signal()));
        self.workers.push((name, handle));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Request shutdown and wait for every worker to terminate.
    pub async fn shutdown(self) {
        log::info!("Stopping {} worker(s)", self.workers.len());
        self.tx.send_replace(true);
        for (name, handle) in self.workers {
            match handle.await {
                Ok(()) => log::info!("Worker {name} terminated"),
                Err(err) => log::error!("Worker {name} failed: {err}"),
            }
        }
    }
}

/// SIGTERM and SIGINT, registered ahead of time.
#[derive(Debug)]
pub struct TerminationSignal {
    term: Signal,
    int: Signal,
}

impl TerminationSignal {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            term: signal(SignalKind::terminate())?,
            int: signal(SignalKind::interrupt())?,
        })
    }

    pub async fn recv(mut self) {
        tokio::select! {
            _ = self.term.recv() => log::info!("Received SIGTERM"),
            _ = self.int.recv() => log::info!("Received SIGINT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn shutdown_awaits_all_workers() {
        let mut supervisor = Supervisor::new();
        let stopped = Arc::new(AtomicUsize::new(0));
        for n in 0..3 {
            let stopped = Arc::clone(&stopped);
            supervisor.spawn(format!("worker{n}"), |mut shutdown| async move {
                shutdown.wait().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
                stopped.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(supervisor.len(), 3);
        let signal = supervisor.shutdown_signal();
        assert!(!signal.is_triggered());
        timeout(Duration::from_secs(2), supervisor.shutdown())
            .await
            .unwrap();
        assert_eq!(stopped.load(Ordering::SeqCst), 3);
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn dropped_supervisor_releases_waiters() {
        let supervisor = Supervisor::new();
        let mut shutdown = supervisor.shutdown_signal();
        drop(supervisor);
        timeout(Duration::from_secs(2), shutdown.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn panicking_worker_is_reported() {
        let mut supervisor = Supervisor::new();
        supervisor.spawn("broken", |_| async { None::<()>.expect("broken worker") });
        assert!(!supervisor.is_empty());
        timeout(Duration::from_secs(2), supervisor.shutdown())
            .await
            .unwrap();
    }
}
