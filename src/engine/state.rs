//! Engine state machine

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::constants::POLL_CEILING;
use crate::transport::lock;

/// Engine lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    /// No sockets allocated
    Uninitialized,
    /// Sockets allocated, worker not running
    Initialized,
    /// Worker running
    Started,
}

struct Worker<R> {
    cancel: CancellationToken,
    handle: JoinHandle<R>,
}

struct Inner<R> {
    phase: EnginePhase,
    /// Resources waiting for the next start
    idle: Option<R>,
    worker: Option<Worker<R>>,
    /// A stop is waiting for the worker to exit
    stopping: bool,
}

/// Lifecycle of an engine whose worker borrows resources of type `R`
pub struct Lifecycle<R> {
    inner: Mutex<Inner<R>>,
}

impl<R: Send + 'static> Default for Lifecycle<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores a consistent state if a stop is abandoned mid-way
struct StopGuard<'a, R> {
    lifecycle: &'a Lifecycle<R>,
    finished: bool,
}

impl<R> Drop for StopGuard<'_, R> {
    fn drop(&mut self) {
        if !self.finished {
            // the worker's resources went away with its join handle
            let mut inner = lock(&self.lifecycle.inner);
            inner.stopping = false;
            inner.phase = EnginePhase::Uninitialized;
        }
    }
}

impl<R: Send + 'static> Lifecycle<R> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: EnginePhase::Uninitialized,
                idle: None,
                worker: None,
                stopping: false,
            }),
        }
    }

    pub fn phase(&self) -> EnginePhase {
        lock(&self.inner).phase
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() != EnginePhase::Uninitialized
    }

    pub fn is_started(&self) -> bool {
        self.phase() == EnginePhase::Started
    }

    /// Store freshly allocated resources
    pub fn init(&self, resources: R) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.phase != EnginePhase::Uninitialized || inner.stopping {
            return Err(Error::Param("already initialized".into()));
        }
        inner.idle = Some(resources);
        inner.phase = EnginePhase::Initialized;
        Ok(())
    }

    /// Run `f` on the idle resources, if the engine is initialized and not
    /// started
    pub fn with_idle<T>(&self, f: impl FnOnce(&mut R) -> T) -> Option<T> {
        lock(&self.inner).idle.as_mut().map(f)
    }

    /// Spawn the worker. Starting a started engine is a no-op.
    ///
    /// `run` receives the idle resources and a cancellation token, and must
    /// return the resources when the token fires.
    pub fn start<F, Fut>(&self, run: F) -> Result<()>
    where
        F: FnOnce(R, CancellationToken) -> Fut,
        Fut: Future<Output = R> + Send + 'static,
    {
        let mut inner = lock(&self.inner);
        if inner.stopping {
            return Err(Error::Busy("another caller is stopping the engine".into()));
        }
        match inner.phase {
            EnginePhase::Uninitialized => return Err(Error::Param("not initialized".into())),
            EnginePhase::Started => return Ok(()),
            EnginePhase::Initialized => {}
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::System(format!("no tokio runtime: {}", e)))?;
        let resources = inner
            .idle
            .take()
            .ok_or_else(|| Error::System("engine resources missing".into()))?;

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run(resources, cancel.clone()));
        inner.worker = Some(Worker { cancel, handle });
        inner.phase = EnginePhase::Started;
        Ok(())
    }

    /// Cancel the worker and wait for it to exit. Stopping a stopped engine
    /// is a no-op.
    pub async fn stop(&self) -> Result<()> {
        let worker = {
            let mut inner = lock(&self.inner);
            if inner.stopping {
                return Err(Error::Busy("another caller is stopping the engine".into()));
            }
            if inner.phase != EnginePhase::Started {
                return Ok(());
            }
            inner.stopping = true;
            inner.worker.take()
        };

        let mut guard = StopGuard {
            lifecycle: self,
            finished: false,
        };

        let resources = match worker {
            Some(worker) => {
                worker.cancel.cancel();
                worker
                    .handle
                    .await
                    .map_err(|e| Error::System(format!("worker task failed: {}", e)))
            }
            None => Err(Error::System("worker handle missing".into())),
        };

        let mut inner = lock(&self.inner);
        inner.stopping = false;
        guard.finished = true;
        match resources {
            Ok(resources) => {
                inner.idle = Some(resources);
                inner.phase = EnginePhase::Initialized;
                Ok(())
            }
            Err(e) => {
                inner.phase = EnginePhase::Uninitialized;
                Err(e)
            }
        }
    }

    /// Stop the worker and give back the resources
    pub async fn uninit(&self) -> Result<Option<R>> {
        self.stop().await?;
        let mut inner = lock(&self.inner);
        inner.phase = EnginePhase::Uninitialized;
        Ok(inner.idle.take())
    }
}

impl<R> Drop for Lifecycle<R> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(worker) = inner.worker.take() {
            worker.cancel.cancel();
        }
    }
}

/// How long the worker may wait for socket activity before the next tick
pub fn poll_timeout(now: Instant, next_tick: Instant) -> Duration {
    next_tick.saturating_duration_since(now).min(POLL_CEILING)
}

/// Schedule the tick after `next_tick`, skipping ticks already missed
pub fn advance_tick(next_tick: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = next_tick + interval;
    while next <= now {
        next += interval;
    }
    next
}
