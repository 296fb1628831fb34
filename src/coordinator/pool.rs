/*!
 * Bounded worker pool.
 *
 * Every submitted future is spawned at once but waits for a semaphore
 * permit before it runs, so at most `size` futures are past their admission
 * point at any time. A future whose permit arrives after the run was halted
 * is not started; its fallback value is returned instead.
 */

use log::trace;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::translation::RunSignals;

pub struct WorkerPool<T> {
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<T>,
    signals: RunSignals,
    size: usize,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(size: usize, signals: RunSignals) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
            signals,
            size,
        }
    }

    /// Queue `work`; `on_halt` produces the result when the run stops before it starts
    pub fn submit<F, H>(&mut self, work: F, on_halt: H)
    where
        F: Future<Output = T> + Send + 'static,
        H: FnOnce() -> T + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let signals = self.signals.clone();
        self.tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return on_halt();
            };
            if signals.halted() {
                trace!("Dropping queued task, run halted");
                return on_halt();
            }
            work.await
        });
    }

    /// Next finished task, in completion order
    pub async fn next(&mut self) -> Option<Result<T, JoinError>> {
        self.tasks.join_next().await
    }

    /// Tasks queued or running
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Tasks currently holding a permit
    pub fn running(&self) -> usize {
        self.size - self.semaphore.available_permits()
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
