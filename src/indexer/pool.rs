// Bounded worker pool

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Outcome of a pool run.
#[derive(Debug)]
pub struct PoolReport<R> {
    pub completed: usize,
    pub errored: usize,
    /// Items never claimed because the run was interrupted
    pub skipped: usize,
    /// Successful handler outputs, in completion order
    pub outputs: Vec<R>,
}

impl<R> PoolReport<R> {
    pub fn total(&self) -> usize {
        self.completed + self.errored + self.skipped
    }
}

/// Run `handler` over `items` with at most `concurrency` calls in flight.
///
/// `min(concurrency, items.len())` workers are polled together in the calling
/// task and pull the next index from one shared cursor, so every item is
/// claimed at most once. A failing item is counted and logged; the other
/// workers keep going. `is_interrupted` is checked before each claim only, so
/// an item already in progress always finishes.
pub async fn run<'a, T, R, F, Fut>(
    items: &'a [T],
    concurrency: usize,
    handler: F,
    is_interrupted: Option<&(dyn Fn() -> bool + Sync)>,
) -> PoolReport<R>
where
    F: Fn(&'a T) -> Fut,
    Fut: Future<Output = anyhow::Result<R>>,
{
    let n = items.len();
    let workers = concurrency.max(1).min(n);
    let cursor = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let errored = AtomicUsize::new(0);
    let outputs = Mutex::new(Vec::with_capacity(n));

    debug!("Worker pool: {} items, {} workers", n, workers);

    let (handler, cursor) = (&handler, &cursor);
    let (done, failed, results) = (&completed, &errored, &outputs);
    let worker = move |worker_id: usize| async move {
        loop {
            if is_interrupted.map(|f| f()).unwrap_or(false) {
                debug!("Worker {} stopping: interrupted", worker_id);
                break;
            }
            let index = cursor.fetch_add(1, Ordering::SeqCst);
            if index >= n {
                break;
            }
            match handler(&items[index]).await {
                Ok(output) => {
                    results.lock().push(output);
                    done.fetch_add(1, Ordering::SeqCst);
                }
                Err(e) => {
                    warn!("Task {} failed: {:#}", index, e);
                    failed.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    };

    join_all((0..workers).map(worker)).await;

    let completed = completed.into_inner();
    let errored = errored.into_inner();
    PoolReport {
        completed,
        errored,
        skipped: n - completed - errored,
        outputs: outputs.into_inner(),
    }
}
