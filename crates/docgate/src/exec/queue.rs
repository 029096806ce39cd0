//! Bounded FIFO admission queue with a completion-driven drain pump
//!
//! Work is admitted only while the pending backlog is below the configured
//! ceiling; at most `max_concurrent` units run at once (default 1, which
//! keeps the external programs globally serialized). Every completion
//! re-arms the pump, so the queue never idles with free capacity and a
//! non-empty backlog.

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::config::QueueConfig;

/// A deferred action bundling one program invocation and its caller-defined
/// result handling. Owned by the queue from admission until it settles;
/// runs at most once and is never requeued.
pub type UnitOfWork = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send + 'static>;

struct QueueState {
    pending: VecDeque<UnitOfWork>,
    running: usize,
}

struct Inner {
    state: Mutex<QueueState>,
    max_concurrent: usize,
    max_queue_size: usize,
}

/// Cheaply cloneable handle; all clones share the same queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<Inner>,
}

impl AdmissionQueue {
    pub fn new(config: &QueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: 0,
                }),
                max_concurrent: config.max_concurrent.max(1),
                max_queue_size: config.max_queue_size,
            }),
        }
    }

    /// Admit a unit of work.
    ///
    /// Returns `false`, with no side effect, when the backlog is at
    /// capacity. Never blocks; the unit starts asynchronously in strict
    /// submission order.
    pub fn submit(&self, unit: UnitOfWork) -> bool {
        {
            let mut state = self.inner.state.lock();
            if state.pending.len() >= self.inner.max_queue_size {
                return false;
            }
            state.pending.push_back(unit);
        }
        self.drain();
        true
    }

    /// Start pending units while concurrency slots are free.
    fn drain(&self) {
        loop {
            let unit = {
                let mut state = self.inner.state.lock();
                if state.running >= self.inner.max_concurrent {
                    return;
                }
                match state.pending.pop_front() {
                    Some(unit) => {
                        state.running += 1;
                        unit
                    }
                    None => return,
                }
            };

            let queue = self.clone();
            tokio::spawn(async move {
                // A unit that panics still settles; the pump must not stall.
                if AssertUnwindSafe(async move { (unit)().await })
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    tracing::error!("unit of work panicked");
                }
                queue.settle();
            });
        }
    }

    fn settle(&self) {
        self.inner.state.lock().running -= 1;
        self.drain();
    }

    /// Units admitted but not yet started.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Units currently executing.
    pub fn running(&self) -> usize {
        self.inner.state.lock().running
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn max_queue_size(&self) -> usize {
        self.inner.max_queue_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn queue(max_concurrent: usize, max_queue_size: usize) -> AdmissionQueue {
        AdmissionQueue::new(&QueueConfig {
            max_concurrent,
            max_queue_size,
        })
    }

    async fn wait_for(condition: impl Fn() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn units_start_in_submission_order() {
        let queue = queue(1, 20);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            let accepted = queue.submit(Box::new(move || {
                Box::pin(async move {
                    order.lock().push(i);
                })
            }));
            assert!(accepted);
        }

        wait_for(|| order.lock().len() == 5).await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.running(), 0);
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn rejects_when_backlog_is_full() {
        // max_concurrent=1, max_queue_size=2: A starts, B and C wait,
        // D is turned away while all three occupy capacity.
        let queue = queue(1, 2);
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            let done = Arc::clone(&done);
            let accepted = queue.submit(Box::new(move || {
                Box::pin(async move {
                    gate.acquire().await.unwrap().forget();
                    done.fetch_add(1, Ordering::SeqCst);
                })
            }));
            assert!(accepted);
        }
        assert_eq!(queue.running(), 1);
        assert_eq!(queue.pending(), 2);

        let rejected = queue.submit(Box::new(|| Box::pin(async {})));
        assert!(!rejected);
        assert_eq!(queue.pending(), 2);

        // each completion pulls the next pending unit
        gate.add_permits(3);
        wait_for(|| done.load(Ordering::SeqCst) == 3).await;
        assert_eq!(queue.running(), 0);
        assert_eq!(queue.pending(), 0);

        // capacity is available again
        assert!(queue.submit(Box::new(|| Box::pin(async {}))));
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_limit() {
        let queue = queue(2, 20);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            assert!(queue.submit(Box::new(move || {
                Box::pin(async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    done.fetch_add(1, Ordering::SeqCst);
                })
            })));
        }

        wait_for(|| done.load(Ordering::SeqCst) == 6).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(queue.running(), 0);
    }

    #[tokio::test]
    async fn panicking_unit_settles_and_pump_continues() {
        let queue = queue(1, 20);
        assert!(queue.submit(Box::new(|| Box::pin(async { panic!("boom") }))));

        let done = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&done);
        assert!(queue.submit(Box::new(move || {
            Box::pin(async move {
                flag.fetch_add(1, Ordering::SeqCst);
            })
        })));

        wait_for(|| done.load(Ordering::SeqCst) == 1).await;
        assert_eq!(queue.running(), 0);
        assert_eq!(queue.pending(), 0);
    }
}
