//! Submission facade collaborators use to request execution

use futures::FutureExt;
use std::future::Future;

use super::queue::AdmissionQueue;

/// Wraps caller business logic into a unit of work and submits it.
///
/// The accepted boolean comes back unchanged so callers can surface a
/// queue-full response to their own caller. Rejection is terminal for that
/// submission; the original requester must resubmit.
#[derive(Clone)]
pub struct JobDispatcher {
    queue: AdmissionQueue,
}

impl JobDispatcher {
    pub fn new(queue: AdmissionQueue) -> Self {
        Self { queue }
    }

    pub fn dispatch<F, Fut>(&self, job: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.queue.submit(Box::new(move || job().boxed()))
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn dispatched_job_runs() {
        let dispatcher = JobDispatcher::new(AdmissionQueue::new(&QueueConfig::default()));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        assert!(dispatcher.dispatch(move || async move {
            flag.store(true, Ordering::SeqCst);
        }));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !ran.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("job never ran");
    }

    #[tokio::test]
    async fn reports_rejection_when_full() {
        let dispatcher = JobDispatcher::new(AdmissionQueue::new(&QueueConfig {
            max_concurrent: 1,
            max_queue_size: 1,
        }));
        // first occupies the slot, second fills the backlog, third is
        // turned away
        assert!(dispatcher.dispatch(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }));
        assert!(dispatcher.dispatch(|| async {}));
        assert!(!dispatcher.dispatch(|| async {}));
    }
}
