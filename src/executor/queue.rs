//! Bounded concurrency queue
//!
//! Jobs run in rounds. Each round starts as many jobs as there are free
//! slots and waits for all of them before the next round begins, so a slow
//! job at the tail of a round holds back new work even while other slots
//! are idle. This is the queue's contract, not a sliding window.

use futures::future::{join_all, BoxFuture, FutureExt};
use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::future::Future;
use tracing::debug;

use crate::models::DEFAULT_MAX_CONCURRENCY;

/// A deferred unit of work
pub type Job<'a, T> = Box<dyn FnOnce() -> BoxFuture<'a, T> + Send + 'a>;

/// Box a closure returning a future as a [`Job`]
pub fn job<'a, T, F, Fut>(f: F) -> Job<'a, T>
where
    F: FnOnce() -> Fut + Send + 'a,
    Fut: Future<Output = T> + Send + 'a,
{
    Box::new(move || f().boxed())
}

pub struct BoundedQueue<'a, T> {
    jobs: VecDeque<Job<'a, T>>,
    active_count: usize,
    max_concurrency: usize,
}

impl<'a, T: Send + 'a> BoundedQueue<'a, T> {
    /// A ceiling of zero falls back to the default of 10
    pub fn new(jobs: Vec<Job<'a, T>>, max_concurrency: usize) -> Self {
        let max_concurrency = if max_concurrency == 0 {
            DEFAULT_MAX_CONCURRENCY
        } else {
            max_concurrency
        };
        Self {
            jobs: jobs.into(),
            active_count: 0,
            max_concurrency,
        }
    }

    /// Jobs not yet started
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every job and return the results in job order
    pub async fn process(&mut self) -> Vec<T> {
        let mut output = Vec::with_capacity(self.jobs.len());
        while let Some(results) = self.run_round().await {
            output.extend(results);
        }
        output
    }

    /// Yield the results of each round as it settles
    pub fn into_stream(self) -> impl Stream<Item = Vec<T>> + 'a {
        stream::unfold(self, |mut queue| async move {
            let results = queue.run_round().await;
            results.map(|results| (results, queue))
        })
    }

    async fn run_round(&mut self) -> Option<Vec<T>> {
        if self.jobs.is_empty() {
            return None;
        }

        let slots_available = self.max_concurrency - self.active_count;
        let take = slots_available.min(self.jobs.len());
        let round: Vec<BoxFuture<'a, T>> = self.jobs.drain(..take).map(|job| job()).collect();
        self.active_count += round.len();
        debug!(
            "queue round: {} started, {} waiting",
            round.len(),
            self.jobs.len()
        );

        let results = join_all(round).await;
        self.active_count -= results.len();
        Some(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_ceiling() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<Job<'_, usize>> = (0..7)
            .map(|i| {
                let active = active.clone();
                let peak = peak.clone();
                job(move || async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10 * (i as u64 % 3 + 1))).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    i
                })
            })
            .collect();

        let mut queue = BoundedQueue::new(jobs, 3);
        let results = queue.process().await;

        assert_eq!(results, vec![0, 1, 2, 3, 4, 5, 6]);
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(queue.active_count(), 0);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_round_waits_for_slowest_job() {
        let origin = Instant::now();
        let started = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(Vec::new()));

        let jobs: Vec<Job<'_, ()>> = [100u64, 10, 10]
            .into_iter()
            .enumerate()
            .map(|(i, ms)| {
                let started = started.clone();
                let finished = finished.clone();
                job(move || async move {
                    started.lock().push((i, origin.elapsed()));
                    sleep(Duration::from_millis(ms)).await;
                    finished.lock().push((i, origin.elapsed()));
                })
            })
            .collect();

        BoundedQueue::new(jobs, 2).process().await;

        let started = started.lock().clone();
        let finished = finished.lock().clone();
        let start_of = |id| started.iter().find(|(i, _)| *i == id).unwrap().1;
        let end_of = |id| finished.iter().find(|(i, _)| *i == id).unwrap().1;

        assert!(end_of(1) < Duration::from_millis(100));
        assert!(start_of(2) >= end_of(0));
        assert!(start_of(2) >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_stream_yields_each_round() {
        let jobs: Vec<Job<'_, i32>> = (1..=5).map(|i| job(move || async move { i })).collect();
        let rounds: Vec<Vec<i32>> = BoundedQueue::new(jobs, 2).into_stream().collect().await;
        assert_eq!(rounds, vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_empty_queue() {
        let mut queue: BoundedQueue<'_, ()> = BoundedQueue::new(Vec::new(), 4);
        assert!(tokio_test::block_on(queue.process()).is_empty());
    }

    #[test]
    fn test_zero_ceiling_uses_default() {
        let queue: BoundedQueue<'_, ()> = BoundedQueue::new(Vec::new(), 0);
        assert_eq!(queue.max_concurrency(), 10);
    }
}
