//! Bounded-concurrency batch fetching
//!
//! Upstream detail pages are fetched in fixed-size batches: within a batch
//! every fetch runs concurrently, batches run strictly one after another.
//! Each fetch carries its own timeout, so one hung request degrades into a
//! missing value for that single item instead of stalling or failing the
//! whole batch.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;

/// Tuning knobs for batched upstream fetches
///
/// The numbers are operational tuning, not semantics; routes receive them
/// from configuration rather than hard-coding per-platform constants.
#[derive(Debug, Clone)]
pub struct FetchPolicy {
    /// Items fetched concurrently per batch
    pub batch_size: usize,
    /// Per-item timeout; expiry turns that fetch into a soft failure
    pub timeout: Duration,
    /// Days a cached item payload stays valid
    pub ttl_days: i64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            batch_size: 5,
            timeout: Duration::from_secs(10),
            ttl_days: 30,
        }
    }
}

/// Runs `fetch` over `items` in fixed-size sequential batches
///
/// Returns one slot per input item, in input order. A fetch that returns
/// `None`, errors out of its own accord, or exceeds `timeout` yields
/// `None` in its slot; sibling fetches in the same and later batches are
/// unaffected.
pub async fn fetch_batched<I, T, F, Fut>(
    items: Vec<I>,
    batch_size: usize,
    timeout: Duration,
    fetch: F,
) -> Vec<Option<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::with_capacity(items.len());
    let mut remaining = items;

    while !remaining.is_empty() {
        let rest = remaining.split_off(batch_size.min(remaining.len()));
        let batch = std::mem::replace(&mut remaining, rest);

        let settled = join_all(batch.into_iter().map(|item| {
            let attempt = fetch(item);
            async move { tokio::time::timeout(timeout, attempt).await.ok().flatten() }
        }))
        .await;

        results.extend(settled);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_all_items_fetched_in_input_order() {
        let results = fetch_batched(vec![1, 2, 3, 4, 5, 6, 7], 3, Duration::from_secs(1), |n| {
            async move { Some(n * 10) }
        })
        .await;

        assert_eq!(
            results,
            vec![
                Some(10),
                Some(20),
                Some(30),
                Some(40),
                Some(50),
                Some(60),
                Some(70)
            ]
        );
    }

    #[tokio::test]
    async fn test_each_item_fetched_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let results = fetch_batched(vec![0; 13], 5, Duration::from_secs(1), move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Some(())
            }
        })
        .await;

        assert_eq!(results.len(), 13);
        assert_eq!(calls.load(Ordering::SeqCst), 13);
    }

    #[tokio::test]
    async fn test_one_failure_leaves_siblings_intact() {
        let results = fetch_batched(vec![1, 2, 3], 3, Duration::from_secs(1), |n| {
            async move {
                if n == 2 {
                    None
                } else {
                    Some(n)
                }
            }
        })
        .await;

        assert_eq!(results, vec![Some(1), None, Some(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_converts_hung_fetch_to_soft_failure() {
        let results = fetch_batched(vec![1, 2, 3], 3, Duration::from_millis(100), |n| {
            async move {
                if n == 2 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                Some(n)
            }
        })
        .await;

        assert_eq!(results, vec![Some(1), None, Some(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_run_sequentially_and_items_concurrently() {
        let started = tokio::time::Instant::now();

        // 7 items in batches of 3: three batches of 50ms each. Items inside
        // a batch sleep concurrently, so total time tracks the batch count.
        let results = fetch_batched(vec![0; 7], 3, Duration::from_secs(1), |_| async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Some(())
        })
        .await;

        assert_eq!(results.len(), 7);
        assert_eq!(started.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_clamped() {
        let results =
            fetch_batched(vec![1, 2], 0, Duration::from_secs(1), |n| async move { Some(n) }).await;
        assert_eq!(results, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_output() {
        let results =
            fetch_batched(Vec::<u32>::new(), 5, Duration::from_secs(1), |n| async move { Some(n) })
                .await;
        assert!(results.is_empty());
    }
}
