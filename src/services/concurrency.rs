//! Bounded-concurrency helper shared by every stage that fans out
//! per-paper LLM or HTTP calls (Filter-Seed, Review, Harvest-Other).

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Run `f` over every item in `items`, with at most `concurrency` calls
/// in flight at once, preserving input order in the returned `Vec`.
pub async fn map_bounded<T, R, F, Fut>(items: Vec<T>, concurrency: usize, f: F) -> Vec<R>
where
    T: Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send,
    R: Send,
{
    stream::iter(items)
        .map(|item| f(item))
        .buffered(concurrency)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_map_bounded_preserves_order() {
        let items: Vec<u32> = (0..20).collect();
        let results = map_bounded(items, 4, |n| async move { n * 2 }).await;
        let expected: Vec<u32> = (0..20).map(|n| n * 2).collect();
        assert_eq!(results, expected);
    }
}
