//! Delivery guarantees
//!
//! Every item ends with exactly one recorded outcome, no batch is larger than
//! the sizing policy allows and no item is in two requests at once.

#[cfg(test)]
mod tests {
    use crate::assert_ok;
    use crate::common::fixtures::{self, article};
    use crate::common::MockStore;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use vecbatch::config::{BatchConfig, DynamicSizing};
    use vecbatch::{BatchClient, ItemError, ItemId};

    /// Fails every third position of each request on an item's first three attempts
    fn flaky_store() -> MockStore {
        MockStore::new().with_item_policy(|ctx| {
            ((ctx.call + ctx.position) % 3 == 0 && ctx.attempt <= 3)
                .then(|| ItemError::new("too many requests").with_code("429"))
        })
    }

    async fn ingest(client: &BatchClient, count: usize) -> Vec<ItemId> {
        let (ids, _) = assert_ok!(
            client
                .with_session(async |session| {
                    let mut ids = Vec::with_capacity(count);
                    for n in 0..count {
                        ids.push(session.add_object(article(n)).await?);
                    }
                    Ok(ids)
                })
                .await
        );
        ids
    }

    // ==================== Exactly Once ====================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_item_recorded_once_under_failures() {
        let store = Arc::new(flaky_store());
        let mut config = fixtures::config(8, 3);
        config.retry = config.retry.with_max_retries(10);
        let client = BatchClient::new(store.clone(), config).unwrap();
        client.retain_outcomes(true);

        let callbacks = Arc::new(AtomicUsize::new(0));
        {
            let callbacks = callbacks.clone();
            client.on_outcome(move |_| {
                callbacks.fetch_add(1, Ordering::SeqCst);
            });
        }

        let ids = ingest(&client, 300).await;

        let outcomes = client.pop_results();
        let recorded: HashSet<ItemId> = outcomes.iter().map(|o| o.id).collect();
        assert_eq!(outcomes.len(), 300);
        assert_eq!(recorded.len(), 300);
        assert_eq!(recorded, ids.into_iter().collect::<HashSet<_>>());
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(callbacks.load(Ordering::SeqCst), 300);

        assert_eq!(store.stored_count(), 300);
        assert_eq!(client.summary().succeeded, 300);
        assert_eq!(client.number_errors(), 0);
        assert_eq!(store.overlaps(), 0);
    }

    #[tokio::test]
    async fn test_successes_not_double_counted_across_sessions() {
        let store = Arc::new(MockStore::new());
        let client = BatchClient::new(store.clone(), fixtures::config(10, 2)).unwrap();
        client.retain_outcomes(true);

        ingest(&client, 25).await;
        ingest(&client, 25).await;

        assert_eq!(client.summary().succeeded, 50);
        assert_eq!(client.pop_results().len(), 50);
        assert!(client.pop_results().is_empty());
    }

    // ==================== Batch Size Invariant ====================

    #[tokio::test]
    async fn test_fixed_batches_never_exceed_size() {
        let store = Arc::new(flaky_store());
        let mut config = fixtures::config(7, 4);
        config.retry = config.retry.with_max_retries(10);
        let client = BatchClient::new(store.clone(), config).unwrap();

        ingest(&client, 200).await;

        let sizes = store.batch_sizes();
        assert!(sizes.iter().all(|&size| (1..=7).contains(&size)));
        assert_eq!(store.overlaps(), 0);
        assert_eq!(store.stored_count(), 200);
    }

    #[tokio::test]
    async fn test_dynamic_batches_stay_within_bounds() {
        let store = Arc::new(flaky_store());
        let mut config = fixtures::config(1, 2);
        config.batch = BatchConfig::new()
            .with_concurrency(2)
            .with_dynamic_sizing(DynamicSizing {
                min_size: 2,
                max_size: 16,
                initial_size: 8,
                target_duration_ms: 1_000,
                increase_step: 4,
                decrease_factor: 0.5,
            });
        config.retry = config.retry.with_max_retries(10);
        let client = BatchClient::new(store.clone(), config).unwrap();

        ingest(&client, 400).await;

        let sizes = store.batch_sizes();
        assert!(sizes.iter().all(|&size| (1..=16).contains(&size)));
        assert_eq!(store.overlaps(), 0);
        assert_eq!(store.stored_count(), 400);
        assert_eq!(client.summary().succeeded, 400);
    }

    #[tokio::test]
    async fn test_dynamic_batches_grow_on_clean_store() {
        let store = Arc::new(MockStore::new());
        let mut config = fixtures::config(1, 1);
        config.batch = BatchConfig::new()
            .with_concurrency(1)
            .with_max_in_flight_batches(1)
            .with_dynamic_sizing(DynamicSizing {
                min_size: 2,
                max_size: 32,
                initial_size: 4,
                target_duration_ms: 10_000,
                increase_step: 4,
                decrease_factor: 0.5,
            });
        let client = BatchClient::new(store.clone(), config).unwrap();

        ingest(&client, 500).await;

        let sizes = store.batch_sizes();
        assert!(sizes.iter().all(|&size| size <= 32));
        assert!(sizes.iter().any(|&size| size > 4));
        assert_eq!(sizes.iter().sum::<usize>(), 500);
    }
}
