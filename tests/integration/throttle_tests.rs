//! Concurrency, rate limit and backpressure tests
//!
//! All tests run on paused time so latencies are exact.

#[cfg(test)]
mod tests {
    use crate::assert_ok;
    use crate::common::MockStore;
    use crate::common::fixtures::{self, article};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;
    use vecbatch::BatchClient;
    use vecbatch::config::RateLimitConfig;

    const LATENCY: Duration = Duration::from_secs(1);

    /// Send `batches` full batches of ten through `concurrency` workers
    async fn timed_run(concurrency: usize, batches: usize) -> (Duration, Arc<MockStore>) {
        let store = Arc::new(MockStore::new().with_latency(LATENCY));
        let client = BatchClient::new(store.clone(), fixtures::config(10, concurrency)).unwrap();

        let start = Instant::now();
        assert_ok!(
            client
                .with_session(async |session| {
                    for n in 0..batches * 10 {
                        session.add_object(article(n)).await?;
                    }
                    Ok(())
                })
                .await
        );
        (start.elapsed(), store)
    }

    // ==================== Worker Pool ====================

    #[tokio::test(start_paused = true)]
    async fn test_two_workers_halve_wall_time() {
        let (elapsed, store) = timed_run(2, 6).await;

        assert!(elapsed >= 3 * LATENCY, "finished too early: {:?}", elapsed);
        assert!(elapsed < 4 * LATENCY, "no parallelism: {:?}", elapsed);
        assert_eq!(store.peak_in_flight(), 2);
        assert_eq!(store.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_odd_batch_count_rounds_up() {
        let (elapsed, store) = timed_run(2, 5).await;

        assert!(elapsed >= 3 * LATENCY);
        assert!(elapsed < 4 * LATENCY);
        assert_eq!(store.peak_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_worker_is_sequential() {
        let (elapsed, store) = timed_run(1, 4).await;

        assert!(elapsed >= 4 * LATENCY);
        assert!(elapsed < 5 * LATENCY);
        assert_eq!(store.peak_in_flight(), 1);
    }

    // ==================== Rate Limit ====================

    #[tokio::test(start_paused = true)]
    async fn test_requests_per_minute_budget() {
        let store = Arc::new(MockStore::new());
        let mut config = fixtures::config(2, 2);
        config.rate_limit = RateLimitConfig::new().with_requests_per_minute(2);
        let client = BatchClient::new(store.clone(), config).unwrap();

        let start = Instant::now();
        assert_ok!(
            client
                .with_session(async |session| {
                    for n in 0..6 {
                        session.add_object(article(n)).await?;
                    }
                    Ok(())
                })
                .await
        );

        assert_eq!(store.calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(start.elapsed() < Duration::from_secs(120));
    }

    // ==================== Store Backlog ====================

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_pauses_while_store_backlogged() {
        let store = Arc::new(MockStore::new());
        store.set_backlog(1_000);
        let mut config = fixtures::config(2, 1);
        config.rate_limit = RateLimitConfig::new()
            .with_max_queue_depth(100)
            .with_poll_interval(Duration::from_millis(100));
        let client = BatchClient::new(store.clone(), config).unwrap();

        let session = client.session();
        assert_ok!(session.add_object(article(0)).await);
        tokio::time::sleep(Duration::from_millis(350)).await;

        // Completes a batch while the backlog is above the threshold
        assert_ok!(session.add_object(article(1)).await);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.calls(), 0);
        assert!(store.shard_polls() > 1);

        store.set_backlog(0);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(store.calls(), 1);

        let summary = assert_ok!(session.close().await);
        assert_eq!(summary.succeeded, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_queue_blocks_producer() {
        let store = Arc::new(MockStore::new().with_latency(LATENCY));
        let mut config = fixtures::config(5, 1);
        config.batch = config
            .batch
            .with_max_queue_len(5)
            .with_max_in_flight_batches(1);
        let client = BatchClient::new(store.clone(), config).unwrap();

        let start = Instant::now();
        let session = client.session();
        for n in 0..30 {
            assert_ok!(session.add_object(article(n)).await);
        }
        let producer_time = start.elapsed();
        assert_ok!(session.close().await);

        // The producer had to wait for earlier batches to go out
        assert!(producer_time >= LATENCY, "producer never blocked: {:?}", producer_time);
        assert_eq!(store.stored_count(), 30);
    }
}
