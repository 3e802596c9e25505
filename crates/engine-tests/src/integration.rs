#[cfg(test)]
mod tests {
    use crate::utils::{
        ConcurrencyProbe, FailingSegment, RecordingWriter, ScriptedPages, SlowWriter,
        UnprocessedOnce, item, seeded_store,
    };
    use engine_config::settings::RawSettings;
    use engine_core::{
        connectors::{memory::KeySchema, source::PageSource},
        error::StoreError,
        retry::RetryPolicy,
    };
    use engine_processing::{
        batch::writer::BatchWriter, copy::policy::ErrorPolicy, error::ProcessingError,
        iter::limited::iterate, scan::parallel::ParallelScan,
    };
    use engine_runtime::Client;
    use model::{
        pagination::{cursor::ContinuationToken, descriptor::ScanDescriptor, page::Page},
        records::{key::FieldsExtractor, row::Row, write::WriteRequest},
    };
    use std::{
        sync::{Arc, Mutex, atomic::Ordering},
        time::Duration,
    };
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    // Scenario: 57 puts go through a client with default settings.
    // Expected Outcome: three store calls of 25, 25 and 7 requests, in order.
    #[traced_test]
    #[tokio::test]
    async fn batch_write_chunks_to_store_limit() {
        let store = seeded_store("t", 0, 100).await;
        let client = Client::new(Arc::new(RecordingWriter::new(store.clone())));
        let rows: Vec<Row> = (0..57).map(item).collect();

        let written = client
            .batch_put("t", rows, &CancellationToken::new())
            .await
            .expect("batch put");

        assert_eq!(written, 57);
        assert_eq!(client.store().batch_sizes(), vec![25, 25, 7]);
        assert_eq!(store.item_count("t").await.unwrap(), 57);
    }

    // Test Settings: batch.max_batch_size = 10.
    // Scenario: 23 puts through a client built from JSON settings.
    // Expected Outcome: batches of 10, 10 and 3.
    #[traced_test]
    #[tokio::test]
    async fn batch_size_follows_settings() {
        let settings = RawSettings::from_json_str(r#"{ "batch": { "max_batch_size": 10 } }"#)
            .expect("parse settings")
            .validate()
            .expect("valid settings");
        let store = seeded_store("t", 0, 100).await;
        let client = Client::with_settings(Arc::new(RecordingWriter::new(store)), settings);

        client
            .batch_put("t", (0..23).map(item).collect(), &CancellationToken::new())
            .await
            .expect("batch put");

        assert_eq!(client.store().batch_sizes(), vec![10, 10, 3]);
    }

    // Scenario: the store leaves 5 of 20 requests unprocessed on the first call.
    // Expected Outcome: one resubmission of exactly those 5, every item applied.
    #[traced_test]
    #[tokio::test]
    async fn unprocessed_items_converge_in_two_rounds() {
        let store = seeded_store("t", 0, 100).await;
        let flaky = Arc::new(UnprocessedOnce::new(store.clone(), 5));
        let writer = BatchWriter::new(flaky.clone()).with_retry(RetryPolicy::immediate(3));
        let requests: Vec<WriteRequest> = (0..20).map(|i| WriteRequest::put(item(i))).collect();

        let written = writer
            .write("t", requests, &CancellationToken::new())
            .await
            .expect("write converges");

        assert_eq!(written, 20);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.item_count("t").await.unwrap(), 20);
        assert_eq!(writer.metrics().snapshot().unprocessed_retries, 5);
        assert!(logs_contain("resubmitting"));
    }

    // Scenario: 4 segments, segment 2 fails on its first page.
    // Expected Outcome: the store error is returned and the other workers
    // stop within one further request each.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_scan_surfaces_segment_failure() {
        let store = seeded_store("t", 60, 2).await;
        let failing = Arc::new(FailingSegment::new(store, 2, Duration::from_millis(5)));
        let source: Arc<dyn PageSource> = failing.clone();

        let err = ParallelScan::new(source, 4)
            .run(
                ScanDescriptor::new("t"),
                |_page: Page| async { Ok::<(), ProcessingError>(()) },
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            ProcessingError::Store { table, source } => {
                assert_eq!(table, "t");
                assert!(matches!(source, StoreError::Transport(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(failing.calls_after_failure.load(Ordering::SeqCst) <= 3);
        assert!(logs_contain("Parallel scan failed"));
    }

    // Test Settings: 8 segments, callback serialization on, page size 3.
    // Scenario: a callback that yields mid-way records every row it sees.
    // Expected Outcome: all 100 rows exactly once, never two callbacks at once.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn serialized_callback_never_overlaps() {
        let store = seeded_store("t", 100, 3).await;
        let client = Client::new(store);
        let probe = Arc::new(ConcurrencyProbe::default());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let callback = {
            let probe = probe.clone();
            let seen = seen.clone();
            move |page: Page| {
                let probe = probe.clone();
                let seen = seen.clone();
                async move {
                    let _inside = probe.enter();
                    tokio::task::yield_now().await;
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    let keys = page.rows.iter().filter_map(|r| r.get("SK")?.as_i64());
                    seen.lock().expect("seen lock").extend(keys);
                    Ok::<(), ProcessingError>(())
                }
            }
        };

        client
            .parallel_scan(
                ScanDescriptor::new("t"),
                8,
                callback,
                true,
                &CancellationToken::new(),
            )
            .await
            .expect("scan");

        let mut keys = seen.lock().unwrap().clone();
        keys.sort_unstable();
        assert_eq!(keys, (0..100).collect::<Vec<i64>>());
        assert_eq!(probe.peak(), 1);
        assert_eq!(client.metrics().snapshot().rows_read, 100);
    }

    // Scenario: the same 10-row table is copied twice into one destination.
    // Expected Outcome: the destination holds 10 items after both runs.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn copy_table_is_idempotent() {
        let store = seeded_store("src", 10, 4).await;
        store.create_table("dst", KeySchema::composite("PK", "SK")).await;
        let client = Client::new(store.clone());
        let token = CancellationToken::new();

        for _ in 0..2 {
            let report = client
                .copy_table("dst", "src", 3, ErrorPolicy::Abort, &token)
                .await
                .expect("copy");
            assert_eq!(report.rows_written, 10);
            assert_eq!(report.rows_failed, 0);
        }

        assert_eq!(store.item_count("dst").await.unwrap(), 10);
        assert!(logs_contain("Table copy finished"));
    }

    // Scenario: the caller cancels while a slow destination is being written.
    // Expected Outcome: the copy stops with a cancellation error and has not
    // written the whole table.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn copy_table_stops_on_cancel() {
        let store = seeded_store("src", 50, 5).await;
        store.create_table("dst", KeySchema::composite("PK", "SK")).await;
        let slow = Arc::new(SlowWriter {
            inner: store.clone(),
            delay: Duration::from_millis(50),
        });
        let client = Client::new(store.clone());
        let token = CancellationToken::new();

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let err = client
            .copy_table_to(slow, "dst", "src", 2, ErrorPolicy::Abort, &token)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(store.item_count("dst").await.unwrap() < 50);
    }

    // Scenario: 3 pages of 10 rows each, total limit 15, cursor on PK and SK.
    // Expected Outcome: two callbacks, the second trimmed to 5 rows with a
    // token pointing at the 15th row; the third page is never requested.
    #[traced_test]
    #[tokio::test]
    async fn limit_trims_last_page_and_rebuilds_token() {
        let pages = Arc::new(ScriptedPages::new(3, 10));
        let mut delivered: Vec<Page> = Vec::new();

        let seen = iterate(
            pages.clone(),
            ScanDescriptor::new("t").with_limit(15),
            None,
            vec!["PK".to_string(), "SK".to_string()],
            |page| {
                delivered.push(page);
                Ok(())
            },
            &CancellationToken::new(),
        )
        .await
        .expect("iterate");

        assert_eq!(seen, 15);
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].len(), 10);
        assert_eq!(delivered[1].len(), 5);
        assert_eq!(
            delivered[1].next,
            Some(ContinuationToken::new(
                Row::new().with("PK", "p").with("SK", 14i64)
            ))
        );
        assert_eq!(pages.requests.load(Ordering::SeqCst), 2);
    }

    // Scenario: a 12-row table fits on one page and is swept.
    // Expected Outcome: exactly one batch write carrying 12 deletes.
    #[traced_test]
    #[tokio::test]
    async fn sweep_issues_one_batch_per_page() {
        let store = seeded_store("t", 12, 100).await;
        let client = Client::new(Arc::new(RecordingWriter::new(store.clone())));

        let deleted = client
            .scan_delete(
                "t",
                ScanDescriptor::new("t"),
                &FieldsExtractor::pk_sk(),
                &CancellationToken::new(),
            )
            .await
            .expect("sweep");

        assert_eq!(deleted, 12);
        let batches = client.store().batches.lock().unwrap().clone();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 12);
        assert!(batches[0].iter().all(WriteRequest::is_delete));
        assert_eq!(store.item_count("t").await.unwrap(), 0);
        assert!(logs_contain("Sweep finished"));
    }
}
