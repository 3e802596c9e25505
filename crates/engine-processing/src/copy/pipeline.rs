use crate::{
    copy::{
        policy::{ErrorAction, ErrorPolicy},
        report::CopyReport,
    },
    error::ProcessingError,
    scan::parallel::ParallelScan,
};
use engine_config::settings::validated::ValidatedSettings;
use engine_core::{
    connectors::{destination::ItemWriter, source::PageSource},
    metrics::Metrics,
};
use model::{
    core::error::ConfigError,
    pagination::{descriptor::ScanDescriptor, page::Page},
    records::row::Row,
};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, error::TrySendError},
    },
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Copies every item of one table into another with a parallel scan
/// feeding a pool of single-item writers through a bounded channel.
///
/// Writes overwrite, so re-running a copy after a failure is safe. Nothing
/// written before a failure is rolled back.
pub struct CopyJob {
    source: Arc<dyn PageSource>,
    source_table: String,
    destination: Arc<dyn ItemWriter>,
    destination_table: String,
    workers: usize,
    channel_capacity: usize,
    policy: ErrorPolicy,
    in_flight: Arc<AtomicUsize>,
    metrics: Metrics,
}

impl CopyJob {
    pub fn new(
        source: Arc<dyn PageSource>,
        source_table: impl Into<String>,
        destination: Arc<dyn ItemWriter>,
        destination_table: impl Into<String>,
    ) -> Self {
        Self {
            source,
            source_table: source_table.into(),
            destination,
            destination_table: destination_table.into(),
            workers: 4,
            channel_capacity: 4,
            policy: ErrorPolicy::default(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            metrics: Metrics::new(),
        }
    }

    pub fn with_settings(self, settings: &ValidatedSettings) -> Self {
        self.with_workers(settings.workers())
            .with_channel_capacity(settings.channel_capacity())
    }

    /// Writer tasks and scan segments. Also resets the channel capacity to match.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self.channel_capacity = workers.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Counters every run adds its totals to once it ends.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Writes currently in progress.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Totals across every finished run. Each [`CopyReport`] covers only its own run.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<CopyReport, ProcessingError> {
        if self.source_table.is_empty() || self.destination_table.is_empty() {
            return Err(ConfigError::EmptyTableName.into());
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidSegmentCount(0).into());
        }

        let started_at = chrono::Utc::now();
        let run_metrics = Metrics::new();
        let token = cancel.child_token();
        let _guard = token.clone().drop_guard();

        info!(
            source = %self.source_table,
            destination = %self.destination_table,
            workers = self.workers,
            "Starting table copy"
        );

        let (row_tx, row_rx) = mpsc::channel::<Row>(self.channel_capacity);
        let (err_tx, mut err_rx) = mpsc::channel::<ProcessingError>(self.workers);
        let row_rx = Arc::new(Mutex::new(row_rx));

        let mut tasks = JoinSet::new();
        tasks.spawn(self.read_rows(row_tx, err_tx.clone(), token.clone(), run_metrics.clone()));
        for worker in 0..self.workers {
            tasks.spawn(self.write_rows(
                worker,
                row_rx.clone(),
                err_tx.clone(),
                token.clone(),
                run_metrics.clone(),
            ));
        }
        drop(err_tx);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(in_flight = self.in_flight(), "Copy cancelled by caller");
                    break Err(ProcessingError::Cancelled);
                }
                Some(err) = err_rx.recv() => {
                    if let Err(err) = self.apply_policy(err) {
                        break Err(err);
                    }
                }
                joined = tasks.join_next() => match joined {
                    None => break Ok(()),
                    Some(Ok(())) => {}
                    Some(Err(e)) => break Err(ProcessingError::TaskJoin(e)),
                },
            }
        };

        // Errors reported just before the last task exited.
        let outcome = outcome.and_then(|()| {
            while let Ok(err) = err_rx.try_recv() {
                self.apply_policy(err)?;
            }
            Ok(())
        });

        if let Err(e) = outcome {
            token.cancel();
            debug!(in_flight = self.in_flight(), "Waiting for copy tasks to drain");
            while let Some(joined) = tasks.join_next().await {
                if let Err(join_err) = joined {
                    warn!(error = %join_err, "Copy task ended abnormally while draining");
                }
            }
            self.metrics.absorb(&run_metrics.snapshot());
            error!(
                source = %self.source_table,
                destination = %self.destination_table,
                error = %e,
                "Table copy aborted"
            );
            return Err(e);
        }

        let snapshot = run_metrics.snapshot();
        self.metrics.absorb(&snapshot);
        let report = CopyReport::from_snapshot(snapshot, started_at, chrono::Utc::now());
        info!(
            source = %self.source_table,
            destination = %self.destination_table,
            rows_read = report.rows_read,
            rows_written = report.rows_written,
            rows_failed = report.rows_failed,
            "Table copy finished"
        );
        Ok(report)
    }

    fn apply_policy(&self, err: ProcessingError) -> Result<(), ProcessingError> {
        match self.policy.decide(&err) {
            ErrorAction::Abort => Err(err),
            ErrorAction::Continue => {
                warn!(error = %err, "Copy error skipped by policy");
                Ok(())
            }
        }
    }

    /// Scans the source and pushes every row into the channel. The channel
    /// closes when this task finishes, which lets the writers run dry.
    fn read_rows(
        &self,
        row_tx: mpsc::Sender<Row>,
        err_tx: mpsc::Sender<ProcessingError>,
        token: CancellationToken,
        metrics: Metrics,
    ) -> impl Future<Output = ()> + Send + use<> {
        let scan = ParallelScan::new(self.source.clone(), self.workers)
            .serialize_callback(true)
            .with_metrics(metrics);
        let request = ScanDescriptor::new(self.source_table.clone());

        async move {
            let send_token = token.clone();
            let result = scan
                .run(
                    request,
                    move |page: Page| {
                        let row_tx = row_tx.clone();
                        let token = send_token.clone();
                        async move {
                            for row in page.rows {
                                tokio::select! {
                                    _ = token.cancelled() => return Err(ProcessingError::Cancelled),
                                    sent = row_tx.send(row) => {
                                        sent.map_err(|_| ProcessingError::ChannelClosed)?
                                    }
                                }
                            }
                            Ok(())
                        }
                    },
                    &token,
                )
                .await;

            debug!("Copy reader finished");
            if let Err(e) = result {
                if !token.is_cancelled() {
                    tokio::select! {
                        _ = token.cancelled() => {}
                        _ = err_tx.send(e) => {}
                    }
                }
            }
        }
    }

    fn write_rows(
        &self,
        worker: usize,
        row_rx: Arc<Mutex<mpsc::Receiver<Row>>>,
        err_tx: mpsc::Sender<ProcessingError>,
        token: CancellationToken,
        metrics: Metrics,
    ) -> impl Future<Output = ()> + Send + use<> {
        let destination = self.destination.clone();
        let table = self.destination_table.clone();
        let in_flight = self.in_flight.clone();

        async move {
            loop {
                let next = {
                    let mut rx = row_rx.lock().await;
                    tokio::select! {
                        _ = token.cancelled() => None,
                        row = rx.recv() => row,
                    }
                };
                let Some(row) = next else {
                    break;
                };

                in_flight.fetch_add(1, Ordering::SeqCst);
                let result = tokio::select! {
                    _ = token.cancelled() => None,
                    res = destination.put_item(&table, row) => Some(res),
                };
                in_flight.fetch_sub(1, Ordering::SeqCst);

                match result {
                    None => break,
                    Some(Ok(())) => metrics.increment_written(1),
                    Some(Err(e)) => {
                        metrics.increment_failures(1);
                        let err = ProcessingError::store(&table, e);
                        if let Err(TrySendError::Full(err)) = err_tx.try_send(err) {
                            warn!(worker, error = %err, "Error channel busy, dropping copy error");
                        }
                    }
                }
            }
            debug!(worker, "Copy writer finished");
        }
    }
}
