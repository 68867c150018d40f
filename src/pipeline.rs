use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{Datelike as _, NaiveDate};
use futures::Stream;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, RetrieveConfig};
use crate::dates;
use crate::extract::{ExtractionError, RecordExtractor};
use crate::fetch::{FetchError, FetchOutcome, Fetcher, Transport};
use crate::model::{PageRef, Record};
use crate::paginate::{PaginationError, Paginator};

#[derive(Debug)]
pub enum PageResult {
    Record(Record),
    Failure(PageFailure),
}

#[derive(Debug)]
pub struct PageFailure {
    pub page_ref: PageRef,
    pub kind: FailureKind,
}

#[derive(Debug, Error)]
pub enum FailureKind {
    #[error("fetch failed after {attempts} attempt(s): {error}")]
    Fetch { attempts: u32, error: FetchError },
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub listing_pages_visited: u32,
    pub detail_pages_visited: u64,
    pub records_yielded: u64,
    pub failures: u64,
    pub failed_urls: Vec<String>,
    pub out_of_range: u64,
    pub duplicates: u64,
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled(RunSummary),
    #[error("listing traversal failed")]
    Listing {
        #[source]
        source: PaginationError,
        summary: RunSummary,
    },
    #[error("pipeline driver failed: {0}")]
    Driver(String),
}

impl RunError {
    /// The partial summary, when the run got far enough to have one.
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunError::Cancelled(summary) | RunError::Listing { summary, .. } => Some(summary),
            RunError::Driver(_) => None,
        }
    }
}

pub struct Pipeline {
    config: RetrieveConfig,
    link_pattern: regex::Regex,
    fetcher: Fetcher,
    extractor: Arc<RecordExtractor>,
}

impl Pipeline {
    pub fn new(config: RetrieveConfig, transport: Arc<dyn Transport>) -> Result<Self, ConfigError> {
        let link_pattern = config.validate()?;
        let fetcher = Fetcher::new(transport, config.retry.clone());
        let extractor = Arc::new(RecordExtractor::new(config.reference_date));
        Ok(Self {
            config,
            link_pattern,
            fetcher,
            extractor,
        })
    }

    /// Spawns the run. Results arrive through the returned handle; cancelling
    /// `cancel` stops new fetches and lets in-flight ones finish and be emitted.
    pub fn start(self, cancel: CancellationToken) -> RunHandle {
        let cancel = cancel.child_token();
        let capacity = self.config.max_concurrent_fetches.saturating_mul(2).max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let driver = tokio::spawn(self.drive(cancel.clone(), tx));
        RunHandle {
            receiver: rx,
            driver,
            cancel,
        }
    }

    async fn drive(
        self,
        cancel: CancellationToken,
        tx: mpsc::Sender<PageResult>,
    ) -> Result<RunSummary, RunError> {
        let limit = self.config.max_concurrent_fetches;
        let mut paginator = Paginator::new(
            self.fetcher.clone(),
            self.config.listing_url.clone(),
            self.link_pattern.clone(),
            self.config.max_pages,
            self.config.from_date,
            self.config.reference_date.year(),
        );
        let mut emitter = Emitter {
            tx,
            cancel: cancel.clone(),
            from: self.config.from_date,
            to: self.config.to_date,
            seen_cases: HashSet::new(),
            summary: RunSummary::default(),
        };
        let mut reorder = self.config.ordered.then(ReorderBuffer::default);
        let mut pending = VecDeque::<PageRef>::new();
        let mut join_set = JoinSet::new();
        let mut listing_error = None;

        tracing::info!(
            url = %self.config.listing_url,
            concurrency = limit,
            ordered = self.config.ordered,
            "retrieval started"
        );

        loop {
            while !cancel.is_cancelled() && join_set.len() < limit {
                if let Some(page_ref) = pending.pop_front() {
                    join_set.spawn(fetch_detail(
                        self.fetcher.clone(),
                        Arc::clone(&self.extractor),
                        page_ref,
                    ));
                    continue;
                }
                if listing_error.is_some() || paginator.is_finished() {
                    break;
                }

                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = paginator.next_page() => next,
                };
                match next {
                    Ok(Some(page)) => {
                        emitter.summary.listing_pages_visited += 1;
                        pending.extend(page.refs);
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::error!(
                            error = %err,
                            cause = %err.fetch_error(),
                            "listing traversal failed"
                        );
                        listing_error = Some(err);
                    }
                }
            }

            if join_set.is_empty() {
                let listing_done = listing_error.is_some() || paginator.is_finished();
                if cancel.is_cancelled() || (pending.is_empty() && listing_done) {
                    break;
                }
                continue;
            }

            let Some(joined) = join_set.join_next().await else {
                continue;
            };
            let (seq, result) = joined.map_err(|err| RunError::Driver(err.to_string()))?;
            emitter.summary.detail_pages_visited += 1;

            match reorder.as_mut() {
                Some(buffer) => {
                    for ready in buffer.push(seq, result) {
                        emitter.emit(ready).await;
                    }
                }
                None => emitter.emit(result).await,
            }
        }

        if let Some(buffer) = reorder.take() {
            for held in buffer.drain() {
                emitter.emit(held).await;
            }
        }

        let Emitter { tx, mut summary, .. } = emitter;
        drop(tx);
        summary.cancelled = cancel.is_cancelled();
        tracing::info!(
            listing_pages = summary.listing_pages_visited,
            detail_pages = summary.detail_pages_visited,
            records = summary.records_yielded,
            failures = summary.failures,
            out_of_range = summary.out_of_range,
            duplicates = summary.duplicates,
            cancelled = summary.cancelled,
            "retrieval finished"
        );

        if let Some(source) = listing_error {
            return Err(RunError::Listing { source, summary });
        }
        if summary.cancelled {
            return Err(RunError::Cancelled(summary));
        }
        Ok(summary)
    }
}

/// Runs to completion even after cancellation, so an admitted page is
/// always reported.
async fn fetch_detail(
    fetcher: Fetcher,
    extractor: Arc<RecordExtractor>,
    page_ref: PageRef,
) -> (u64, PageResult) {
    let seq = page_ref.seq;
    let kind = match fetcher.fetch(&page_ref.url).await {
        FetchOutcome::Success(body) => match extractor.extract(&body) {
            Ok(mut record) => {
                record.link = Some(page_ref.url.to_string());
                return (seq, PageResult::Record(record));
            }
            Err(err) => FailureKind::Extraction(err),
        },
        FetchOutcome::Terminal { attempts, error } => FailureKind::Fetch { attempts, error },
        FetchOutcome::Exhausted {
            attempts,
            last_error,
        } => FailureKind::Fetch {
            attempts,
            error: last_error,
        },
    };
    tracing::warn!(url = %page_ref.url, error = %kind, "detail page failed");
    (seq, PageResult::Failure(PageFailure { page_ref, kind }))
}

struct Emitter {
    tx: mpsc::Sender<PageResult>,
    cancel: CancellationToken,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    seen_cases: HashSet<String>,
    summary: RunSummary,
}

impl Emitter {
    async fn emit(&mut self, result: PageResult) {
        match &result {
            PageResult::Record(record) => {
                if let Some(date) = record.date
                    && !dates::is_between(date, self.from, self.to)
                {
                    tracing::debug!(date = %date, link = ?record.link, "record outside date range");
                    self.summary.out_of_range += 1;
                    return;
                }
                if let Some(case) = record.case_number.as_deref()
                    && !self.seen_cases.insert(case.to_string())
                {
                    tracing::debug!(case = case, link = ?record.link, "duplicate case skipped");
                    self.summary.duplicates += 1;
                    return;
                }
                self.summary.records_yielded += 1;
            }
            PageResult::Failure(failure) => {
                self.summary.failures += 1;
                self.summary.failed_urls.push(failure.page_ref.url.to_string());
            }
        }

        if self.tx.send(result).await.is_err() && !self.cancel.is_cancelled() {
            tracing::info!("result receiver dropped; cancelling run");
            self.cancel.cancel();
        }
    }
}

/// Holds completed results until every earlier sequence number is in.
/// Pages never admitted (after cancellation) leave gaps that `drain` skips.
#[derive(Default)]
struct ReorderBuffer {
    next: u64,
    held: BTreeMap<u64, PageResult>,
}

impl ReorderBuffer {
    fn push(&mut self, seq: u64, result: PageResult) -> Vec<PageResult> {
        self.held.insert(seq, result);
        let mut ready = Vec::new();
        while let Some(result) = self.held.remove(&self.next) {
            ready.push(result);
            self.next += 1;
        }
        ready
    }

    fn drain(self) -> impl Iterator<Item = PageResult> {
        self.held.into_values()
    }
}

pub struct RunHandle {
    receiver: mpsc::Receiver<PageResult>,
    driver: JoinHandle<Result<RunSummary, RunError>>,
    cancel: CancellationToken,
}

impl RunHandle {
    pub async fn next(&mut self) -> Option<PageResult> {
        self.receiver.recv().await
    }

    pub fn results(&mut self) -> impl Stream<Item = PageResult> + '_ {
        futures::stream::poll_fn(move |cx| self.receiver.poll_recv(cx))
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the run to end. Results not yet consumed are discarded.
    pub async fn finish(mut self) -> Result<RunSummary, RunError> {
        let mut discarded = 0usize;
        while self.receiver.recv().await.is_some() {
            discarded += 1;
        }
        if discarded > 0 {
            tracing::debug!(discarded = discarded, "unconsumed results discarded");
        }
        self.driver
            .await
            .map_err(|err| RunError::Driver(err.to_string()))?
    }

    /// Consumes every result, then returns them along with the run's outcome.
    pub async fn collect(mut self) -> (Vec<PageResult>, Result<RunSummary, RunError>) {
        let mut results = Vec::new();
        while let Some(result) = self.next().await {
            results.push(result);
        }
        let outcome = self.finish().await;
        (results, outcome)
    }
}
