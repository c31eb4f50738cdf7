//! Paginated retrieval pipeline
//!
//! Drives a [`SearchClient`] and a [`FetchClient`] across the whole result
//! set and yields article records in search order, each identifier at most
//! once. The clients are only reachable through [`Remote`], which paces
//! every call start and retries transient failures; there is no other path
//! to the network from here.
//!
//! Pagination stops when the service runs out of identifiers (an empty or
//! short page), when `max_results` identifiers have been considered, or at
//! the end of ESearch's [`SEARCH_WINDOW`]. The
//! service's total-count estimate only sizes the progress bar; a live result
//! set that grows or shrinks while paging is not an error.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::ProgressBar;
use pubbatch_core::progress::set_expected;
use pubbatch_core::{
    ArticleRecord, Clock, GaveUp, Pacer, RemoteError, RetrievalError, RetryPolicy, Stage, fmt_num,
    shutdown_flag,
};
use rustc_hash::FxHashSet;
use serde::Serialize;

use crate::client::{FetchClient, FetchedPage, SearchClient, SearchPage};
use crate::config::RetrievalConfig;

/// ESearch lists at most this many identifiers per query; `retstart`
/// above 9,998 is answered with an error payload instead of a page.
pub const SEARCH_WINDOW: usize = 9_999;

/// Remote calls, paced and retried.
struct Remote<'a, S, F, C> {
    searcher: &'a S,
    fetcher: &'a F,
    pacer: Pacer<C>,
    retry: RetryPolicy,
}

impl<S: SearchClient, F: FetchClient, C: Clock> Remote<'_, S, F, C> {
    fn call<T>(
        &self,
        stage: Stage,
        mut op: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, GaveUp> {
        self.retry.run(
            stage.label(),
            |delay| self.pacer.sleep(delay),
            || {
                self.pacer.pace();
                op()
            },
        )
    }

    fn search(&self, query: &str, offset: usize, page_size: usize) -> Result<SearchPage, GaveUp> {
        self.call(Stage::Search, || self.searcher.search(query, offset, page_size))
    }

    fn fetch(&self, ids: &[String]) -> Result<FetchedPage, GaveUp> {
        self.call(Stage::Fetch, || self.fetcher.fetch(ids))
    }
}

/// Cursor and dedup state; discarded with the pipeline.
#[derive(Debug, Default)]
struct RetrievalState {
    offset: usize,
    seen: FxHashSet<String>,
    expected: Option<usize>,
}

/// Counters describing one retrieval run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetrievalStats {
    /// Service's estimate from the first search
    pub total_count: usize,
    /// Identifiers returned across all search pages
    pub enumerated: usize,
    /// Identifiers returned more than once
    pub duplicates: usize,
    /// Unique identifiers sent to fetch
    pub considered: usize,
    /// Identifiers fetch could not resolve (skipped, not fatal)
    pub fetch_failed: usize,
    /// Records handed downstream
    pub yielded: usize,
    pub search_calls: usize,
    pub fetch_calls: usize,
}

/// Lazy, single-pass retrieval of article records for one query.
///
/// Yields `Ok(record)` in search order. A fatal failure is yielded once as
/// `Err` and ends the sequence.
pub struct Retrieval<'a, S, F, C> {
    remote: Remote<'a, S, F, C>,
    query: String,
    page_size: usize,
    max_results: usize,
    state: RetrievalState,
    buffer: VecDeque<ArticleRecord>,
    stats: RetrievalStats,
    pb: ProgressBar,
    shutdown: &'a AtomicBool,
    finished: bool,
}

impl<'a, S: SearchClient, F: FetchClient, C: Clock> Retrieval<'a, S, F, C> {
    pub fn new(
        searcher: &'a S,
        fetcher: &'a F,
        query: impl Into<String>,
        config: &RetrievalConfig,
        clock: C,
    ) -> Self {
        Self {
            remote: Remote {
                searcher,
                fetcher,
                pacer: Pacer::per_second(config.rate_limit, clock),
                retry: config.retry_policy(),
            },
            query: query.into(),
            page_size: config.page_size.max(1),
            max_results: config.max_results,
            state: RetrievalState::default(),
            buffer: VecDeque::new(),
            stats: RetrievalStats::default(),
            pb: ProgressBar::hidden(),
            shutdown: shutdown_flag(),
            finished: false,
        }
    }

    /// Report progress on `pb` (records considered / expected).
    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    /// Watch `flag` instead of the process-wide shutdown flag.
    pub fn with_shutdown_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn stats(&self) -> &RetrievalStats {
        &self.stats
    }

    fn fail(&self, stage: Stage, gave_up: GaveUp) -> RetrievalError {
        let query = self.query.clone();
        let processed = self.stats.yielded;
        if gave_up.error.is_retryable() {
            RetrievalError::Exhausted {
                stage,
                query,
                processed,
                attempts: gave_up.attempts,
                source: gave_up.error,
            }
        } else {
            RetrievalError::Rejected {
                stage,
                query,
                processed,
                source: gave_up.error,
            }
        }
    }

    fn check_shutdown(&self, stage: Stage) -> Result<(), RetrievalError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(RetrievalError::Interrupted {
                stage,
                query: self.query.clone(),
                processed: self.stats.yielded,
            });
        }
        Ok(())
    }

    fn finish(&mut self) {
        self.finished = true;
        self.pb.finish_and_clear();
        log::info!(
            "Retrieved {} records ({} unresolved, {} duplicate ids) in {} search + {} fetch calls",
            fmt_num(self.stats.considered - self.stats.fetch_failed),
            self.stats.fetch_failed,
            self.stats.duplicates,
            self.stats.search_calls,
            self.stats.fetch_calls
        );
    }

    /// Search one page, fetch its new identifiers, buffer the records.
    fn next_page(&mut self) -> Result<(), RetrievalError> {
        let remaining = self.max_results.saturating_sub(self.state.seen.len());
        if remaining == 0 {
            self.finish();
            return Ok(());
        }
        let window_left = SEARCH_WINDOW.saturating_sub(self.state.offset);
        if window_left == 0 {
            log::warn!(
                "Stopping at ESearch's {}-id window; {} of {} matching articles were not listed",
                fmt_num(SEARCH_WINDOW),
                fmt_num(self.stats.total_count.saturating_sub(self.state.offset)),
                fmt_num(self.stats.total_count)
            );
            self.finish();
            return Ok(());
        }

        self.check_shutdown(Stage::Search)?;
        let request = self.page_size.min(remaining).min(window_left);
        let page = self
            .remote
            .search(&self.query, self.state.offset, request)
            .map_err(|g| self.fail(Stage::Search, g))?;
        self.stats.search_calls += 1;

        if self.state.expected.is_none() {
            self.state.expected = Some(page.total_count);
            self.stats.total_count = page.total_count;
            log::info!(
                "{} articles match; considering up to {}",
                fmt_num(page.total_count),
                fmt_num(page.total_count.min(self.max_results))
            );
            if page.total_count == 0 {
                self.finish();
                return Ok(());
            }
            set_expected(&self.pb, page.total_count.min(self.max_results) as u64);
        }

        let returned = page.ids.len();
        self.state.offset += returned;
        self.stats.enumerated += returned;

        let mut new_ids = Vec::with_capacity(returned.min(remaining));
        for id in page.ids {
            if new_ids.len() >= remaining {
                break;
            }
            if self.state.seen.contains(&id) {
                self.stats.duplicates += 1;
                log::debug!("PMID {id}: already seen on an earlier page");
            } else {
                self.state.seen.insert(id.clone());
                new_ids.push(id);
            }
        }

        if !new_ids.is_empty() {
            self.check_shutdown(Stage::Fetch)?;
            let mut fetched = self
                .remote
                .fetch(&new_ids)
                .map_err(|g| self.fail(Stage::Fetch, g))?;
            self.stats.fetch_calls += 1;
            self.stats.considered += new_ids.len();

            for id in &new_ids {
                match fetched.records.remove(id) {
                    Some(record) => self.buffer.push_back(record),
                    None => {
                        self.stats.fetch_failed += 1;
                        log::warn!("PMID {id}: not returned by fetch, skipping");
                    }
                }
            }
            self.pb.inc(new_ids.len() as u64);
        }

        let exhausted = returned < request;
        if exhausted {
            let expected = self.state.expected.unwrap_or(0);
            if self.state.offset < expected && self.state.seen.len() < self.max_results {
                log::warn!(
                    "Search listed {} of {} expected ids; continuing with what was enumerated",
                    fmt_num(self.state.offset),
                    fmt_num(expected)
                );
            }
        }
        if exhausted || self.state.seen.len() >= self.max_results {
            self.finish();
        }
        Ok(())
    }
}

impl<S: SearchClient, F: FetchClient, C: Clock> Iterator for Retrieval<'_, S, F, C> {
    type Item = Result<ArticleRecord, RetrievalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                self.stats.yielded += 1;
                return Some(Ok(record));
            }
            if self.finished {
                return None;
            }
            if let Err(e) = self.next_page() {
                self.finished = true;
                self.buffer.clear();
                self.pb.abandon();
                return Some(Err(e));
            }
        }
    }
}

/// Run a retrieval to completion, collecting every record.
pub fn retrieve<S: SearchClient, F: FetchClient, C: Clock>(
    searcher: &S,
    fetcher: &F,
    query: &str,
    config: &RetrievalConfig,
    clock: C,
) -> Result<(Vec<ArticleRecord>, RetrievalStats), RetrievalError> {
    let mut retrieval = Retrieval::new(searcher, fetcher, query, config, clock);
    let records = retrieval.by_ref().collect::<Result<Vec<_>, _>>()?;
    Ok((records, retrieval.stats))
}
