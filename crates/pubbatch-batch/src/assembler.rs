//! Greedy, order-preserving batch assembly.
//!
//! Each article is filtered (abstract required), counted once, then placed
//! into the open batch if it fits. An article that does not fit seals the
//! open batch and starts the next one. An empty batch accepts any article,
//! so an article larger than the limit ends up alone in its own batch.
//! Filling the remaining budget exactly counts as fitting.

use pubbatch_core::{ArticleRecord, fmt_num};

use crate::batch::Batch;
use crate::metrics::{MetricsAggregator, RunSummary};
use crate::token::TokenCounter;

/// Online batch assembler.
///
/// Feed articles with [`push`](Self::push) in retrieval order; sealed
/// batches come back as they close. [`finish`](Self::finish) seals the last
/// batch and returns the run summary.
pub struct Assembler<T> {
    counter: T,
    token_limit: usize,
    open: Batch,
    metrics: MetricsAggregator,
}

impl<T: TokenCounter> Assembler<T> {
    pub fn new(counter: T, token_limit: usize) -> Self {
        Self {
            counter,
            token_limit,
            open: Batch::new(0),
            metrics: MetricsAggregator::new(token_limit),
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    /// Add one article; returns the batch it sealed, if any.
    pub fn push(&mut self, mut article: ArticleRecord) -> Option<Batch> {
        if !article.has_abstract() {
            log::debug!("PMID {}: no abstract, skipping", article.pmid());
            self.metrics.record_skip(&article);
            return None;
        }

        let counter = &self.counter;
        let tokens = article.ensure_counts(|text| counter.count(text));

        let sealed = if !self.open.is_empty() && self.open.tokens() + tokens > self.token_limit {
            Some(self.seal())
        } else {
            None
        };

        if self.open.is_empty() && tokens > self.token_limit {
            log::warn!(
                "PMID {}: {} tokens exceeds the {} token limit, emitting it as its own batch",
                article.pmid(),
                fmt_num(tokens),
                fmt_num(self.token_limit)
            );
        }

        self.metrics.record_admit(&article);
        self.open.push(article, tokens);
        sealed
    }

    fn seal(&mut self) -> Batch {
        let next = Batch::new(self.open.index() + 1);
        let batch = std::mem::replace(&mut self.open, next);
        self.metrics.record_seal(&batch);
        log::debug!(
            "batch {} sealed: {} articles, {} tokens",
            batch.index(),
            batch.len(),
            batch.tokens()
        );
        batch
    }

    /// Seal the final open batch (if any) and produce the summary.
    pub fn finish(mut self) -> (Option<Batch>, RunSummary) {
        let last = if self.open.is_empty() {
            None
        } else {
            Some(self.seal())
        };
        (last, self.metrics.finish())
    }
}

/// Batch a complete article sequence.
pub fn assemble<T: TokenCounter>(
    articles: impl IntoIterator<Item = ArticleRecord>,
    counter: T,
    token_limit: usize,
) -> (Vec<Batch>, RunSummary) {
    let mut assembler = Assembler::new(counter, token_limit);
    let mut batches: Vec<Batch> = articles
        .into_iter()
        .filter_map(|article| assembler.push(article))
        .collect();
    let (last, summary) = assembler.finish();
    batches.extend(last);
    (batches, summary)
}

/// Batch a fallible article stream.
///
/// The first error aborts assembly: batches built so far, sealed or open,
/// are dropped and the error is returned.
pub fn try_assemble<T: TokenCounter, E>(
    articles: impl IntoIterator<Item = Result<ArticleRecord, E>>,
    counter: T,
    token_limit: usize,
) -> Result<(Vec<Batch>, RunSummary), E> {
    let mut assembler = Assembler::new(counter, token_limit);
    let mut batches = Vec::new();
    for article in articles {
        match article {
            Ok(article) => batches.extend(assembler.push(article)),
            Err(e) => {
                if !batches.is_empty() {
                    log::debug!("discarding {} partial batches", batches.len());
                }
                return Err(e);
            }
        }
    }
    let (last, summary) = assembler.finish();
    batches.extend(last);
    Ok((batches, summary))
}
