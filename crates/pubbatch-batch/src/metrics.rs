//! Run statistics for batch assembly.
//!
//! [`MetricsAggregator`] observes assembler events as they happen and
//! produces a [`RunSummary`]. [`RunSummary::from_batches`] computes the same
//! summary from the finished batches in one pass; both paths must agree.

use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use pubbatch_core::{ArticleRecord, fmt_num};
use serde::Serialize;

use crate::batch::Batch;

/// Single-writer accumulator fed by the assembler.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    token_limit: usize,
    articles_seen: usize,
    skipped_no_abstract: usize,
    fetch_failed: usize,
    admitted: usize,
    total_tokens: usize,
    total_words: usize,
    batch_tokens: Vec<usize>,
    batch_articles: Vec<usize>,
    oversized_batches: usize,
}

impl MetricsAggregator {
    pub fn new(token_limit: usize) -> Self {
        Self {
            token_limit,
            articles_seen: 0,
            skipped_no_abstract: 0,
            fetch_failed: 0,
            admitted: 0,
            total_tokens: 0,
            total_words: 0,
            batch_tokens: Vec::new(),
            batch_articles: Vec::new(),
            oversized_batches: 0,
        }
    }

    /// Article discarded for lacking an abstract
    pub fn record_skip(&mut self, _article: &ArticleRecord) {
        self.articles_seen += 1;
        self.skipped_no_abstract += 1;
    }

    /// Article placed into the open batch (counts already computed)
    pub fn record_admit(&mut self, article: &ArticleRecord) {
        self.articles_seen += 1;
        self.admitted += 1;
        self.total_tokens += article.token_count().unwrap_or(0);
        self.total_words += article.word_count().unwrap_or(0);
    }

    pub fn record_seal(&mut self, batch: &Batch) {
        self.batch_tokens.push(batch.tokens());
        self.batch_articles.push(batch.len());
        if batch.is_oversized(self.token_limit) {
            self.oversized_batches += 1;
        }
    }

    /// Identifiers retrieval could not resolve, reported alongside the run
    pub fn record_fetch_failures(&mut self, count: usize) {
        self.fetch_failed += count;
    }

    pub fn finish(self) -> RunSummary {
        RunSummary::build(
            self.token_limit,
            self.articles_seen,
            self.skipped_no_abstract,
            self.fetch_failed,
            self.total_tokens,
            self.total_words,
            self.batch_tokens,
            self.batch_articles,
            self.oversized_batches,
        )
    }
}

/// Final, immutable statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub token_limit: usize,
    /// Articles handed to the assembler
    pub articles_seen: usize,
    pub articles_admitted: usize,
    pub skipped_no_abstract: usize,
    /// Identifiers dropped during retrieval
    pub fetch_failed: usize,
    pub batch_count: usize,
    pub oversized_batches: usize,
    pub total_tokens: usize,
    pub total_words: usize,
    pub min_batch_tokens: usize,
    pub max_batch_tokens: usize,
    pub avg_batch_tokens: f64,
    pub avg_article_tokens: f64,
    pub avg_article_words: f64,
    /// Token total per batch, in batch order
    pub batch_tokens: Vec<usize>,
    /// Article count per batch, in batch order
    pub batch_articles: Vec<usize>,
}

impl RunSummary {
    #[allow(clippy::too_many_arguments)]
    fn build(
        token_limit: usize,
        articles_seen: usize,
        skipped_no_abstract: usize,
        fetch_failed: usize,
        total_tokens: usize,
        total_words: usize,
        batch_tokens: Vec<usize>,
        batch_articles: Vec<usize>,
        oversized_batches: usize,
    ) -> Self {
        let articles_admitted = articles_seen - skipped_no_abstract;
        Self {
            token_limit,
            articles_seen,
            articles_admitted,
            skipped_no_abstract,
            fetch_failed,
            batch_count: batch_tokens.len(),
            oversized_batches,
            total_tokens,
            total_words,
            min_batch_tokens: batch_tokens.iter().copied().min().unwrap_or(0),
            max_batch_tokens: batch_tokens.iter().copied().max().unwrap_or(0),
            avg_batch_tokens: ratio(total_tokens, batch_tokens.len()),
            avg_article_tokens: ratio(total_tokens, articles_admitted),
            avg_article_words: ratio(total_words, articles_admitted),
            batch_tokens,
            batch_articles,
        }
    }

    /// Recompute the summary from finished batches.
    ///
    /// `skipped_no_abstract` is not recoverable from batches and is passed in.
    pub fn from_batches(
        batches: &[Batch],
        token_limit: usize,
        skipped_no_abstract: usize,
        fetch_failed: usize,
    ) -> Self {
        let admitted: usize = batches.iter().map(Batch::len).sum();
        let total_tokens = batches
            .iter()
            .flat_map(|b| b.articles())
            .filter_map(|a| a.token_count())
            .sum();
        let total_words = batches.iter().map(Batch::words).sum();
        Self::build(
            token_limit,
            admitted + skipped_no_abstract,
            skipped_no_abstract,
            fetch_failed,
            total_tokens,
            total_words,
            batches.iter().map(Batch::tokens).collect(),
            batches.iter().map(Batch::len).collect(),
            batches.iter().filter(|b| b.is_oversized(token_limit)).count(),
        )
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Batching")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Articles seen"),
            Cell::new(fmt_num(self.articles_seen)),
        ]);
        table.add_row(vec![
            Cell::new("Skipped (no abstract)"),
            Cell::new(fmt_num(self.skipped_no_abstract)),
        ]);
        if self.fetch_failed > 0 {
            table.add_row(vec![
                Cell::new("Unresolved ids").fg(Color::Yellow),
                Cell::new(fmt_num(self.fetch_failed)).fg(Color::Yellow),
            ]);
        }
        table.add_row(vec![
            Cell::new("Articles batched").fg(Color::Green),
            Cell::new(fmt_num(self.articles_admitted)).fg(Color::Green),
        ]);
        table.add_row(vec![
            Cell::new("Batches"),
            Cell::new(format!(
                "{} (limit {} tokens)",
                fmt_num(self.batch_count),
                fmt_num(self.token_limit)
            )),
        ]);
        if self.oversized_batches > 0 {
            table.add_row(vec![
                Cell::new("Oversized batches").fg(Color::Yellow),
                Cell::new(fmt_num(self.oversized_batches)).fg(Color::Yellow),
            ]);
        }
        table.add_row(vec![
            Cell::new("Tokens per batch"),
            Cell::new(format!(
                "min {} / avg {:.1} / max {}",
                fmt_num(self.min_batch_tokens),
                self.avg_batch_tokens,
                fmt_num(self.max_batch_tokens)
            )),
        ]);
        table.add_row(vec![
            Cell::new("Total tokens"),
            Cell::new(fmt_num(self.total_tokens)),
        ]);
        table.add_row(vec![
            Cell::new("Avg tokens / article"),
            Cell::new(format!("{:.1}", self.avg_article_tokens)),
        ]);
        table.add_row(vec![
            Cell::new("Avg words / article"),
            Cell::new(format!("{:.1}", self.avg_article_words)),
        ]);

        format!("\n{table}")
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "Batching complete: {} articles in {} batches ({} skipped, {} unresolved)",
            fmt_num(self.articles_admitted),
            self.batch_count,
            self.skipped_no_abstract,
            self.fetch_failed
        );
    }
}

fn ratio(total: usize, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total as f64 / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counted(pmid: &str, tokens: usize) -> ArticleRecord {
        let mut a = ArticleRecord::new(pmid, "title", Some("one two".into()), None);
        a.ensure_counts(|_| tokens);
        a
    }

    fn batch(index: usize, tokens: &[usize]) -> Batch {
        let mut b = Batch::new(index);
        for (i, &t) in tokens.iter().enumerate() {
            b.push(counted(&format!("{index}-{i}"), t), t);
        }
        b
    }

    #[test]
    fn empty_run() {
        let summary = MetricsAggregator::new(100).finish();
        assert_eq!(summary.batch_count, 0);
        assert_eq!(summary.min_batch_tokens, 0);
        assert_eq!(summary.avg_batch_tokens, 0.0);
        assert_eq!(summary.avg_article_tokens, 0.0);
    }

    #[test]
    fn incremental_counts() {
        let mut agg = MetricsAggregator::new(100);
        let skipped = ArticleRecord::new("0", "t", None, None);
        agg.record_skip(&skipped);

        let b0 = batch(0, &[30, 40]);
        for a in b0.articles() {
            agg.record_admit(a);
        }
        agg.record_seal(&b0);
        let b1 = batch(1, &[150]);
        agg.record_admit(&b1.articles()[0]);
        agg.record_seal(&b1);
        agg.record_fetch_failures(2);

        let s = agg.finish();
        assert_eq!(s.articles_seen, 4);
        assert_eq!(s.articles_admitted, 3);
        assert_eq!(s.skipped_no_abstract, 1);
        assert_eq!(s.fetch_failed, 2);
        assert_eq!(s.batch_count, 2);
        assert_eq!(s.oversized_batches, 1);
        assert_eq!(s.total_tokens, 220);
        assert_eq!(s.total_words, 9);
        assert_eq!((s.min_batch_tokens, s.max_batch_tokens), (70, 150));
        assert_eq!(s.avg_batch_tokens, 110.0);
        assert_eq!(s.batch_articles, vec![2, 1]);
    }

    #[test]
    fn from_batches_matches_incremental() {
        let batches = vec![batch(0, &[10, 20, 30]), batch(1, &[55]), batch(2, &[1, 2])];
        let mut agg = MetricsAggregator::new(60);
        for b in &batches {
            for a in b.articles() {
                agg.record_admit(a);
            }
            agg.record_seal(b);
        }
        agg.record_skip(&ArticleRecord::new("x", "t", None, None));
        agg.record_fetch_failures(1);

        assert_eq!(agg.finish(), RunSummary::from_batches(&batches, 60, 1, 1));
    }

    #[test]
    fn summary_serializes() {
        let s = RunSummary::from_batches(&[batch(0, &[5])], 10, 0, 0);
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["batch_count"], 1);
        assert_eq!(json["batch_tokens"][0], 5);
        assert_eq!(json["avg_article_tokens"], 5.0);
    }

    #[test]
    fn table_mentions_counts() {
        let s = RunSummary::from_batches(&[batch(0, &[1200])], 1000, 3, 2);
        let table = s.format_table();
        assert!(table.contains("1,200"));
        assert!(table.contains("Oversized batches"));
        assert!(table.contains("Unresolved ids"));
    }
}
