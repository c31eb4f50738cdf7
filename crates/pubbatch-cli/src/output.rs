//! Run artifacts: batch text files, summary.txt and summary.json
//!
//! Everything is rendered in memory first and written only once the run
//! has succeeded. Each file goes through a `.tmp` sibling and a rename.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pubbatch_batch::{Batch, RunSummary};
use pubbatch_pubmed::RetrievalStats;
use serde::Serialize;

pub const LOG_FILE: &str = "fetch_log.txt";
pub const SUMMARY_TXT: &str = "summary.txt";
pub const SUMMARY_JSON: &str = "summary.json";

const BATCH_PREFIX: &str = "pubmed_batch_";

/// Everything summary.txt and summary.json report about one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub query: String,
    /// ESearch term actually sent
    pub term: String,
    pub reviews_only: bool,
    pub date_range: Option<String>,
    pub fetched_at: String,
    pub elapsed_secs: f64,
    pub token_encoding: String,
    pub retrieval: RetrievalStats,
    pub batching: RunSummary,
    pub files: Vec<String>,
}

/// 1-based file name for a batch.
pub fn batch_file_name(batch: &Batch) -> String {
    format!("{BATCH_PREFIX}{}.txt", batch.index() + 1)
}

pub fn render_batch(batch: &Batch) -> String {
    let mut out = String::new();
    for article in batch.articles() {
        let _ = write!(
            out,
            "PMID: {}\n\nTITLE: {}\n\nABSTRACT:\n{}\n\n{}\n\n",
            article.pmid(),
            article.title(),
            article.abstract_text().unwrap_or_default(),
            "-".repeat(40)
        );
    }
    out
}

fn section(out: &mut String, title: &str) {
    let rule = "-".repeat(60);
    let _ = write!(out, "{rule}\n{title}\n{rule}\n");
}

/// Human-readable run summary.
pub fn render_summary_text(report: &RunReport, output_dir: &Path) -> String {
    let s = &report.batching;
    let r = &report.retrieval;
    let banner = "=".repeat(60);
    let mut out = String::new();

    let _ = writeln!(out, "{banner}\nPUBMED FETCH SUMMARY\n{banner}\n");
    let _ = writeln!(out, "Search Query: {}", report.query);
    let _ = writeln!(out, "Search Term: {}", report.term);
    let _ = writeln!(out, "Review Articles Only: {}", report.reviews_only);
    let _ = writeln!(
        out,
        "Date Range: {}",
        report.date_range.as_deref().unwrap_or("any")
    );
    let _ = writeln!(out, "Fetch Date: {}\n", report.fetched_at);

    section(&mut out, "FETCH STATISTICS");
    let _ = writeln!(out, "Matching articles (service estimate): {}", fmt(r.total_count));
    let _ = writeln!(out, "Articles considered: {}", fmt(r.considered));
    let _ = writeln!(out, "Articles fetched: {}", fmt(r.yielded));
    let _ = writeln!(out, "Unresolved ids: {}", fmt(r.fetch_failed));
    let _ = writeln!(out, "Duplicate ids ignored: {}", fmt(r.duplicates));
    let _ = writeln!(out, "Articles skipped (no abstract): {}", fmt(s.skipped_no_abstract));
    let _ = writeln!(out, "Total batches created: {}", fmt(s.batch_count));
    let _ = writeln!(out, "Elapsed: {:.1}s\n", report.elapsed_secs);

    section(&mut out, "TOKEN & WORD METRICS");
    let _ = writeln!(out, "Token encoding: {}", report.token_encoding);
    let _ = writeln!(out, "Token limit per batch: {}", fmt(s.token_limit));
    let _ = writeln!(out, "Total words: {}", fmt(s.total_words));
    let _ = writeln!(out, "Total tokens: {}", fmt(s.total_tokens));
    let _ = writeln!(out, "Average words per article: {:.1}", s.avg_article_words);
    let _ = writeln!(out, "Average tokens per article: {:.1}", s.avg_article_tokens);
    let _ = writeln!(
        out,
        "Tokens per batch: min {} / avg {:.1} / max {}\n",
        fmt(s.min_batch_tokens),
        s.avg_batch_tokens,
        fmt(s.max_batch_tokens)
    );

    section(&mut out, "BATCH DISTRIBUTION");
    for (i, (tokens, articles)) in s.batch_tokens.iter().zip(&s.batch_articles).enumerate() {
        let oversized = if *articles == 1 && *tokens > s.token_limit {
            " (oversized)"
        } else {
            ""
        };
        let _ = writeln!(
            out,
            "Batch {}: {} articles, {} tokens{oversized}",
            i + 1,
            articles,
            fmt(*tokens)
        );
    }

    out.push('\n');
    section(&mut out, "OUTPUT FILES");
    let _ = writeln!(out, "Output directory: {}", output_dir.display());
    for file in &report.files {
        let _ = writeln!(out, "  - {file}");
    }
    out
}

fn fmt(n: usize) -> String {
    pubbatch_core::fmt_num(n)
}

/// Write `contents` to `path` via a temporary sibling and rename.
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).with_context(|| format!("failed to write {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| {
        format!("failed to rename {} → {}", tmp.display(), path.display())
    })?;
    Ok(())
}

/// Batch files left over from an earlier run with more batches.
fn stale_batch_files(dir: &Path, batch_count: usize) -> Result<Vec<PathBuf>> {
    let mut stale = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let path = entry?.path();
        let number = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(BATCH_PREFIX))
            .and_then(|n| n.strip_suffix(".txt"))
            .and_then(|n| n.parse::<usize>().ok());
        if number.is_some_and(|n| n > batch_count) {
            stale.push(path);
        }
    }
    Ok(stale)
}

/// The file list recorded in the summaries.
pub fn output_file_names(batches: &[Batch]) -> Vec<String> {
    batches
        .iter()
        .map(batch_file_name)
        .chain([SUMMARY_TXT, SUMMARY_JSON, LOG_FILE].map(String::from))
        .collect()
}

/// Write all batch files and both summaries into `dir`.
///
/// Returns the paths written, batches first.
pub fn write_outputs(dir: &Path, batches: &[Batch], report: &RunReport) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let mut written = Vec::with_capacity(batches.len() + 2);
    for batch in batches {
        let path = dir.join(batch_file_name(batch));
        write_atomic(&path, &render_batch(batch))?;
        log::info!(
            "Saved batch {}: {} articles, {} tokens -> {}",
            batch.index() + 1,
            batch.len(),
            fmt(batch.tokens()),
            path.display()
        );
        written.push(path);
    }

    for stale in stale_batch_files(dir, batches.len())? {
        log::debug!("removing stale {}", stale.display());
        fs::remove_file(&stale).with_context(|| format!("failed to remove {}", stale.display()))?;
    }

    let txt = dir.join(SUMMARY_TXT);
    write_atomic(&txt, &render_summary_text(report, dir))?;
    written.push(txt);

    let json = dir.join(SUMMARY_JSON);
    let body = serde_json::to_string_pretty(report).context("failed to serialize summary")?;
    write_atomic(&json, &body)?;
    written.push(json);

    Ok(written)
}
