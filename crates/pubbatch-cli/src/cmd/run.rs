//! `pubbatch run` - retrieve articles for a query and write token-bounded batches

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use clap::Args;

use pubbatch_batch::{Batch, Cl100kCounter, RunSummary, TokenCounter, try_assemble};
use pubbatch_core::{Clock, RetrievalError, SharedProgress, SystemClock, fmt_num};
use pubbatch_pubmed::{
    DateRange, EutilsClient, EutilsConfig, FetchClient, Retrieval, RetrievalConfig, RetrievalStats,
    SearchClient, SearchQuery,
};

use crate::config::Config;
use crate::output::{RunReport, output_file_names, write_outputs};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// PubMed search query (free text, MeSH terms, field tags)
    #[arg(short, long)]
    pub query: String,

    /// Contact email sent to NCBI with every request
    #[arg(long)]
    pub email: Option<String>,

    /// NCBI API key (raises the default rate limit to 10/s)
    #[arg(long)]
    pub api_key: Option<String>,

    /// Only articles published in the last N years
    #[arg(short, long, conflicts_with_all = ["start_year", "end_year"])]
    pub years: Option<u32>,

    /// First publication year (inclusive)
    #[arg(long, requires = "end_year")]
    pub start_year: Option<i32>,

    /// Last publication year (inclusive)
    #[arg(long, requires = "start_year")]
    pub end_year: Option<i32>,

    /// Only review articles
    #[arg(long)]
    pub reviews_only: bool,

    /// Maximum number of articles to consider
    #[arg(short = 'n', long)]
    pub max_results: Option<usize>,

    /// Token budget per batch
    #[arg(short, long)]
    pub token_limit: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Remote calls per second
    #[arg(long)]
    pub rate_limit: Option<f64>,

    /// Retries after the first attempt of a failing call
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Identifiers per search page
    #[arg(long)]
    pub page_size: Option<usize>,
}

/// Fully resolved settings for one run (CLI flags over config file).
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub query: SearchQuery,
    pub eutils: EutilsConfig,
    pub retrieval: RetrievalConfig,
    pub token_limit: usize,
    pub output_dir: PathBuf,
}

impl RunPlan {
    pub fn resolve(args: RunArgs, config: &Config) -> Result<Self> {
        ensure!(!args.query.trim().is_empty(), "query must not be empty");

        let api_key = args.api_key.or_else(|| config.ncbi.api_key.clone());
        let email = args.email.or_else(|| config.ncbi.email.clone());

        let date_range = match (args.years, args.start_year, args.end_year) {
            (Some(years), _, _) => Some(DateRange::last_years(years)),
            (None, Some(start), Some(end)) => Some(DateRange::new(start, end)),
            _ => None,
        };
        let mut query = SearchQuery::new(args.query).reviews_only(args.reviews_only);
        if let Some(range) = date_range {
            query = query.with_date_range(range);
        }

        let retrieval = RetrievalConfig {
            page_size: args.page_size.unwrap_or(config.batch.page_size),
            max_results: args.max_results.unwrap_or(config.batch.max_results),
            rate_limit: args
                .rate_limit
                .unwrap_or_else(|| config.http.effective_rate_limit(api_key.is_some())),
            max_retries: args.max_retries.unwrap_or(config.http.max_retries),
            backoff_base: Duration::from_millis(config.http.backoff_base_ms),
        };
        retrieval.validate()?;

        let token_limit = args.token_limit.unwrap_or(config.batch.token_limit);
        ensure!(token_limit > 0, "token_limit must be at least 1");

        Ok(Self {
            query,
            eutils: EutilsConfig {
                base_url: config.ncbi.base_url.clone(),
                tool: config.ncbi.tool.clone(),
                email,
                api_key,
                timeout: Duration::from_secs(config.http.timeout_secs),
            },
            retrieval,
            token_limit,
            output_dir: args.output.unwrap_or_else(|| config.output.default_dir.clone()),
        })
    }
}

pub fn run(plan: &RunPlan, progress: &SharedProgress) -> Result<()> {
    let term = plan.query.to_term();
    log::info!("Search term: {term}");
    log::info!("  Output: {}", plan.output_dir.display());
    log::info!(
        "  Up to {} articles, {} tokens per batch, {:.1} calls/s",
        fmt_num(plan.retrieval.max_results),
        fmt_num(plan.token_limit),
        plan.retrieval.rate_limit
    );
    if plan.eutils.email.is_none() {
        log::warn!("No contact email configured; NCBI asks clients to send one (--email)");
    }

    let counter = Cl100kCounter::new()?;
    let client = EutilsClient::new(plan.eutils.clone());
    let started = Instant::now();

    let retrieval = Retrieval::new(&client, &client, term.clone(), &plan.retrieval, SystemClock)
        .with_progress(progress.stage_line("retrieve"));
    let (batches, summary, stats) = collect_batches(retrieval, &counter, plan.token_limit)
        .inspect_err(|e| log::error!("{e}"))
        .context("retrieval aborted; no output written")?;

    let report = RunReport {
        query: plan.query.term.clone(),
        term,
        reviews_only: plan.query.reviews_only,
        date_range: plan.query.date_range.map(|r| r.to_string()),
        fetched_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        elapsed_secs: started.elapsed().as_secs_f64(),
        token_encoding: counter.name().to_string(),
        retrieval: stats,
        files: output_file_names(&batches),
        batching: summary,
    };

    write_outputs(&plan.output_dir, &batches, &report)?;

    if progress.is_tty() {
        eprintln!("{}", report.batching.format_table());
    } else {
        report.batching.log();
    }
    log::info!(
        "Wrote {} batch files to {} in {:.1}s",
        batches.len(),
        plan.output_dir.display(),
        report.elapsed_secs
    );
    Ok(())
}

/// Drain a retrieval into the assembler.
///
/// A retrieval failure drops every batch built so far. Identifiers fetch
/// could not resolve are carried into the summary.
pub fn collect_batches<S, F, C, T>(
    mut retrieval: Retrieval<'_, S, F, C>,
    counter: T,
    token_limit: usize,
) -> Result<(Vec<Batch>, RunSummary, RetrievalStats), RetrievalError>
where
    S: SearchClient,
    F: FetchClient,
    C: Clock,
    T: TokenCounter,
{
    let (batches, mut summary) = try_assemble(retrieval.by_ref(), counter, token_limit)?;
    let stats = retrieval.stats().clone();
    summary.fetch_failed = stats.fetch_failed;
    Ok((batches, summary, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    use clap::Parser;
    use pubbatch_batch::WhitespaceCounter;
    use pubbatch_core::{ArticleRecord, RemoteError, Stage};
    use pubbatch_pubmed::{FetchedPage, SearchPage};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    fn parse(argv: &[&str]) -> RunArgs {
        TestCli::try_parse_from(std::iter::once("pubbatch").chain(argv.iter().copied()))
            .unwrap()
            .args
    }

    fn anonymous() -> Config {
        let mut config = Config::default();
        config.ncbi.api_key = None;
        config
    }

    #[test]
    fn defaults_from_config() {
        let plan = RunPlan::resolve(parse(&["-q", "sepsis"]), &anonymous()).unwrap();
        assert_eq!(plan.token_limit, 8000);
        assert_eq!(plan.retrieval.max_results, 100);
        assert_eq!(plan.retrieval.page_size, 200);
        assert_eq!(plan.retrieval.rate_limit, 3.0);
        assert_eq!(plan.output_dir, PathBuf::from("./pubmed_output"));
        assert_eq!(plan.query.to_term(), "(sepsis)");
    }

    #[test]
    fn flags_override_config() {
        let argv = [
            "-q", "crispr", "--email", "me@example.org", "-n", "500", "-t", "10000", "-o",
            "/tmp/out", "--max-retries", "5", "--page-size", "50", "--reviews-only",
        ];
        let plan = RunPlan::resolve(parse(&argv), &anonymous()).unwrap();
        assert_eq!(plan.retrieval.max_results, 500);
        assert_eq!(plan.retrieval.max_retries, 5);
        assert_eq!(plan.retrieval.page_size, 50);
        assert_eq!(plan.token_limit, 10000);
        assert_eq!(plan.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(plan.eutils.email.as_deref(), Some("me@example.org"));
        assert!(plan.query.reviews_only);
    }

    #[test]
    fn api_key_raises_default_rate() {
        let plan = RunPlan::resolve(parse(&["-q", "x", "--api-key", "k"]), &anonymous()).unwrap();
        assert_eq!(plan.retrieval.rate_limit, 10.0);
        assert_eq!(plan.eutils.api_key.as_deref(), Some("k"));

        let pinned =
            RunPlan::resolve(parse(&["-q", "x", "--api-key", "k", "--rate-limit", "2"]), &anonymous())
                .unwrap();
        assert_eq!(pinned.retrieval.rate_limit, 2.0);
    }

    #[test]
    fn explicit_year_range() {
        let plan = RunPlan::resolve(
            parse(&["-q", "x", "--start-year", "2024", "--end-year", "2019"]),
            &anonymous(),
        )
        .unwrap();
        assert_eq!(plan.query.date_range, Some(DateRange::new(2019, 2024)));
    }

    #[test]
    fn years_conflicts_with_range() {
        let result = TestCli::try_parse_from(["pubbatch", "-q", "x", "-y", "5", "--start-year", "2020", "--end-year", "2021"]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_settings_rejected() {
        assert!(RunPlan::resolve(parse(&["-q", "  "]), &anonymous()).is_err());
        assert!(RunPlan::resolve(parse(&["-q", "x", "-t", "0"]), &anonymous()).is_err());
        assert!(RunPlan::resolve(parse(&["-q", "x", "--page-size", "0"]), &anonymous()).is_err());
        assert!(RunPlan::resolve(parse(&["-q", "x", "--rate-limit", "0"]), &anonymous()).is_err());
    }

    /// Clock that never waits.
    struct Instantly;

    impl Clock for Instantly {
        fn now(&self) -> Instant {
            Instant::now()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    /// Numbered ids `1..=n`; `missing` ids never resolve, and fetch call
    /// number `reject_fetch` (0-based) fails with a 400.
    struct Listing {
        n: usize,
        missing: Vec<&'static str>,
        reject_fetch: Option<usize>,
        fetches: std::cell::Cell<usize>,
    }

    impl Listing {
        fn new(n: usize) -> Self {
            Self {
                n,
                missing: Vec::new(),
                reject_fetch: None,
                fetches: std::cell::Cell::new(0),
            }
        }
    }

    impl SearchClient for Listing {
        fn search(&self, _query: &str, offset: usize, page_size: usize) -> Result<SearchPage, RemoteError> {
            let end = (offset + page_size).min(self.n);
            Ok(SearchPage {
                ids: (offset.min(end) + 1..=end).map(|i| i.to_string()).collect(),
                total_count: self.n,
            })
        }
    }

    impl FetchClient for Listing {
        fn fetch(&self, ids: &[String]) -> Result<FetchedPage, RemoteError> {
            let call = self.fetches.get();
            self.fetches.set(call + 1);
            if self.reject_fetch == Some(call) {
                return Err(RemoteError::from_status(400, "bad request"));
            }
            let records = ids
                .iter()
                .filter(|id| !self.missing.iter().any(|m| *m == id.as_str()))
                .map(|id| ArticleRecord::new(id.as_str(), "Title", Some(format!("Abstract of {id}")), None));
            Ok(FetchedPage::from_records(ids, records))
        }
    }

    fn retrieval_config(page_size: usize) -> RetrievalConfig {
        RetrievalConfig {
            page_size,
            max_results: 100,
            rate_limit: 1000.0,
            max_retries: 0,
            backoff_base: Duration::from_millis(1),
        }
    }

    #[test]
    fn unresolved_ids_reach_summary() {
        let mut listing = Listing::new(10);
        listing.missing = vec!["3", "8"];
        let flag = AtomicBool::new(false);
        let retrieval = Retrieval::new(&listing, &listing, "q", &retrieval_config(10), Instantly)
            .with_shutdown_flag(&flag);

        let (batches, summary, stats) = collect_batches(retrieval, WhitespaceCounter, 100).unwrap();
        let batched: Vec<&str> = batches
            .iter()
            .flat_map(|b| b.articles())
            .map(|a| a.pmid())
            .collect();
        assert_eq!(batched, vec!["1", "2", "4", "5", "6", "7", "9", "10"]);
        assert_eq!(summary.articles_seen, 8);
        assert_eq!(summary.fetch_failed, 2);
        assert_eq!(stats.fetch_failed, 2);
    }

    #[test]
    fn fatal_retrieval_error_discards_batches() {
        let mut listing = Listing::new(6);
        listing.reject_fetch = Some(1);
        let flag = AtomicBool::new(false);
        let retrieval = Retrieval::new(&listing, &listing, "q", &retrieval_config(2), Instantly)
            .with_shutdown_flag(&flag);

        // Token limit 1 seals a batch per article, so batches exist before the failure
        match collect_batches(retrieval, WhitespaceCounter, 1) {
            Err(RetrievalError::Rejected { stage, processed, .. }) => {
                assert_eq!(stage, Stage::Fetch);
                assert_eq!(processed, 2);
            }
            other => panic!("expected rejected fetch, got {other:?}"),
        }
    }
}
