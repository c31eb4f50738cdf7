//! pubbatch - PubMed retrieval with token-bounded batching
//!
//! Searches PubMed for a query, fetches titles and abstracts, and packs
//! them into text batches that each fit a fixed token budget.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod cmd;
mod config;
mod output;

use config::Config;

#[derive(Parser)]
#[command(name = "pubbatch")]
#[command(about = "Fetch PubMed abstracts into token-bounded batches")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Config file path (default: ./pubbatch.toml or ~/.config/pubbatch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Search, fetch and batch articles for a query
    Run(cmd::run::RunArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(pubbatch_core::ProgressContext::new());

    let config_path = Config::locate(cli.config);
    let config = match &config_path {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Run(args) => {
            let plan = cmd::run::RunPlan::resolve(args, &config)?;
            std::fs::create_dir_all(&plan.output_dir).with_context(|| {
                format!("failed to create {}", plan.output_dir.display())
            })?;
            init_logging(
                &progress,
                cli.debug,
                Some(&plan.output_dir.join(output::LOG_FILE)),
            )?;
            log_config_source(config_path.as_deref());
            pubbatch_core::install_signal_handlers()
                .context("failed to install signal handlers")?;
            cmd::run::run(&plan, &progress)
        }
        Command::Config => {
            init_logging(&progress, cli.debug, None)?;
            log_config_source(config_path.as_deref());
            show_config(&config);
            Ok(())
        }
    }
}

// Logging:
//   TTY:     quiet (warn) unless --debug, progress bars show activity
//   non-TTY: info unless --debug, logs are the only progress indicator
fn init_logging(
    progress: &pubbatch_core::ProgressContext,
    debug: bool,
    log_file: Option<&Path>,
) -> Result<()> {
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = if is_tty { !debug } else { false };
    pubbatch_core::init_logging(quiet, debug, multi, log_file)
        .context("failed to initialise logging")
}

fn log_config_source(path: Option<&Path>) {
    match path {
        Some(path) => log::info!("Loaded config from {}", path.display()),
        None => log::debug!("No config file found, using defaults"),
    }
}

fn show_config(config: &Config) {
    use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Setting").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);

    let has_key = config.ncbi.api_key.is_some();
    table.add_row(vec![
        "Output directory",
        &config.output.default_dir.display().to_string(),
    ]);
    table.add_row(vec!["E-utilities URL", &config.ncbi.base_url]);
    table.add_row(vec!["Tool", &config.ncbi.tool]);
    table.add_row(vec![
        "Email",
        config.ncbi.email.as_deref().unwrap_or("not set"),
    ]);
    table.add_row(vec![
        "NCBI API key",
        if has_key { "configured" } else { "not set" },
    ]);
    table.add_row(vec![
        "Rate limit",
        &format!("{:.1} calls/s", config.http.effective_rate_limit(has_key)),
    ]);
    table.add_row(vec!["Max retries", &config.http.max_retries.to_string()]);
    table.add_row(vec![
        "Backoff base",
        &format!("{}ms", config.http.backoff_base_ms),
    ]);
    table.add_row(vec!["Timeout", &format!("{}s", config.http.timeout_secs)]);
    table.add_row(vec!["Token limit", &config.batch.token_limit.to_string()]);
    table.add_row(vec!["Page size", &config.batch.page_size.to_string()]);
    table.add_row(vec!["Max results", &config.batch.max_results.to_string()]);

    eprintln!("\n{table}");
}
