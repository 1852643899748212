//! cvefetch - Mirror recent CVE records from the NVD API
//!
//! Fetches CVEs published or modified in the last N days and writes them
//! to numbered JSON files.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

mod cmd;
mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "cvefetch")]
#[command(about = "Mirror recent CVE records from the NVD API into JSON files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./cvefetch.toml or ~/.config/cvefetch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Write a timestamped debug log file into this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch CVEs from the last N days
    Fetch(cmd::fetch::FetchArgs),
    /// Show current configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = Arc::new(cvefetch_core::ProgressContext::new());

    // Load configuration before logging so [logging] dir can apply
    let config = match &cli.config {
        Some(path) => Config::from_file(path),
        None => Config::load(),
    };

    // Logging:
    //   TTY:     warn unless --debug, progress bars show activity
    //   non-TTY: info unless --quiet/--debug, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    let log_dir = cli.log_dir.clone().or_else(|| {
        config
            .as_ref()
            .ok()
            .and_then(|c| c.logging.dir.clone())
    });
    match cvefetch_core::init_logging(quiet, cli.debug, multi, log_dir.as_deref()) {
        Ok(Some(path)) => log::debug!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::from(cmd::fetch::EXIT_USAGE);
        }
    }

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            log::error!("{e:#}");
            return ExitCode::from(cmd::fetch::EXIT_USAGE);
        }
    };
    match &config.source {
        Some(path) => log::info!("Loaded config from {}", path.display()),
        None => log::debug!("No config file found, using defaults"),
    }

    match cli.command {
        Command::Fetch(args) => cmd::fetch::run(args, &config, &progress),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let resolved = config.fetch_config(0);
            let quota = resolved.rate_limit();

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec![
                "Config file",
                &config
                    .source
                    .as_ref()
                    .map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string()),
            ]);
            table.add_row(vec!["NVD base URL", &resolved.base_url]);
            table.add_row(vec![
                "NVD API key",
                if resolved.has_api_key() {
                    "configured"
                } else {
                    "not set"
                },
            ]);
            table.add_row(vec!["Date filter", resolved.date_filter.as_str()]);
            table.add_row(vec!["Page size", &resolved.page_size.to_string()]);
            table.add_row(vec![
                "Output directory",
                &resolved.output_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Shard size",
                &format!(
                    "{} records / {} bytes",
                    resolved.shard_size, resolved.max_shard_bytes
                ),
            ]);
            table.add_row(vec!["File prefix", &resolved.file_prefix]);
            table.add_row(vec![
                "Rate limit",
                &format!(
                    "{} req / {}s, min interval {}ms",
                    quota.max_requests,
                    quota.window.as_secs(),
                    quota.min_interval.as_millis()
                ),
            ]);
            table.add_row(vec![
                "Retry",
                &format!(
                    "{} attempts, {}ms..{}s, jitter {}",
                    resolved.retry.max_attempts,
                    resolved.retry.initial_delay.as_millis(),
                    resolved.retry.max_delay.as_secs(),
                    resolved.retry.jitter
                ),
            ]);
            table.add_row(vec![
                "HTTP timeouts",
                &format!(
                    "connect {}s, request {}s",
                    resolved.http.connect_timeout.as_secs(),
                    resolved.http.request_timeout.as_secs()
                ),
            ]);
            table.add_row(vec![
                "Log directory",
                &log_dir.map_or_else(|| "(none)".to_string(), |d| d.display().to_string()),
            ]);

            eprintln!("\n{table}");
            ExitCode::SUCCESS
        }
    }
}
