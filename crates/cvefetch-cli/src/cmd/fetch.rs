//! Fetch subcommand - mirror recent CVEs into sharded JSON files

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, ValueEnum};
use cvefetch_core::{ErrorKind, SharedProgress, ShutdownFlag};
use cvefetch_nvd::DateFilter;

use crate::config::Config;

/// Process exit status for configuration and usage errors
pub const EXIT_USAGE: u8 = 1;

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// How many days back to fetch CVEs
    #[arg(short, long, value_name = "DAYS", allow_negative_numbers = true)]
    pub days_back: i64,

    /// Output directory (default: [output] dir from config)
    #[arg(short, long, visible_alias = "output-directory")]
    pub output: Option<PathBuf>,

    /// Filter windows on publication or last-modified date
    #[arg(long, value_enum)]
    pub date_filter: Option<DateFilterArg>,

    /// Results per request (max 2000)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Records per output file
    #[arg(long)]
    pub shard_size: Option<usize>,

    /// Output file name prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// API endpoint
    #[arg(long)]
    pub base_url: Option<String>,

    /// Maximum attempts per request, including the first
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum DateFilterArg {
    Published,
    Modified,
}

impl From<DateFilterArg> for DateFilter {
    fn from(f: DateFilterArg) -> Self {
        match f {
            DateFilterArg::Published => DateFilter::Published,
            DateFilterArg::Modified => DateFilter::Modified,
        }
    }
}

impl FetchArgs {
    /// Merge CLI overrides onto the file configuration
    pub fn resolve(&self, config: &Config) -> cvefetch_nvd::Config {
        let mut fetch = config.fetch_config(self.days_back);
        if let Some(dir) = &self.output {
            fetch.output_dir = dir.clone();
        }
        if let Some(filter) = self.date_filter {
            fetch.date_filter = filter.into();
        }
        if let Some(page_size) = self.page_size {
            fetch.page_size = page_size;
        }
        if let Some(shard_size) = self.shard_size {
            fetch.shard_size = shard_size;
        }
        if let Some(prefix) = &self.prefix {
            fetch.file_prefix = prefix.clone();
        }
        if let Some(url) = &self.base_url {
            fetch.base_url = url.clone();
        }
        if let Some(attempts) = self.max_attempts {
            fetch.retry.max_attempts = attempts;
        }
        fetch
    }
}

/// Process exit status for a failed run
pub fn exit_code_for(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidConfig => EXIT_USAGE,
        ErrorKind::InvalidRange => 2,
        ErrorKind::Http => 3,
        ErrorKind::MalformedResponse => 4,
        ErrorKind::Exhausted => 5,
        ErrorKind::Write => 6,
        ErrorKind::Cancelled => 130,
        // Only surfaces unretried when the client cannot be built
        ErrorKind::Network => 5,
    }
}

pub fn run(args: FetchArgs, config: &Config, progress: &SharedProgress) -> ExitCode {
    let fetch_config = args.resolve(config);

    log::info!("Fetching NVD CVEs");
    log::info!("  Days back: {}", fetch_config.days_back);
    log::info!("  Filter: {}", fetch_config.date_filter);
    log::info!("  Output: {}", fetch_config.output_dir.display());
    log::info!(
        "  API key: {}",
        if fetch_config.has_api_key() {
            "configured"
        } else {
            "not set"
        }
    );

    let shutdown = ShutdownFlag::new();
    if let Err(e) = shutdown.install_signal_handlers() {
        log::warn!("Signal handlers not installed, Ctrl-C will abort immediately: {e}");
    }

    match cvefetch_nvd::run(&fetch_config, progress.clone(), shutdown) {
        Ok(summary) => {
            if progress.is_tty() {
                summary.print();
            } else {
                summary.log();
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = exit_code_for(e.kind());
            if e.kind() == ErrorKind::Cancelled {
                log::warn!("Shutdown requested, stopped at {}", position_or_start(&e));
            } else {
                log::error!("Fetch failed [{}]: {e}", e.kind());
            }
            ExitCode::from(code)
        }
    }
}

fn position_or_start(e: &cvefetch_core::RunError) -> String {
    e.position
        .map(|p| p.to_string())
        .unwrap_or_else(|| "start".to_string())
}
