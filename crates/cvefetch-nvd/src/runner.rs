//! Main execution logic for the NVD fetcher

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use cvefetch_core::progress::upgrade_to_bar;
use cvefetch_core::{
    FetchError, FetchWindow, ProgressContext, RateLimiter, RetryPolicy, RunError, SharedClock,
    SharedProgress, ShardWriter, ShutdownFlag, fmt_duration, fmt_num, plan, system_clock,
};

use crate::api::{NvdFetcher, PageRequest, PageSource};
use crate::config::Config;
use crate::schema::record_id;
use crate::state::FetchState;

/// Summary of a completed run
#[derive(Debug, Clone, Default)]
pub struct FetchSummary {
    pub windows: usize,
    /// HTTP requests issued, retries included
    pub requests: u64,
    pub retries: u32,
    pub total_records: u64,
    pub shard_count: usize,
    pub shards: Vec<PathBuf>,
    pub bytes_written: u64,
    pub output_dir: PathBuf,
    /// Time spent blocked on the request quota
    pub rate_limit_wait: Duration,
    pub elapsed: Duration,
}

impl FetchSummary {
    pub fn log(&self) {
        log::info!("=== Fetch Summary ===");
        log::info!(
            "Windows: {}, requests: {} ({} retries)",
            self.windows,
            self.requests,
            self.retries
        );
        log::info!(
            "Records: {} in {} shard(s), {} bytes under {}",
            fmt_num(self.total_records),
            self.shard_count,
            fmt_num(self.bytes_written),
            self.output_dir.display()
        );
        log::info!(
            "Time: {:.1}s ({:.1}s waiting on rate limit)",
            self.elapsed.as_secs_f64(),
            self.rate_limit_wait.as_secs_f64()
        );
        let secs = self.elapsed.as_secs_f64();
        if self.total_records > 0 && secs > 0.0 {
            log::info!(
                "Throughput: {:.0} records/sec",
                self.total_records as f64 / secs
            );
        }
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Fetch Summary")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);
        table.add_row(vec![Cell::new("Windows"), Cell::new(self.windows)]);
        table.add_row(vec![
            Cell::new("Requests"),
            Cell::new(fmt_num(self.requests)),
        ]);
        let retries = Cell::new(self.retries);
        table.add_row(vec![
            Cell::new("Retries"),
            if self.retries > 0 {
                retries.fg(Color::Yellow)
            } else {
                retries
            },
        ]);
        table.add_row(vec![
            Cell::new("Records"),
            Cell::new(fmt_num(self.total_records)).fg(Color::Green),
        ]);
        table.add_row(vec![Cell::new("Shards"), Cell::new(self.shard_count)]);
        table.add_row(vec![
            Cell::new("Bytes written"),
            Cell::new(fmt_num(self.bytes_written)),
        ]);
        table.add_row(vec![
            Cell::new("Output"),
            Cell::new(self.output_dir.display()),
        ]);
        table.add_row(vec![
            Cell::new("Rate limit wait"),
            Cell::new(fmt_duration(self.rate_limit_wait)),
        ]);
        table.add_row(vec![
            Cell::new("Elapsed"),
            Cell::new(fmt_duration(self.elapsed)),
        ]);
        table.to_string()
    }

    /// Print summary table to stderr.
    pub fn print(&self) {
        eprintln!("\n{}", self.format_table());
    }
}

/// Sequential window → page → shard pipeline over one [`PageSource`]
pub struct FetchPipeline<S> {
    config: Config,
    source: S,
    clock: SharedClock,
    progress: SharedProgress,
    shutdown: Option<ShutdownFlag>,
}

impl<S: PageSource> FetchPipeline<S> {
    pub fn new(config: Config, source: S, clock: SharedClock) -> Self {
        Self {
            config,
            source,
            clock,
            progress: Arc::new(ProgressContext::hidden()),
            shutdown: None,
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownFlag) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(ShutdownFlag::is_requested)
    }

    /// Fetch `[now - days_back, now]` into the output directory.
    ///
    /// Configuration and window planning are checked before any request is
    /// made or any file is touched. On failure the shards finalized so far stay
    /// on disk and the error carries the window/offset where progress stopped.
    pub fn run(&mut self, now: DateTime<Utc>) -> Result<FetchSummary, RunError> {
        let started = self.clock.now();

        self.config.validate()?;
        let windows = plan(self.config.days_back, now, self.config.max_span)?;

        let quota = self.config.rate_limit();
        log::info!(
            "Fetching CVEs {} in the last {} day(s): {} window(s), page size {}, quota {}/{}s ({})",
            self.config.date_filter,
            self.config.days_back,
            windows.len(),
            self.config.page_size,
            quota.max_requests,
            quota.window.as_secs(),
            if self.config.has_api_key() {
                "API key"
            } else {
                "no API key"
            }
        );

        let mut writer = ShardWriter::create(self.config.shard_config())?;
        let mut limiter = RateLimiter::new(quota, self.clock.clone());
        let mut retry = RetryPolicy::new(self.config.retry, self.clock.clone());
        if let Some(flag) = &self.shutdown {
            retry = retry.with_shutdown(flag.clone());
        }

        let mut state = FetchState::default();
        let mut counters = Counters::default();

        for (index, window) in windows.iter().enumerate() {
            state.enter_window(index);
            let label = format!("window {}/{}", index + 1, windows.len());
            if let Err(e) = self.fetch_window(
                &label,
                *window,
                &mut state,
                &mut counters,
                &mut limiter,
                &mut retry,
                &mut writer,
            ) {
                return Err(match state.position(&windows) {
                    Some(p) => RunError::at(e, p),
                    None => RunError::unpositioned(e),
                });
            }
        }

        let stats = writer.finalize()?;
        let summary = FetchSummary {
            windows: windows.len(),
            requests: counters.requests,
            retries: retry.retries(),
            total_records: counters.records,
            shard_count: stats.shard_count(),
            bytes_written: stats.bytes,
            shards: stats.shards,
            output_dir: self.config.output_dir.clone(),
            rate_limit_wait: limiter.total_waited(),
            elapsed: self.clock.now().saturating_duration_since(started),
        };
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn fetch_window(
        &mut self,
        label: &str,
        window: FetchWindow,
        state: &mut FetchState,
        counters: &mut Counters,
        limiter: &mut RateLimiter,
        retry: &mut RetryPolicy,
        writer: &mut ShardWriter,
    ) -> Result<(), FetchError> {
        log::info!("{label}: {window}");
        let pb = self.progress.window_bar(label);
        let mut window_total: Option<u64> = None;

        loop {
            if self.shutdown_requested() {
                log::warn!("{label}: shutdown requested, stopping");
                pb.abandon();
                return Err(FetchError::Cancelled);
            }

            let request = PageRequest {
                window,
                offset: state.current_offset,
                limit: self.config.page_size,
            };
            let source = &mut self.source;
            let requests = &mut counters.requests;
            let page = retry.run(label, || {
                limiter.acquire();
                *requests += 1;
                source.fetch(&request)
            })?;

            let returned = page.returned_count();
            let total = *window_total.get_or_insert_with(|| {
                upgrade_to_bar(&pb, page.total_available);
                log::debug!("{label}: {} records available", page.total_available);
                page.total_available
            });
            if page.total_available != total {
                log::warn!(
                    "{label}: totalResults changed from {total} to {} during pagination, keeping {total}",
                    page.total_available
                );
            }

            if let (Some(first), Some(last)) = (page.records.first(), page.records.last()) {
                log::debug!(
                    "{label}: offset {} +{returned} ({} .. {})",
                    state.current_offset,
                    record_id(first).unwrap_or("?"),
                    record_id(last).unwrap_or("?")
                );
            }
            for record in &page.records {
                writer.append(record)?;
            }
            state.advance(returned);
            counters.records += returned;
            pb.set_position(state.current_offset);

            if state.current_offset >= total {
                break;
            }
            if returned == 0 {
                log::warn!(
                    "{label}: empty page at offset {} of {total}, ending window early",
                    state.current_offset
                );
                break;
            }
        }

        pb.finish_and_clear();
        log::info!(
            "{label}: {} records",
            fmt_num(state.current_offset)
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    requests: u64,
    records: u64,
}

/// Fetch with the live NVD client and the system clock.
pub fn run(
    config: &Config,
    progress: SharedProgress,
    shutdown: ShutdownFlag,
) -> Result<FetchSummary, RunError> {
    let fetcher = NvdFetcher::from_config(config)?;
    let mut pipeline = FetchPipeline::new(config.clone(), fetcher, system_clock())
        .with_progress(progress)
        .with_shutdown(shutdown);
    pipeline.run(Utc::now())
}
