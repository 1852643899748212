//! Numbered JSON shard files with atomic tmp→rename finalization.
//!
//! Records are serialized once on `append` and buffered as bytes. A shard is
//! flushed when it holds `max_records` records or when the next record would
//! push the file past `max_bytes`. Every shard is a complete JSON array.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::FetchError;

/// Bytes of `[\n` + `\n]\n` around the records
const ARRAY_OVERHEAD: usize = 5;

/// Bytes of `,\n` between records
const SEPARATOR_LEN: usize = 2;

/// Shard bounds and naming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardConfig {
    pub output_dir: PathBuf,
    /// File name prefix, e.g. `cve` → `cve_0001.json`
    pub prefix: String,
    pub max_records: usize,
    pub max_bytes: usize,
}

impl ShardConfig {
    /// File name for 1-based shard `index`
    pub fn file_name(&self, index: usize) -> String {
        format!("{}_{index:04}.json", self.prefix)
    }
}

/// Totals after [`ShardWriter::finalize`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardStats {
    pub shards: Vec<PathBuf>,
    pub records: usize,
    pub bytes: u64,
}

impl ShardStats {
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}

/// Buffers raw records and writes them as bounded JSON array files
pub struct ShardWriter {
    config: ShardConfig,
    buffer: Vec<Vec<u8>>,
    /// Encoded size of the buffered shard, array brackets included
    buffered_bytes: usize,
    stats: ShardStats,
    /// Shards of the previous run are removed once this run commits its first write
    previous_cleared: bool,
}

impl std::fmt::Debug for ShardWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardWriter")
            .field("output_dir", &self.config.output_dir)
            .field("buffered", &self.buffer.len())
            .field("shards", &self.stats.shards.len())
            .finish_non_exhaustive()
    }
}

impl ShardWriter {
    /// Create the output directory.
    ///
    /// Shards left by a previous run stay in place until the first shard of
    /// this run is written (or a run without records finalizes), so a run
    /// that fails early keeps the last complete mirror.
    pub fn create(config: ShardConfig) -> Result<Self, FetchError> {
        fs::create_dir_all(&config.output_dir)
            .map_err(|e| FetchError::write(&config.output_dir, e))?;

        Ok(Self {
            config,
            buffer: Vec::new(),
            buffered_bytes: ARRAY_OVERHEAD,
            stats: ShardStats::default(),
            previous_cleared: false,
        })
    }

    /// Buffer one record, flushing first if it would overflow the byte cap.
    ///
    /// A record larger than the cap on its own still gets a shard of its own.
    pub fn append(&mut self, record: &Value) -> Result<(), FetchError> {
        let encoded = serde_json::to_vec(record).map_err(|e| {
            FetchError::write(&self.config.output_dir, std::io::Error::other(e))
        })?;

        if !self.buffer.is_empty()
            && self.buffered_bytes + SEPARATOR_LEN + encoded.len() > self.config.max_bytes
        {
            self.flush()?;
        }

        if !self.buffer.is_empty() {
            self.buffered_bytes += SEPARATOR_LEN;
        }
        self.buffered_bytes += encoded.len();
        self.buffer.push(encoded);
        self.flush_if_needed()?;
        Ok(())
    }

    /// Flush when the record or byte threshold is reached. Returns whether a shard was written.
    pub fn flush_if_needed(&mut self) -> Result<bool, FetchError> {
        let full = self.buffer.len() >= self.config.max_records.max(1)
            || self.buffered_bytes >= self.config.max_bytes;
        if full && !self.buffer.is_empty() {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Flush the remaining partial shard. Writes nothing when no record is buffered.
    pub fn finalize(mut self) -> Result<ShardStats, FetchError> {
        if !self.buffer.is_empty() {
            self.flush()?;
        }
        self.clear_previous()?;
        log::debug!(
            "Shard writer finalized: {} records in {} shard(s)",
            self.stats.records,
            self.stats.shards.len()
        );
        Ok(self.stats)
    }

    /// Records buffered but not yet written
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn shards_written(&self) -> usize {
        self.stats.shards.len()
    }

    fn clear_previous(&mut self) -> Result<(), FetchError> {
        if !self.previous_cleared {
            let removed = remove_previous_shards(&self.config.output_dir, &self.config.prefix)
                .map_err(|e| FetchError::write(&self.config.output_dir, e))?;
            if removed > 0 {
                log::info!("Removed {removed} file(s) from the previous run");
            }
            self.previous_cleared = true;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), FetchError> {
        self.clear_previous()?;
        let index = self.stats.shards.len() + 1;
        let filename = self.config.file_name(index);
        let final_path = self.config.output_dir.join(&filename);
        let tmp_path = self.config.output_dir.join(format!("{filename}.tmp"));

        let bytes = write_array(&tmp_path, &self.buffer).map_err(|e| FetchError::write(&tmp_path, e))?;
        fs::rename(&tmp_path, &final_path).map_err(|e| FetchError::write(&final_path, e))?;

        log::info!("Wrote {} ({} records)", filename, self.buffer.len());
        self.stats.records += self.buffer.len();
        self.stats.bytes += bytes;
        self.stats.shards.push(final_path);
        self.buffer.clear();
        self.buffered_bytes = ARRAY_OVERHEAD;
        Ok(())
    }
}

/// Write pre-encoded records as a JSON array, one record per line
fn write_array(path: &Path, records: &[Vec<u8>]) -> std::io::Result<u64> {
    let mut out = BufWriter::new(File::create(path)?);
    let mut written = 0u64;
    out.write_all(b"[\n")?;
    written += 2;
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            out.write_all(b",\n")?;
            written += SEPARATOR_LEN as u64;
        }
        out.write_all(record)?;
        written += record.len() as u64;
    }
    out.write_all(b"\n]\n")?;
    written += 3;
    out.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    Ok(written)
}

/// What a file name means to the writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShardFile {
    /// `<prefix>_NNNN.json`
    Complete,
    /// `<prefix>_NNNN.json.tmp` left by an interrupted flush
    Partial,
}

/// Classify `name` as one of our shard files: `<prefix>_` followed by at least
/// four ASCII digits, then `.json` or `.json.tmp`.
fn shard_file(name: &str, prefix: &str) -> Option<ShardFile> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
    let (digits, kind) = match rest.strip_suffix(".json.tmp") {
        Some(digits) => (digits, ShardFile::Partial),
        None => (rest.strip_suffix(".json")?, ShardFile::Complete),
    };
    (digits.len() >= 4 && digits.bytes().all(|b| b.is_ascii_digit())).then_some(kind)
}

/// Remove shards named `<prefix>_NNNN.json` and their `.tmp` leftovers from an
/// earlier run. Other files in the directory are never touched.
pub fn remove_previous_shards(output_dir: &Path, prefix: &str) -> std::io::Result<usize> {
    let pattern = format!(
        "{}/{}_*.json*",
        glob::Pattern::escape(&output_dir.to_string_lossy()),
        glob::Pattern::escape(prefix)
    );
    let entries = glob::glob(&pattern)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let mut removed = 0;
    for path in entries.filter_map(Result::ok) {
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match shard_file(name, prefix) {
            Some(ShardFile::Partial) => {
                log::warn!("Removing stale tmp file: {}", path.display());
            }
            Some(ShardFile::Complete) => {
                log::debug!("Removing shard from previous run: {}", path.display());
            }
            None => continue,
        }
        fs::remove_file(&path)?;
        removed += 1;
    }
    Ok(removed)
}
