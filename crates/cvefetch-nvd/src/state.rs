//! Pipeline state types for NVD fetching

use std::fmt;

use cvefetch_core::{FetchPosition, FetchWindow};
use serde::Deserialize;

/// Which record timestamp the window bounds filter on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    /// First publication date (`pubStartDate` / `pubEndDate`)
    #[default]
    Published,
    /// Last modification date (`lastModStartDate` / `lastModEndDate`)
    Modified,
}

impl DateFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Modified => "modified",
        }
    }

    /// Query parameter names for the window start and end
    pub fn param_names(self) -> (&'static str, &'static str) {
        match self {
            Self::Published => ("pubStartDate", "pubEndDate"),
            Self::Modified => ("lastModStartDate", "lastModEndDate"),
        }
    }
}

impl fmt::Display for DateFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory cursor over the planned windows. Not persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchState {
    pub current_window_index: usize,
    pub current_offset: u64,
}

impl FetchState {
    /// Move to the start of window `index`
    pub fn enter_window(&mut self, index: usize) {
        self.current_window_index = index;
        self.current_offset = 0;
    }

    pub fn advance(&mut self, returned: u64) {
        self.current_offset += returned;
    }

    pub fn position(&self, windows: &[FetchWindow]) -> Option<FetchPosition> {
        let window = *windows.get(self.current_window_index)?;
        Some(FetchPosition {
            window_index: self.current_window_index,
            window_count: windows.len(),
            window,
            offset: self.current_offset,
        })
    }
}
