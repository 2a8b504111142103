//! The grid store: a column/row-addressed remote store (a Google sheet) consumed only through
//! get, batch get, update and batch update.
//!
//! `GoogleSheet` talks to the Sheets API. `TestGrid` keeps cells in memory so that the whole
//! program can run, top to bottom, without touching Google; it can also inject failures.

mod google;
mod test_grid;

use crate::error::Res;
use crate::model::{CellAddress, CellRange};
use crate::Config;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub(crate) use google::GoogleSheet;
pub use test_grid::TestGrid;

/// Environment variable that, when set and non-empty, selects `Mode::Testing`.
pub const TEST_MODE_ENV: &str = "SHEET_LEDGER_IN_TEST_MODE";

/// Which grid store implementation to use.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Use the Google Sheets API.
    #[default]
    Google,
    /// Use the in-memory `TestGrid`.
    Testing,
}

serde_plain::derive_display_from_serialize!(Mode);

impl Mode {
    /// `Mode::Testing` when `SHEET_LEDGER_IN_TEST_MODE` is set and non-empty, otherwise
    /// `Mode::Google`.
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(value) if !value.is_empty() => Mode::Testing,
            _ => Mode::Google,
        }
    }
}

/// One value destined for one cell.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CellWrite {
    pub cell: CellAddress,
    pub value: String,
}

impl CellWrite {
    pub fn new(cell: CellAddress, value: impl Into<String>) -> Self {
        Self {
            cell,
            value: value.into(),
        }
    }
}

/// The operations this crate needs from a grid store.
///
/// Returned grids are row-major and may be ragged: trailing empty cells and trailing empty rows
/// can be omitted, exactly as the Sheets API does. Use `pad_grid` when a rectangle is needed.
/// Failures should carry a `crate::StoreError` so callers can tell transient from fatal.
#[async_trait::async_trait]
pub trait GridStore: Send + Sync {
    /// Reads the values of one range.
    async fn get(&self, range: &CellRange) -> Res<Vec<Vec<String>>>;

    /// Reads several ranges in one call, returning grids in the order of `ranges`.
    async fn batch_get(&self, ranges: &[CellRange]) -> Res<Vec<Vec<Vec<String>>>>;

    /// Writes one value into one cell of `sheet`.
    async fn update(&self, sheet: &str, write: &CellWrite) -> Res<()>;

    /// Writes several cells of `sheet` in one call.
    async fn batch_update(&self, sheet: &str, writes: &[CellWrite]) -> Res<()>;
}

/// Pads a possibly ragged grid into a `height` x `width` rectangle of strings.
pub fn pad_grid(mut grid: Vec<Vec<String>>, height: usize, width: usize) -> Vec<Vec<String>> {
    grid.truncate(height);
    grid.resize_with(height, Vec::new);
    for row in grid.iter_mut() {
        row.truncate(width);
        row.resize_with(width, String::new);
    }
    grid
}

/// Creates the grid store for `mode`.
pub async fn grid_store(config: &Config, mode: Mode) -> Res<Arc<dyn GridStore>> {
    match mode {
        Mode::Google => {
            let token = config.access_token().await?;
            Ok(Arc::new(GoogleSheet::new(config.spreadsheet_id(), token)))
        }
        Mode::Testing => Ok(Arc::new(TestGrid::new())),
    }
}
