//! Finds the next usable row or cell inside a bounded range of the grid.
//!
//! Scans read the range in batches of `batch_rows` rows (50 by default) and stop at the first
//! batch that contains a hit, so a mostly empty range costs a single read. A row or cell counts
//! as free only when it is empty (whitespace-only values count as empty). When nothing is free
//! the finder returns `RowBounds::sentinel()`, i.e. `max_row + 1`; it never returns a row outside
//! `[start_row, max_row + 1]`.

use crate::api::{pad_grid, GridStore};
use crate::error::Res;
use crate::model::{CellRange, ColumnSpan, RowBounds};
use crate::retry::{ProgressHook, RetryPolicy};
use std::collections::BTreeMap;
use tracing::debug;

/// Default number of rows fetched per read.
pub const DEFAULT_BATCH_ROWS: u32 = 50;

/// Batched free row/cell scanner over one sheet.
pub struct FreeSlotFinder<'a> {
    store: &'a dyn GridStore,
    sheet: &'a str,
    retry: RetryPolicy,
    hook: Option<&'a ProgressHook>,
    batch_rows: u32,
}

impl<'a> FreeSlotFinder<'a> {
    pub fn new(store: &'a dyn GridStore, sheet: &'a str, retry: RetryPolicy) -> Self {
        Self {
            store,
            sheet,
            retry,
            hook: None,
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }

    pub fn with_batch_rows(mut self, batch_rows: u32) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }

    pub fn with_hook(mut self, hook: Option<&'a ProgressHook>) -> Self {
        self.hook = hook;
        self
    }

    /// Returns the first row in `bounds` whose cells across `span` are all empty, or the
    /// sentinel when every row holds something.
    pub async fn find_free_row(&self, span: ColumnSpan, bounds: RowBounds) -> Res<u32> {
        for (first, last) in self.batches(bounds.start_row(), bounds.max_row()) {
            let range = CellRange::new(self.sheet, span, first, last);
            let grid = self
                .retry
                .run(&format!("read {range}"), self.hook, || self.store.get(&range))
                .await?;
            let grid = pad_grid(grid, range.height(), range.width());
            if let Some(offset) = grid.iter().position(|row| row.iter().all(|v| is_empty(v))) {
                let row = first + offset as u32;
                debug!("Free row {row} found in {range}");
                return Ok(row);
            }
        }
        debug!(
            "No free row in {}!{}{}:{}{}",
            self.sheet,
            span.first(),
            bounds.start_row(),
            span.last(),
            bounds.max_row()
        );
        Ok(bounds.sentinel())
    }

    /// Returns the first empty cell of `column` in `bounds` at or after `from_row`, or the
    /// sentinel.
    pub async fn find_free_cell(&self, column: &str, bounds: RowBounds, from_row: u32) -> Res<u32> {
        let first_row = from_row.max(bounds.start_row());
        if first_row > bounds.max_row() {
            return Ok(bounds.sentinel());
        }
        for (first, last) in self.batches(first_row, bounds.max_row()) {
            let range = CellRange::column(self.sheet, column, first, last)?;
            let grid = self
                .retry
                .run(&format!("read {range}"), self.hook, || self.store.get(&range))
                .await?;
            if let Some(offset) = first_empty(grid, range.height()) {
                return Ok(first + offset as u32);
            }
        }
        Ok(bounds.sentinel())
    }

    /// Finds the first empty cell of each of `columns` in `bounds`, reading all still unresolved
    /// columns of a batch with one `batch_get`. Columns with no space map to the sentinel.
    pub async fn find_free_cells(
        &self,
        columns: &[String],
        bounds: RowBounds,
    ) -> Res<BTreeMap<String, u32>> {
        let mut found = BTreeMap::new();
        let mut pending: Vec<String> = Vec::new();
        for column in columns {
            if !pending.contains(column) {
                pending.push(column.clone());
            }
        }

        for (first, last) in self.batches(bounds.start_row(), bounds.max_row()) {
            if pending.is_empty() {
                break;
            }
            let ranges = pending
                .iter()
                .map(|c| CellRange::column(self.sheet, c, first, last))
                .collect::<Res<Vec<_>>>()?;
            let grids = self
                .retry
                .run(
                    &format!("read {} column(s) of {}", ranges.len(), self.sheet),
                    self.hook,
                    || self.store.batch_get(&ranges),
                )
                .await?;

            let height = (last - first + 1) as usize;
            let grids = grids.into_iter().chain(std::iter::repeat_with(Vec::new));
            let mut still_pending = Vec::new();
            for (column, grid) in pending.into_iter().zip(grids) {
                match first_empty(grid, height) {
                    Some(offset) => {
                        found.insert(column, first + offset as u32);
                    }
                    None => still_pending.push(column),
                }
            }
            pending = still_pending;
        }

        for column in pending {
            found.insert(column, bounds.sentinel());
        }
        Ok(found)
    }

    /// Splits `[first, last]` into inclusive batches of at most `batch_rows` rows.
    fn batches(&self, first: u32, last: u32) -> Vec<(u32, u32)> {
        let mut batches = Vec::new();
        let mut start = first;
        while start <= last {
            let end = start.saturating_add(self.batch_rows - 1).min(last);
            batches.push((start, end));
            if end == u32::MAX {
                break;
            }
            start = end + 1;
        }
        batches
    }
}

fn is_empty(value: &str) -> bool {
    value.trim().is_empty()
}

/// Offset of the first empty cell in a single-column grid of `height` rows.
fn first_empty(grid: Vec<Vec<String>>, height: usize) -> Option<usize> {
    pad_grid(grid, height, 1)
        .iter()
        .position(|row| is_empty(&row[0]))
}
