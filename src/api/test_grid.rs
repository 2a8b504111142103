//! Implements the `GridStore` trait using in-memory data.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the
//! whole app, top-to-bottom, without using Google Sheets.

use crate::api::{CellWrite, GridStore};
use crate::error::{Res, StoreError};
use crate::model::{column_index, column_letters, CellAddress, CellRange};
use anyhow::Context;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tracing::trace;

/// Which calls an injected failure applies to.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Target {
    Any,
    Reads,
    Writes,
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by `(sheet, column index, row)`.
    cells: HashMap<(String, u32, u32), String>,
    failures: VecDeque<(Target, StoreError)>,
    reads: usize,
    writes: Vec<(String, CellWrite)>,
    write_calls: usize,
}

impl State {
    /// Pops the next injected failure if it applies to this kind of call.
    fn take_failure(&mut self, is_write: bool) -> Option<StoreError> {
        let applies = match self.failures.front() {
            Some((Target::Any, _)) => true,
            Some((Target::Reads, _)) => !is_write,
            Some((Target::Writes, _)) => is_write,
            None => false,
        };
        if applies {
            self.failures.pop_front().map(|(_, e)| e)
        } else {
            None
        }
    }

    fn read(&self, range: &CellRange) -> Vec<Vec<String>> {
        let mut grid: Vec<Vec<String>> = (range.first_row()..=range.last_row())
            .map(|row| {
                let mut values: Vec<String> = (range.first_column()..=range.last_column())
                    .map(|col| {
                        self.cells
                            .get(&(range.sheet().to_string(), col, row))
                            .cloned()
                            .unwrap_or_default()
                    })
                    .collect();
                // Like the Sheets API, trailing empty cells are omitted
                while values.last().is_some_and(|v| v.is_empty()) {
                    values.pop();
                }
                values
            })
            .collect();
        while grid.last().is_some_and(|r| r.is_empty()) {
            grid.pop();
        }
        grid
    }
}

/// An in-memory `GridStore` with failure injection and a log of every write.
#[derive(Debug, Default)]
pub struct TestGrid {
    state: Mutex<State>,
}

impl TestGrid {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test; keep going with the data
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets one cell.
    pub fn set(&self, sheet: &str, cell: &str, value: impl Into<String>) -> Res<()> {
        let cell: CellAddress = cell.parse()?;
        let col = column_index(cell.column())?;
        self.lock()
            .cells
            .insert((sheet.to_string(), col, cell.row()), value.into());
        Ok(())
    }

    /// Sets every cell of `range` to `value`.
    pub fn fill(&self, range: &str, value: &str) -> Res<()> {
        let range: CellRange = range.parse()?;
        let mut state = self.lock();
        for row in range.first_row()..=range.last_row() {
            for col in range.first_column()..=range.last_column() {
                state
                    .cells
                    .insert((range.sheet().to_string(), col, row), value.to_string());
            }
        }
        Ok(())
    }

    /// Reads one cell, `None` when it is empty.
    pub fn value(&self, sheet: &str, cell: &str) -> Option<String> {
        let cell: CellAddress = cell.parse().ok()?;
        let col = column_index(cell.column()).ok()?;
        self.lock()
            .cells
            .get(&(sheet.to_string(), col, cell.row()))
            .filter(|v| !v.is_empty())
            .cloned()
    }

    /// The next `count` calls of any kind fail with `error`.
    pub fn fail_next(&self, count: usize, error: StoreError) {
        self.push_failures(Target::Any, count, error);
    }

    /// The next `count` read calls fail with `error`.
    pub fn fail_next_reads(&self, count: usize, error: StoreError) {
        self.push_failures(Target::Reads, count, error);
    }

    /// The next `count` write calls fail with `error`.
    pub fn fail_next_writes(&self, count: usize, error: StoreError) {
        self.push_failures(Target::Writes, count, error);
    }

    fn push_failures(&self, target: Target, count: usize, error: StoreError) {
        let mut state = self.lock();
        for _ in 0..count {
            state.failures.push_back((target, error.clone()));
        }
    }

    /// Number of read calls (`get` and `batch_get`) that reached the grid.
    pub fn read_calls(&self) -> usize {
        self.lock().reads
    }

    /// Number of write calls (`update` and `batch_update`) that reached the grid.
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// Every cell written so far, in order, as `(sheet, write)`.
    pub fn writes(&self) -> Vec<(String, CellWrite)> {
        self.lock().writes.clone()
    }

    /// Renders a range as text, one line per row, for debugging failing tests.
    pub fn dump(&self, range: &str) -> Res<String> {
        let range: CellRange = range.parse()?;
        let state = self.lock();
        let mut out = String::new();
        for row in range.first_row()..=range.last_row() {
            let values: Vec<String> = (range.first_column()..=range.last_column())
                .map(|col| {
                    let v = state
                        .cells
                        .get(&(range.sheet().to_string(), col, row))
                        .cloned()
                        .unwrap_or_default();
                    format!("{}{}={}", column_letters(col), row, v)
                })
                .collect();
            out.push_str(&values.join(" "));
            out.push('\n');
        }
        Ok(out)
    }

    fn apply(&self, sheet: &str, writes: &[CellWrite]) -> Res<()> {
        let mut state = self.lock();
        if let Some(e) = state.take_failure(true) {
            return Err(e).with_context(|| format!("Failed to write {} cell(s)", writes.len()));
        }
        state.write_calls += 1;
        for w in writes {
            let col = column_index(w.cell.column())?;
            state
                .cells
                .insert((sheet.to_string(), col, w.cell.row()), w.value.clone());
            state.writes.push((sheet.to_string(), w.clone()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl GridStore for TestGrid {
    async fn get(&self, range: &CellRange) -> Res<Vec<Vec<String>>> {
        trace!("get {range}");
        let mut state = self.lock();
        if let Some(e) = state.take_failure(false) {
            return Err(e).with_context(|| format!("Failed to read {range}"));
        }
        state.reads += 1;
        Ok(state.read(range))
    }

    async fn batch_get(&self, ranges: &[CellRange]) -> Res<Vec<Vec<Vec<String>>>> {
        trace!("batch_get {} range(s)", ranges.len());
        let mut state = self.lock();
        if let Some(e) = state.take_failure(false) {
            return Err(e).with_context(|| format!("Failed to read {} range(s)", ranges.len()));
        }
        state.reads += 1;
        Ok(ranges.iter().map(|r| state.read(r)).collect())
    }

    async fn update(&self, sheet: &str, write: &CellWrite) -> Res<()> {
        trace!("update {}", write.cell.on_sheet(sheet));
        self.apply(sheet, std::slice::from_ref(write))
    }

    async fn batch_update(&self, sheet: &str, writes: &[CellWrite]) -> Res<()> {
        trace!("batch_update {} cell(s) on {sheet}", writes.len());
        self.apply(sheet, writes)
    }
}
