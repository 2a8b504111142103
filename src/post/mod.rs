//! Writes confirmed sessions into the grid.
//!
//! `LedgerPoster::post` never fails as a whole: every value that could not be written ends up
//! in `PostResult::failed` with the reason, next to the values that were written.

mod plan;
mod profit;

pub use profit::ProfitInputs;

use crate::api::{CellWrite, GridStore};
use crate::error::{StoreError, StoreErrorKind};
use crate::model::{
    format_amount, CellAddress, ColumnSpan, FailedEntry, FailureReason, PostBatch, PostMode,
    PostResult, RowBounds, WrittenEntry,
};
use crate::retry::{ProgressHook, RetryPolicy};
use crate::routing::{ColumnBindingStore, ColumnRouter, FxRateProvider};
use crate::slots::{FreeSlotFinder, DEFAULT_BATCH_ROWS};
use plan::{plan_add, plan_rate, Plan, PlannedValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{error, info, warn};

/// Tunable parts of posting.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostSettings {
    /// Added once per distinct crypto subject in Add mode.
    pub surcharge: Decimal,
    pub retry_attempts: u32,
    /// Backoff unit: attempt `n` waits `n * retry_delay_ms`.
    pub retry_delay_ms: u64,
    pub call_timeout_secs: u64,
    /// Rows read per scan request.
    pub batch_rows: u32,
}

impl Default for PostSettings {
    fn default() -> Self {
        Self {
            surcharge: Decimal::ONE,
            retry_attempts: crate::retry::DEFAULT_ATTEMPTS,
            retry_delay_ms: crate::retry::DEFAULT_DELAY.as_millis() as u64,
            call_timeout_secs: crate::retry::DEFAULT_CALL_TIMEOUT.as_secs(),
            batch_rows: DEFAULT_BATCH_ROWS,
        }
    }
}

impl PostSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_secs(self.call_timeout_secs),
        )
    }
}

/// Where a post goes: the sheet, the row range resolved from the partition key, the column span
/// scanned for a free row, and the optional profit column.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PostTarget {
    pub sheet: String,
    pub span: ColumnSpan,
    pub bounds: RowBounds,
    pub profit_column: Option<String>,
}

/// Routes, places and writes the values of a confirmed session.
pub struct LedgerPoster<'a> {
    store: &'a dyn GridStore,
    bindings: &'a dyn ColumnBindingStore,
    rates: Option<&'a dyn FxRateProvider>,
    settings: PostSettings,
    hook: Option<ProgressHook>,
}

impl<'a> LedgerPoster<'a> {
    pub fn new(
        store: &'a dyn GridStore,
        bindings: &'a dyn ColumnBindingStore,
        settings: PostSettings,
    ) -> Self {
        Self {
            store,
            bindings,
            rates: None,
            settings,
            hook: None,
        }
    }

    /// Enables profit computation for Add mode.
    pub fn with_rates(mut self, rates: &'a dyn FxRateProvider) -> Self {
        self.rates = Some(rates);
        self
    }

    /// Receives a notice before every retry.
    pub fn with_hook(mut self, hook: ProgressHook) -> Self {
        self.hook = Some(hook);
        self
    }

    pub async fn post(&self, batch: &PostBatch, target: &PostTarget) -> PostResult {
        let router = ColumnRouter::new(self.bindings);
        let result = match batch.mode {
            PostMode::Add => {
                let plan = plan_add(batch, &router, self.settings.surcharge).await;
                self.post_add(plan, target).await
            }
            PostMode::Rate => {
                let plan = plan_rate(batch, &router).await;
                self.post_rate(plan, target).await
            }
        };
        info!(
            "Posted {} value(s) in {} mode to {}, {} failed",
            result.written.len(),
            batch.mode,
            target.sheet,
            result.failed.len()
        );
        result
    }

    fn retry(&self) -> RetryPolicy {
        self.settings.retry_policy()
    }

    fn finder<'s>(&'s self, sheet: &'s str) -> FreeSlotFinder<'s> {
        FreeSlotFinder::new(self.store, sheet, self.retry())
            .with_batch_rows(self.settings.batch_rows)
            .with_hook(self.hook.as_ref())
    }

    /// Writes all values into one free row. If there is no free row, or the write fails, every
    /// value fails together and nothing is written.
    async fn post_add(&self, mut plan: Plan, target: &PostTarget) -> PostResult {
        let mut result = PostResult::default();
        for failed in plan.failed {
            result.push_failed(failed);
        }
        if plan.values.is_empty() {
            return result;
        }

        let row = match self
            .finder(&target.sheet)
            .find_free_row(target.span, target.bounds)
            .await
        {
            Ok(row) if target.bounds.contains(row) => row,
            Ok(_) => {
                warn!("No free row left in {} rows {}", target.sheet, target.bounds);
                fail_all(&mut result, &plan.values, FailureReason::SlotExhausted);
                return result;
            }
            Err(e) => {
                error!("Could not scan {} for a free row: {e:#}", target.sheet);
                fail_all(&mut result, &plan.values, store_reason(&e));
                return result;
            }
        };

        let mut cells = Vec::with_capacity(plan.values.len());
        for value in &plan.values {
            match CellAddress::new(&value.column, row) {
                Ok(cell) => {
                    if !target.span.contains(&value.column) {
                        warn!("Column {} is outside the scanned span", value.column);
                    }
                    cells.push((cell, value));
                }
                Err(e) => {
                    plan.profit.mark_incomplete();
                    result.push_failed(value.failed(FailureReason::Invalid(format!("{e:#}"))));
                }
            }
        }
        if cells.is_empty() {
            return result;
        }

        let writes: Vec<CellWrite> = cells
            .iter()
            .map(|(cell, v)| CellWrite::new(cell.clone(), format_amount(v.amount)))
            .collect();
        let operation = format!("write {} cell(s) to {}!{row}", writes.len(), target.sheet);
        let outcome = self
            .retry()
            .run(&operation, self.hook.as_ref(), || {
                self.store.batch_update(&target.sheet, &writes)
            })
            .await;
        match outcome {
            Ok(()) => {
                for (cell, value) in cells {
                    result.push_written(written(cell, value));
                }
            }
            Err(e) => {
                let reason = store_reason(&e);
                for (_, value) in cells {
                    result.push_failed(value.failed(reason.clone()));
                }
                return result;
            }
        }

        if let Some(rates) = self.rates {
            self.post_profit(&plan.profit, rates, target, row, &mut result)
                .await;
        }
        result
    }

    async fn post_profit(
        &self,
        inputs: &ProfitInputs,
        rates: &dyn FxRateProvider,
        target: &PostTarget,
        row: u32,
        result: &mut PostResult,
    ) {
        let profit = match inputs.compute(rates).await {
            Ok(profit) => profit,
            Err(e) => {
                warn!("Profit not computed: {e:#}");
                return;
            }
        };
        result.profit = Some(profit);
        let Some(column) = &target.profit_column else {
            return;
        };

        let amount = Decimal::from(profit);
        let cell = match CellAddress::new(column, row) {
            Ok(cell) => cell,
            Err(e) => {
                result.push_failed(profit_failure(amount, FailureReason::Invalid(format!("{e:#}"))));
                return;
            }
        };
        let write = CellWrite::new(cell.clone(), profit.to_string());
        let outcome = self
            .retry()
            .run(
                &format!("write profit to {}", cell.on_sheet(&target.sheet)),
                self.hook.as_ref(),
                || self.store.update(&target.sheet, &write),
            )
            .await;
        match outcome {
            Ok(()) => result.push_written(WrittenEntry {
                cell,
                label: "profit".to_string(),
                amount,
                currency: Some("USD".to_string()),
            }),
            Err(e) => result.push_failed(profit_failure(amount, store_reason(&e))),
        }
    }

    /// Writes every value into the first free cell of its own column. Values sharing a column
    /// take successive free cells. Each value succeeds or fails on its own.
    async fn post_rate(&self, plan: Plan, target: &PostTarget) -> PostResult {
        let mut result = PostResult::default();
        for failed in plan.failed {
            result.push_failed(failed);
        }
        if plan.values.is_empty() {
            return result;
        }

        let finder = self.finder(&target.sheet);
        let columns: Vec<String> = plan.values.iter().map(|v| v.column.clone()).collect();
        // Columns whose follow-up scan failed, with the reason
        let mut unreadable: BTreeMap<String, FailureReason> = BTreeMap::new();
        let mut next: BTreeMap<String, u32> = match finder.find_free_cells(&columns, target.bounds).await {
            Ok(found) => found,
            Err(e) => {
                error!("Could not scan {} for free cells: {e:#}", target.sheet);
                fail_all(&mut result, &plan.values, store_reason(&e));
                return result;
            }
        };

        for value in &plan.values {
            if let Some(reason) = unreadable.get(&value.column) {
                result.push_failed(value.failed(reason.clone()));
                continue;
            }
            let row = next
                .get(&value.column)
                .copied()
                .unwrap_or(target.bounds.sentinel());
            if !target.bounds.contains(row) {
                warn!(
                    "Column {} has no free cell in rows {}",
                    value.column, target.bounds
                );
                result.push_failed(value.failed(FailureReason::SlotExhausted));
                continue;
            }
            let cell = match CellAddress::new(&value.column, row) {
                Ok(cell) => cell,
                Err(e) => {
                    result.push_failed(value.failed(FailureReason::Invalid(format!("{e:#}"))));
                    continue;
                }
            };

            let write = CellWrite::new(cell.clone(), format_amount(value.amount));
            let outcome = self
                .retry()
                .run(
                    &format!("write {}", cell.on_sheet(&target.sheet)),
                    self.hook.as_ref(),
                    || self.store.update(&target.sheet, &write),
                )
                .await;
            match outcome {
                Ok(()) => {
                    result.push_written(written(cell, value));
                    match finder
                        .find_free_cell(&value.column, target.bounds, row + 1)
                        .await
                    {
                        Ok(following) => {
                            next.insert(value.column.clone(), following);
                        }
                        Err(e) => {
                            warn!("Could not scan column {}: {e:#}", value.column);
                            unreadable.insert(value.column.clone(), store_reason(&e));
                        }
                    }
                }
                Err(e) => result.push_failed(value.failed(store_reason(&e))),
            }
        }
        result
    }
}

fn written(cell: CellAddress, value: &PlannedValue) -> WrittenEntry {
    WrittenEntry {
        cell,
        label: value.label.clone(),
        amount: value.amount,
        currency: value.currency.clone(),
    }
}

fn fail_all(result: &mut PostResult, values: &[PlannedValue], reason: FailureReason) {
    for value in values {
        result.push_failed(value.failed(reason.clone()));
    }
}

fn store_reason(e: &anyhow::Error) -> FailureReason {
    match StoreError::find(e) {
        Some(store) => FailureReason::Store {
            kind: store.kind(),
            message: store.to_string(),
        },
        None => FailureReason::Store {
            kind: StoreErrorKind::Fatal,
            message: format!("{e:#}"),
        },
    }
}

fn profit_failure(amount: Decimal, reason: FailureReason) -> FailedEntry {
    FailedEntry {
        label: "profit".to_string(),
        amount: Some(amount),
        currency: Some("USD".to_string()),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TestGrid;
    use crate::model::{ClassifiedEntry, LedgerRow};
    use crate::retry::RetryNotice;
    use crate::test::{MemoryBindings, MemoryRates};
    use std::sync::{Arc, Mutex};

    const SHEET: &str = "Ledger";

    fn settings() -> PostSettings {
        PostSettings {
            retry_delay_ms: 1,
            call_timeout_secs: 5,
            ..PostSettings::default()
        }
    }

    fn bindings() -> MemoryBindings {
        let mut b = MemoryBindings::default();
        b.column("BTC", "C");
        b.column("LTC", "D");
        b.column("SBER", "H");
        b.bucket("RUB", "J", "RUB", "Cash RUB");
        b
    }

    fn target() -> PostTarget {
        PostTarget {
            sheet: SHEET.to_string(),
            span: ColumnSpan::new("B", "K").unwrap(),
            bounds: RowBounds::new(5, 20).unwrap(),
            profit_column: Some("L".to_string()),
        }
    }

    fn row(index: usize, entries: Vec<ClassifiedEntry>) -> LedgerRow {
        let mut row = LedgerRow::new(index);
        for e in entries {
            row.try_insert(e).unwrap();
        }
        row
    }

    fn btc(thousandths: i64) -> ClassifiedEntry {
        ClassifiedEntry::crypto(Decimal::new(thousandths, 3), "BTC")
    }

    fn ltc(tenths: i64) -> ClassifiedEntry {
        ClassifiedEntry::crypto(Decimal::new(tenths, 1), "LTC")
    }

    fn rub(amount: i64) -> ClassifiedEntry {
        ClassifiedEntry::cash(Decimal::from(amount), "RUB", false)
    }

    #[tokio::test]
    async fn test_add_same_currency_one_cell_one_surcharge() {
        let grid = TestGrid::new();
        grid.fill("Ledger!B5:K6", "x").unwrap();
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        let batch = PostBatch::new(
            vec![row(0, vec![btc(8)]), row(1, vec![btc(10)])],
            PostMode::Add,
        );
        let result = poster.post(&batch, &target()).await;
        assert!(result.failed.is_empty(), "{}", result.summary());
        assert_eq!(result.written.len(), 1);
        assert_eq!(result.written[0].cell.to_string(), "C7");
        assert_eq!(result.written[0].amount, Decimal::new(1018, 3));
        assert_eq!(grid.value(SHEET, "C7").as_deref(), Some("1.018"));
        assert_eq!(result.rows, vec![7]);
    }

    #[tokio::test]
    async fn test_add_exhausted_range_writes_nothing() {
        let grid = TestGrid::new();
        grid.fill("Ledger!B5:K20", "x").unwrap();
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        let batch = PostBatch::new(vec![row(0, vec![btc(8), rub(5000)])], PostMode::Add);
        let result = poster.post(&batch, &target()).await;
        assert!(!result.success());
        assert_eq!(result.failed.len(), 2);
        assert!(result
            .failed
            .iter()
            .all(|f| f.reason == FailureReason::SlotExhausted));
        assert_eq!(grid.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_with_profit() {
        let grid = TestGrid::new();
        let b = bindings();
        let mut rates = MemoryRates::default();
        rates.set("RUB", Decimal::from(100));
        let poster = LedgerPoster::new(&grid, &b, settings()).with_rates(&rates);
        let batch = PostBatch::new(
            vec![row(
                0,
                vec![
                    ClassifiedEntry::crypto(Decimal::from(40), "BTC"),
                    ClassifiedEntry::card("SBER", None, None),
                    rub(5000),
                ],
            )],
            PostMode::Add,
        );
        let result = poster.post(&batch, &target()).await;
        assert!(result.failed.is_empty(), "{}", result.summary());
        // 5000 / 100 - (40 + 1)
        assert_eq!(result.profit, Some(9));
        assert_eq!(grid.value(SHEET, "C5").as_deref(), Some("41"));
        assert_eq!(grid.value(SHEET, "H5").as_deref(), Some("5000"));
        assert_eq!(grid.value(SHEET, "L5").as_deref(), Some("9"));
        assert_eq!(result.written.len(), 3);
    }

    /// Accepts batch writes, refuses single-cell writes.
    struct RefusingUpdates(TestGrid);

    #[async_trait::async_trait]
    impl GridStore for RefusingUpdates {
        async fn get(&self, range: &crate::model::CellRange) -> crate::error::Res<Vec<Vec<String>>> {
            self.0.get(range).await
        }

        async fn batch_get(
            &self,
            ranges: &[crate::model::CellRange],
        ) -> crate::error::Res<Vec<Vec<Vec<String>>>> {
            self.0.batch_get(ranges).await
        }

        async fn update(&self, _sheet: &str, _write: &CellWrite) -> crate::error::Res<()> {
            Err(StoreError::fatal("403 Forbidden").into())
        }

        async fn batch_update(&self, sheet: &str, writes: &[CellWrite]) -> crate::error::Res<()> {
            self.0.batch_update(sheet, writes).await
        }
    }

    #[tokio::test]
    async fn test_failed_profit_write_is_reported() {
        let grid = RefusingUpdates(TestGrid::new());
        let b = bindings();
        let mut rates = MemoryRates::default();
        rates.set("RUB", Decimal::from(100));
        let poster = LedgerPoster::new(&grid, &b, settings()).with_rates(&rates);
        let batch = PostBatch::new(vec![row(0, vec![rub(3000)])], PostMode::Add);

        let result = poster.post(&batch, &target()).await;
        assert_eq!(result.profit, Some(30));
        assert_eq!(grid.0.value(SHEET, "J5").as_deref(), Some("3000"));
        assert_eq!(grid.0.value(SHEET, "L5"), None);
        assert_eq!(result.status(), crate::model::PostStatus::PartiallyPosted);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].label, "profit");
    }

    #[tokio::test]
    async fn test_profit_without_column_is_only_reported() {
        let grid = TestGrid::new();
        let b = bindings();
        let mut rates = MemoryRates::default();
        rates.set("RUB", Decimal::from(100));
        let poster = LedgerPoster::new(&grid, &b, settings()).with_rates(&rates);
        let batch = PostBatch::new(vec![row(0, vec![rub(3000)])], PostMode::Add);
        let mut t = target();
        t.profit_column = None;

        let result = poster.post(&batch, &t).await;
        assert_eq!(result.profit, Some(30));
        assert_eq!(result.written.len(), 1);
        assert_eq!(grid.write_calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_partial_success() {
        let grid = TestGrid::new();
        grid.fill("Ledger!D5:D20", "1").unwrap();
        grid.fill("Ledger!C5:C6", "1").unwrap();
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        let batch = PostBatch::new(
            vec![row(0, vec![btc(8)]), row(1, vec![ltc(8)]), row(2, vec![rub(5000)])],
            PostMode::Rate,
        );
        let result = poster.post(&batch, &target()).await;
        assert!(result.success());
        let written: Vec<String> = result.written.iter().map(|w| w.cell.to_string()).collect();
        assert_eq!(written, vec!["C7", "J5"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].label, "LTC");
        assert_eq!(result.failed[0].reason, FailureReason::SlotExhausted);
        assert_eq!(result.profit, None);
    }

    #[tokio::test]
    async fn test_rate_same_column_takes_successive_cells() {
        let grid = TestGrid::new();
        grid.set(SHEET, "C6", "1").unwrap();
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        let batch = PostBatch::new(
            vec![
                row(0, vec![btc(1)]),
                row(1, vec![btc(2)]),
                row(2, vec![btc(3)]),
            ],
            PostMode::Rate,
        );
        let result = poster.post(&batch, &target()).await;
        let written: Vec<String> = result.written.iter().map(|w| w.cell.to_string()).collect();
        assert_eq!(written, vec!["C5", "C7", "C8"]);
    }

    #[tokio::test]
    async fn test_transient_errors_then_success() {
        let grid = TestGrid::new();
        let b = bindings();
        let notices = Arc::new(Mutex::new(Vec::<RetryNotice>::new()));
        let sink = notices.clone();
        let hook: ProgressHook = Arc::new(move |n| sink.lock().unwrap().push(n));
        let poster = LedgerPoster::new(&grid, &b, settings()).with_hook(hook);
        grid.fail_next_writes(4, StoreError::transient("429 Too Many Requests"));

        let batch = PostBatch::new(vec![row(0, vec![btc(8)])], PostMode::Add);
        let result = poster.post(&batch, &target()).await;
        assert!(result.failed.is_empty(), "{}", result.summary());
        assert_eq!(result.written.len(), 1);
        assert_eq!(grid.write_calls(), 1);
        assert_eq!(notices.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_fatal_error_fails_every_value() {
        let grid = TestGrid::new();
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        grid.fail_next_writes(1, StoreError::fatal("403 Forbidden"));

        let batch = PostBatch::new(vec![row(0, vec![btc(8), rub(5000)])], PostMode::Add);
        let result = poster.post(&batch, &target()).await;
        assert!(!result.success());
        assert_eq!(result.failed.len(), 2);
        assert!(matches!(
            &result.failed[0].reason,
            FailureReason::Store { kind: StoreErrorKind::Fatal, message } if message.contains("403")
        ));
        assert_eq!(
            result.failed[0].reason.error_type(),
            crate::error::ErrorType::FatalStore
        );
        assert_eq!(grid.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_transient_store() {
        let grid = TestGrid::new();
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        grid.fail_next_writes(5, StoreError::transient("503 Service Unavailable"));

        let batch = PostBatch::new(vec![row(0, vec![btc(8)])], PostMode::Add);
        let result = poster.post(&batch, &target()).await;
        assert!(!result.success());
        assert_eq!(
            result.failed[0].reason.error_type(),
            crate::error::ErrorType::TransientStore
        );
    }

    #[tokio::test]
    async fn test_unrouted_crypto_leaves_profit_unknown() {
        let grid = TestGrid::new();
        let b = bindings();
        let mut rates = MemoryRates::default();
        rates.set("RUB", Decimal::from(100));
        let poster = LedgerPoster::new(&grid, &b, settings()).with_rates(&rates);
        let batch = PostBatch::new(
            vec![
                row(0, vec![ClassifiedEntry::crypto(Decimal::new(5, 1), "DOGE")]),
                row(1, vec![ClassifiedEntry::card("SBER", None, None), rub(5000)]),
            ],
            PostMode::Add,
        );
        let result = poster.post(&batch, &target()).await;
        assert_eq!(grid.value(SHEET, "H5").as_deref(), Some("5000"));
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].reason, FailureReason::Unrouted("DOGE".to_string()));
        assert_eq!(result.profit, None);
        assert_eq!(grid.value(SHEET, "L5"), None);
        assert_eq!(result.written.len(), 1);
    }

    #[tokio::test]
    async fn test_add_overflow_is_reported() {
        let grid = TestGrid::new();
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        let half = ClassifiedEntry::crypto(Decimal::MAX / Decimal::TWO + Decimal::ONE, "BTC");
        let batch = PostBatch::new(
            vec![row(0, vec![half.clone()]), row(1, vec![half])],
            PostMode::Add,
        );
        let result = poster.post(&batch, &target()).await;
        assert!(!result.success());
        assert_eq!(result.failed.len(), 1);
        assert_eq!(
            result.failed[0].reason,
            FailureReason::Invalid("amount overflow".to_string())
        );
        assert_eq!(grid.write_calls(), 0);
    }

    /// Serves batch reads and writes, refuses single-range reads.
    struct RefusingGets(TestGrid);

    #[async_trait::async_trait]
    impl GridStore for RefusingGets {
        async fn get(&self, _range: &crate::model::CellRange) -> crate::error::Res<Vec<Vec<String>>> {
            Err(StoreError::fatal("403 Forbidden").into())
        }

        async fn batch_get(
            &self,
            ranges: &[crate::model::CellRange],
        ) -> crate::error::Res<Vec<Vec<Vec<String>>>> {
            self.0.batch_get(ranges).await
        }

        async fn update(&self, sheet: &str, write: &CellWrite) -> crate::error::Res<()> {
            self.0.update(sheet, write).await
        }

        async fn batch_update(&self, sheet: &str, writes: &[CellWrite]) -> crate::error::Res<()> {
            self.0.batch_update(sheet, writes).await
        }
    }

    #[tokio::test]
    async fn test_rate_scan_failure_after_write_is_a_store_failure() {
        let grid = RefusingGets(TestGrid::new());
        let b = bindings();
        let poster = LedgerPoster::new(&grid, &b, settings());
        let batch = PostBatch::new(
            vec![row(0, vec![btc(1)]), row(1, vec![btc(2)]), row(2, vec![rub(500)])],
            PostMode::Rate,
        );
        let result = poster.post(&batch, &target()).await;

        let written: Vec<String> = result.written.iter().map(|w| w.cell.to_string()).collect();
        assert_eq!(written, vec!["C5", "J5"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].amount, Some(Decimal::new(2, 3)));
        assert!(matches!(
            &result.failed[0].reason,
            FailureReason::Store { kind: StoreErrorKind::Fatal, message } if message.contains("403")
        ));
        assert_eq!(grid.0.value(SHEET, "C6"), None);
    }
}
