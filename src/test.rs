//! Shared test utilities.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::error::Res;
use crate::routing::{CashBucket, ColumnBindingStore, FxRateProvider};
use crate::Config;
use anyhow::anyhow;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tempfile::TempDir;
use uuid::Uuid;

/// Test environment with a home directory, `Config` and an initialized database.
/// Holds the `TempDir` to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    config: Config,
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("sheet-ledger");
        let rand = Uuid::new_v4().to_string().replace('-', "");
        let sheet_url = format!("https://docs.google.com/spreadsheets/d/{rand}/edit");
        let config = Config::create(&root, &sheet_url).await.unwrap();
        Self {
            _temp_dir: temp_dir,
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config.clone()
    }
}

/// Column bindings and cash buckets held in memory.
#[derive(Debug, Default)]
pub struct MemoryBindings {
    columns: HashMap<String, String>,
    buckets: HashMap<String, CashBucket>,
}

impl MemoryBindings {
    pub fn column(&mut self, subject: &str, column: &str) {
        self.columns
            .insert(subject.to_uppercase(), column.to_string());
    }

    pub fn bucket(&mut self, name: &str, column: &str, currency: &str, display_name: &str) {
        self.buckets.insert(
            name.to_uppercase(),
            CashBucket {
                column: column.to_string(),
                currency: currency.to_string(),
                display_name: display_name.to_string(),
            },
        );
    }
}

#[async_trait::async_trait]
impl ColumnBindingStore for MemoryBindings {
    async fn get_column(&self, subject: &str) -> Res<Option<String>> {
        Ok(self.columns.get(&subject.to_uppercase()).cloned())
    }

    async fn get_cash_bucket(&self, name: &str) -> Res<Option<CashBucket>> {
        Ok(self.buckets.get(&name.to_uppercase()).cloned())
    }
}

/// FX rates held in memory.
#[derive(Debug, Default)]
pub struct MemoryRates {
    rates: HashMap<String, Decimal>,
}

impl MemoryRates {
    pub fn set(&mut self, currency: &str, rate: Decimal) {
        self.rates.insert(currency.to_uppercase(), rate);
    }
}

#[async_trait::async_trait]
impl FxRateProvider for MemoryRates {
    async fn get_rate(&self, currency: &str) -> Res<Decimal> {
        self.rates
            .get(&currency.to_uppercase())
            .copied()
            .ok_or_else(|| anyhow!("No FX rate for {currency}"))
    }
}
