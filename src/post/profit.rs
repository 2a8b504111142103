//! Profit of an Add-mode post: what the fiat side is worth in USD minus what the crypto side
//! cost, surcharges included.

use crate::error::Res;
use crate::model::round_to_integer;
use crate::routing::FxRateProvider;
use anyhow::Context;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// The amounts profit is computed from.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ProfitInputs {
    /// Fiat totals (card and cash amounts) per currency.
    fiat: BTreeMap<String, Decimal>,
    /// Crypto totals in USD, surcharges included.
    crypto_usd: Decimal,
    /// Set when a money value of the batch is not in the totals.
    incomplete: bool,
}

impl ProfitInputs {
    pub fn add_fiat(&mut self, currency: &str, amount: Decimal) {
        let total = self.fiat.entry(currency.to_uppercase()).or_default();
        match total.checked_add(amount) {
            Some(sum) => *total = sum,
            None => self.incomplete = true,
        }
    }

    pub fn add_crypto(&mut self, amount: Decimal) {
        match self.crypto_usd.checked_add(amount) {
            Some(sum) => self.crypto_usd = sum,
            None => self.incomplete = true,
        }
    }

    /// Records that a value was left out, e.g. because it could not be routed. Profit is then
    /// unknown.
    pub fn mark_incomplete(&mut self) {
        self.incomplete = true;
    }

    pub fn is_complete(&self) -> bool {
        !self.incomplete
    }

    pub fn is_empty(&self) -> bool {
        self.fiat.is_empty() && self.crypto_usd.is_zero()
    }

    /// `sum(fiat / rate(currency)) - crypto`, rounded half away from zero. Fails when a value is
    /// missing from the totals, a rate is missing or not positive, or the arithmetic overflows.
    pub async fn compute(&self, rates: &dyn FxRateProvider) -> Res<i64> {
        anyhow::ensure!(
            !self.incomplete,
            "Not every amount of the batch is known, so the profit is not either"
        );
        let mut fiat_usd = Decimal::ZERO;
        for (currency, amount) in &self.fiat {
            let rate = rates.get_rate(currency).await?;
            anyhow::ensure!(rate > Decimal::ZERO, "The FX rate for {currency} is not positive");
            let usd = amount
                .checked_div(rate)
                .with_context(|| format!("Cannot convert {amount} {currency} to USD"))?;
            debug!("{amount} {currency} at {rate} is {usd} USD");
            fiat_usd = fiat_usd
                .checked_add(usd)
                .context("The fiat total overflows")?;
        }
        let difference = fiat_usd
            .checked_sub(self.crypto_usd)
            .context("The profit overflows")?;
        let profit = round_to_integer(difference);
        profit
            .to_i64()
            .with_context(|| format!("Profit {profit} does not fit into an integer"))
    }
}
