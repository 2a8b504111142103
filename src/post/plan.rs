//! Turns confirmed rows into routed `(column, amount)` values.

use crate::model::{ClassifiedEntry, FailedEntry, FailureReason, PostBatch};
use crate::post::profit::ProfitInputs;
use crate::routing::{crypto_subject, ColumnRouter, Route, Unrouted};
use rust_decimal::Decimal;

const OVERFLOW: &str = "amount overflow";

/// One value bound for one column.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct PlannedValue {
    pub column: String,
    pub label: String,
    pub amount: Decimal,
    pub currency: Option<String>,
}

impl PlannedValue {
    fn new(route: Route, amount: Decimal, currency: Option<String>) -> Self {
        Self {
            column: route.column,
            label: route.label,
            amount,
            currency,
        }
    }

    pub fn failed(&self, reason: FailureReason) -> FailedEntry {
        FailedEntry {
            label: self.label.clone(),
            amount: Some(self.amount),
            currency: self.currency.clone(),
            reason,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub values: Vec<PlannedValue>,
    pub failed: Vec<FailedEntry>,
    pub profit: ProfitInputs,
}

impl Plan {
    fn unrouted(&mut self, label: String, entry: &ClassifiedEntry, amount: Decimal, e: Unrouted) {
        let reason = match e {
            Unrouted::Missing(subject) => FailureReason::Unrouted(subject),
            Unrouted::Broken { subject, message } => {
                FailureReason::Invalid(format!("binding for '{subject}' is unusable: {message}"))
            }
        };
        self.profit.mark_incomplete();
        self.failed.push(FailedEntry {
            label,
            amount: Some(amount),
            currency: entry.currency.clone(),
            reason,
        });
    }

    /// A total that does not fit into a `Decimal`.
    fn overflow(&mut self, label: String, currency: Option<String>) {
        self.profit.mark_incomplete();
        self.failed.push(FailedEntry {
            label,
            amount: None,
            currency,
            reason: FailureReason::Invalid(OVERFLOW.to_string()),
        });
    }

    fn card_without_amount(&mut self, card: &ClassifiedEntry) {
        self.failed.push(FailedEntry {
            label: card.display.clone(),
            amount: None,
            currency: None,
            reason: FailureReason::Invalid("card without amount".to_string()),
        });
    }

    async fn add_crypto(
        &mut self,
        router: &ColumnRouter<'_>,
        entry: &ClassifiedEntry,
        wallet: Option<u8>,
        amount: Decimal,
    ) {
        match router.route_crypto(entry, wallet).await {
            Ok(route) => {
                self.profit.add_crypto(amount);
                let currency = Some(route.subject.clone());
                self.values.push(PlannedValue::new(route, amount, currency));
            }
            Err(e) => {
                let label = crypto_subject(entry.currency.as_deref().unwrap_or_default(), wallet);
                self.unrouted(label, entry, amount, e);
            }
        }
    }

    async fn add_card(
        &mut self,
        router: &ColumnRouter<'_>,
        card: &ClassifiedEntry,
        cash: &ClassifiedEntry,
    ) {
        let amount = cash.amount_or_zero();
        match router.route_card(card, Some(cash)).await {
            Ok(route) => {
                let currency = route.currency.clone();
                if let Some(currency) = &currency {
                    self.profit.add_fiat(currency, amount);
                }
                self.values.push(PlannedValue::new(route, amount, currency));
            }
            Err(e) => self.unrouted(card.display.clone(), cash, amount, e),
        }
    }

    async fn add_cash(&mut self, router: &ColumnRouter<'_>, cash: &ClassifiedEntry, amount: Decimal) {
        match router.route_cash(cash).await {
            Ok(route) => {
                let currency = route.currency.clone();
                if let Some(currency) = &currency {
                    self.profit.add_fiat(currency, amount);
                }
                self.values.push(PlannedValue::new(route, amount, currency));
            }
            Err(e) => {
                let label = cash.currency.clone().unwrap_or_default();
                self.unrouted(label, cash, amount, e);
            }
        }
    }
}

/// Add mode: crypto amounts are summed per subject and get `surcharge` once per subject, a card
/// takes the cash amount of its own row, card-less cash is summed per bucket, and values that
/// land in the same column are merged.
pub(crate) async fn plan_add(batch: &PostBatch, router: &ColumnRouter<'_>, surcharge: Decimal) -> Plan {
    let mut plan = Plan::default();
    // A `None` total has overflowed
    let mut crypto: Vec<(String, ClassifiedEntry, Option<u8>, Option<Decimal>)> = Vec::new();
    let mut pairs: Vec<(&ClassifiedEntry, &ClassifiedEntry)> = Vec::new();
    let mut lone_cash: Vec<(String, &ClassifiedEntry, Option<Decimal>)> = Vec::new();

    for row in &batch.rows {
        if let Some(entry) = &row.crypto {
            let wallet = batch.wallet(row.index);
            let subject = crypto_subject(entry.currency.as_deref().unwrap_or_default(), wallet);
            match crypto.iter_mut().find(|(s, ..)| *s == subject) {
                Some((_, _, _, total)) => {
                    *total = total.and_then(|t| t.checked_add(entry.amount_or_zero()))
                }
                None => crypto.push((subject, entry.clone(), wallet, Some(entry.amount_or_zero()))),
            }
        }
        match (&row.card, &row.cash) {
            (Some(card), Some(cash)) => pairs.push((card, cash)),
            (Some(card), None) => plan.card_without_amount(card),
            (None, Some(cash)) => {
                let bucket = cash.currency.clone().unwrap_or_default();
                match lone_cash.iter_mut().find(|(b, ..)| *b == bucket) {
                    Some((_, _, total)) => {
                        *total = total.and_then(|t| t.checked_add(cash.amount_or_zero()))
                    }
                    None => lone_cash.push((bucket, cash, Some(cash.amount_or_zero()))),
                }
            }
            (None, None) => {}
        }
    }

    for (subject, entry, wallet, total) in &crypto {
        match total.and_then(|t| t.checked_add(surcharge)) {
            Some(amount) => plan.add_crypto(router, entry, *wallet, amount).await,
            None => plan.overflow(subject.clone(), entry.currency.clone()),
        }
    }
    for (card, cash) in pairs {
        plan.add_card(router, card, cash).await;
    }
    for (bucket, cash, total) in lone_cash {
        match total {
            Some(amount) => plan.add_cash(router, cash, amount).await,
            None => plan.overflow(bucket, cash.currency.clone()),
        }
    }

    plan.merge_by_column();
    plan
}

/// Rate mode: every entry stands alone, in row order.
pub(crate) async fn plan_rate(batch: &PostBatch, router: &ColumnRouter<'_>) -> Plan {
    let mut plan = Plan::default();
    for row in &batch.rows {
        if let Some(entry) = &row.crypto {
            plan.add_crypto(router, entry, batch.wallet(row.index), entry.amount_or_zero())
                .await;
        }
        match (&row.card, &row.cash) {
            (Some(card), Some(cash)) => plan.add_card(router, card, cash).await,
            (Some(card), None) => plan.card_without_amount(card),
            (None, Some(cash)) => plan.add_cash(router, cash, cash.amount_or_zero()).await,
            (None, None) => {}
        }
    }
    plan
}

impl Plan {
    /// Merges values that land in the same column. A value whose sum would overflow stays out
    /// and fails.
    fn merge_by_column(&mut self) {
        let mut merged: Vec<PlannedValue> = Vec::new();
        for value in std::mem::take(&mut self.values) {
            let Some(m) = merged.iter_mut().find(|m| m.column == value.column) else {
                merged.push(value);
                continue;
            };
            match m.amount.checked_add(value.amount) {
                Some(amount) => {
                    m.amount = amount;
                    if m.label != value.label {
                        m.label = format!("{} + {}", m.label, value.label);
                    }
                    if m.currency != value.currency {
                        m.currency = None;
                    }
                }
                None => {
                    self.profit.mark_incomplete();
                    self.failed
                        .push(value.failed(FailureReason::Invalid(OVERFLOW.to_string())));
                }
            }
        }
        self.values = merged;
    }
}
