//! Resolves financial subjects (crypto currencies, cards, cash buckets) to grid columns.

use crate::error::Res;
use crate::model::{normalize_column, ClassifiedEntry};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A named cash bucket and where its amounts go.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CashBucket {
    pub column: String,
    /// The currency the bucket's amounts are denominated in, used for FX conversion.
    pub currency: String,
    pub display_name: String,
}

/// Key-value lookups from a subject to a column letter.
#[async_trait::async_trait]
pub trait ColumnBindingStore: Send + Sync {
    /// The column bound to a crypto subject (`BTC`, `XMR2`) or card id, if any.
    async fn get_column(&self, subject: &str) -> Res<Option<String>>;

    /// The cash bucket registered under `name`, if any.
    async fn get_cash_bucket(&self, name: &str) -> Res<Option<CashBucket>>;
}

/// Exchange rates, expressed as units of `currency` per one USD.
#[async_trait::async_trait]
pub trait FxRateProvider: Send + Sync {
    async fn get_rate(&self, currency: &str) -> Res<Decimal>;
}

/// Where one subject lands in the grid.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Route {
    /// The key the column was looked up by.
    pub subject: String,
    /// A normalized column letter.
    pub column: String,
    /// What to show the operator, e.g. `BTC` or a cash bucket's display name.
    pub label: String,
    /// The FX currency for cash amounts (a bucket's currency); `None` for crypto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Why a subject could not be routed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Unrouted {
    /// No binding exists for the subject.
    Missing(String),
    /// The binding exists but is unusable, or the lookup itself failed.
    Broken { subject: String, message: String },
}

impl Unrouted {
    pub fn subject(&self) -> &str {
        match self {
            Unrouted::Missing(subject) => subject,
            Unrouted::Broken { subject, .. } => subject,
        }
    }
}

pub type RouteResult = std::result::Result<Route, Unrouted>;

/// The subject a crypto entry routes through. Currencies that need a wallet number get it
/// appended, e.g. `XMR` with wallet 2 routes as `XMR2`.
pub fn crypto_subject(currency: &str, wallet: Option<u8>) -> String {
    match wallet {
        Some(n) => format!("{}{n}", currency.to_uppercase()),
        None => currency.to_uppercase(),
    }
}

/// Looks columns up in a `ColumnBindingStore`.
pub struct ColumnRouter<'a> {
    bindings: &'a dyn ColumnBindingStore,
}

impl<'a> ColumnRouter<'a> {
    pub fn new(bindings: &'a dyn ColumnBindingStore) -> Self {
        Self { bindings }
    }

    /// Routes a crypto entry. `wallet` is the wallet number selected for the entry's row.
    pub async fn route_crypto(&self, entry: &ClassifiedEntry, wallet: Option<u8>) -> RouteResult {
        let currency = entry.currency.as_deref().unwrap_or_default();
        let subject = crypto_subject(currency, wallet);
        let column = self.column(&subject).await?;
        Ok(Route {
            label: subject.clone(),
            subject,
            column,
            currency: None,
        })
    }

    /// Routes a card by its name. The currency is taken from the cash bucket of the amount that
    /// is paired with the card, when known.
    pub async fn route_card(&self, card: &ClassifiedEntry, cash: Option<&ClassifiedEntry>) -> RouteResult {
        let subject = card
            .card_name
            .as_deref()
            .unwrap_or_default()
            .to_uppercase();
        let column = self.column(&subject).await?;
        let currency = match cash.and_then(|c| c.currency.as_deref()) {
            Some(bucket) => Some(self.bucket_currency(bucket).await),
            None => None,
        };
        Ok(Route {
            label: card.display.clone(),
            subject,
            column,
            currency,
        })
    }

    /// Routes a card-less cash amount by its bucket name.
    pub async fn route_cash(&self, entry: &ClassifiedEntry) -> RouteResult {
        let name = entry.currency.as_deref().unwrap_or_default();
        let bucket = self.bucket(name).await?;
        let column = normalize_column(&bucket.column).map_err(|e| Unrouted::Broken {
            subject: name.to_string(),
            message: format!("{e:#}"),
        })?;
        Ok(Route {
            subject: name.to_string(),
            column,
            label: bucket.display_name,
            currency: Some(bucket.currency),
        })
    }

    async fn column(&self, subject: &str) -> std::result::Result<String, Unrouted> {
        match self.bindings.get_column(subject).await {
            Ok(Some(column)) => {
                let column = normalize_column(&column).map_err(|e| Unrouted::Broken {
                    subject: subject.to_string(),
                    message: format!("{e:#}"),
                })?;
                debug!("Routed '{subject}' to column {column}");
                Ok(column)
            }
            Ok(None) => {
                warn!("No column bound for '{subject}'");
                Err(Unrouted::Missing(subject.to_string()))
            }
            Err(e) => {
                warn!("Column lookup for '{subject}' failed: {e:#}");
                Err(Unrouted::Broken {
                    subject: subject.to_string(),
                    message: format!("{e:#}"),
                })
            }
        }
    }

    async fn bucket(&self, name: &str) -> std::result::Result<CashBucket, Unrouted> {
        match self.bindings.get_cash_bucket(name).await {
            Ok(Some(bucket)) => Ok(bucket),
            Ok(None) => {
                warn!("No cash bucket named '{name}'");
                Err(Unrouted::Missing(name.to_string()))
            }
            Err(e) => {
                warn!("Cash bucket lookup for '{name}' failed: {e:#}");
                Err(Unrouted::Broken {
                    subject: name.to_string(),
                    message: format!("{e:#}"),
                })
            }
        }
    }

    /// The currency of a cash bucket, falling back to the bucket name itself.
    async fn bucket_currency(&self, name: &str) -> String {
        match self.bindings.get_cash_bucket(name).await {
            Ok(Some(bucket)) => bucket.currency,
            _ => name.to_string(),
        }
    }
}
