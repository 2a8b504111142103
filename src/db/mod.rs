//! The local SQLite database that holds column bindings, cash buckets and FX rates.

mod migrations;

use crate::error::Res;
use crate::model::normalize_column;
use crate::routing::{CashBucket, ColumnBindingStore, FxRateProvider};
use anyhow::{bail, ensure, Context};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A `subject -> column` binding.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ColumnBinding {
    pub subject: String,
    pub column: String,
}

/// Everything the database knows, for `bind list`.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    pub columns: Vec<ColumnBinding>,
    pub cash_buckets: Vec<NamedCashBucket>,
    pub rates: Vec<(String, Decimal)>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct NamedCashBucket {
    pub name: String,
    #[serde(flatten)]
    pub bucket: CashBucket,
}

#[derive(Debug, Clone)]
pub(crate) struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Creates a new SQLite file at `path` (which must not exist) and brings its schema up to
    /// date.
    pub(crate) async fn init(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        ensure!(
            !path.exists(),
            "A database already exists at {}",
            path.display()
        );
        let db = Self::open(path, true).await?;
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&db.pool)
            .await
            .context("Failed to create schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&db.pool)
            .await
            .context("Failed to insert the initial schema version")?;
        migrations::run(&db.pool, 0, migrations::CURRENT_VERSION).await?;
        info!("Created database {}", path.display());
        Ok(db)
    }

    /// Opens the SQLite file at `path` and runs any pending migrations.
    pub(crate) async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display());
        }
        let db = Self::open(path, false).await?;
        let version = db.schema_version().await?;
        ensure!(
            version <= migrations::CURRENT_VERSION,
            "The database schema version {version} is newer than this program supports"
        );
        migrations::run(&db.pool, version, migrations::CURRENT_VERSION).await?;
        Ok(db)
    }

    async fn open(path: &Path, create: bool) -> Res<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .context("Failed to parse SQLite connection string")?
            .create_if_missing(create);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database {}", path.display()))?;
        Ok(Self { pool })
    }

    async fn schema_version(&self) -> Res<i32> {
        let row: (i32,) = sqlx::query_as("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to query the schema version")?;
        Ok(row.0)
    }

    /// Binds `subject` (upper-cased) to `column`, replacing any earlier binding.
    pub(crate) async fn set_column(&self, subject: &str, column: &str) -> Res<()> {
        let subject = subject_key(subject)?;
        let column = normalize_column(column)?;
        sqlx::query(
            "INSERT INTO column_bindings (subject, column_letter) VALUES (?, ?) \
             ON CONFLICT(subject) DO UPDATE SET column_letter = excluded.column_letter",
        )
        .bind(&subject)
        .bind(&column)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to bind '{subject}'"))?;
        debug!("Bound '{subject}' to column {column}");
        Ok(())
    }

    pub(crate) async fn set_cash_bucket(&self, name: &str, bucket: &CashBucket) -> Res<()> {
        let name = subject_key(name)?;
        let column = normalize_column(&bucket.column)?;
        sqlx::query(
            "INSERT INTO cash_buckets (name, column_letter, currency, display_name) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET column_letter = excluded.column_letter, \
             currency = excluded.currency, display_name = excluded.display_name",
        )
        .bind(&name)
        .bind(&column)
        .bind(bucket.currency.to_uppercase())
        .bind(&bucket.display_name)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save cash bucket '{name}'"))?;
        debug!("Cash bucket '{name}' now goes to column {column}");
        Ok(())
    }

    /// Stores the rate of `currency` in units per USD. The rate must be positive.
    pub(crate) async fn set_rate(&self, currency: &str, rate: Decimal) -> Res<()> {
        ensure!(rate > Decimal::ZERO, "The rate for {currency} must be positive");
        let currency = subject_key(currency)?;
        sqlx::query(
            "INSERT INTO fx_rates (currency, rate) VALUES (?, ?) \
             ON CONFLICT(currency) DO UPDATE SET rate = excluded.rate",
        )
        .bind(&currency)
        .bind(rate.to_string())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save the rate for {currency}"))?;
        Ok(())
    }

    /// Imports `subject,column` rows from CSV text with a header row. Returns the number of
    /// bindings written. Nothing is written when any row is invalid.
    pub(crate) async fn import_bindings_csv(&self, csv_text: &str) -> Res<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(csv_text.as_bytes());
        let mut rows = Vec::new();
        for (i, record) in reader.deserialize::<ColumnBinding>().enumerate() {
            // +2: one for the header, one for 1-based line numbers
            let binding = record.with_context(|| format!("Invalid CSV on line {}", i + 2))?;
            let subject = subject_key(&binding.subject)?;
            let column = normalize_column(&binding.column)
                .with_context(|| format!("Invalid column for '{subject}' on line {}", i + 2))?;
            rows.push((subject, column));
        }

        let mut tx = self.pool.begin().await.context("Failed to begin import")?;
        for (subject, column) in &rows {
            sqlx::query(
                "INSERT INTO column_bindings (subject, column_letter) VALUES (?, ?) \
                 ON CONFLICT(subject) DO UPDATE SET column_letter = excluded.column_letter",
            )
            .bind(subject)
            .bind(column)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to import '{subject}'"))?;
        }
        tx.commit().await.context("Failed to commit import")?;
        info!("Imported {} column binding(s)", rows.len());
        Ok(rows.len())
    }

    pub(crate) async fn list_bindings(&self) -> Res<Bindings> {
        let columns: Vec<(String, String)> = sqlx::query_as(
            "SELECT subject, column_letter FROM column_bindings ORDER BY subject",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list column bindings")?;

        let buckets: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT name, column_letter, currency, display_name FROM cash_buckets ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cash buckets")?;

        let rates: Vec<(String, String)> =
            sqlx::query_as("SELECT currency, rate FROM fx_rates ORDER BY currency")
                .fetch_all(&self.pool)
                .await
                .context("Failed to list FX rates")?;

        Ok(Bindings {
            columns: columns
                .into_iter()
                .map(|(subject, column)| ColumnBinding { subject, column })
                .collect(),
            cash_buckets: buckets
                .into_iter()
                .map(|(name, column, currency, display_name)| NamedCashBucket {
                    name,
                    bucket: CashBucket {
                        column,
                        currency,
                        display_name,
                    },
                })
                .collect(),
            rates: rates
                .into_iter()
                .map(|(currency, rate)| parse_rate(&rate).map(|r| (currency, r)))
                .collect::<Res<Vec<_>>>()?,
        })
    }
}

fn subject_key(subject: &str) -> Res<String> {
    let key = subject.trim().to_uppercase();
    ensure!(!key.is_empty(), "A subject cannot be empty");
    Ok(key)
}

fn parse_rate(text: &str) -> Res<Decimal> {
    Decimal::from_str(text).with_context(|| format!("Invalid stored rate '{text}'"))
}

#[async_trait::async_trait]
impl ColumnBindingStore for Db {
    async fn get_column(&self, subject: &str) -> Res<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT column_letter FROM column_bindings WHERE subject = ?")
                .bind(subject.trim().to_uppercase())
                .fetch_optional(&self.pool)
                .await
                .with_context(|| format!("Failed to look up the column for '{subject}'"))?;
        Ok(row.map(|(column,)| column))
    }

    async fn get_cash_bucket(&self, name: &str) -> Res<Option<CashBucket>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            "SELECT column_letter, currency, display_name FROM cash_buckets WHERE name = ?",
        )
        .bind(name.trim().to_uppercase())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to look up cash bucket '{name}'"))?;
        Ok(row.map(|(column, currency, display_name)| CashBucket {
            column,
            currency,
            display_name,
        }))
    }
}

#[async_trait::async_trait]
impl FxRateProvider for Db {
    async fn get_rate(&self, currency: &str) -> Res<Decimal> {
        let row: Option<(String,)> = sqlx::query_as("SELECT rate FROM fx_rates WHERE currency = ?")
            .bind(currency.trim().to_uppercase())
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to look up the rate for {currency}"))?;
        let Some((rate,)) = row else {
            bail!("No FX rate stored for {currency}");
        };
        let rate = parse_rate(&rate)?;
        ensure!(rate > Decimal::ZERO, "The FX rate for {currency} is not positive");
        Ok(rate)
    }
}
