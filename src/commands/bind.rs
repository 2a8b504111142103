use crate::commands::Out;
use crate::db::Bindings;
use crate::error::{ErrorType, IntoResult};
use crate::routing::CashBucket;
use crate::{utils, Config, Result};
use std::path::Path;

/// Binds a crypto subject or card name to a column.
pub async fn bind_column(config: &Config, subject: &str, column: &str) -> Result<Out<()>> {
    config
        .db()
        .set_column(subject, column)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(format!("{} -> {}", subject.to_uppercase(), column.to_uppercase()).into())
}

/// Registers or replaces a cash bucket.
pub async fn bind_cash(
    config: &Config,
    name: &str,
    column: &str,
    currency: &str,
    display_name: &str,
) -> Result<Out<()>> {
    let bucket = CashBucket {
        column: column.to_string(),
        currency: currency.to_string(),
        display_name: display_name.to_string(),
    };
    config
        .db()
        .set_cash_bucket(name, &bucket)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(format!(
        "Cash bucket {} ({display_name}, {}) -> {}",
        name.to_uppercase(),
        currency.to_uppercase(),
        column.to_uppercase()
    )
    .into())
}

/// Imports `subject,column` bindings from a CSV file.
pub async fn bind_import(config: &Config, file: &Path) -> Result<Out<usize>> {
    let text = utils::read(file).await.pub_result(ErrorType::Io)?;
    let count = config
        .db()
        .import_bindings_csv(&text)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!("Imported {count} binding(s) from {}", file.display()),
        count,
    ))
}

/// Lists every binding, cash bucket and FX rate.
pub async fn bind_list(config: &Config) -> Result<Out<Bindings>> {
    let bindings = config
        .db()
        .list_bindings()
        .await
        .pub_result(ErrorType::Database)?;
    let mut lines = Vec::new();
    for b in &bindings.columns {
        lines.push(format!("{} -> {}", b.subject, b.column));
    }
    for b in &bindings.cash_buckets {
        lines.push(format!(
            "Cash {} ({}, {}) -> {}",
            b.name, b.bucket.display_name, b.bucket.currency, b.bucket.column
        ));
    }
    for (currency, rate) in &bindings.rates {
        lines.push(format!("1 USD = {rate} {currency}"));
    }
    if lines.is_empty() {
        lines.push("Nothing is bound yet".to_string());
    }
    Ok(Out::new(lines.join("\n"), bindings))
}
