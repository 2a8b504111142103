use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use rust_decimal::Decimal;

/// Stores the rate of `currency` in units per USD.
pub async fn fx_set(config: &Config, currency: &str, rate: Decimal) -> Result<Out<()>> {
    config
        .db()
        .set_rate(currency, rate)
        .await
        .pub_result(ErrorType::Database)?;
    Ok(format!("1 USD = {rate} {}", currency.to_uppercase()).into())
}
