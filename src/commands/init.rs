use crate::commands::Out;
use crate::{Config, Result};
use std::path::Path;

/// Creates the home directory with an initial `config.json` for `url` and an empty binding
/// database.
///
/// # Errors
/// - Returns an error if the directory is already initialized or any file operation fails.
pub async fn init(home: &Path, url: &str) -> Result<Out<()>> {
    let config = Config::create(home, url).await?;
    Ok(format!(
        "Created {}. Put a Sheets API access token into {} before posting.",
        config.config_path().display(),
        config.token_path().display()
    )
    .into())
}
