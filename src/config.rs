//! Configuration file handling.
//!
//! The configuration file is stored at `$SHEET_LEDGER_HOME/config.json` and contains the Google
//! Sheet URL, the grid layout (which rows each weekday posts into, which columns are scanned) and
//! the classifier, session and posting settings.

use crate::classify::ClassifierSettings;
use crate::db::Db;
use crate::error::{ErrorType, IntoResult, Res};
use crate::model::{ColumnSpan, PostMode, RowBounds};
use crate::post::{PostSettings, PostTarget};
use crate::session::SessionSettings;
use crate::{utils, Result};
use anyhow::{bail, ensure, Context};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "sheet-ledger";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const ACCESS_TOKEN: &str = "access_token";
const CONFIG_JSON: &str = "config.json";
const LEDGER_SQLITE: &str = "sheet-ledger.sqlite";
const DEFAULT_SHEET_NAME: &str = "Ledger";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$SHEET_LEDGER_HOME` and from there it loads `config.json`. It provides paths to
/// other items that are expected in a certain location within the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
    db: Db,
    spreadsheet_id: String,
    sqlite_path: PathBuf,
}

impl Config {
    /// Creates the home directory and its `.secrets` subdirectory, writes an initial
    /// `config.json` for `sheet_url` with default settings, and initializes the SQLite database.
    ///
    /// # Arguments
    /// - `dir` - The home directory, e.g. `$HOME/sheet-ledger`
    /// - `sheet_url` - The URL of the Google Sheet that holds the ledger, e.g.
    ///   https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    pub async fn create(dir: impl Into<PathBuf>, sheet_url: &str) -> Result<Self> {
        Self::create_inner(dir.into(), sheet_url)
            .await
            .pub_result(ErrorType::Config)
    }

    async fn create_inner(maybe_relative: PathBuf, sheet_url: &str) -> Res<Self> {
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;
        let config_path = root.join(CONFIG_JSON);
        ensure!(
            !config_path.exists(),
            "A config file already exists at '{}'",
            config_path.display()
        );

        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;

        let spreadsheet_id = extract_spreadsheet_id(sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let config_file = ConfigFile {
            sheet_url: sheet_url.to_string(),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        let sqlite_path = root.join(LEDGER_SQLITE);
        let db = Db::init(&sqlite_path)
            .await
            .context("Unable to create SQLite DB")?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
            db,
            spreadsheet_id,
            sqlite_path,
        })
    }

    /// This will
    /// - validate that the home directory and the config file exist
    /// - load and validate the config file
    /// - open the SQLite database, migrating it if needed
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        Self::load_inner(home.into())
            .await
            .pub_result(ErrorType::Config)
    }

    async fn load_inner(maybe_relative: PathBuf) -> Res<Self> {
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The home directory is missing")?;

        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;

        let spreadsheet_id = extract_spreadsheet_id(&config_file.sheet_url)
            .context("Failed to extract spreadsheet ID from sheet URL")?
            .to_string();

        let sqlite_path = root.join(LEDGER_SQLITE);
        let db = Db::load(&sqlite_path)
            .await
            .context("Unable to load SQLite DB")?;

        Ok(Self {
            secrets: root.join(SECRETS),
            root,
            config_path,
            config_file,
            db,
            spreadsheet_id,
            sqlite_path,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub(crate) fn db(&self) -> &Db {
        &self.db
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn sheet_url(&self) -> &str {
        &self.config_file.sheet_url
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    pub fn sheet_name(&self) -> &str {
        &self.config_file.sheet_name
    }

    pub fn sqlite_path(&self) -> &Path {
        &self.sqlite_path
    }

    pub fn classifier_settings(&self) -> &ClassifierSettings {
        &self.config_file.classifier
    }

    pub fn session_settings(&self) -> &SessionSettings {
        &self.config_file.session
    }

    pub fn post_settings(&self) -> &PostSettings {
        &self.config_file.posting
    }

    /// The column span scanned for a free row in Add mode.
    pub fn add_span(&self) -> Result<ColumnSpan> {
        self.config_file
            .layout
            .span()
            .pub_result(ErrorType::Config)
    }

    pub fn profit_column(&self) -> Option<&str> {
        self.config_file.layout.profit_column.as_deref()
    }

    /// The rows Add mode writes into on `weekday`.
    pub fn add_range(&self, weekday: Weekday) -> RowBounds {
        self.config_file.layout.weekday_ranges[weekday.num_days_from_monday() as usize]
    }

    /// The rows Rate mode writes into.
    pub fn rate_range(&self) -> RowBounds {
        self.config_file.layout.rate_range
    }

    /// Where a post in `mode` goes. `weekday` selects the Add range and is ignored for Rate.
    pub fn post_target(&self, mode: PostMode, weekday: Weekday) -> Result<PostTarget> {
        let (bounds, profit_column) = match mode {
            PostMode::Add => (
                self.add_range(weekday),
                self.profit_column().map(String::from),
            ),
            PostMode::Rate => (self.rate_range(), None),
        };
        Ok(PostTarget {
            sheet: self.sheet_name().to_string(),
            span: self.add_span()?,
            bounds,
            profit_column,
        })
    }

    /// The path of the file holding the bearer token for the Sheets API.
    pub fn token_path(&self) -> PathBuf {
        let p = self.config_file.token_path();
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }

    /// Reads the bearer token for the Sheets API.
    pub(crate) async fn access_token(&self) -> Res<String> {
        let path = self.token_path();
        let token = utils::read(&path)
            .await
            .context("Unable to read the access token")?;
        let token = token.trim();
        ensure!(!token.is_empty(), "The access token file '{}' is empty", path.display());
        Ok(token.to_string())
    }
}

/// Which parts of the sheet are written.
///
/// Example:
/// ```json
/// {
///   "first_column": "B",
///   "last_column": "K",
///   "profit_column": "L",
///   "weekday_ranges": [[5, 34], [37, 66], [69, 98], [101, 130], [133, 162], [165, 194], [197, 226]],
///   "rate_range": [5, 226]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default)]
struct Layout {
    first_column: String,
    last_column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    profit_column: Option<String>,
    /// Monday first.
    weekday_ranges: [RowBounds; 7],
    rate_range: RowBounds,
}

impl Layout {
    fn span(&self) -> Res<ColumnSpan> {
        ColumnSpan::new(&self.first_column, &self.last_column)
            .context("Invalid layout columns in the config file")
    }

    fn validate(&self) -> Res<()> {
        self.span()?;
        if let Some(column) = &self.profit_column {
            crate::model::normalize_column(column)
                .context("Invalid profit_column in the config file")?;
        }
        Ok(())
    }
}

impl Default for Layout {
    fn default() -> Self {
        let day = |i: u32| RowBounds::fixed(5 + i * 32, 34 + i * 32);
        Self {
            first_column: "B".to_string(),
            last_column: "K".to_string(),
            profit_column: None,
            weekday_ranges: [day(0), day(1), day(2), day(3), day(4), day(5), day(6)],
            rate_range: RowBounds::fixed(5, 226),
        }
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "sheet-ledger",
///   "config_version": 1,
///   "sheet_url": "https://docs.google.com/spreadsheets/d/7KpXm2RfZwNJgs84QhVYno5DU6iM9Wlr3bCzAv1txRpL",
///   "sheet_name": "Ledger",
///   "token_path": ".secrets/access_token",
///   "layout": { "first_column": "B", "last_column": "K" },
///   "posting": { "surcharge": "1", "retry_attempts": 5 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "sheet-ledger"
    app_name: String,

    config_version: u8,

    /// URL of the Google Sheet that holds the ledger
    sheet_url: String,

    /// The tab that is written
    #[serde(default = "default_sheet_name")]
    sheet_name: String,

    /// Path to the bearer token file (optional, relative to the home directory or absolute)
    /// Defaults to $SHEET_LEDGER_HOME/.secrets/access_token if not specified
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,

    #[serde(default)]
    layout: Layout,

    #[serde(default)]
    classifier: ClassifierSettings,

    #[serde(default)]
    session: SessionSettings,

    #[serde(default)]
    posting: PostSettings,
}

fn default_sheet_name() -> String {
    DEFAULT_SHEET_NAME.to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            sheet_url: String::new(),
            sheet_name: default_sheet_name(),
            token_path: None,
            layout: Layout::default(),
            classifier: ClassifierSettings::default(),
            session: SessionSettings::default(),
            posting: PostSettings::default(),
        }
    }
}

impl ConfigFile {
    /// Loads and validates a ConfigFile from the specified path.
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;

        ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        ensure!(
            config.config_version <= CONFIG_VERSION,
            "Unsupported config_version {} in config file",
            config.config_version
        );
        config.layout.validate()?;
        Ok(config)
    }

    /// Saves the ConfigFile to the specified path.
    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }

    /// Gets the token path. If None, defaults to .secrets/access_token
    fn token_path(&self) -> PathBuf {
        self.token_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(ACCESS_TOKEN))
    }
}

/// Extracts the spreadsheet ID from a Google Sheets URL
///
/// # Arguments
/// * `url` - The Google Sheets URL (e.g., "https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...")
///
/// # Returns
/// The spreadsheet ID or an error if the URL format is invalid. Returns an empty string if the URL is empty.
fn extract_spreadsheet_id(url: &str) -> Res<&str> {
    if url.is_empty() {
        return Ok(url);
    }

    // URL format: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID/...
    // or: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID?foo=bar
    let parts: Vec<&str> = url.split('/').collect();
    for (i, part) in parts.iter().enumerate() {
        if *part == "d" && i + 1 < parts.len() {
            let id_part = parts[i + 1];
            let id = id_part
                .split('?')
                .next()
                .unwrap_or(id_part)
                .split('#')
                .next()
                .unwrap_or(id_part);
            return Ok(id);
        }
    }
    bail!("Invalid Google Sheets URL format. Expected: https://docs.google.com/spreadsheets/d/SPREADSHEET_ID")
}
