//! These structs provide the CLI interface for the sheet-ledger CLI.

use crate::model::PostMode;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing::level_filters::LevelFilter;

/// sheet-ledger: classifies forwarded chat fragments into ledger entries and posts them into a
/// Google sheet.
///
/// Fragments are short texts such as "0.008", "5000 без долга" or "Sber 4276 1234 5678 9012".
/// Each is classified as a crypto amount, a cash amount, a card reference or a user name, grouped
/// into the rows of a session, and posted into the sheet either merged into one new row (add
/// mode) or one value per column (rate mode).
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the binding database.
    ///
    /// After this, put a Google Sheets API bearer token into $SHEET_LEDGER_HOME/.secrets/access_token
    /// and bind the columns of your sheet with `bind`.
    Init(InitArgs),
    /// Classify fragments and print the result, without touching any session or the sheet.
    Classify(ClassifyArgs),
    /// Manage the bindings from subjects (crypto currencies, cards, cash buckets) to columns.
    Bind(BindArgs),
    /// Manage the FX rates used for the profit calculation.
    Fx(FxArgs),
    /// Collect fragments into one session, confirm it and post it into the sheet.
    Post(PostArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where data and configuration is held. Defaults to ~/sheet-ledger
    #[arg(long, env = "SHEET_LEDGER_HOME", default_value_t = default_home())]
    home: DisplayPath,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf) -> Self {
        Self {
            log_level,
            home: home.into(),
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }
}

/// (Not shown): Args for the `init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The URL to your Google sheet. It looks like this:
    /// https://docs.google.com/spreadsheets/d/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6iDuE3VhMjX
    #[arg(long)]
    sheet_url: String,
}

impl InitArgs {
    pub fn new(sheet_url: impl Into<String>) -> Self {
        Self {
            sheet_url: sheet_url.into(),
        }
    }

    pub fn sheet_url(&self) -> &str {
        &self.sheet_url
    }
}

/// (Not shown): Args for the `classify` command.
#[derive(Debug, Parser, Clone)]
pub struct ClassifyArgs {
    /// One or more fragments. Quote fragments that contain spaces.
    #[arg(required = true)]
    texts: Vec<String>,
}

impl ClassifyArgs {
    pub fn new(texts: Vec<String>) -> Self {
        Self { texts }
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }
}

/// (Not shown): Args for the `bind` command.
#[derive(Debug, Parser, Clone)]
pub struct BindArgs {
    #[command(subcommand)]
    action: BindAction,
}

impl BindArgs {
    pub fn new(action: BindAction) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &BindAction {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum BindAction {
    /// Bind a crypto subject (e.g. BTC, XMR2) or a card name (e.g. SBER) to a column.
    Column {
        subject: String,
        /// A column letter, e.g. C
        column: String,
    },
    /// Register a cash bucket (e.g. RUB) with its column, currency and display name.
    Cash {
        name: String,
        column: String,
        currency: String,
        display_name: String,
    },
    /// Import `subject,column` bindings from a CSV file with a header row. All or nothing.
    Import { file: PathBuf },
    /// Print every binding, cash bucket and FX rate.
    List,
}

/// (Not shown): Args for the `fx` command.
#[derive(Debug, Parser, Clone)]
pub struct FxArgs {
    #[command(subcommand)]
    action: FxAction,
}

impl FxArgs {
    pub fn new(action: FxAction) -> Self {
        Self { action }
    }

    pub fn action(&self) -> &FxAction {
        &self.action
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum FxAction {
    /// Set the rate of CURRENCY, in units of CURRENCY per one USD.
    Set { currency: String, rate: Decimal },
}

/// (Not shown): Args for the `post` command.
#[derive(Debug, Parser, Clone)]
pub struct PostArgs {
    /// "add" merges everything into one new row of today's range, "rate" writes each value into
    /// the next free cell of its column.
    #[arg(long, default_value_t = PostMode::Add)]
    mode: PostMode,

    /// The user the session belongs to.
    #[arg(long, default_value_t = 0)]
    user: i64,

    /// The session key.
    #[arg(long, default_value = "cli")]
    session: String,

    /// Read fragments from this file, one per line. Defaults to stdin.
    #[arg(long)]
    file: Option<PathBuf>,
}

impl PostArgs {
    pub fn new(mode: PostMode, user: i64, session: impl Into<String>, file: Option<PathBuf>) -> Self {
        Self {
            mode,
            user,
            session: session.into(),
            file,
        }
    }

    pub fn mode(&self) -> PostMode {
        self.mode
    }

    pub fn user(&self) -> i64 {
        self.user
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("sheet-ledger"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or SHEET_LEDGER_HOME instead of relying on the default \
                home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("sheet-ledger")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn path(&self) -> &Path {
        &self.0
    }
}
