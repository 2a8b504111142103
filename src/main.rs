use clap::Parser;
use sheet_ledger::args::{Args, BindAction, Command, FxAction};
use sheet_ledger::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // This allows for testing the program without hitting the Google APIs. When
    // SHEET_LEDGER_IN_TEST_MODE is set and non-zero in length, then the mode will be
    // Mode::Testing, otherwise it will be Mode::Google.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.sheet_url()).await?.print(),

        Command::Classify(classify_args) => commands::classify(home, classify_args.texts())
            .await?
            .print(),

        Command::Bind(bind_args) => {
            let config = Config::load(home).await?;
            match bind_args.action() {
                BindAction::Column { subject, column } => {
                    commands::bind_column(&config, subject, column)
                        .await?
                        .print()
                }
                BindAction::Cash {
                    name,
                    column,
                    currency,
                    display_name,
                } => commands::bind_cash(&config, name, column, currency, display_name)
                    .await?
                    .print(),
                BindAction::Import { file } => {
                    commands::bind_import(&config, file).await?.print()
                }
                BindAction::List => commands::bind_list(&config).await?.print(),
            }
        }

        Command::Fx(fx_args) => {
            let config = Config::load(home).await?;
            match fx_args.action() {
                FxAction::Set { currency, rate } => {
                    commands::fx_set(&config, currency, *rate).await?.print()
                }
            }
        }

        Command::Post(post_args) => {
            let config = Config::load(home).await?;
            commands::post(&config, mode, post_args).await?.print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
