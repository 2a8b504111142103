use crate::api::{GridStore, Mode};
use crate::args::PostArgs;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::ledger::Ledger;
use crate::model::{PostResult, RawFragment};
use crate::session::{SessionKey, SubmitOutcome};
use crate::{api, utils, Config, Result};
use anyhow::Context;
use chrono::{Datelike, Local, Utc};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{info, warn};

/// A line holding only this starts a new row.
pub const ROW_SEPARATOR: &str = "---";

/// Reads fragments (from `args.file()` or stdin), collects them into one session, confirms it
/// and posts it into the range for today (add mode) or the rate range.
pub async fn post(config: &Config, mode: Mode, args: &PostArgs) -> Result<Out<PostResult>> {
    let lines = match args.file() {
        Some(path) => utils::read_lines(path).await,
        None => read_stdin().await,
    }
    .pub_result(ErrorType::Io)?;
    let store = api::grid_store(config, mode)
        .await
        .pub_result(ErrorType::Config)?;
    post_lines(config, store, args, &lines).await
}

async fn read_stdin() -> anyhow::Result<Vec<String>> {
    let mut text = String::new();
    tokio::io::stdin()
        .read_to_string(&mut text)
        .await
        .context("Unable to read fragments from stdin")?;
    Ok(utils::lines(&text))
}

async fn post_lines(
    config: &Config,
    store: Arc<dyn GridStore>,
    args: &PostArgs,
    lines: &[String],
) -> Result<Out<PostResult>> {
    let ledger = Ledger::with_store(config, store);
    let key = SessionKey::new(args.user(), args.session());
    ledger.start(&key, args.mode()).await?;

    let now = Utc::now().timestamp();
    for (i, line) in lines.iter().enumerate() {
        if line == ROW_SEPARATOR {
            ledger.add_row(&key).await?;
            continue;
        }
        let fragment = RawFragment::new(line, format!("line-{}", i + 1), now, args.session());
        let state = ledger.submit(args.user(), &fragment).await?;
        match &state.outcome {
            SubmitOutcome::DuplicateKind { row, slot } => warn!(
                "Line {}: row {} already has a {slot} entry, '{line}' was dropped",
                i + 1,
                row + 1
            ),
            outcome => {
                if let Some(error_type) = outcome.error_type() {
                    warn!("Line {}: '{line}' was not absorbed ({error_type})", i + 1);
                }
            }
        }
    }

    let batch = ledger.confirm(&key).await?;
    let target = config.post_target(args.mode(), Local::now().weekday())?;
    info!(
        "Posting {} row(s) in {} mode to {} rows {}",
        batch.rows.len(),
        batch.mode,
        target.sheet,
        target.bounds
    );
    let result = ledger.post(&key, &batch, &target).await?;
    for failed in &result.failed {
        warn!(
            "Not posted: {} ({}: {})",
            failed.label,
            failed.reason.error_type(),
            failed.reason
        );
    }
    Ok(Out::new(result.summary(), result))
}
