//! Schema migrations for the binding database.
//!
//! Each version has a pair of files: `migration_NN_up.sql` takes the schema from `NN-1` to `NN`
//! and `migration_NN_down.sql` takes it back.

use crate::error::Res;
use anyhow::{bail, Context};
use sqlx::{Executor, SqlitePool};
use tracing::debug;

/// The schema version this build expects.
pub(crate) const CURRENT_VERSION: i32 = 1;

struct Migration {
    version: i32,
    up_sql: &'static str,
    down_sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up_sql: include_str!("migration_01_up.sql"),
    down_sql: include_str!("migration_01_down.sql"),
}];

fn find(version: i32) -> Res<&'static Migration> {
    MIGRATIONS
        .iter()
        .find(|m| m.version == version)
        .with_context(|| format!("Migration {version} not found"))
}

/// Moves the schema from `from` to `to`, one version at a time. Every step runs in its own
/// transaction together with the `schema_version` update. All needed migrations are checked to
/// exist before the first one runs.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Res<()> {
    if from == to {
        debug!("Schema already at version {to}");
        return Ok(());
    }
    check_available(from, to)?;

    if from < to {
        for version in (from + 1)..=to {
            debug!("Applying migration {version:02} (up)");
            apply(pool, find(version)?.up_sql, version).await?;
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            debug!("Reverting migration {version:02} (down)");
            apply(pool, find(version)?.down_sql, version - 1).await?;
        }
    }
    debug!("Schema now at version {to}");
    Ok(())
}

async fn apply(pool: &SqlitePool, sql: &str, new_version: i32) -> Res<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;
    tx.execute(sql)
        .await
        .context("Failed to execute migration SQL")?;
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *tx)
        .await
        .context("Failed to clear schema_version")?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(new_version)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;
    tx.commit()
        .await
        .context("Failed to commit migration transaction")
}

fn check_available(from: i32, to: i32) -> Res<()> {
    let (low, high) = if from < to { (from + 1, to) } else { (to + 1, from) };
    for version in low..=high {
        if !MIGRATIONS.iter().any(|m| m.version == version) {
            bail!("Migration {version} is missing but required to go from {from} to {to}");
        }
    }
    Ok(())
}
