use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Ordered schema steps; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[(&str, &str)] = &[("schema_v1.sql", include_str!("schemas/schema_v1.sql"))];

fn latest_version() -> i32 {
    MIGRATIONS.len() as i32
}

pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;
    let target = latest_version();

    if current > target {
        bail!("snapshot store schema ({current}) is newer than this build supports ({target})");
    }
    if current == target {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .context("failed to open migration transaction")?;

    for (name, sql) in MIGRATIONS.iter().skip(current as usize) {
        tx.execute_batch(sql)
            .with_context(|| format!("failed to execute {name}"))?;
    }

    tx.pragma_update(None, "user_version", target)
        .context("failed to update user_version pragma")?;
    tx.commit().context("failed to commit migrations")?;

    Ok(())
}
