use tripcover_db::{connect_with_settings, migrations};

use crate::commands::{block_on, load_config, CommandFailure, CommandResult};

pub fn run() -> CommandResult {
    CommandResult::from_outcome("migrate", migrate())
}

fn migrate() -> Result<String, CommandFailure> {
    let config = load_config()?;

    let applied = block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| CommandFailure::new("db_connectivity", error.to_string(), 4))?;

        let outcome = match migrations::pending_count(&pool).await {
            Ok(pending) => migrations::run_pending(&pool)
                .await
                .map(|()| pending)
                .map_err(|error| CommandFailure::new("migration", error.to_string(), 5)),
            Err(error) => Err(CommandFailure::new("migration", error.to_string(), 5)),
        };
        pool.close().await;
        outcome
    })??;

    Ok(match applied {
        0 => "schema already current".to_string(),
        count => format!("applied {count} pending migration(s)"),
    })
}
