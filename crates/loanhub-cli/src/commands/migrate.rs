//! Database migration command.

use loanhub_core::config::AppConfig;
use loanhub_core::error::AppError;
use loanhub_database::DatabasePool;

use crate::output;

/// Run all pending migrations
pub async fn execute(config: &AppConfig) -> Result<(), AppError> {
    let pool = DatabasePool::connect(&config.database).await?;

    println!("Running database migrations...");
    loanhub_database::migration::run_migrations(pool.pool()).await?;
    output::print_success("All migrations applied successfully.");

    Ok(())
}
