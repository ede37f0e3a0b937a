use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::info;

use crate::error::StoreError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Idempotent: safe to call every startup, as §4.B requires of `initialize`.
pub fn run_pending_migrations(conn: &mut SqliteConnection) -> Result<(), StoreError> {
    info!("Applying any pending event store migrations");
    conn.run_pending_migrations(&MIGRATIONS)
        .map(|_| ())
        .map_err(StoreError::Migrate)
}
