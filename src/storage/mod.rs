mod repository;

pub use repository::*;

/// SQL migration for the balances and transactions tables
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");

/// SQLite URL for a database file. With `create`, the file is created if missing.
pub fn database_url(path: &str, create: bool) -> String {
    if create {
        format!("sqlite:{}?mode=rwc", path)
    } else {
        format!("sqlite:{}", path)
    }
}
