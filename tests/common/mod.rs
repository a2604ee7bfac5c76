// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use cashier::auth::{AuthGate, NonceStore, RequestSigner};
use cashier::storage::{database_url, LedgerStore};
use cashier::Cents;
use tempfile::TempDir;

pub const OPENING_BALANCE: Cents = 100000;
pub const TEST_SERVICE: &str = "game-server";
pub const TEST_SECRET: &str = "test-secret-key-at-least-32-chars";

/// Helper to create a store over a temporary database
pub async fn test_store(opening_balance: Cents) -> Result<(LedgerStore, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let store = LedgerStore::init(
        &database_url(db_path.to_str().unwrap(), true),
        opening_balance,
    )
    .await?;
    Ok((store, temp_dir))
}

pub fn test_services() -> HashMap<String, String> {
    HashMap::from([(TEST_SERVICE.to_string(), TEST_SECRET.to_string())])
}

pub fn test_gate() -> Arc<AuthGate> {
    Arc::new(AuthGate::new(
        test_services(),
        Duration::from_secs(300),
        Arc::new(NonceStore::new(Duration::from_secs(600))),
    ))
}

pub fn test_signer() -> RequestSigner {
    RequestSigner::new(TEST_SERVICE, TEST_SECRET)
}
