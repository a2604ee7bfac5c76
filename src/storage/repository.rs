use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Account, AccountSummary, Cents, Direction, LedgerEntry};

use super::MIGRATION_001_INITIAL;

/// How long a writer waits for SQLite's write lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_CONNECTIONS: u32 = 10;

/// Outcome of [`LedgerStore::apply_entry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The entry was journaled and the balance updated.
    Applied { entry: LedgerEntry, balance: Cents },
    /// An entry with the same idempotency key already exists; nothing was written.
    AlreadyApplied { entry: LedgerEntry, balance: Cents },
    /// The debit would take the balance below zero; nothing was written.
    InsufficientFunds { balance: Cents },
    /// The resulting balance does not fit in [`Cents`]; nothing was written.
    BalanceOverflow { balance: Cents },
}

/// Durable balances plus the append-only transaction journal.
#[derive(Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
    opening_balance: Cents,
}

impl LedgerStore {
    /// Create a store over an existing pool. Accounts touched for the first
    /// time start at `opening_balance`.
    pub fn new(pool: SqlitePool, opening_balance: Cents) -> Self {
        Self {
            pool,
            opening_balance,
        }
    }

    /// Connect to a SQLite database.
    /// Use a `?mode=rwc` URL to create the file if it doesn't exist.
    pub async fn connect(database_url: &str, opening_balance: Cents) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool, opening_balance))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str, opening_balance: Cents) -> Result<Self> {
        let store = Self::connect(database_url, opening_balance).await?;
        store.migrate().await?;
        Ok(store)
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn opening_balance(&self) -> Cents {
        self.opening_balance
    }

    // ========================
    // Account operations
    // ========================

    /// Return the account, creating it with the opening balance if absent.
    /// A single upsert statement, so concurrent first touches agree.
    pub async fn get_or_init_account(&self, player_id: &str) -> Result<Account> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::upsert_account(&mut conn, player_id, self.opening_balance).await
    }

    /// Balance for `player_id`, creating the account on first touch.
    pub async fn get_or_init_balance(&self, player_id: &str) -> Result<Cents> {
        Ok(self.get_or_init_account(player_id).await?.balance_cents)
    }

    /// Get an account without creating it.
    pub async fn get_account(&self, player_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT player_id, amount_cents, opening_cents, updated_at
            FROM balances
            WHERE player_id = ?
            "#,
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    async fn upsert_account(
        conn: &mut SqliteConnection,
        player_id: &str,
        opening_balance: Cents,
    ) -> Result<Account> {
        // The no-op DO UPDATE makes RETURNING yield the existing row too.
        let row = sqlx::query(
            r#"
            INSERT INTO balances (player_id, amount_cents, opening_cents, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(player_id) DO UPDATE SET player_id = excluded.player_id
            RETURNING player_id, amount_cents, opening_cents, updated_at
            "#,
        )
        .bind(player_id)
        .bind(opening_balance)
        .bind(opening_balance)
        .bind(format_timestamp(Utc::now()))
        .fetch_one(&mut *conn)
        .await
        .context("Failed to upsert account")?;

        Self::row_to_account(&row)
    }

    // ========================
    // Journal operations
    // ========================

    /// Apply one debit or credit atomically.
    ///
    /// Balance read, funds check, entry insert and balance update run in a
    /// single transaction whose first statement is a write, so SQLite holds
    /// the write lock for the whole sequence and concurrent calls for the
    /// same account are serialised. Either both writes commit or neither.
    pub async fn apply_entry(
        &self,
        player_id: &str,
        amount_cents: Cents,
        direction: Direction,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<ApplyOutcome> {
        anyhow::ensure!(amount_cents > 0, "Entry amount must be positive");

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let account = Self::upsert_account(&mut tx, player_id, self.opening_balance).await?;
        let Some(new_balance) = direction.apply(account.balance_cents, amount_cents) else {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(ApplyOutcome::BalanceOverflow {
                balance: account.balance_cents,
            });
        };

        if direction == Direction::Debit && new_balance < 0 {
            tx.rollback().await.context("Failed to roll back")?;
            return Ok(ApplyOutcome::InsufficientFunds {
                balance: account.balance_cents,
            });
        }

        let entry = LedgerEntry::new(
            player_id,
            amount_cents,
            direction,
            reference,
            idempotency_key,
        );

        let inserted = sqlx::query(
            r#"
            INSERT INTO transactions (id, player_id, amount_cents, direction, reference, idempotency_key, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(idempotency_key) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(entry.id.to_string())
        .bind(&entry.player_id)
        .bind(entry.amount_cents)
        .bind(entry.direction.as_str())
        .bind(&entry.reference)
        .bind(&entry.idempotency_key)
        .bind(format_timestamp(entry.timestamp))
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to insert entry")?;

        if inserted.is_none() {
            // Another call already journaled this key.
            tx.rollback().await.context("Failed to roll back")?;
            debug!(idempotency_key, "idempotency key conflict on insert");

            let existing = self
                .find_by_idempotency_key(idempotency_key)
                .await?
                .ok_or_else(|| anyhow!("Conflicting entry vanished: {}", idempotency_key))?;
            let balance = self.get_or_init_balance(&existing.player_id).await?;
            return Ok(ApplyOutcome::AlreadyApplied {
                entry: existing,
                balance,
            });
        }

        sqlx::query("UPDATE balances SET amount_cents = ?, updated_at = ? WHERE player_id = ?")
            .bind(new_balance)
            .bind(format_timestamp(entry.timestamp))
            .bind(player_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update balance")?;

        tx.commit().await.context("Failed to commit entry")?;

        Ok(ApplyOutcome::Applied {
            entry,
            balance: new_balance,
        })
    }

    /// Look up the entry recorded under an idempotency key.
    pub async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<LedgerEntry>> {
        let row = sqlx::query(
            r#"
            SELECT id, player_id, amount_cents, direction, reference, idempotency_key, timestamp
            FROM transactions
            WHERE idempotency_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch entry by idempotency key")?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    /// Entries for a player, most recent first.
    pub async fn list_entries(
        &self,
        player_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, player_id, amount_cents, direction, reference, idempotency_key, timestamp
            FROM transactions
            WHERE player_id = ?
            ORDER BY timestamp DESC, seq DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(player_id)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Per-account journal totals for reconciliation.
    pub async fn account_summaries(&self) -> Result<Vec<AccountSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT
                b.player_id AS player_id,
                b.opening_cents AS opening_cents,
                b.amount_cents AS amount_cents,
                COALESCE(SUM(CASE WHEN t.direction = 'CREDIT' THEN t.amount_cents ELSE 0 END), 0) AS credits,
                COALESCE(SUM(CASE WHEN t.direction = 'DEBIT' THEN t.amount_cents ELSE 0 END), 0) AS debits,
                COUNT(t.seq) AS entry_count
            FROM balances b
            LEFT JOIN transactions t ON t.player_id = b.player_id
            GROUP BY b.player_id
            ORDER BY b.player_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute account summaries")?;

        Ok(rows
            .iter()
            .map(|row| AccountSummary {
                player_id: row.get("player_id"),
                opening_cents: row.get("opening_cents"),
                balance_cents: row.get("amount_cents"),
                credits_cents: row.get("credits"),
                debits_cents: row.get("debits"),
                entry_count: row.get("entry_count"),
            })
            .collect())
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let updated_at_str: String = row.get("updated_at");

        Ok(Account {
            player_id: row.get("player_id"),
            balance_cents: row.get("amount_cents"),
            opening_cents: row.get("opening_cents"),
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at")?,
        })
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        let id_str: String = row.get("id");
        let direction_str: String = row.get("direction");
        let timestamp_str: String = row.get("timestamp");

        Ok(LedgerEntry {
            id: Uuid::parse_str(&id_str).context("Invalid entry ID")?,
            player_id: row.get("player_id"),
            amount_cents: row.get("amount_cents"),
            direction: Direction::from_str(&direction_str)
                .ok_or_else(|| anyhow!("Invalid direction: {}", direction_str))?,
            reference: row.get("reference"),
            idempotency_key: row.get("idempotency_key"),
            timestamp: parse_timestamp(&timestamp_str).context("Invalid timestamp")?,
        })
    }
}

/// Fixed-width RFC 3339 so that lexical order equals chronological order.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}
