use chrono::{DateTime, Utc};

use crate::domain::{
    build_reconciliation_report, Cents, Direction, EntryId, LedgerEntry, PlayerId,
    ReconciliationReport,
};
use crate::storage::LedgerStore;

use super::AppError;

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

/// A `limit`/`offset` window over a player's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl Page {
    /// Build a page from optional query values; `limit` is clamped to
    /// `1..=MAX_PAGE_SIZE`.
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
            offset: offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerBalance {
    pub player_id: PlayerId,
    pub balance_cents: Cents,
}

/// Public projection of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: EntryId,
    pub amount_cents: Cents,
    pub direction: Direction,
    pub reference: String,
    pub timestamp: DateTime<Utc>,
}

impl From<LedgerEntry> for HistoryEntry {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id,
            amount_cents: entry.amount_cents,
            direction: entry.direction,
            reference: entry.reference,
            timestamp: entry.timestamp,
        }
    }
}

/// Read-only balance and history access.
#[derive(Clone)]
pub struct BalanceQuery {
    store: LedgerStore,
}

impl BalanceQuery {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Current balance, creating the account on first touch.
    pub async fn get_balance(&self, player_id: &str) -> Result<PlayerBalance, AppError> {
        require_player(player_id)?;
        let balance_cents = self.store.get_or_init_balance(player_id).await?;
        Ok(PlayerBalance {
            player_id: player_id.to_string(),
            balance_cents,
        })
    }

    /// Entries for `player_id`, most recent first.
    pub async fn get_transactions(
        &self,
        player_id: &str,
        page: Page,
    ) -> Result<Vec<HistoryEntry>, AppError> {
        require_player(player_id)?;
        let entries = self
            .store
            .list_entries(player_id, page.limit, page.offset)
            .await?;
        Ok(entries.into_iter().map(HistoryEntry::from).collect())
    }

    /// Check every account against its journal.
    pub async fn reconcile(&self) -> Result<ReconciliationReport, AppError> {
        let summaries = self.store.account_summaries().await?;
        Ok(build_reconciliation_report(&summaries))
    }
}

fn require_player(player_id: &str) -> Result<(), AppError> {
    if player_id.trim().is_empty() {
        return Err(AppError::Validation(
            "playerId must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults_and_clamping() {
        assert_eq!(Page::default(), Page { limit: 50, offset: 0 });
        assert_eq!(Page::new(None, None), Page::default());
        assert_eq!(Page::new(Some(2), Some(2)), Page { limit: 2, offset: 2 });
        assert_eq!(Page::new(Some(0), None).limit, 1);
        assert_eq!(Page::new(Some(10_000), None).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_history_projection() {
        let entry = LedgerEntry::new("p1", 1000, Direction::Debit, "game-1", "k1");
        let projected = HistoryEntry::from(entry.clone());

        assert_eq!(projected.id, entry.id);
        assert_eq!(projected.amount_cents, 1000);
        assert_eq!(projected.direction, Direction::Debit);
        assert_eq!(projected.reference, "game-1");
        assert_eq!(projected.timestamp, entry.timestamp);
    }
}
