use tracing::{debug, info, warn};

use crate::domain::{format_cents, Cents, Direction, EntryId, LedgerEntry};
use crate::storage::{ApplyOutcome, LedgerStore};

use super::{AppError, Rejection};

/// Uniform outcome of a withdraw or deposit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    /// Journal entry id; also set when an idempotent retry is answered
    pub transaction_id: Option<EntryId>,
    /// Balance after the operation, or the unchanged balance on a refused
    /// debit. `None` when the request was refused before storage access.
    pub balance: Option<Cents>,
    pub success: bool,
    pub error: Option<Rejection>,
}

impl TransactionResult {
    fn applied(transaction_id: EntryId, balance: Cents) -> Self {
        Self {
            transaction_id: Some(transaction_id),
            balance: Some(balance),
            success: true,
            error: None,
        }
    }

    fn rejected(rejection: Rejection, balance: Option<Cents>) -> Self {
        Self {
            transaction_id: None,
            balance,
            success: false,
            error: Some(rejection),
        }
    }
}

/// Withdraw and deposit use cases with idempotency-key deduplication.
#[derive(Clone)]
pub struct TransactionService {
    store: LedgerStore,
}

impl TransactionService {
    pub fn new(store: LedgerStore) -> Self {
        Self { store }
    }

    /// Debit `amount_cents` from the player's wallet. Refused without any
    /// write if the balance cannot cover it.
    pub async fn withdraw(
        &self,
        player_id: &str,
        amount_cents: Cents,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<TransactionResult, AppError> {
        self.apply(
            Direction::Debit,
            player_id,
            amount_cents,
            reference,
            idempotency_key,
        )
        .await
    }

    /// Credit `amount_cents` to the player's wallet.
    pub async fn deposit(
        &self,
        player_id: &str,
        amount_cents: Cents,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<TransactionResult, AppError> {
        self.apply(
            Direction::Credit,
            player_id,
            amount_cents,
            reference,
            idempotency_key,
        )
        .await
    }

    async fn apply(
        &self,
        direction: Direction,
        player_id: &str,
        amount_cents: Cents,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<TransactionResult, AppError> {
        if amount_cents <= 0 {
            return Ok(TransactionResult::rejected(Rejection::InvalidAmount, None));
        }
        if player_id.trim().is_empty() {
            return Ok(TransactionResult::rejected(
                Rejection::InvalidRequest("playerId must not be empty".to_string()),
                None,
            ));
        }
        if idempotency_key.trim().is_empty() {
            return Ok(TransactionResult::rejected(
                Rejection::InvalidRequest("idempotencyKey must not be empty".to_string()),
                None,
            ));
        }

        // Fast path for blind retries. The unique key in storage still
        // decides races between concurrent first attempts.
        if let Some(existing) = self.store.find_by_idempotency_key(idempotency_key).await? {
            let balance = self.store.get_or_init_balance(&existing.player_id).await?;
            return Ok(self.replayed(direction, player_id, amount_cents, existing, balance));
        }

        let outcome = self
            .store
            .apply_entry(
                player_id,
                amount_cents,
                direction,
                reference,
                idempotency_key,
            )
            .await?;

        Ok(match outcome {
            ApplyOutcome::Applied { entry, balance } => {
                info!(
                    player_id,
                    entry_id = %entry.id,
                    direction = %direction,
                    amount = %format_cents(amount_cents),
                    balance = %format_cents(balance),
                    "applied ledger entry"
                );
                TransactionResult::applied(entry.id, balance)
            }
            ApplyOutcome::AlreadyApplied { entry, balance } => {
                self.replayed(direction, player_id, amount_cents, entry, balance)
            }
            ApplyOutcome::InsufficientFunds { balance } => {
                warn!(
                    player_id,
                    amount = %format_cents(amount_cents),
                    balance = %format_cents(balance),
                    "insufficient funds"
                );
                TransactionResult::rejected(Rejection::InsufficientFunds, Some(balance))
            }
            ApplyOutcome::BalanceOverflow { balance } => {
                warn!(
                    player_id,
                    amount = %format_cents(amount_cents),
                    balance = %format_cents(balance),
                    "balance would overflow"
                );
                TransactionResult::rejected(Rejection::BalanceOverflow, Some(balance))
            }
        })
    }

    fn replayed(
        &self,
        direction: Direction,
        player_id: &str,
        amount_cents: Cents,
        existing: LedgerEntry,
        balance: Cents,
    ) -> TransactionResult {
        if existing.player_id != player_id
            || existing.direction != direction
            || existing.amount_cents != amount_cents
        {
            warn!(
                idempotency_key = %existing.idempotency_key,
                entry_id = %existing.id,
                "idempotency key reused for a different operation"
            );
        } else {
            debug!(
                idempotency_key = %existing.idempotency_key,
                entry_id = %existing.id,
                "idempotent retry answered from journal"
            );
        }
        TransactionResult::applied(existing.id, balance)
    }
}
