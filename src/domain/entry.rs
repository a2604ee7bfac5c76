use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, PlayerId};

pub type EntryId = Uuid;

/// Which way a ledger entry moves the balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Balance decreases (withdrawal)
    Debit,
    /// Balance increases (deposit)
    Credit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Debit => "DEBIT",
            Direction::Credit => "CREDIT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DEBIT" => Some(Direction::Debit),
            "CREDIT" => Some(Direction::Credit),
            _ => None,
        }
    }

    /// Balance after applying `amount` in this direction.
    /// Returns `None` on overflow.
    pub fn apply(&self, balance: Cents, amount: Cents) -> Option<Cents> {
        match self {
            Direction::Debit => balance.checked_sub(amount),
            Direction::Credit => balance.checked_add(amount),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An immutable record of one applied balance mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub player_id: PlayerId,
    /// Amount in cents (always positive)
    pub amount_cents: Cents,
    pub direction: Direction,
    /// Caller-supplied context (game session, payout id, ...)
    pub reference: String,
    /// Unique across the whole journal
    pub idempotency_key: String,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a new entry stamped with the current time, truncated to the
    /// microsecond precision the journal stores.
    pub fn new(
        player_id: impl Into<PlayerId>,
        amount_cents: Cents,
        direction: Direction,
        reference: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        assert!(amount_cents > 0, "Entry amount must be positive");
        Self {
            id: Uuid::new_v4(),
            player_id: player_id.into(),
            amount_cents,
            direction,
            reference: reference.into(),
            idempotency_key: idempotency_key.into(),
            timestamp: Utc::now().trunc_subsecs(6),
        }
    }

    /// Signed effect of this entry on the balance.
    pub fn signed_amount(&self) -> Cents {
        match self.direction {
            Direction::Debit => -self.amount_cents,
            Direction::Credit => self.amount_cents,
        }
    }
}
