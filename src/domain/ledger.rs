use super::{format_cents, Cents, PlayerId};

/// Aggregated journal totals for one account, as read from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub player_id: PlayerId,
    pub opening_cents: Cents,
    pub balance_cents: Cents,
    pub credits_cents: Cents,
    pub debits_cents: Cents,
    pub entry_count: i64,
}

impl AccountSummary {
    /// Balance implied by the journal: opening + credits - debits.
    /// Returns `None` on overflow.
    pub fn expected_balance(&self) -> Option<Cents> {
        self.opening_cents
            .checked_add(self.credits_cents)?
            .checked_sub(self.debits_cents)
    }
}

/// A single reconciliation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// Stored balance disagrees with the journal
    BalanceMismatch {
        player_id: PlayerId,
        stored: Cents,
        expected: Option<Cents>,
    },
    /// Stored balance is below zero
    NegativeBalance { player_id: PlayerId, stored: Cents },
}

impl std::fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Discrepancy::BalanceMismatch {
                player_id,
                stored,
                expected: Some(expected),
            } => write!(
                f,
                "{}: stored balance {} but journal implies {}",
                player_id,
                format_cents(*stored),
                format_cents(*expected)
            ),
            Discrepancy::BalanceMismatch {
                player_id, stored, ..
            } => write!(
                f,
                "{}: stored balance {} but journal totals overflow",
                player_id,
                format_cents(*stored)
            ),
            Discrepancy::NegativeBalance { player_id, stored } => {
                write!(f, "{}: negative balance {}", player_id, format_cents(*stored))
            }
        }
    }
}

/// Result of checking every account against its journal.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationReport {
    pub account_count: usize,
    pub entry_count: i64,
    pub total_balance: Cents,
    pub issues: Vec<Discrepancy>,
}

impl ReconciliationReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check that each account satisfies
/// `balance = opening + Σcredits − Σdebits` and `balance >= 0`.
pub fn build_reconciliation_report(summaries: &[AccountSummary]) -> ReconciliationReport {
    let mut report = ReconciliationReport {
        account_count: summaries.len(),
        ..Default::default()
    };

    for summary in summaries {
        report.entry_count += summary.entry_count;
        report.total_balance = report.total_balance.saturating_add(summary.balance_cents);

        let expected = summary.expected_balance();
        if expected != Some(summary.balance_cents) {
            report.issues.push(Discrepancy::BalanceMismatch {
                player_id: summary.player_id.clone(),
                stored: summary.balance_cents,
                expected,
            });
        }
        if summary.balance_cents < 0 {
            report.issues.push(Discrepancy::NegativeBalance {
                player_id: summary.player_id.clone(),
                stored: summary.balance_cents,
            });
        }
    }

    report
}
