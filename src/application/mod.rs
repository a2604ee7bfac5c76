// Application layer - use cases over the ledger store.
// Mutations go through TransactionService, reads through BalanceQuery;
// both share one LedgerStore.

pub mod error;
pub mod history;
pub mod transactions;

pub use error::*;
pub use history::*;
pub use transactions::*;
