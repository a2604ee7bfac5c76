use thiserror::Error;

use crate::auth::AuthError;

/// A withdraw or deposit that was refused. Carried inside
/// [`TransactionResult`](super::TransactionResult) rather than raised;
/// none of these perform any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Balance limit exceeded")]
    BalanceOverflow,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(#[from] AuthError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
