//! Error taxonomy shared by the ledger engine, the payout/refund workflow and
//! the moderation operations.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a [`Store`](crate::store::Store) or its units of work.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error. Retryable by the caller.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A unique constraint rejected the write (e.g. a racing idempotency key).
    #[error("conflicting write: {0}")]
    Conflict(String),

    /// Payload could not be encoded for storage.
    #[error("payload encoding error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Conflict(db.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}

/// Errors surfaced synchronously by core operations.
///
/// Idempotent replays are not errors: they come back as
/// [`Posted::replayed`](crate::ledger::Posted) with the original entry.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: i64, requested: i64 },

    #[error("wallet {0} is frozen")]
    WalletFrozen(Uuid),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),

    /// The value would push a balance or timestamp past what can be stored.
    #[error("{field} {value} is out of range")]
    OutOfRange { field: &'static str, value: i64 },

    #[error("{entity} {id} cannot move from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        id: Uuid,
        from: &'static str,
        to: &'static str,
    },

    #[error("an idempotency key is required")]
    IdempotencyKeyRequired,

    /// The key was already applied to a different wallet or entry kind.
    #[error("idempotency key {key} was already used for another operation")]
    IdempotencyKeyReused { key: String },

    #[error("actor {actor} may not modify {entity} {id}")]
    Forbidden {
        entity: &'static str,
        id: Uuid,
        actor: Uuid,
    },

    /// Retryable store failure.
    #[error("transient store error: {0}")]
    TransientStore(#[from] StoreError),
}

impl LedgerError {
    pub(crate) fn not_found(entity: &'static str, id: Uuid) -> Self {
        LedgerError::NotFound { entity, id }
    }

    pub(crate) fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::TransientStore(StoreError::Conflict(_)))
    }
}
