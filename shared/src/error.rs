use thiserror::Error;

use crate::ledger::ShareOperation;
use crate::types::ReservationStatus;

/// User-facing failure taxonomy for the reservation workflow. The HTTP
/// layer maps these onto status codes; validation variants are produced
/// before any storage access.
#[derive(Debug, Error)]
pub enum ReservationError {
    #[error("transaction_id must be exactly {expected} characters, got {actual}")]
    InvalidTransactionId { expected: usize, actual: usize },

    #[error("missing transaction_id")]
    MissingTransactionId,

    #[error("share_count must be at least 1, got {requested}")]
    InvalidShareCount { requested: i32 },

    #[error("insufficient empty shares: {available} available, {requested} requested")]
    InsufficientShares { available: i32, requested: i32 },

    #[error("operation '{operation}' does not match the requested share change")]
    OperationMismatch { operation: ShareOperation },

    #[error("a reservation with this transaction_id already exists")]
    DuplicateTransaction,

    #[error("reservation not found")]
    NotFound,

    #[error("sacrifice animal not found")]
    AnimalNotFound,

    #[error("reservation is {status}, expected pending")]
    NotPending { status: ReservationStatus },

    #[error("{given} shareholders submitted but the reservation holds {reserved} shares")]
    ShareholderCountMismatch { given: usize, reserved: i32 },

    #[error("invalid shareholder data: {reason}")]
    InvalidShareholder { reason: String },

    #[error("reservation was modified concurrently, reload and retry")]
    ConcurrentUpdate,

    #[error("storage error: {0}")]
    Storage(String),
}

impl ReservationError {
    pub fn storage(err: impl std::fmt::Display) -> Self {
        ReservationError::Storage(err.to_string())
    }
}

impl From<diesel::result::Error> for ReservationError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => ReservationError::NotFound,
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                ReservationError::DuplicateTransaction
            }
            other => ReservationError::Storage(other.to_string()),
        }
    }
}
