//! Domain error types.

use record_store::StoreError;
use thiserror::Error;

use crate::address::AddressError;
use crate::cart::CartError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the record store.
    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    /// A cart operation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// An address operation was rejected.
    #[error("Address error: {0}")]
    Address(#[from] AddressError),
}

/// Coarse classification of a failure, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, rejected before any state change.
    Validation,
    /// The target does not exist for this owner.
    NotFound,
    /// A concurrent write won; retrying the whole operation may succeed.
    Conflict,
    /// The store failed. Nothing was committed.
    Storage,
}

impl DomainError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Store(e) if e.is_conflict() => ErrorKind::Conflict,
            DomainError::Store(_) => ErrorKind::Storage,
            DomainError::Cart(e) => e.kind(),
            DomainError::Address(e) => e.kind(),
        }
    }

    /// Returns true if the caller may retry the whole operation.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}
