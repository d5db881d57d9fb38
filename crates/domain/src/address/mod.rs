//! Address book aggregate, commands and registry.

mod aggregate;
mod commands;
mod service;

pub use aggregate::AddressBook;
pub use commands::{CreateAddress, UpdateAddress};
pub use service::AddressRegistry;

use common::AddressId;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during address operations.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The address does not exist or belongs to another user.
    #[error("Address not found: {address_id}")]
    NotFound { address_id: AddressId },

    /// A required field was blank.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },
}

impl AddressError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AddressError::NotFound { .. } => ErrorKind::NotFound,
            AddressError::MissingField { .. } => ErrorKind::Validation,
        }
    }
}
