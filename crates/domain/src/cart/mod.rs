//! Cart aggregate, commands and engine.

mod aggregate;
mod commands;
mod service;

pub use aggregate::{Cart, MergePlan};
pub use commands::*;
pub use service::{CartEngine, ItemUpdate, LineResult, MergeReport};

use common::CartItemId;
use thiserror::Error;

use crate::error::ErrorKind;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity on add must be a positive integer.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Unit price must not be negative.
    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    /// A required identifier was empty.
    #[error("Missing identifier: {field}")]
    MissingIdentifier { field: &'static str },

    /// The resulting line quantity does not fit.
    #[error("Quantity too large")]
    QuantityOverflow,

    /// The cart total would not fit in a money amount.
    #[error("Cart total too large")]
    TotalOverflow,

    /// Item not found in the caller's cart.
    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: CartItemId },
}

impl CartError {
    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CartError::ItemNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        }
    }
}
