//! Domain layer for the storefront cart and address core.
//!
//! This crate provides:
//! - The Aggregate trait for versioned, row-backed entities
//! - The Cart aggregate and the CartEngine service (add, update, remove,
//!   clear, guest-to-user merge)
//! - The AddressBook aggregate and the AddressRegistry service with the
//!   single-default invariant
//! - The ProductCatalog collaborator used to price and stock-check adds

pub mod address;
pub mod aggregate;
pub mod cart;
pub mod catalog;
pub mod error;
pub mod locks;

pub use address::{AddressBook, AddressError, AddressRegistry, CreateAddress, UpdateAddress};
pub use aggregate::Aggregate;
pub use cart::{
    AddItem, Cart, CartEngine, CartError, ClearCart, ItemUpdate, LineResult, MergeCarts,
    MergeReport, RemoveItem, UpdateItem,
};
pub use catalog::{InMemoryCatalog, ProductCatalog, ProductInfo};
pub use error::{DomainError, ErrorKind};
pub use locks::KeyedLocks;
