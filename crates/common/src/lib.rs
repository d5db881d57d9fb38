//! Shared types for the storefront cart and address core.

mod address;
mod cart;
mod money;
mod types;

pub use address::{AddressFields, UserAddress};
pub use cart::{CartItem, CartTotals};
pub use money::Money;
pub use types::{
    AddressId, CartId, CartItemId, CartOwner, ProductId, SessionId, UserId, VariantId,
};
