use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CartId, CartItemId, Money, ProductId, VariantId};

/// A line item in a cart.
///
/// There is at most one line per `(cart_id, product_id, product_variant_id)`
/// and its quantity is always at least 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub product_variant_id: Option<VariantId>,
    pub quantity: u32,
    /// Unit price captured when the line was first created.
    pub price: Money,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    /// Returns true if this line holds the given product and variant.
    pub fn matches(&self, product_id: &ProductId, variant_id: Option<&VariantId>) -> bool {
        &self.product_id == product_id && self.product_variant_id.as_ref() == variant_id
    }

    /// Returns `quantity * price` for this line.
    pub fn line_total(&self) -> Money {
        self.price.multiply(self.quantity)
    }

    /// Returns `quantity * price`, or None if it does not fit in `Money`.
    pub fn checked_line_total(&self) -> Option<Money> {
        self.price.checked_multiply(self.quantity)
    }
}

/// Derived totals of a cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    /// Sum of item quantities.
    pub total_items: u64,
    /// Sum of `quantity * price` over items.
    pub total_price: Money,
}

impl CartTotals {
    /// Computes totals over a set of line items.
    pub fn of<'a>(items: impl IntoIterator<Item = &'a CartItem>) -> Self {
        items
            .into_iter()
            .fold(CartTotals::default(), |mut totals, item| {
                totals.total_items = totals.total_items.saturating_add(u64::from(item.quantity));
                totals.total_price += item.line_total();
                totals
            })
    }

    /// Computes totals, or None if a line total or the cart total does not
    /// fit in `Money`.
    pub fn checked_of<'a>(items: impl IntoIterator<Item = &'a CartItem>) -> Option<Self> {
        items
            .into_iter()
            .try_fold(CartTotals::default(), |totals, item| {
                Some(CartTotals {
                    total_items: totals.total_items.checked_add(u64::from(item.quantity))?,
                    total_price: totals.total_price.checked_add(item.checked_line_total()?)?,
                })
            })
    }
}
