//! Cart commands.

use common::{CartItemId, CartOwner, Money, ProductId, SessionId, UserId, VariantId};

/// Command to add a product to a cart.
///
/// `quantity` is taken as given and validated by the cart, so a caller can
/// pass raw input through.
#[derive(Debug, Clone)]
pub struct AddItem {
    /// The cart to add to.
    pub owner: CartOwner,

    /// The product to add.
    pub product_id: ProductId,

    /// The product variant, if any.
    pub variant_id: Option<VariantId>,

    /// Number of units to add.
    pub quantity: i64,

    /// Unit price to store if this creates a new line.
    pub unit_price: Money,
}

impl AddItem {
    /// Creates a new AddItem command for one unit.
    pub fn new(
        owner: impl Into<CartOwner>,
        product_id: impl Into<ProductId>,
        unit_price: Money,
    ) -> Self {
        Self {
            owner: owner.into(),
            product_id: product_id.into(),
            variant_id: None,
            quantity: 1,
            unit_price,
        }
    }

    /// Sets the number of units.
    pub fn with_quantity(mut self, quantity: i64) -> Self {
        self.quantity = quantity;
        self
    }

    /// Sets the product variant.
    pub fn with_variant(mut self, variant_id: impl Into<VariantId>) -> Self {
        self.variant_id = Some(variant_id.into());
        self
    }
}

/// Command to set the quantity of a line.
///
/// A quantity of zero or less removes the line.
#[derive(Debug, Clone)]
pub struct UpdateItem {
    /// The cart holding the line.
    pub owner: CartOwner,

    /// The line to update.
    pub item_id: CartItemId,

    /// The new quantity.
    pub quantity: i64,
}

impl UpdateItem {
    /// Creates a new UpdateItem command.
    pub fn new(owner: impl Into<CartOwner>, item_id: CartItemId, quantity: i64) -> Self {
        Self {
            owner: owner.into(),
            item_id,
            quantity,
        }
    }
}

/// Command to remove a line from a cart.
#[derive(Debug, Clone)]
pub struct RemoveItem {
    /// The cart holding the line.
    pub owner: CartOwner,

    /// The line to remove.
    pub item_id: CartItemId,
}

impl RemoveItem {
    /// Creates a new RemoveItem command.
    pub fn new(owner: impl Into<CartOwner>, item_id: CartItemId) -> Self {
        Self {
            owner: owner.into(),
            item_id,
        }
    }
}

/// Command to remove every line from a cart.
#[derive(Debug, Clone)]
pub struct ClearCart {
    /// The cart to clear.
    pub owner: CartOwner,
}

impl ClearCart {
    /// Creates a new ClearCart command.
    pub fn new(owner: impl Into<CartOwner>) -> Self {
        Self {
            owner: owner.into(),
        }
    }
}

/// Command to fold a guest cart into a user cart at login.
#[derive(Debug, Clone)]
pub struct MergeCarts {
    /// The guest session whose cart is consumed.
    pub session_id: SessionId,

    /// The user receiving the lines.
    pub user_id: UserId,
}

impl MergeCarts {
    /// Creates a new MergeCarts command.
    pub fn new(session_id: impl Into<SessionId>, user_id: UserId) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
        }
    }
}
