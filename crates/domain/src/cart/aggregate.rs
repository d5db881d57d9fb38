//! Cart aggregate implementation.

use chrono::{DateTime, Utc};
use common::{
    CartId, CartItem, CartItemId, CartOwner, CartTotals, Money, ProductId, VariantId,
};
use record_store::{CartCommit, CartRecord, CartWrite, Version};

use crate::aggregate::Aggregate;

use super::CartError;

/// Cart aggregate root.
///
/// A cart belongs to one owner and holds at most one line per product and
/// variant. A cart that was never committed is empty and has version 0; the
/// first add creates it in the store.
#[derive(Debug, Clone)]
pub struct Cart {
    /// Cart identifier, generated up front for a cart not yet stored.
    id: CartId,

    /// Owner of the cart.
    owner: CartOwner,

    /// Current version for optimistic concurrency.
    version: Version,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Line items in insertion order.
    items: Vec<CartItem>,
}

/// Row changes of a guest-to-user merge.
#[derive(Debug, Clone, Default)]
pub struct MergePlan {
    /// Changes to the guest cart (its deletion), empty if it has no cart.
    pub guest_writes: Vec<CartWrite>,

    /// Changes to the user cart, empty if there is nothing to move.
    pub user_writes: Vec<CartWrite>,

    /// Guest lines summed into an existing user line.
    pub merged_lines: usize,

    /// Guest lines moved to the user cart unchanged.
    pub moved_lines: usize,
}

impl Aggregate for Cart {
    type Change = CartWrite;

    fn aggregate_type() -> &'static str {
        "Cart"
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, change: Self::Change) {
        match change {
            CartWrite::CreateCart { created_at } => {
                self.created_at = created_at;
                self.updated_at = created_at;
            }
            CartWrite::InsertItem(item) => self.items.push(item),
            CartWrite::SetQuantity {
                item_id,
                quantity,
                updated_at,
            } => {
                if let Some(item) = self.items.iter_mut().find(|i| i.id == item_id) {
                    item.quantity = quantity;
                    item.updated_at = updated_at;
                }
            }
            CartWrite::DeleteItem { item_id } => self.items.retain(|i| i.id != item_id),
            CartWrite::ClearItems | CartWrite::DeleteCart => self.items.clear(),
        }
    }
}

// Construction and query methods
impl Cart {
    /// Creates an empty cart that is not stored yet.
    pub fn new(owner: CartOwner) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            owner,
            version: Version::initial(),
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        }
    }

    /// Rebuilds a cart from its stored rows.
    pub fn from_record(record: CartRecord) -> Self {
        Self {
            id: record.id,
            owner: record.owner,
            version: record.version,
            created_at: record.created_at,
            updated_at: record.updated_at,
            items: record.items,
        }
    }

    /// Returns the cart identifier.
    pub fn id(&self) -> CartId {
        self.id
    }

    /// Returns the owner.
    pub fn owner(&self) -> &CartOwner {
        &self.owner
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns all line items.
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Returns a line by id.
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Returns the line holding a product and variant.
    pub fn find_line(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Option<&CartItem> {
        self.items.iter().find(|i| i.matches(product_id, variant_id))
    }

    /// Returns the number of lines.
    pub fn line_count(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the derived totals.
    pub fn totals(&self) -> CartTotals {
        CartTotals::of(&self.items)
    }

    /// Wraps changes decided on this cart into a commit guarded by its
    /// current version.
    pub fn commit(&self, writes: Vec<CartWrite>) -> CartCommit {
        let mut commit = CartCommit::new(self.id, self.owner.clone(), self.version);
        for write in writes {
            commit.push(write);
        }
        commit
    }

    /// Records the timestamp of an accepted commit.
    pub(crate) fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }

    /// Rejects changes after which a line total or the cart total would not
    /// fit in `Money`.
    fn check_totals(&self, writes: &[CartWrite]) -> Result<(), CartError> {
        let mut after = self.clone();
        after.apply_all(writes.iter().cloned());
        CartTotals::checked_of(&after.items)
            .map(|_| ())
            .ok_or(CartError::TotalOverflow)
    }

    /// Starts the change list of a command, creating the cart if needed.
    fn begin(&self, now: DateTime<Utc>) -> Vec<CartWrite> {
        if self.is_persisted() {
            Vec::new()
        } else {
            vec![CartWrite::CreateCart { created_at: now }]
        }
    }
}

/// Checks a requested quantity and narrows it to the stored width.
fn positive_quantity(quantity: i64) -> Result<u32, CartError> {
    if quantity <= 0 {
        return Err(CartError::InvalidQuantity { quantity });
    }
    u32::try_from(quantity).map_err(|_| CartError::QuantityOverflow)
}

// Command methods (return changes)
impl Cart {
    /// Adds units of a product.
    ///
    /// An existing line for the product and variant has its quantity
    /// increased and keeps its original price. Otherwise a new line is
    /// created at `unit_price`. Returns the changes and the id of the
    /// affected line.
    pub fn add_item(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
        quantity: i64,
        unit_price: Money,
    ) -> Result<(Vec<CartWrite>, CartItemId), CartError> {
        if product_id.is_blank() {
            return Err(CartError::MissingIdentifier {
                field: "product_id",
            });
        }
        let quantity = positive_quantity(quantity)?;
        if unit_price.is_negative() {
            return Err(CartError::InvalidPrice {
                price: unit_price.minor_units(),
            });
        }

        // A blank variant is the same line as no variant.
        let variant_id = variant_id.filter(|v| !v.is_blank());

        let now = Utc::now();
        let mut writes = self.begin(now);

        if let Some(existing) = self.find_line(product_id, variant_id) {
            let new_quantity = existing
                .quantity
                .checked_add(quantity)
                .ok_or(CartError::QuantityOverflow)?;
            writes.push(CartWrite::SetQuantity {
                item_id: existing.id,
                quantity: new_quantity,
                updated_at: now,
            });
            self.check_totals(&writes)?;
            return Ok((writes, existing.id));
        }

        let item = CartItem {
            id: CartItemId::new(),
            cart_id: self.id,
            product_id: product_id.clone(),
            product_variant_id: variant_id.cloned(),
            quantity,
            price: unit_price,
            created_at: now,
            updated_at: now,
        };
        let item_id = item.id;
        writes.push(CartWrite::InsertItem(item));
        self.check_totals(&writes)?;
        Ok((writes, item_id))
    }

    /// Sets the quantity of a line exactly.
    ///
    /// A quantity of zero or less removes the line. Setting the current
    /// quantity again produces no changes.
    pub fn update_item(
        &self,
        item_id: CartItemId,
        quantity: i64,
    ) -> Result<Vec<CartWrite>, CartError> {
        let existing = self
            .item(item_id)
            .ok_or(CartError::ItemNotFound { item_id })?;

        if quantity <= 0 {
            return Ok(vec![CartWrite::DeleteItem { item_id }]);
        }

        let quantity = u32::try_from(quantity).map_err(|_| CartError::QuantityOverflow)?;
        if quantity == existing.quantity {
            return Ok(vec![]);
        }

        let writes = vec![CartWrite::SetQuantity {
            item_id,
            quantity,
            updated_at: Utc::now(),
        }];
        self.check_totals(&writes)?;
        Ok(writes)
    }

    /// Removes a line.
    pub fn remove_item(&self, item_id: CartItemId) -> Result<Vec<CartWrite>, CartError> {
        if self.item(item_id).is_none() {
            return Err(CartError::ItemNotFound { item_id });
        }
        Ok(vec![CartWrite::DeleteItem { item_id }])
    }

    /// Removes every line. An empty cart produces no changes.
    pub fn clear(&self) -> Vec<CartWrite> {
        if self.is_empty() {
            vec![]
        } else {
            vec![CartWrite::ClearItems]
        }
    }

    /// Plans folding a guest cart into this (user) cart.
    ///
    /// Each guest line either sums into the matching line here, which keeps
    /// its own price, or moves here with the same id, price and quantity.
    /// The guest cart is deleted.
    pub fn merge_from(&self, guest: &Cart) -> Result<MergePlan, CartError> {
        let mut plan = MergePlan::default();
        if !guest.is_persisted() {
            return Ok(plan);
        }
        plan.guest_writes.push(CartWrite::DeleteCart);

        if guest.is_empty() {
            return Ok(plan);
        }

        let now = Utc::now();
        let mut writes = self.begin(now);

        for guest_item in &guest.items {
            let existing =
                self.find_line(&guest_item.product_id, guest_item.product_variant_id.as_ref());

            match existing {
                Some(existing) => {
                    let quantity = existing
                        .quantity
                        .checked_add(guest_item.quantity)
                        .ok_or(CartError::QuantityOverflow)?;
                    writes.push(CartWrite::SetQuantity {
                        item_id: existing.id,
                        quantity,
                        updated_at: now,
                    });
                    plan.merged_lines += 1;
                }
                None => {
                    writes.push(CartWrite::InsertItem(CartItem {
                        cart_id: self.id,
                        updated_at: now,
                        ..guest_item.clone()
                    }));
                    plan.moved_lines += 1;
                }
            }
        }

        self.check_totals(&writes)?;
        plan.user_writes = writes;
        Ok(plan)
    }
}
