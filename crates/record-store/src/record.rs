use chrono::{DateTime, Utc};
use common::{AddressFields, AddressId, CartId, CartItem, CartItemId, CartOwner, UserAddress, UserId};

use crate::Version;

/// A stored cart together with its line items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRecord {
    pub id: CartId,
    pub owner: CartOwner,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<CartItem>,
}

/// A single row-level change to a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartWrite {
    /// Inserts the cart row. Must be the first write of a commit that
    /// expects the initial version.
    CreateCart { created_at: DateTime<Utc> },

    /// Inserts a line item. Items moved from another cart keep their id.
    InsertItem(CartItem),

    /// Sets the quantity of an existing line.
    SetQuantity {
        item_id: CartItemId,
        quantity: u32,
        updated_at: DateTime<Utc>,
    },

    /// Deletes a line item.
    DeleteItem { item_id: CartItemId },

    /// Deletes every line item of the cart.
    ClearItems,

    /// Deletes the cart row and its items.
    DeleteCart,
}

impl CartWrite {
    /// Short name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CartWrite::CreateCart { .. } => "create_cart",
            CartWrite::InsertItem(_) => "insert_item",
            CartWrite::SetQuantity { .. } => "set_quantity",
            CartWrite::DeleteItem { .. } => "delete_item",
            CartWrite::ClearItems => "clear_items",
            CartWrite::DeleteCart => "delete_cart",
        }
    }
}

/// A batch of writes against one cart, guarded by the version the writer
/// observed when it loaded the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartCommit {
    pub cart_id: CartId,
    pub owner: CartOwner,
    pub expected_version: Version,
    pub committed_at: DateTime<Utc>,
    pub writes: Vec<CartWrite>,
}

impl CartCommit {
    /// Creates an empty commit for a cart at the given version.
    pub fn new(cart_id: CartId, owner: CartOwner, expected_version: Version) -> Self {
        Self {
            cart_id,
            owner,
            expected_version,
            committed_at: Utc::now(),
            writes: Vec::new(),
        }
    }

    /// Appends a write.
    pub fn push(&mut self, write: CartWrite) {
        self.writes.push(write);
    }

    /// Returns the version the cart has after this commit.
    pub fn next_version(&self) -> Version {
        self.expected_version.next()
    }

    /// Returns true if the commit deletes the cart.
    pub fn deletes_cart(&self) -> bool {
        self.writes.iter().any(|w| matches!(w, CartWrite::DeleteCart))
    }
}

/// A user's saved addresses and the version guarding the whole set.
///
/// A user who never saved an address has an empty book at the initial
/// version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressBookRecord {
    pub user_id: UserId,
    pub version: Version,
    pub addresses: Vec<UserAddress>,
}

impl AddressBookRecord {
    /// Returns an empty, never committed book.
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            version: Version::initial(),
            addresses: Vec::new(),
        }
    }
}

/// A single row-level change to a user's addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressWrite {
    /// Inserts a new address. Its `is_default` flag is stored as given.
    Insert(UserAddress),

    /// Replaces the editable fields of an address.
    Update {
        address_id: AddressId,
        fields: AddressFields,
        updated_at: DateTime<Utc>,
    },

    /// Rewrites the default flag of every address of the user: only
    /// `address_id` ends up default, or none when it is `None`.
    SetDefault {
        address_id: Option<AddressId>,
        updated_at: DateTime<Utc>,
    },

    /// Deletes an address.
    Delete { address_id: AddressId },
}

impl AddressWrite {
    /// Short name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AddressWrite::Insert(_) => "insert",
            AddressWrite::Update { .. } => "update",
            AddressWrite::SetDefault { .. } => "set_default",
            AddressWrite::Delete { .. } => "delete",
        }
    }
}

/// A batch of writes against one user's address set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCommit {
    pub user_id: UserId,
    pub expected_version: Version,
    pub writes: Vec<AddressWrite>,
}

impl AddressCommit {
    /// Creates an empty commit for the address set at the given version.
    pub fn new(user_id: UserId, expected_version: Version) -> Self {
        Self {
            user_id,
            expected_version,
            writes: Vec::new(),
        }
    }

    /// Appends a write.
    pub fn push(&mut self, write: AddressWrite) {
        self.writes.push(write);
    }

    /// Returns the version the address set has after this commit.
    pub fn next_version(&self) -> Version {
        self.expected_version.next()
    }
}
