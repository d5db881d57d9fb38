//! Address commands.

use common::{AddressFields, AddressId, UserId};

/// Command to save a new address.
#[derive(Debug, Clone)]
pub struct CreateAddress {
    pub user_id: UserId,
    pub fields: AddressFields,

    /// Make the new address the user's only default.
    pub make_default: bool,
}

impl CreateAddress {
    /// Creates a new CreateAddress command.
    pub fn new(user_id: UserId, fields: AddressFields) -> Self {
        Self {
            user_id,
            fields,
            make_default: false,
        }
    }

    /// Marks the address to become the default.
    pub fn as_default(mut self) -> Self {
        self.make_default = true;
        self
    }
}

/// Command to replace the fields of a saved address.
///
/// With `make_default` false the default flag is left as it is.
#[derive(Debug, Clone)]
pub struct UpdateAddress {
    pub user_id: UserId,
    pub address_id: AddressId,
    pub fields: AddressFields,
    pub make_default: bool,
}

impl UpdateAddress {
    /// Creates a new UpdateAddress command.
    pub fn new(user_id: UserId, address_id: AddressId, fields: AddressFields) -> Self {
        Self {
            user_id,
            address_id,
            fields,
            make_default: false,
        }
    }

    /// Marks the address to become the default.
    pub fn as_default(mut self) -> Self {
        self.make_default = true;
        self
    }
}
