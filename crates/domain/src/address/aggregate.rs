//! Address book aggregate implementation.

use chrono::Utc;
use common::{AddressFields, AddressId, UserAddress, UserId};
use record_store::{AddressBookRecord, AddressCommit, AddressWrite, Version};

use crate::aggregate::Aggregate;

use super::AddressError;

/// A user's saved addresses.
///
/// At most one address is the default. The flag only moves through a
/// `SetDefault` change, which rewrites it on every address of the user in
/// one commit. Deleting the default leaves the user without one.
#[derive(Debug, Clone)]
pub struct AddressBook {
    user_id: UserId,
    version: Version,
    addresses: Vec<UserAddress>,
}

impl Aggregate for AddressBook {
    type Change = AddressWrite;

    fn aggregate_type() -> &'static str {
        "AddressBook"
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, change: Self::Change) {
        match change {
            AddressWrite::Insert(address) => self.addresses.push(address),
            AddressWrite::Update {
                address_id,
                fields,
                updated_at,
            } => {
                if let Some(address) = self.addresses.iter_mut().find(|a| a.id == address_id) {
                    address.fields = fields;
                    address.updated_at = updated_at;
                }
            }
            AddressWrite::SetDefault {
                address_id,
                updated_at,
            } => {
                for address in &mut self.addresses {
                    let is_default = Some(address.id) == address_id;
                    if address.is_default != is_default {
                        address.is_default = is_default;
                        address.updated_at = updated_at;
                    }
                }
            }
            AddressWrite::Delete { address_id } => {
                self.addresses.retain(|a| a.id != address_id);
            }
        }
    }
}

// Construction and query methods
impl AddressBook {
    /// Creates an empty book for a user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            version: Version::initial(),
            addresses: Vec::new(),
        }
    }

    /// Rebuilds a book from its stored rows.
    pub fn from_record(record: AddressBookRecord) -> Self {
        Self {
            user_id: record.user_id,
            version: record.version,
            addresses: record.addresses,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns all addresses in creation order.
    pub fn addresses(&self) -> &[UserAddress] {
        &self.addresses
    }

    /// Returns an address of this user by id.
    pub fn get(&self, address_id: AddressId) -> Option<&UserAddress> {
        self.addresses.iter().find(|a| a.id == address_id)
    }

    /// Returns the default address, if any.
    pub fn default_address(&self) -> Option<&UserAddress> {
        self.addresses.iter().find(|a| a.is_default)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Wraps changes decided on this book into a commit guarded by its
    /// current version.
    pub fn commit(&self, writes: Vec<AddressWrite>) -> AddressCommit {
        let mut commit = AddressCommit::new(self.user_id, self.version);
        for write in writes {
            commit.push(write);
        }
        commit
    }

    fn owned(&self, address_id: AddressId) -> Result<&UserAddress, AddressError> {
        self.get(address_id)
            .ok_or(AddressError::NotFound { address_id })
    }
}

fn require_fields(fields: &AddressFields) -> Result<(), AddressError> {
    match fields.first_missing_field() {
        Some(field) => Err(AddressError::MissingField { field }),
        None => Ok(()),
    }
}

// Command methods (return changes)
impl AddressBook {
    /// Saves a new address.
    ///
    /// The first address of a user always becomes the default. Returns the
    /// changes and the new address id.
    pub fn create(
        &self,
        fields: AddressFields,
        make_default: bool,
    ) -> Result<(Vec<AddressWrite>, AddressId), AddressError> {
        require_fields(&fields)?;

        let now = Utc::now();
        let address = UserAddress {
            id: AddressId::new(),
            user_id: self.user_id,
            fields,
            is_default: false,
            created_at: now,
            updated_at: now,
        };
        let address_id = address.id;

        let mut writes = vec![AddressWrite::Insert(address)];
        if make_default || self.is_empty() {
            writes.push(AddressWrite::SetDefault {
                address_id: Some(address_id),
                updated_at: now,
            });
        }
        Ok((writes, address_id))
    }

    /// Replaces the fields of an address.
    pub fn update(
        &self,
        address_id: AddressId,
        fields: AddressFields,
        make_default: bool,
    ) -> Result<Vec<AddressWrite>, AddressError> {
        let existing = self.owned(address_id)?;
        require_fields(&fields)?;

        let now = Utc::now();
        let mut writes = vec![AddressWrite::Update {
            address_id,
            fields,
            updated_at: now,
        }];
        if make_default && !existing.is_default {
            writes.push(AddressWrite::SetDefault {
                address_id: Some(address_id),
                updated_at: now,
            });
        }
        Ok(writes)
    }

    /// Deletes an address. No other address is promoted to default.
    pub fn delete(&self, address_id: AddressId) -> Result<Vec<AddressWrite>, AddressError> {
        self.owned(address_id)?;
        Ok(vec![AddressWrite::Delete { address_id }])
    }

    /// Makes an address the user's only default.
    ///
    /// Produces no changes if it already is.
    pub fn set_default(&self, address_id: AddressId) -> Result<Vec<AddressWrite>, AddressError> {
        if self.owned(address_id)?.is_default {
            return Ok(vec![]);
        }
        Ok(vec![AddressWrite::SetDefault {
            address_id: Some(address_id),
            updated_at: Utc::now(),
        }])
    }
}
