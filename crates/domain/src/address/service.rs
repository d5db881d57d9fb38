//! Address registry providing the address operations.

use common::{AddressId, UserAddress, UserId};
use record_store::{AddressStore, AddressWrite};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::locks::KeyedLocks;

use super::{AddressBook, AddressError, CreateAddress, UpdateAddress};

/// Service for managing users' saved addresses.
///
/// Operations on one user's addresses are serialized by a per-user lock
/// and each is committed as one versioned unit, so two concurrent default
/// changes end with exactly one default.
pub struct AddressRegistry<S: AddressStore> {
    store: S,
    locks: KeyedLocks<UserId>,
}

impl<S: AddressStore> AddressRegistry<S> {
    /// Creates a new address registry with the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    async fn load(&self, user_id: UserId) -> Result<AddressBook, DomainError> {
        let record = self.store.load_addresses(user_id).await?;
        Ok(AddressBook::from_record(record))
    }

    async fn commit(
        &self,
        book: &mut AddressBook,
        writes: Vec<AddressWrite>,
    ) -> Result<(), DomainError> {
        if writes.is_empty() {
            return Ok(());
        }

        let changes_default = writes
            .iter()
            .any(|w| matches!(w, AddressWrite::SetDefault { .. }));

        let version = self
            .store
            .commit_addresses(book.commit(writes.clone()))
            .await
            .inspect_err(|e| {
                if e.is_conflict() {
                    tracing::warn!(user_id = %book.user_id(), error = %e, "address commit conflict");
                }
            })?;

        book.apply_all(writes);
        book.set_version(version);

        if changes_default {
            metrics::counter!("address_default_changes_total").increment(1);
        }
        Ok(())
    }

    fn present(book: &AddressBook, address_id: AddressId) -> Result<UserAddress, DomainError> {
        Ok(book
            .get(address_id)
            .cloned()
            .ok_or(AddressError::NotFound { address_id })?)
    }

    /// Saves a new address. A user's first address becomes the default.
    #[tracing::instrument(skip(self))]
    pub async fn create(&self, cmd: CreateAddress) -> Result<UserAddress, DomainError> {
        let _guard = self.locks.lock(&cmd.user_id).await;

        let mut book = self.load(cmd.user_id).await?;
        let (writes, address_id) = book.create(cmd.fields, cmd.make_default)?;
        self.commit(&mut book, writes).await?;

        Self::present(&book, address_id)
    }

    /// Replaces the fields of an address, optionally making it the default.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, cmd: UpdateAddress) -> Result<UserAddress, DomainError> {
        let _guard = self.locks.lock(&cmd.user_id).await;

        let mut book = self.load(cmd.user_id).await?;
        let writes = book.update(cmd.address_id, cmd.fields, cmd.make_default)?;
        self.commit(&mut book, writes).await?;

        Self::present(&book, cmd.address_id)
    }

    /// Deletes an address.
    ///
    /// If it was the default the user is left without one.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, user_id: UserId, address_id: AddressId) -> Result<(), DomainError> {
        let _guard = self.locks.lock(&user_id).await;

        let mut book = self.load(user_id).await?;
        let was_default = book.get(address_id).is_some_and(|a| a.is_default);
        let writes = book.delete(address_id)?;
        self.commit(&mut book, writes).await?;

        if was_default {
            tracing::debug!(%user_id, %address_id, "default address deleted");
        }
        Ok(())
    }

    /// Makes an address the user's only default.
    #[tracing::instrument(skip(self))]
    pub async fn set_default(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<UserAddress, DomainError> {
        let _guard = self.locks.lock(&user_id).await;

        let mut book = self.load(user_id).await?;
        let writes = book.set_default(address_id)?;
        self.commit(&mut book, writes).await?;

        Self::present(&book, address_id)
    }

    /// Returns every address of a user in creation order.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self, user_id: UserId) -> Result<Vec<UserAddress>, DomainError> {
        Ok(self.load(user_id).await?.addresses().to_vec())
    }

    /// Returns one address of a user.
    #[tracing::instrument(skip(self))]
    pub async fn get(
        &self,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<UserAddress, DomainError> {
        let book = self.load(user_id).await?;
        Self::present(&book, address_id)
    }

    /// Returns the user's default address, if any.
    #[tracing::instrument(skip(self))]
    pub async fn default_address(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserAddress>, DomainError> {
        Ok(self.load(user_id).await?.default_address().cloned())
    }
}
