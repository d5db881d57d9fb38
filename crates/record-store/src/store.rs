use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartOwner, UserId};

use crate::{
    AddressBookRecord, AddressCommit, AddressWrite, CartCommit, CartRecord, CartWrite, Result,
    Version,
};

/// Persistence for carts and their line items.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Loads the cart of an owner with its items.
    ///
    /// Returns None if the owner has no cart.
    async fn load_cart(&self, owner: &CartOwner) -> Result<Option<CartRecord>>;

    /// Applies a batch of cart commits atomically.
    ///
    /// Either every commit succeeds or none does. Each commit fails with
    /// `ConcurrencyConflict` if its cart is not at `expected_version`.
    ///
    /// Returns the new version of each cart, in commit order. A deleted cart
    /// reports the initial version.
    async fn commit_carts(&self, commits: Vec<CartCommit>) -> Result<Vec<Version>>;
}

/// Persistence for users' saved addresses.
#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Loads every address of a user.
    ///
    /// A user without addresses gets an empty book at the initial version.
    async fn load_addresses(&self, user_id: UserId) -> Result<AddressBookRecord>;

    /// Applies a commit to one user's address set atomically.
    ///
    /// Fails with `ConcurrencyConflict` if the set is not at
    /// `expected_version`, and with `UniqueViolation` if the result would
    /// hold more than one default address.
    async fn commit_addresses(&self, commit: AddressCommit) -> Result<Version>;
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn load_cart(&self, owner: &CartOwner) -> Result<Option<CartRecord>> {
        (**self).load_cart(owner).await
    }

    async fn commit_carts(&self, commits: Vec<CartCommit>) -> Result<Vec<Version>> {
        (**self).commit_carts(commits).await
    }
}

#[async_trait]
impl<T: AddressStore + ?Sized> AddressStore for Arc<T> {
    async fn load_addresses(&self, user_id: UserId) -> Result<AddressBookRecord> {
        (**self).load_addresses(user_id).await
    }

    async fn commit_addresses(&self, commit: AddressCommit) -> Result<Version> {
        (**self).commit_addresses(commit).await
    }
}

/// Extension trait providing convenience methods for cart stores.
#[async_trait]
pub trait CartStoreExt: CartStore {
    /// Applies a single cart commit.
    async fn commit_cart(&self, commit: CartCommit) -> Result<Version> {
        let versions = self.commit_carts(vec![commit]).await?;
        Ok(versions.into_iter().next().unwrap_or_default())
    }

    /// Checks if an owner has a cart.
    async fn cart_exists(&self, owner: &CartOwner) -> Result<bool> {
        Ok(self.load_cart(owner).await?.is_some())
    }
}

impl<T: CartStore + ?Sized> CartStoreExt for T {}

/// Error returned when a commit is malformed.
#[derive(Debug, Clone)]
pub struct CommitValidationError {
    pub message: String,
}

impl std::fmt::Display for CommitValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Commit validation error: {}", self.message)
    }
}

impl std::error::Error for CommitValidationError {}

fn invalid(message: impl Into<String>) -> CommitValidationError {
    CommitValidationError {
        message: message.into(),
    }
}

/// Validates a batch of cart commits before any row is touched.
pub fn validate_cart_commits(
    commits: &[CartCommit],
) -> std::result::Result<(), CommitValidationError> {
    if commits.is_empty() {
        return Err(invalid("Cannot commit an empty batch"));
    }

    let mut owners = HashSet::new();
    let mut cart_ids = HashSet::new();

    for commit in commits {
        if !owners.insert(&commit.owner) || !cart_ids.insert(commit.cart_id) {
            return Err(invalid(format!(
                "Cart {} appears more than once in the batch",
                commit.owner
            )));
        }

        if commit.writes.is_empty() {
            return Err(invalid(format!("Commit for {} has no writes", commit.owner)));
        }

        let creates = matches!(commit.writes.first(), Some(CartWrite::CreateCart { .. }));
        if creates != commit.expected_version.is_initial() {
            return Err(invalid(format!(
                "Cart {} must be created exactly when committing at the initial version",
                commit.owner
            )));
        }

        let last = commit.writes.len() - 1;
        for (index, write) in commit.writes.iter().enumerate() {
            match write {
                CartWrite::CreateCart { .. } if index != 0 => {
                    return Err(invalid("CreateCart must be the first write"));
                }
                CartWrite::DeleteCart if index != last => {
                    return Err(invalid("DeleteCart must be the last write"));
                }
                CartWrite::InsertItem(item) if item.cart_id != commit.cart_id => {
                    return Err(invalid(format!(
                        "Item {} does not belong to cart {}",
                        item.id, commit.cart_id
                    )));
                }
                CartWrite::InsertItem(item) if item.quantity == 0 => {
                    return Err(invalid(format!("Item {} has zero quantity", item.id)));
                }
                CartWrite::SetQuantity {
                    item_id,
                    quantity: 0,
                    ..
                } => {
                    return Err(invalid(format!("Item {item_id} set to zero quantity")));
                }
                _ => {}
            }
        }
    }

    Ok(())
}

/// Validates an address commit before any row is touched.
pub fn validate_address_commit(
    commit: &AddressCommit,
) -> std::result::Result<(), CommitValidationError> {
    if commit.writes.is_empty() {
        return Err(invalid(format!(
            "Address commit for user {} has no writes",
            commit.user_id
        )));
    }

    for write in &commit.writes {
        if let AddressWrite::Insert(address) = write
            && address.user_id != commit.user_id
        {
            return Err(invalid(format!(
                "Address {} does not belong to user {}",
                address.id, commit.user_id
            )));
        }
    }

    Ok(())
}
