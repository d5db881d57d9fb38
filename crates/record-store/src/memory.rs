use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartItemId, CartOwner, UserId};
use tokio::sync::RwLock;

use crate::{
    AddressBookRecord, AddressCommit, AddressWrite, CartCommit, CartRecord, CartWrite, Result,
    StoreError, Version,
    store::{AddressStore, CartStore, validate_address_commit, validate_cart_commits},
};

/// In-memory record store for tests and single-process deployments.
///
/// Commits are staged on copies of the touched aggregates and only written
/// back once every check passed, so a failed commit leaves no partial state.
/// The store simulates the same uniqueness rules as the PostgreSQL schema.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    carts: Arc<RwLock<HashMap<CartOwner, CartRecord>>>,
    addresses: Arc<RwLock<HashMap<UserId, AddressBookRecord>>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored carts.
    pub async fn cart_count(&self) -> usize {
        self.carts.read().await.len()
    }

    /// Returns the number of stored cart items across all carts.
    pub async fn item_count(&self) -> usize {
        self.carts
            .read()
            .await
            .values()
            .map(|cart| cart.items.len())
            .sum()
    }

    /// Clears all carts and addresses.
    pub async fn clear(&self) {
        self.carts.write().await.clear();
        self.addresses.write().await.clear();
    }
}

fn conflict(aggregate: String, expected: Version, actual: Version) -> StoreError {
    StoreError::ConcurrencyConflict {
        aggregate,
        expected,
        actual,
    }
}

fn unique(constraint: &str) -> StoreError {
    StoreError::UniqueViolation {
        constraint: constraint.to_string(),
    }
}

/// Applies one commit to a staged copy of the cart.
fn stage_cart_commit(staged: &mut Option<CartRecord>, commit: &CartCommit) -> Result<Version> {
    let actual = staged.as_ref().map(|c| c.version).unwrap_or_default();
    if actual != commit.expected_version
        || staged.as_ref().is_some_and(|c| c.id != commit.cart_id)
    {
        return Err(conflict(
            commit.owner.to_string(),
            commit.expected_version,
            actual,
        ));
    }

    for write in &commit.writes {
        if let CartWrite::CreateCart { created_at } = write {
            if staged.is_some() {
                return Err(unique("carts_owner_unique"));
            }
            *staged = Some(CartRecord {
                id: commit.cart_id,
                owner: commit.owner.clone(),
                version: Version::initial(),
                created_at: *created_at,
                updated_at: *created_at,
                items: Vec::new(),
            });
            continue;
        }

        let cart = staged.as_mut().ok_or_else(|| {
            StoreError::InvalidCommit(format!("Cart {} does not exist", commit.owner))
        })?;

        match write {
            CartWrite::CreateCart { .. } => {}
            CartWrite::InsertItem(item) => {
                if cart.items.iter().any(|i| i.id == item.id) {
                    return Err(unique("cart_items_pkey"));
                }
                if cart
                    .items
                    .iter()
                    .any(|i| i.matches(&item.product_id, item.product_variant_id.as_ref()))
                {
                    return Err(unique("cart_items_line_unique"));
                }
                cart.items.push(item.clone());
            }
            CartWrite::SetQuantity {
                item_id,
                quantity,
                updated_at,
            } => {
                let item = cart
                    .items
                    .iter_mut()
                    .find(|i| i.id == *item_id)
                    .ok_or_else(|| {
                        StoreError::InvalidCommit(format!("Item {item_id} does not exist"))
                    })?;
                item.quantity = *quantity;
                item.updated_at = *updated_at;
            }
            CartWrite::DeleteItem { item_id } => {
                cart.items.retain(|i| i.id != *item_id);
            }
            CartWrite::ClearItems => cart.items.clear(),
            CartWrite::DeleteCart => {
                *staged = None;
                return Ok(Version::initial());
            }
        }
    }

    let cart = staged.as_mut().ok_or_else(|| {
        StoreError::InvalidCommit(format!("Cart {} does not exist", commit.owner))
    })?;
    cart.version = commit.next_version();
    cart.updated_at = commit.committed_at;
    Ok(cart.version)
}

/// Returns true if an inserted item id would be held by two carts once the
/// staged batch is written back. Item ids are unique across all carts.
fn inserted_id_collides(
    carts: &HashMap<CartOwner, CartRecord>,
    staged: &[(CartOwner, Option<CartRecord>)],
    commits: &[CartCommit],
) -> bool {
    let inserted: HashSet<CartItemId> = commits
        .iter()
        .flat_map(|c| c.writes.iter())
        .filter_map(|w| match w {
            CartWrite::InsertItem(item) => Some(item.id),
            _ => None,
        })
        .collect();

    let untouched = carts
        .iter()
        .filter(|(owner, _)| !staged.iter().any(|(o, _)| o == *owner))
        .map(|(_, cart)| cart);
    let after = untouched.chain(staged.iter().filter_map(|(_, cart)| cart.as_ref()));

    let mut seen = HashSet::new();
    after
        .flat_map(|cart| cart.items.iter())
        .filter(|item| inserted.contains(&item.id))
        .any(|item| !seen.insert(item.id))
}

/// Applies a commit to a staged copy of a user's address set.
fn stage_address_commit(book: &mut AddressBookRecord, commit: &AddressCommit) -> Result<Version> {
    if book.version != commit.expected_version {
        return Err(conflict(
            format!("addresses of user {}", commit.user_id),
            commit.expected_version,
            book.version,
        ));
    }

    for write in &commit.writes {
        match write {
            AddressWrite::Insert(address) => {
                if book.addresses.iter().any(|a| a.id == address.id) {
                    return Err(unique("user_addresses_pkey"));
                }
                book.addresses.push(address.clone());
            }
            AddressWrite::Update {
                address_id,
                fields,
                updated_at,
            } => {
                let address = book
                    .addresses
                    .iter_mut()
                    .find(|a| a.id == *address_id)
                    .ok_or_else(|| {
                        StoreError::InvalidCommit(format!("Address {address_id} does not exist"))
                    })?;
                address.fields = fields.clone();
                address.updated_at = *updated_at;
            }
            AddressWrite::SetDefault {
                address_id,
                updated_at,
            } => {
                for address in &mut book.addresses {
                    let is_default = Some(address.id) == *address_id;
                    if address.is_default != is_default {
                        address.is_default = is_default;
                        address.updated_at = *updated_at;
                    }
                }
            }
            AddressWrite::Delete { address_id } => {
                book.addresses.retain(|a| a.id != *address_id);
            }
        }
    }

    if book.addresses.iter().filter(|a| a.is_default).count() > 1 {
        return Err(unique("user_addresses_one_default"));
    }

    book.version = commit.next_version();
    Ok(book.version)
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn load_cart(&self, owner: &CartOwner) -> Result<Option<CartRecord>> {
        Ok(self.carts.read().await.get(owner).cloned())
    }

    async fn commit_carts(&self, commits: Vec<CartCommit>) -> Result<Vec<Version>> {
        validate_cart_commits(&commits).map_err(|e| StoreError::InvalidCommit(e.message))?;

        let mut carts = self.carts.write().await;

        let mut staged: Vec<(CartOwner, Option<CartRecord>)> = Vec::with_capacity(commits.len());
        let mut versions = Vec::with_capacity(commits.len());
        for commit in &commits {
            let mut cart = carts.get(&commit.owner).cloned();
            let version = stage_cart_commit(&mut cart, commit).inspect_err(|e| {
                tracing::debug!(owner = %commit.owner, error = %e, "cart commit rejected");
            })?;
            versions.push(version);
            staged.push((commit.owner.clone(), cart));
        }

        if inserted_id_collides(&carts, &staged, &commits) {
            return Err(unique("cart_items_pkey"));
        }

        for (owner, cart) in staged {
            match cart {
                Some(cart) => {
                    carts.insert(owner, cart);
                }
                None => {
                    carts.remove(&owner);
                }
            }
        }

        metrics::counter!("record_store_commits_total", "aggregate" => "cart").increment(1);
        Ok(versions)
    }
}

#[async_trait]
impl AddressStore for InMemoryStore {
    async fn load_addresses(&self, user_id: UserId) -> Result<AddressBookRecord> {
        Ok(self
            .addresses
            .read()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| AddressBookRecord::empty(user_id)))
    }

    async fn commit_addresses(&self, commit: AddressCommit) -> Result<Version> {
        validate_address_commit(&commit).map_err(|e| StoreError::InvalidCommit(e.message))?;

        let mut books = self.addresses.write().await;
        let mut book = books
            .get(&commit.user_id)
            .cloned()
            .unwrap_or_else(|| AddressBookRecord::empty(commit.user_id));

        let version = stage_address_commit(&mut book, &commit).inspect_err(|e| {
            tracing::debug!(user_id = %commit.user_id, error = %e, "address commit rejected");
        })?;
        books.insert(commit.user_id, book);

        metrics::counter!("record_store_commits_total", "aggregate" => "address").increment(1);
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{
        AddressFields, AddressId, CartId, CartItem, CartItemId, Money, ProductId, SessionId,
        UserAddress, VariantId,
    };

    use super::*;
    use crate::store::CartStoreExt;

    fn guest(name: &str) -> CartOwner {
        CartOwner::Guest(SessionId::new(name))
    }

    fn item(cart_id: CartId, product: &str, variant: Option<&str>, quantity: u32) -> CartItem {
        let now = Utc::now();
        CartItem {
            id: CartItemId::new(),
            cart_id,
            product_id: ProductId::new(product),
            product_variant_id: variant.map(VariantId::new),
            quantity,
            price: Money::from_minor(1_000),
            created_at: now,
            updated_at: now,
        }
    }

    fn create_commit(owner: CartOwner) -> CartCommit {
        let mut commit = CartCommit::new(CartId::new(), owner, Version::initial());
        commit.push(CartWrite::CreateCart {
            created_at: Utc::now(),
        });
        commit
    }

    fn address(user_id: UserId, is_default: bool) -> UserAddress {
        let now = Utc::now();
        UserAddress {
            id: AddressId::new(),
            user_id,
            fields: AddressFields {
                name: "Siti".to_string(),
                phone: "0813".to_string(),
                address: "Jl. Sudirman 5".to_string(),
                ..AddressFields::default()
            },
            is_default,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_cart_and_load() {
        let store = InMemoryStore::new();
        let owner = guest("s1");
        let mut commit = create_commit(owner.clone());
        commit.push(CartWrite::InsertItem(item(commit.cart_id, "A", None, 2)));

        let version = store.commit_cart(commit).await.unwrap();
        assert_eq!(version, Version::first());

        let cart = store.load_cart(&owner).await.unwrap().unwrap();
        assert_eq!(cart.version, Version::first());
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 2);
    }

    #[tokio::test]
    async fn load_missing_cart_returns_none() {
        let store = InMemoryStore::new();
        assert!(store.load_cart(&guest("nobody")).await.unwrap().is_none());
        assert!(!store.cart_exists(&guest("nobody")).await.unwrap());
    }

    #[tokio::test]
    async fn stale_version_is_a_conflict() {
        let store = InMemoryStore::new();
        let owner = guest("s1");
        let commit = create_commit(owner.clone());
        let cart_id = commit.cart_id;
        store.commit_cart(commit).await.unwrap();

        let mut first = CartCommit::new(cart_id, owner.clone(), Version::first());
        first.push(CartWrite::InsertItem(item(cart_id, "A", None, 1)));
        store.commit_cart(first).await.unwrap();

        let mut stale = CartCommit::new(cart_id, owner.clone(), Version::first());
        stale.push(CartWrite::InsertItem(item(cart_id, "B", None, 1)));
        let result = store.commit_cart(stale).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));

        let cart = store.load_cart(&owner).await.unwrap().unwrap();
        assert_eq!(cart.items.len(), 1);
    }

    #[tokio::test]
    async fn second_cart_for_owner_is_rejected() {
        let store = InMemoryStore::new();
        let owner = guest("s1");
        store.commit_cart(create_commit(owner.clone())).await.unwrap();

        let result = store.commit_cart(create_commit(owner)).await;
        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn duplicate_line_is_rejected() {
        let store = InMemoryStore::new();
        let owner = guest("s1");
        let mut commit = create_commit(owner.clone());
        let cart_id = commit.cart_id;
        commit.push(CartWrite::InsertItem(item(cart_id, "A", Some("red"), 1)));
        store.commit_cart(commit).await.unwrap();

        let mut dup = CartCommit::new(cart_id, owner.clone(), Version::first());
        dup.push(CartWrite::InsertItem(item(cart_id, "A", Some("red"), 1)));
        let result = store.commit_cart(dup).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));

        // Same product, other variant is a separate line.
        let mut other = CartCommit::new(cart_id, owner, Version::first());
        other.push(CartWrite::InsertItem(item(cart_id, "A", None, 1)));
        assert!(store.commit_cart(other).await.is_ok());
    }

    #[tokio::test]
    async fn batch_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let guest_owner = guest("s1");
        let user_owner = CartOwner::User(UserId::new());

        let mut guest_commit = create_commit(guest_owner.clone());
        let guest_cart = guest_commit.cart_id;
        let moved = item(guest_cart, "A", None, 2);
        guest_commit.push(CartWrite::InsertItem(moved.clone()));
        store.commit_cart(guest_commit).await.unwrap();

        // Moving the item into a user cart while expecting a stale guest
        // version must not create the user cart.
        let mut delete_guest = CartCommit::new(guest_cart, guest_owner.clone(), Version::new(7));
        delete_guest.push(CartWrite::DeleteCart);
        let mut create_user = create_commit(user_owner.clone());
        create_user.push(CartWrite::InsertItem(CartItem {
            cart_id: create_user.cart_id,
            ..moved.clone()
        }));

        let result = store.commit_carts(vec![delete_guest, create_user]).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
        assert!(store.load_cart(&user_owner).await.unwrap().is_none());
        assert!(store.load_cart(&guest_owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn move_item_between_carts() {
        let store = InMemoryStore::new();
        let guest_owner = guest("s1");
        let user_owner = CartOwner::User(UserId::new());

        let mut guest_commit = create_commit(guest_owner.clone());
        let guest_cart = guest_commit.cart_id;
        let moved = item(guest_cart, "A", None, 2);
        guest_commit.push(CartWrite::InsertItem(moved.clone()));
        store.commit_cart(guest_commit).await.unwrap();

        let mut delete_guest = CartCommit::new(guest_cart, guest_owner.clone(), Version::first());
        delete_guest.push(CartWrite::DeleteCart);
        let mut create_user = create_commit(user_owner.clone());
        create_user.push(CartWrite::InsertItem(CartItem {
            cart_id: create_user.cart_id,
            ..moved.clone()
        }));

        let versions = store
            .commit_carts(vec![delete_guest, create_user])
            .await
            .unwrap();
        assert_eq!(versions, vec![Version::initial(), Version::first()]);

        assert!(store.load_cart(&guest_owner).await.unwrap().is_none());
        let user_cart = store.load_cart(&user_owner).await.unwrap().unwrap();
        assert_eq!(user_cart.items[0].id, moved.id);
        assert_eq!(store.item_count().await, 1);
    }

    #[tokio::test]
    async fn item_id_cannot_live_in_two_carts() {
        let store = InMemoryStore::new();
        let mut first = create_commit(guest("s1"));
        let shared = item(first.cart_id, "A", None, 1);
        first.push(CartWrite::InsertItem(shared.clone()));
        store.commit_cart(first).await.unwrap();

        let mut second = create_commit(guest("s2"));
        second.push(CartWrite::InsertItem(CartItem {
            cart_id: second.cart_id,
            ..shared
        }));
        let result = store.commit_cart(second).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));
        assert_eq!(store.cart_count().await, 1);
    }

    #[tokio::test]
    async fn set_quantity_and_clear() {
        let store = InMemoryStore::new();
        let owner = guest("s1");
        let mut commit = create_commit(owner.clone());
        let cart_id = commit.cart_id;
        let line = item(cart_id, "A", None, 1);
        commit.push(CartWrite::InsertItem(line.clone()));
        commit.push(CartWrite::InsertItem(item(cart_id, "B", None, 4)));
        store.commit_cart(commit).await.unwrap();

        let mut update = CartCommit::new(cart_id, owner.clone(), Version::first());
        update.push(CartWrite::SetQuantity {
            item_id: line.id,
            quantity: 9,
            updated_at: Utc::now(),
        });
        store.commit_cart(update).await.unwrap();
        let cart = store.load_cart(&owner).await.unwrap().unwrap();
        assert_eq!(cart.items[0].quantity, 9);

        let mut clear = CartCommit::new(cart_id, owner.clone(), Version::new(2));
        clear.push(CartWrite::ClearItems);
        assert_eq!(store.commit_cart(clear).await.unwrap(), Version::new(3));
        let cart = store.load_cart(&owner).await.unwrap().unwrap();
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn empty_address_book_for_unknown_user() {
        let store = InMemoryStore::new();
        let user_id = UserId::new();
        let book = store.load_addresses(user_id).await.unwrap();
        assert_eq!(book, AddressBookRecord::empty(user_id));
    }

    #[tokio::test]
    async fn set_default_rewrites_all_flags() {
        let store = InMemoryStore::new();
        let user_id = UserId::new();
        let a = address(user_id, true);
        let b = address(user_id, false);

        let mut commit = AddressCommit::new(user_id, Version::initial());
        commit.push(AddressWrite::Insert(a.clone()));
        commit.push(AddressWrite::Insert(b.clone()));
        store.commit_addresses(commit).await.unwrap();

        let mut switch = AddressCommit::new(user_id, Version::first());
        switch.push(AddressWrite::SetDefault {
            address_id: Some(b.id),
            updated_at: Utc::now(),
        });
        store.commit_addresses(switch).await.unwrap();

        let book = store.load_addresses(user_id).await.unwrap();
        let defaults: Vec<_> = book.addresses.iter().filter(|x| x.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, b.id);
    }

    #[tokio::test]
    async fn two_defaults_are_rejected() {
        let store = InMemoryStore::new();
        let user_id = UserId::new();

        let mut commit = AddressCommit::new(user_id, Version::initial());
        commit.push(AddressWrite::Insert(address(user_id, true)));
        commit.push(AddressWrite::Insert(address(user_id, true)));
        let result = store.commit_addresses(commit).await;
        assert!(matches!(result, Err(StoreError::UniqueViolation { .. })));

        let book = store.load_addresses(user_id).await.unwrap();
        assert!(book.addresses.is_empty());
    }

    #[tokio::test]
    async fn stale_address_commit_is_a_conflict() {
        let store = InMemoryStore::new();
        let user_id = UserId::new();

        let mut commit = AddressCommit::new(user_id, Version::initial());
        commit.push(AddressWrite::Insert(address(user_id, false)));
        store.commit_addresses(commit).await.unwrap();

        let mut stale = AddressCommit::new(user_id, Version::initial());
        stale.push(AddressWrite::Insert(address(user_id, false)));
        let result = store.commit_addresses(stale).await;
        assert!(matches!(
            result,
            Err(StoreError::ConcurrencyConflict { .. })
        ));
    }
}
