//! Cart engine providing the cart operations.

use common::{CartItem, CartItemId, CartOwner, CartTotals};
use record_store::{CartStore, CartStoreExt, CartWrite, StoreError, Version};

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::locks::KeyedLocks;

use super::{AddItem, Cart, CartError, ClearCart, MergeCarts, RemoveItem, UpdateItem};

/// The line touched by an add, with the cart totals after it.
#[derive(Debug, Clone)]
pub struct LineResult {
    pub item: CartItem,
    pub totals: CartTotals,
}

/// Outcome of setting a line's quantity.
#[derive(Debug, Clone)]
pub enum ItemUpdate {
    /// The line now has the requested quantity.
    Updated { item: CartItem, totals: CartTotals },
    /// The requested quantity was zero or less and the line was removed.
    Removed { totals: CartTotals },
}

impl ItemUpdate {
    /// Returns the cart totals after the update.
    pub fn totals(&self) -> CartTotals {
        match self {
            ItemUpdate::Updated { totals, .. } | ItemUpdate::Removed { totals } => *totals,
        }
    }
}

/// Outcome of a guest-to-user merge.
#[derive(Debug, Clone)]
pub struct MergeReport {
    /// Guest lines summed into an existing user line.
    pub merged_lines: usize,
    /// Guest lines moved to the user cart.
    pub moved_lines: usize,
    /// True if a guest cart existed and was deleted.
    pub guest_cart_deleted: bool,
    /// The user cart after the merge.
    pub cart: Cart,
}

fn reject_blank_owner(owner: &CartOwner) -> Result<(), CartError> {
    match owner {
        CartOwner::Guest(session_id) if session_id.is_blank() => {
            Err(CartError::MissingIdentifier {
                field: "session_id",
            })
        }
        _ => Ok(()),
    }
}

/// Service for managing carts.
///
/// Every operation on a cart runs under that owner's lock from load to
/// commit, so concurrent requests for one cart are applied one after the
/// other. The store's version check still rejects writers from other
/// processes with a conflict. Nothing is retried here.
pub struct CartEngine<S: CartStore> {
    store: S,
    locks: KeyedLocks<CartOwner>,
}

impl<S: CartStore> CartEngine<S> {
    /// Creates a new cart engine with the given store.
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

    /// Loads the cart of an owner, or an empty unsaved cart.
    async fn load(&self, owner: &CartOwner) -> Result<Cart, DomainError> {
        Ok(match self.store.load_cart(owner).await? {
            Some(record) => Cart::from_record(record),
            None => Cart::new(owner.clone()),
        })
    }

    /// Commits changes decided on a cart and applies them to it.
    async fn commit(&self, cart: &mut Cart, writes: Vec<CartWrite>) -> Result<(), DomainError> {
        if writes.is_empty() {
            return Ok(());
        }

        let commit = cart.commit(writes.clone());
        let committed_at = commit.committed_at;
        let version = self
            .store
            .commit_cart(commit)
            .await
            .inspect_err(|e| record_conflict(cart.owner(), e))?;

        cart.apply_all(writes);
        cart.set_version(version);
        cart.touch(committed_at);
        Ok(())
    }

    /// Adds units of a product to a cart, creating the cart if needed.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(&self, cmd: AddItem) -> Result<LineResult, DomainError> {
        reject_blank_owner(&cmd.owner)?;
        let _guard = self.locks.lock(&cmd.owner).await;

        let mut cart = self.load(&cmd.owner).await?;
        let (writes, item_id) = cart.add_item(
            &cmd.product_id,
            cmd.variant_id.as_ref(),
            cmd.quantity,
            cmd.unit_price,
        )?;
        self.commit(&mut cart, writes).await?;

        metrics::counter!("cart_items_added_total").increment(1);

        let item = cart
            .item(item_id)
            .cloned()
            .ok_or(CartError::ItemNotFound { item_id })?;
        Ok(LineResult {
            item,
            totals: cart.totals(),
        })
    }

    /// Sets the quantity of a line in the caller's cart.
    ///
    /// A line of another cart is reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(&self, cmd: UpdateItem) -> Result<ItemUpdate, DomainError> {
        reject_blank_owner(&cmd.owner)?;
        let _guard = self.locks.lock(&cmd.owner).await;

        let mut cart = self.load(&cmd.owner).await?;
        let writes = cart.update_item(cmd.item_id, cmd.quantity)?;
        self.commit(&mut cart, writes).await?;

        let totals = cart.totals();
        Ok(match cart.item(cmd.item_id) {
            Some(item) => ItemUpdate::Updated {
                item: item.clone(),
                totals,
            },
            None => ItemUpdate::Removed { totals },
        })
    }

    /// Removes a line from the caller's cart.
    ///
    /// Returns false if the cart has no such line.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cmd: RemoveItem) -> Result<bool, DomainError> {
        reject_blank_owner(&cmd.owner)?;
        let _guard = self.locks.lock(&cmd.owner).await;

        let mut cart = self.load(&cmd.owner).await?;
        let writes = match cart.remove_item(cmd.item_id) {
            Ok(writes) => writes,
            Err(CartError::ItemNotFound { .. }) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        self.commit(&mut cart, writes).await?;
        Ok(true)
    }

    /// Removes every line from a cart. Returns the number of lines removed.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cmd: ClearCart) -> Result<usize, DomainError> {
        reject_blank_owner(&cmd.owner)?;
        let _guard = self.locks.lock(&cmd.owner).await;

        let mut cart = self.load(&cmd.owner).await?;
        let removed = cart.line_count();
        let writes = cart.clear();
        self.commit(&mut cart, writes).await?;
        Ok(removed)
    }

    /// Folds a guest cart into a user cart and deletes the guest cart.
    ///
    /// Both carts are locked for the whole merge and committed in one
    /// batch, so no reader sees a half-merged state.
    #[tracing::instrument(skip(self))]
    pub async fn merge_guest_into_user(
        &self,
        cmd: MergeCarts,
    ) -> Result<MergeReport, DomainError> {
        let guest_owner = CartOwner::Guest(cmd.session_id);
        let user_owner = CartOwner::User(cmd.user_id);
        reject_blank_owner(&guest_owner)?;

        let _guards = self
            .locks
            .lock_all([guest_owner.clone(), user_owner.clone()])
            .await;

        let guest = self.load(&guest_owner).await?;
        let mut user = self.load(&user_owner).await?;
        let plan = user.merge_from(&guest)?;

        let guest_cart_deleted = !plan.guest_writes.is_empty();
        let mut commits = Vec::with_capacity(2);
        if guest_cart_deleted {
            commits.push(guest.commit(plan.guest_writes));
        }
        let user_commit =
            (!plan.user_writes.is_empty()).then(|| user.commit(plan.user_writes.clone()));
        if let Some(commit) = &user_commit {
            commits.push(commit.clone());
        }

        if !commits.is_empty() {
            let versions = self
                .store
                .commit_carts(commits)
                .await
                .inspect_err(|e| record_conflict(&user_owner, e))?;

            if let Some(commit) = user_commit {
                user.apply_all(plan.user_writes);
                user.set_version(versions.last().copied().unwrap_or_else(Version::initial));
                user.touch(commit.committed_at);
            }
        }

        if guest_cart_deleted {
            metrics::counter!("cart_merges_total").increment(1);
        }
        tracing::info!(
            merged = plan.merged_lines,
            moved = plan.moved_lines,
            guest_cart_deleted,
            "guest cart merged"
        );

        Ok(MergeReport {
            merged_lines: plan.merged_lines,
            moved_lines: plan.moved_lines,
            guest_cart_deleted,
            cart: user,
        })
    }

    /// Returns the cart of an owner. An owner without a cart gets an empty
    /// one.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<Cart, DomainError> {
        self.load(owner).await
    }

    /// Returns the line with the given id in the caller's cart.
    #[tracing::instrument(skip(self))]
    pub async fn get_item(
        &self,
        owner: &CartOwner,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>, DomainError> {
        Ok(self.load(owner).await?.item(item_id).cloned())
    }

    /// Returns true if the owner has a stored cart.
    pub async fn has_cart(&self, owner: &CartOwner) -> Result<bool, DomainError> {
        Ok(self.store.cart_exists(owner).await?)
    }
}

fn record_conflict(owner: &CartOwner, error: &StoreError) {
    if error.is_conflict() {
        metrics::counter!("cart_conflicts_total").increment(1);
        tracing::warn!(%owner, %error, "cart commit conflict");
    }
}
