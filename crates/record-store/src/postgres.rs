use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{
    AddressFields, AddressId, CartId, CartItem, CartItemId, CartOwner, Money, ProductId,
    SessionId, UserAddress, UserId, VariantId,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AddressBookRecord, AddressCommit, AddressWrite, CartCommit, CartRecord, CartWrite, Result,
    StoreError, Version,
    store::{AddressStore, CartStore, validate_address_commit, validate_cart_commits},
};

/// PostgreSQL-backed record store.
///
/// Every commit batch runs in one transaction. The version guard is an
/// `UPDATE ... WHERE version = $expected`, which also takes the row lock on
/// the cart (or address book) for the rest of the transaction.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

const CART_COLUMNS: &str = "id, user_id, session_id, version, created_at, updated_at";
const ITEM_COLUMNS: &str =
    "id, cart_id, product_id, product_variant_id, quantity, price, created_at, updated_at";
const ADDRESS_COLUMNS: &str = "id, user_id, label, name, phone, address, province, city, \
     subdistrict, postal_code, province_id, city_id, subdistrict_id, is_default, created_at, \
     updated_at";

impl PostgresStore {
    /// Creates a new PostgreSQL record store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Opens a read-only snapshot so that a record and its child rows are
    /// read as of the same commit.
    async fn begin_snapshot(&self) -> Result<Transaction<'_, Postgres>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    fn row_to_owner(row: &PgRow) -> Result<CartOwner> {
        let user_id: Option<Uuid> = row.try_get("user_id")?;
        let session_id: Option<String> = row.try_get("session_id")?;
        match (user_id, session_id) {
            (Some(user_id), None) => Ok(CartOwner::User(UserId::from_uuid(user_id))),
            (None, Some(session_id)) => Ok(CartOwner::Guest(SessionId::new(session_id))),
            _ => Err(StoreError::Database(sqlx::Error::Decode(
                "cart row must have exactly one owner".into(),
            ))),
        }
    }

    fn row_to_item(row: PgRow) -> Result<CartItem> {
        let quantity: i64 = row.try_get("quantity")?;
        let quantity =
            u32::try_from(quantity).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        Ok(CartItem {
            id: CartItemId::from_uuid(row.try_get("id")?),
            cart_id: CartId::from_uuid(row.try_get("cart_id")?),
            product_id: ProductId::new(row.try_get::<String, _>("product_id")?),
            product_variant_id: row
                .try_get::<Option<String>, _>("product_variant_id")?
                .map(VariantId::new),
            quantity,
            price: Money::from_minor(row.try_get("price")?),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_address(row: PgRow) -> Result<UserAddress> {
        Ok(UserAddress {
            id: AddressId::from_uuid(row.try_get("id")?),
            user_id: UserId::from_uuid(row.try_get("user_id")?),
            fields: AddressFields {
                label: row.try_get("label")?,
                name: row.try_get("name")?,
                phone: row.try_get("phone")?,
                address: row.try_get("address")?,
                province: row.try_get("province")?,
                city: row.try_get("city")?,
                subdistrict: row.try_get("subdistrict")?,
                postal_code: row.try_get("postal_code")?,
                province_id: row.try_get("province_id")?,
                city_id: row.try_get("city_id")?,
                subdistrict_id: row.try_get("subdistrict_id")?,
            },
            is_default: row.try_get("is_default")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn current_cart_version(
        tx: &mut Transaction<'_, Postgres>,
        cart_id: CartId,
    ) -> Result<Version> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM carts WHERE id = $1")
            .bind(cart_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?;
        Ok(version.map(Version::new).unwrap_or_default())
    }

    async fn apply_cart_commit(
        tx: &mut Transaction<'_, Postgres>,
        commit: &CartCommit,
    ) -> Result<Version> {
        let cart_id = commit.cart_id;
        let new_version = commit.next_version();

        if commit.expected_version.is_initial() {
            sqlx::query(
                r#"
                INSERT INTO carts (id, user_id, session_id, version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $5)
                "#,
            )
            .bind(cart_id.as_uuid())
            .bind(commit.owner.user_id().map(|id| id.as_uuid()))
            .bind(commit.owner.session_id().map(SessionId::as_str))
            .bind(new_version.as_i64())
            .bind(commit.committed_at)
            .execute(&mut **tx)
            .await
            .map_err(map_unique_violation)?;
        } else {
            let updated = sqlx::query(
                "UPDATE carts SET version = $3, updated_at = $4 WHERE id = $1 AND version = $2",
            )
            .bind(cart_id.as_uuid())
            .bind(commit.expected_version.as_i64())
            .bind(new_version.as_i64())
            .bind(commit.committed_at)
            .execute(&mut **tx)
            .await?
            .rows_affected();

            if updated == 0 {
                let actual = Self::current_cart_version(tx, cart_id).await?;
                return Err(StoreError::ConcurrencyConflict {
                    aggregate: commit.owner.to_string(),
                    expected: commit.expected_version,
                    actual,
                });
            }
        }

        for write in &commit.writes {
            match write {
                CartWrite::CreateCart { .. } => {}
                CartWrite::InsertItem(item) => {
                    let quantity = i64::from(item.quantity);
                    sqlx::query(
                        r#"
                        INSERT INTO cart_items
                            (id, cart_id, product_id, product_variant_id, quantity, price, created_at, updated_at)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                        "#,
                    )
                    .bind(item.id.as_uuid())
                    .bind(cart_id.as_uuid())
                    .bind(item.product_id.as_str())
                    .bind(item.product_variant_id.as_ref().map(VariantId::as_str))
                    .bind(quantity)
                    .bind(item.price.minor_units())
                    .bind(item.created_at)
                    .bind(item.updated_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(map_unique_violation)?;
                }
                CartWrite::SetQuantity {
                    item_id,
                    quantity,
                    updated_at,
                } => {
                    let updated = sqlx::query(
                        "UPDATE cart_items SET quantity = $3, updated_at = $4 WHERE id = $1 AND cart_id = $2",
                    )
                    .bind(item_id.as_uuid())
                    .bind(cart_id.as_uuid())
                    .bind(i64::from(*quantity))
                    .bind(*updated_at)
                    .execute(&mut **tx)
                    .await?
                    .rows_affected();

                    if updated == 0 {
                        return Err(StoreError::InvalidCommit(format!(
                            "Item {item_id} does not exist"
                        )));
                    }
                }
                CartWrite::DeleteItem { item_id } => {
                    sqlx::query("DELETE FROM cart_items WHERE id = $1 AND cart_id = $2")
                        .bind(item_id.as_uuid())
                        .bind(cart_id.as_uuid())
                        .execute(&mut **tx)
                        .await?;
                }
                CartWrite::ClearItems => {
                    sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
                        .bind(cart_id.as_uuid())
                        .execute(&mut **tx)
                        .await?;
                }
                CartWrite::DeleteCart => {
                    // Items go with the cart (ON DELETE CASCADE).
                    sqlx::query("DELETE FROM carts WHERE id = $1")
                        .bind(cart_id.as_uuid())
                        .execute(&mut **tx)
                        .await?;
                    return Ok(Version::initial());
                }
            }
        }

        Ok(new_version)
    }

    async fn apply_address_write(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        write: &AddressWrite,
    ) -> Result<()> {
        match write {
            AddressWrite::Insert(address) => {
                let f = &address.fields;
                sqlx::query(
                    r#"
                    INSERT INTO user_addresses
                        (id, user_id, label, name, phone, address, province, city, subdistrict,
                         postal_code, province_id, city_id, subdistrict_id, is_default,
                         created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                    "#,
                )
                .bind(address.id.as_uuid())
                .bind(user_id.as_uuid())
                .bind(&f.label)
                .bind(&f.name)
                .bind(&f.phone)
                .bind(&f.address)
                .bind(&f.province)
                .bind(&f.city)
                .bind(&f.subdistrict)
                .bind(&f.postal_code)
                .bind(f.province_id)
                .bind(f.city_id)
                .bind(f.subdistrict_id)
                .bind(address.is_default)
                .bind(address.created_at)
                .bind(address.updated_at)
                .execute(&mut **tx)
                .await
                .map_err(map_unique_violation)?;
            }
            AddressWrite::Update {
                address_id,
                fields: f,
                updated_at,
            } => {
                let updated = sqlx::query(
                    r#"
                    UPDATE user_addresses SET
                        label = $3, name = $4, phone = $5, address = $6, province = $7,
                        city = $8, subdistrict = $9, postal_code = $10, province_id = $11,
                        city_id = $12, subdistrict_id = $13, updated_at = $14
                    WHERE id = $1 AND user_id = $2
                    "#,
                )
                .bind(address_id.as_uuid())
                .bind(user_id.as_uuid())
                .bind(&f.label)
                .bind(&f.name)
                .bind(&f.phone)
                .bind(&f.address)
                .bind(&f.province)
                .bind(&f.city)
                .bind(&f.subdistrict)
                .bind(&f.postal_code)
                .bind(f.province_id)
                .bind(f.city_id)
                .bind(f.subdistrict_id)
                .bind(*updated_at)
                .execute(&mut **tx)
                .await?
                .rows_affected();

                if updated == 0 {
                    return Err(StoreError::InvalidCommit(format!(
                        "Address {address_id} does not exist"
                    )));
                }
            }
            AddressWrite::SetDefault {
                address_id,
                updated_at,
            } => {
                // The one-default index is checked row by row, so the old
                // default is cleared before the new one is set.
                let target = address_id.map(|id| id.as_uuid());
                sqlx::query(
                    r#"
                    UPDATE user_addresses SET is_default = FALSE, updated_at = $3
                    WHERE user_id = $1 AND is_default AND id IS DISTINCT FROM $2
                    "#,
                )
                .bind(user_id.as_uuid())
                .bind(target)
                .bind(*updated_at)
                .execute(&mut **tx)
                .await?;

                if let Some(target) = target {
                    sqlx::query(
                        r#"
                        UPDATE user_addresses SET is_default = TRUE, updated_at = $3
                        WHERE user_id = $1 AND id = $2 AND NOT is_default
                        "#,
                    )
                    .bind(user_id.as_uuid())
                    .bind(target)
                    .bind(*updated_at)
                    .execute(&mut **tx)
                    .await
                    .map_err(map_unique_violation)?;
                }
            }
            AddressWrite::Delete { address_id } => {
                sqlx::query("DELETE FROM user_addresses WHERE id = $1 AND user_id = $2")
                    .bind(address_id.as_uuid())
                    .bind(user_id.as_uuid())
                    .execute(&mut **tx)
                    .await?;
            }
        }
        Ok(())
    }
}

/// Maps unique index violations to `StoreError::UniqueViolation`.
fn map_unique_violation(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.is_unique_violation()
    {
        return StoreError::UniqueViolation {
            constraint: db_err.constraint().unwrap_or("unknown").to_string(),
        };
    }
    StoreError::Database(e)
}

#[async_trait]
impl CartStore for PostgresStore {
    async fn load_cart(&self, owner: &CartOwner) -> Result<Option<CartRecord>> {
        let mut tx = self.begin_snapshot().await?;

        let query = match owner {
            CartOwner::User(user_id) => {
                sqlx::query(&format!("SELECT {CART_COLUMNS} FROM carts WHERE user_id = $1"))
                    .bind(user_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?
            }
            CartOwner::Guest(session_id) => {
                sqlx::query(&format!(
                    "SELECT {CART_COLUMNS} FROM carts WHERE session_id = $1"
                ))
                .bind(session_id.as_str())
                .fetch_optional(&mut *tx)
                .await?
            }
        };

        let Some(row) = query else {
            tx.commit().await?;
            return Ok(None);
        };

        let cart_id = CartId::from_uuid(row.try_get("id")?);
        let items = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(cart_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Self::row_to_item)
        .collect::<Result<Vec<_>>>()?;
        tx.commit().await?;

        Ok(Some(CartRecord {
            id: cart_id,
            owner: Self::row_to_owner(&row)?,
            version: Version::new(row.try_get("version")?),
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            items,
        }))
    }

    async fn commit_carts(&self, commits: Vec<CartCommit>) -> Result<Vec<Version>> {
        validate_cart_commits(&commits).map_err(|e| StoreError::InvalidCommit(e.message))?;

        let mut tx = self.pool.begin().await?;

        let mut versions = Vec::with_capacity(commits.len());
        for commit in &commits {
            let version = Self::apply_cart_commit(&mut tx, commit)
                .await
                .inspect_err(|e| {
                    tracing::debug!(owner = %commit.owner, error = %e, "cart commit rejected");
                })?;
            versions.push(version);
        }

        tx.commit().await?;

        metrics::counter!("record_store_commits_total", "aggregate" => "cart").increment(1);
        Ok(versions)
    }
}

#[async_trait]
impl AddressStore for PostgresStore {
    async fn load_addresses(&self, user_id: UserId) -> Result<AddressBookRecord> {
        let mut tx = self.begin_snapshot().await?;

        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM address_books WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;

        let Some(version) = version else {
            tx.commit().await?;
            return Ok(AddressBookRecord::empty(user_id));
        };

        let addresses = sqlx::query(&format!(
            "SELECT {ADDRESS_COLUMNS} FROM user_addresses WHERE user_id = $1 ORDER BY created_at ASC, id ASC"
        ))
        .bind(user_id.as_uuid())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Self::row_to_address)
        .collect::<Result<Vec<_>>>()?;
        tx.commit().await?;

        Ok(AddressBookRecord {
            user_id,
            version: Version::new(version),
            addresses,
        })
    }

    async fn commit_addresses(&self, commit: AddressCommit) -> Result<Version> {
        validate_address_commit(&commit).map_err(|e| StoreError::InvalidCommit(e.message))?;

        let user_id = commit.user_id;
        let new_version = commit.next_version();
        let mut tx = self.pool.begin().await?;

        let guarded = if commit.expected_version.is_initial() {
            sqlx::query(
                "INSERT INTO address_books (user_id, version) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user_id.as_uuid())
            .bind(new_version.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                "UPDATE address_books SET version = $3 WHERE user_id = $1 AND version = $2",
            )
            .bind(user_id.as_uuid())
            .bind(commit.expected_version.as_i64())
            .bind(new_version.as_i64())
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };

        if guarded == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM address_books WHERE user_id = $1")
                    .bind(user_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(StoreError::ConcurrencyConflict {
                aggregate: format!("addresses of user {user_id}"),
                expected: commit.expected_version,
                actual: actual.map(Version::new).unwrap_or_default(),
            });
        }

        for write in &commit.writes {
            Self::apply_address_write(&mut tx, user_id, write)
                .await
                .inspect_err(|e| {
                    tracing::debug!(%user_id, write = write.kind(), error = %e, "address write rejected");
                })?;
        }

        tx.commit().await?;

        metrics::counter!("record_store_commits_total", "aggregate" => "address").increment(1);
        Ok(new_version)
    }
}
