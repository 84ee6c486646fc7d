//! Persistence seam.
//!
//! Each ledger is owned by exactly one trait; the mutating operations on
//! shared counters (inventory, discount usage, loyalty balance) are
//! conditional read-modify-writes that the backend must apply atomically
//! per key. Two backends exist: [`postgres::PgStore`] for the service and
//! [`memory::MemoryStore`] for tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Cart, CartKey, Discount, DiscountUsage, Order, Product, User};
use crate::Result;

/// Product catalog reads plus the inventory ledger.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>>;

    /// Decrements a variant's inventory and bumps the parent product's
    /// sold count, only if current stock covers the request. Returns
    /// `false` when it does not; never leaves stock negative.
    async fn reserve_stock(&self, variant_id: Uuid, quantity: i64) -> Result<bool>;

    /// Compensating action for [`reserve_stock`](Self::reserve_stock).
    async fn release_stock(&self, variant_id: Uuid, quantity: i64) -> Result<()>;
}

/// Discount code state and its usage ledger.
#[async_trait]
pub trait DiscountStore: Send + Sync {
    async fn insert_discount(&self, discount: &Discount) -> Result<()>;
    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>>;
    async fn list_discounts(&self, limit: i64, offset: i64) -> Result<(Vec<Discount>, i64)>;

    /// Increments the usage counter and appends to the usage history as
    /// one atomic unit, only while `used_count < usage_limit`. Returns
    /// `false` for unknown, inactive or exhausted codes.
    async fn redeem_discount(&self, code: &str, user_id: Uuid, order_id: Uuid) -> Result<bool>;

    /// Compensating action for [`redeem_discount`](Self::redeem_discount).
    async fn unredeem_discount(&self, code: &str, order_id: Uuid) -> Result<()>;

    async fn discount_usage(&self, code: &str) -> Result<Vec<DiscountUsage>>;
}

/// Account reads plus the loyalty point ledger.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn user(&self, id: Uuid) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Applies `-debit +credit` to the loyalty balance in one write,
    /// only if the balance covers the debit. Returns `false` otherwise.
    async fn adjust_points(&self, user_id: Uuid, debit: i64, credit: i64) -> Result<bool>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart(&self, key: &CartKey) -> Result<Option<Cart>>;
    /// Upserts the cart and replaces its items wholesale.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
    async fn delete_cart(&self, key: &CartKey) -> Result<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert_order(&self, order: &Order) -> Result<()>;
    /// Compensating action for [`insert_order`](Self::insert_order).
    async fn delete_order(&self, id: Uuid) -> Result<()>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>>;
    async fn orders_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64)>;
    /// Persists the current status, payment flags and the latest status
    /// history entry of an already-stored order.
    async fn record_status(&self, order: &Order) -> Result<()>;
}

/// Opaque bearer tokens, stored hashed.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_token(&self, token_hash: &str, user_id: Uuid) -> Result<()>;
    async fn user_for_token(&self, token_hash: &str) -> Result<Option<Uuid>>;
}

/// Everything the service needs from persistence.
pub trait Store:
    CatalogStore + DiscountStore + UserStore + CartStore + OrderStore + SessionStore
{
}

impl<T> Store for T where
    T: CatalogStore + DiscountStore + UserStore + CartStore + OrderStore + SessionStore
{
}
