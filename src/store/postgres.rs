//! Postgres store backend.
//!
//! The ledger mutations are single conditional `UPDATE` statements, so
//! each counter change is atomic per key without application-side
//! locking. Multi-row writes (order persistence, discount redemption)
//! run inside a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::value_objects::{DiscountCode, Sku};
use crate::domain::{
    Address, Cart, CartItem, CartKey, Discount, DiscountUsage, DiscountValueType, Order, OrderLine,
    OrderStatus, PaymentMethod, Product, Role, StatusEntry, User, Variant,
};
use crate::error::Conflict;
use crate::store::{CartStore, CatalogStore, DiscountStore, OrderStore, SessionStore, UserStore};
use crate::{Error, Result};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    slug: String,
    brand: String,
    category: String,
    base_price: i64,
    sold_count: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    sku: String,
    name: String,
    price: i64,
    inventory: i64,
}

impl ProductRow {
    fn into_product(self, variants: Vec<VariantRow>) -> Result<Product> {
        let variants = variants
            .into_iter()
            .map(|v| {
                Ok(Variant {
                    id: v.id,
                    sku: Sku::new(v.sku).map_err(|e| anyhow::anyhow!(e))?,
                    name: v.name,
                    price: v.price,
                    inventory: v.inventory,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Product {
            id: self.id,
            name: self.name,
            slug: self.slug,
            brand: self.brand,
            category: self.category,
            base_price: self.base_price,
            sold_count: self.sold_count,
            is_active: self.is_active,
            variants,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct DiscountRow {
    id: Uuid,
    code: String,
    value_type: String,
    value: i64,
    usage_limit: i64,
    used_count: i64,
    is_active: bool,
    created_by: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<DiscountRow> for Discount {
    type Error = Error;
    fn try_from(row: DiscountRow) -> Result<Self> {
        Ok(Discount {
            id: row.id,
            code: DiscountCode::new(row.code).map_err(|e| anyhow::anyhow!(e))?,
            value_type: row
                .value_type
                .parse::<DiscountValueType>()
                .map_err(|e| anyhow::anyhow!(e))?,
            value: row.value,
            usage_limit: row.usage_limit,
            used_count: row.used_count,
            is_active: row.is_active,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    full_name: String,
    password_hash: Option<String>,
    role: String,
    loyalty_points: i64,
    is_guest_account: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct AddressRow {
    id: Uuid,
    label: String,
    full_name: String,
    phone: Option<String>,
    street: String,
    city: String,
    province: String,
    country: String,
    is_default: bool,
}

impl UserRow {
    fn into_user(self, addresses: Vec<AddressRow>) -> Result<User> {
        let role = match self.role.as_str() {
            "customer" => Role::Customer,
            "admin" => Role::Admin,
            other => return Err(anyhow::anyhow!("unknown role: {other}").into()),
        };
        Ok(User {
            id: self.id,
            email: self.email,
            full_name: self.full_name,
            password_hash: self.password_hash,
            role,
            addresses: addresses
                .into_iter()
                .map(|a| Address {
                    id: a.id,
                    label: a.label,
                    full_name: a.full_name,
                    phone: a.phone,
                    street: a.street,
                    city: a.city,
                    province: a.province,
                    country: a.country,
                    is_default: a.is_default,
                })
                .collect(),
            loyalty_points: self.loyalty_points,
            is_guest_account: self.is_guest_account,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Option<Uuid>,
    session_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct CartItemRow {
    product_id: Uuid,
    variant_id: Uuid,
    quantity: i64,
    price: i64,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    shipping_address: serde_json::Value,
    payment_method: String,
    subtotal: i64,
    discount_code: Option<String>,
    discount_amount: i64,
    points_used: i64,
    points_discount: i64,
    tax_amount: i64,
    shipping_fee: i64,
    total_amount: i64,
    points_earned: i64,
    current_status: String,
    is_paid: bool,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Clone, sqlx::FromRow)]
struct OrderItemRow {
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    variant_id: Uuid,
    variant_name: String,
    variant_sku: String,
    quantity: i64,
    price: i64,
    subtotal: i64,
}

#[derive(Clone, sqlx::FromRow)]
struct StatusRow {
    order_id: Uuid,
    status: String,
    time: DateTime<Utc>,
    note: Option<String>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItemRow>, history: Vec<StatusRow>) -> Result<Order> {
        Ok(Order {
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            items: items
                .into_iter()
                .map(|i| OrderLine {
                    product_id: i.product_id,
                    product_name: i.product_name,
                    variant_id: i.variant_id,
                    variant_name: i.variant_name,
                    variant_sku: i.variant_sku,
                    quantity: i.quantity,
                    price: i.price,
                    subtotal: i.subtotal,
                })
                .collect(),
            shipping_address: serde_json::from_value(self.shipping_address)
                .map_err(|e| anyhow::anyhow!(e))?,
            payment_method: self
                .payment_method
                .parse::<PaymentMethod>()
                .map_err(|e| anyhow::anyhow!(e))?,
            subtotal: self.subtotal,
            discount_code: self
                .discount_code
                .map(|c| DiscountCode::new(c).map_err(|e| anyhow::anyhow!(e)))
                .transpose()?,
            discount_amount: self.discount_amount,
            points_used: self.points_used,
            points_discount: self.points_discount,
            tax_amount: self.tax_amount,
            shipping_fee: self.shipping_fee,
            total_amount: self.total_amount,
            points_earned: self.points_earned,
            current_status: self
                .current_status
                .parse::<OrderStatus>()
                .map_err(|e| anyhow::anyhow!(e))?,
            status_history: history
                .into_iter()
                .map(|h| {
                    Ok(StatusEntry {
                        status: h.status.parse().map_err(|e| anyhow::anyhow!("{e}"))?,
                        time: h.time,
                        note: h.note,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            is_paid: self.is_paid,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::Customer => "customer",
        Role::Admin => "admin",
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO products (id, name, slug, brand, category, base_price, sold_count, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.brand)
        .bind(&product.category)
        .bind(product.base_price)
        .bind(product.sold_count)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;
        for variant in &product.variants {
            sqlx::query(
                "INSERT INTO variants (id, product_id, sku, name, price, inventory) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(variant.id)
            .bind(product.id)
            .bind(variant.sku.as_str())
            .bind(&variant.name)
            .bind(variant.price)
            .bind(variant.inventory)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        let Some(row) =
            sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
        else {
            return Ok(None);
        };
        let variants = sqlx::query_as::<_, VariantRow>(
            "SELECT id, sku, name, price, inventory FROM variants WHERE product_id = $1 ORDER BY sku",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        row.into_product(variants).map(Some)
    }

    async fn reserve_stock(&self, variant_id: Uuid, quantity: i64) -> Result<bool> {
        let result = sqlx::query(
            "WITH reserved AS ( \
                 UPDATE variants SET inventory = inventory - $2 \
                 WHERE id = $1 AND inventory >= $2 RETURNING product_id \
             ) \
             UPDATE products SET sold_count = sold_count + $2, updated_at = NOW() \
             WHERE id IN (SELECT product_id FROM reserved)",
        )
        .bind(variant_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_stock(&self, variant_id: Uuid, quantity: i64) -> Result<()> {
        sqlx::query(
            "WITH released AS ( \
                 UPDATE variants SET inventory = inventory + $2 \
                 WHERE id = $1 RETURNING product_id \
             ) \
             UPDATE products SET sold_count = sold_count - $2, updated_at = NOW() \
             WHERE id IN (SELECT product_id FROM released)",
        )
        .bind(variant_id)
        .bind(quantity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl DiscountStore for PgStore {
    async fn insert_discount(&self, discount: &Discount) -> Result<()> {
        let result = sqlx::query(
            "INSERT INTO discounts (id, code, value_type, value, usage_limit, used_count, is_active, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(discount.id)
        .bind(discount.code.as_str())
        .bind(discount.value_type.as_str())
        .bind(discount.value)
        .bind(discount.usage_limit)
        .bind(discount.used_count)
        .bind(discount.is_active)
        .bind(discount.created_by)
        .bind(discount.created_at)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(Conflict::DuplicateCode.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>> {
        sqlx::query_as::<_, DiscountRow>("SELECT * FROM discounts WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?
            .map(Discount::try_from)
            .transpose()
    }

    async fn list_discounts(&self, limit: i64, offset: i64) -> Result<(Vec<Discount>, i64)> {
        let rows = sqlx::query_as::<_, DiscountRow>(
            "SELECT * FROM discounts ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM discounts")
            .fetch_one(&self.pool)
            .await?;
        let discounts = rows
            .into_iter()
            .map(Discount::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((discounts, total.0))
    }

    async fn redeem_discount(&self, code: &str, user_id: Uuid, order_id: Uuid) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let redeemed: Option<(Uuid,)> = sqlx::query_as(
            "UPDATE discounts SET used_count = used_count + 1 \
             WHERE code = $1 AND is_active AND used_count < usage_limit RETURNING id",
        )
        .bind(code)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((discount_id,)) = redeemed else {
            return Ok(false);
        };
        sqlx::query(
            "INSERT INTO discount_usages (id, discount_id, user_id, order_id, used_at) \
             VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(Uuid::now_v7())
        .bind(discount_id)
        .bind(user_id)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn unredeem_discount(&self, code: &str, order_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query(
            "DELETE FROM discount_usages WHERE order_id = $2 \
             AND discount_id = (SELECT id FROM discounts WHERE code = $1)",
        )
        .bind(code)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        if deleted.rows_affected() > 0 {
            sqlx::query(
                "UPDATE discounts SET used_count = GREATEST(used_count - $2, 0) WHERE code = $1",
            )
            .bind(code)
            .bind(deleted.rows_affected() as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn discount_usage(&self, code: &str) -> Result<Vec<DiscountUsage>> {
        let rows = sqlx::query_as::<_, DiscountUsage>(
            "SELECT u.id, u.discount_id, u.user_id, u.order_id, u.used_at \
             FROM discount_usages u JOIN discounts d ON d.id = u.discount_id \
             WHERE d.code = $1 ORDER BY u.used_at",
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "INSERT INTO users (id, email, full_name, password_hash, role, loyalty_points, is_guest_account, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.password_hash)
        .bind(role_str(user.role))
        .bind(user.loyalty_points)
        .bind(user.is_guest_account)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await;
        if let Err(e) = result {
            return match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    Err(Conflict::DuplicateEmail.into())
                }
                e => Err(e.into()),
            };
        }
        for address in &user.addresses {
            sqlx::query(
                "INSERT INTO addresses (id, user_id, label, full_name, phone, street, city, province, country, is_default) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(address.id)
            .bind(user.id)
            .bind(&address.label)
            .bind(&address.full_name)
            .bind(&address.phone)
            .bind(&address.street)
            .bind(&address.city)
            .bind(&address.province)
            .bind(&address.country)
            .bind(address.is_default)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        let Some(row) = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let addresses = self.addresses_for(id).await?;
        row.into_user(addresses).map(Some)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let Some(row) = sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let addresses = self.addresses_for(row.id).await?;
        row.into_user(addresses).map(Some)
    }

    async fn adjust_points(&self, user_id: Uuid, debit: i64, credit: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE users SET loyalty_points = loyalty_points - $2 + $3, updated_at = NOW() \
             WHERE id = $1 AND loyalty_points >= $2",
        )
        .bind(user_id)
        .bind(debit)
        .bind(credit)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

impl PgStore {
    async fn addresses_for(&self, user_id: Uuid) -> Result<Vec<AddressRow>> {
        Ok(sqlx::query_as::<_, AddressRow>(
            "SELECT id, label, full_name, phone, street, city, province, country, is_default \
             FROM addresses WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn cart_row(&self, key: &CartKey) -> Result<Option<CartRow>> {
        let row = match key {
            CartKey::User(id) => {
                sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE user_id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
            }
            CartKey::Session(sid) => {
                sqlx::query_as::<_, CartRow>("SELECT * FROM carts WHERE session_id = $1")
                    .bind(sid)
                    .fetch_optional(&self.pool)
                    .await?
            }
        };
        Ok(row)
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart(&self, key: &CartKey) -> Result<Option<Cart>> {
        let Some(row) = self.cart_row(key).await? else {
            return Ok(None);
        };
        let items = sqlx::query_as::<_, CartItemRow>(
            "SELECT product_id, variant_id, quantity, price FROM cart_items WHERE cart_id = $1",
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await?;
        let items: Vec<CartItem> = items
            .into_iter()
            .map(|i| CartItem {
                product_id: i.product_id,
                variant_id: i.variant_id,
                quantity: i.quantity,
                price: i.price,
            })
            .collect();
        let total_amount = items.iter().map(|i| i.price * i.quantity).sum();
        Ok(Some(Cart {
            id: row.id,
            user_id: row.user_id,
            session_id: row.session_id,
            items,
            total_amount,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO carts (id, user_id, session_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE SET user_id = $2, session_id = $3, updated_at = $5",
        )
        .bind(cart.id)
        .bind(cart.user_id)
        .bind(&cart.session_id)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id)
            .execute(&mut *tx)
            .await?;
        for item in &cart.items {
            sqlx::query(
                "INSERT INTO cart_items (id, cart_id, product_id, variant_id, quantity, price) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(Uuid::now_v7())
            .bind(cart.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_cart(&self, key: &CartKey) -> Result<()> {
        match key {
            CartKey::User(id) => {
                sqlx::query("DELETE FROM carts WHERE user_id = $1")
                    .bind(id)
                    .execute(&self.pool)
                    .await?
            }
            CartKey::Session(sid) => {
                sqlx::query("DELETE FROM carts WHERE session_id = $1")
                    .bind(sid)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, shipping_address, payment_method, subtotal, \
             discount_code, discount_amount, points_used, points_discount, tax_amount, shipping_fee, \
             total_amount, points_earned, current_status, is_paid, paid_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(serde_json::to_value(&order.shipping_address).map_err(|e| anyhow::anyhow!(e))?)
        .bind(order.payment_method.as_str())
        .bind(order.subtotal)
        .bind(order.discount_code.as_ref().map(|c| c.as_str()))
        .bind(order.discount_amount)
        .bind(order.points_used)
        .bind(order.points_discount)
        .bind(order.tax_amount)
        .bind(order.shipping_fee)
        .bind(order.total_amount)
        .bind(order.points_earned)
        .bind(order.current_status.as_str())
        .bind(order.is_paid)
        .bind(order.paid_at)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;
        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, product_name, variant_id, \
                 variant_name, variant_sku, quantity, price, subtotal) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(Uuid::now_v7())
            .bind(order.id)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.variant_id)
            .bind(&item.variant_name)
            .bind(&item.variant_sku)
            .bind(item.quantity)
            .bind(item.price)
            .bind(item.subtotal)
            .execute(&mut *tx)
            .await?;
        }
        for entry in &order.status_history {
            sqlx::query(
                "INSERT INTO order_status_history (id, order_id, status, time, note) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::now_v7())
            .bind(order.id)
            .bind(entry.status.as_str())
            .bind(entry.time)
            .bind(&entry.note)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        let Some(row) = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT order_id, product_id, product_name, variant_id, variant_name, variant_sku, \
             quantity, price, subtotal FROM order_items WHERE order_id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        let history = sqlx::query_as::<_, StatusRow>(
            "SELECT order_id, status, time, note FROM order_status_history \
             WHERE order_id = $1 ORDER BY time",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        row.into_order(items, history).map(Some)
    }

    async fn orders_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64)> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT order_id, product_id, product_name, variant_id, variant_name, variant_sku, \
             quantity, price, subtotal FROM order_items WHERE order_id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let history = sqlx::query_as::<_, StatusRow>(
            "SELECT order_id, status, time, note FROM order_status_history \
             WHERE order_id = ANY($1) ORDER BY time",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order_id = row.id;
            let own_items = items
                .iter()
                .filter(|i| i.order_id == order_id)
                .cloned()
                .collect();
            let own_history = history
                .iter()
                .filter(|h| h.order_id == order_id)
                .cloned()
                .collect();
            orders.push(row.into_order(own_items, own_history)?);
        }
        Ok((orders, total.0))
    }

    async fn record_status(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE orders SET current_status = $2, is_paid = $3, paid_at = $4, updated_at = $5 \
             WHERE id = $1",
        )
        .bind(order.id)
        .bind(order.current_status.as_str())
        .bind(order.is_paid)
        .bind(order.paid_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;
        if let Some(entry) = order.status_history.last() {
            sqlx::query(
                "INSERT INTO order_status_history (id, order_id, status, time, note) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::now_v7())
            .bind(order.id)
            .bind(entry.status.as_str())
            .bind(entry.time)
            .bind(&entry.note)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_token(&self, token_hash: &str, user_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_tokens (token_hash, user_id, created_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (token_hash) DO NOTHING",
        )
        .bind(token_hash)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn user_for_token(&self, token_hash: &str) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM auth_tokens WHERE token_hash = $1")
                .bind(token_hash)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }
}
