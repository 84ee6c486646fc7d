//! In-memory store backend.
//!
//! Useful for tests and development without a database. Every trait
//! method takes the single write lock for its whole critical section, so
//! each operation is atomic with respect to the others.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{Cart, CartKey, Discount, DiscountUsage, Order, Product, User};
use crate::error::Conflict;
use crate::store::{CartStore, CatalogStore, DiscountStore, OrderStore, SessionStore, UserStore};
use crate::Result;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    discounts: HashMap<String, Discount>,
    usages: Vec<DiscountUsage>,
    users: HashMap<Uuid, User>,
    carts: HashMap<Uuid, Cart>,
    orders: HashMap<Uuid, Order>,
    tokens: HashMap<String, Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cart_matches(cart: &Cart, key: &CartKey) -> bool {
    cart.key().as_ref() == Some(key)
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        self.inner
            .write()
            .products
            .insert(product.id, product.clone());
        Ok(())
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.inner.read().products.get(&id).cloned())
    }

    async fn reserve_stock(&self, variant_id: Uuid, quantity: i64) -> Result<bool> {
        let mut inner = self.inner.write();
        for product in inner.products.values_mut() {
            if let Some(variant) = product.variants.iter_mut().find(|v| v.id == variant_id) {
                if variant.inventory < quantity {
                    return Ok(false);
                }
                variant.inventory -= quantity;
                product.sold_count += quantity;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn release_stock(&self, variant_id: Uuid, quantity: i64) -> Result<()> {
        let mut inner = self.inner.write();
        for product in inner.products.values_mut() {
            if let Some(variant) = product.variants.iter_mut().find(|v| v.id == variant_id) {
                variant.inventory += quantity;
                product.sold_count -= quantity;
                return Ok(());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DiscountStore for MemoryStore {
    async fn insert_discount(&self, discount: &Discount) -> Result<()> {
        let mut inner = self.inner.write();
        let code = discount.code.as_str().to_string();
        if inner.discounts.contains_key(&code) {
            return Err(Conflict::DuplicateCode.into());
        }
        inner.discounts.insert(code, discount.clone());
        Ok(())
    }

    async fn discount_by_code(&self, code: &str) -> Result<Option<Discount>> {
        Ok(self.inner.read().discounts.get(code).cloned())
    }

    async fn list_discounts(&self, limit: i64, offset: i64) -> Result<(Vec<Discount>, i64)> {
        let inner = self.inner.read();
        let mut all: Vec<Discount> = inner.discounts.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn redeem_discount(&self, code: &str, user_id: Uuid, order_id: Uuid) -> Result<bool> {
        let mut inner = self.inner.write();
        let Some(discount) = inner.discounts.get_mut(code) else {
            return Ok(false);
        };
        if !discount.is_valid() {
            return Ok(false);
        }
        discount.used_count += 1;
        let discount_id = discount.id;
        inner.usages.push(DiscountUsage {
            id: Uuid::now_v7(),
            discount_id,
            user_id,
            order_id,
            used_at: Utc::now(),
        });
        Ok(true)
    }

    async fn unredeem_discount(&self, code: &str, order_id: Uuid) -> Result<()> {
        let mut inner = self.inner.write();
        let Some(discount) = inner.discounts.get_mut(code) else {
            return Ok(());
        };
        let discount_id = discount.id;
        let before = inner.usages.len();
        inner
            .usages
            .retain(|u| !(u.discount_id == discount_id && u.order_id == order_id));
        let removed = (before - inner.usages.len()) as i64;
        if removed > 0 {
            if let Some(discount) = inner.discounts.get_mut(code) {
                discount.used_count = (discount.used_count - removed).max(0);
            }
        }
        Ok(())
    }

    async fn discount_usage(&self, code: &str) -> Result<Vec<DiscountUsage>> {
        let inner = self.inner.read();
        let Some(discount) = inner.discounts.get(code) else {
            return Ok(vec![]);
        };
        Ok(inner
            .usages
            .iter()
            .filter(|u| u.discount_id == discount.id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(Conflict::DuplicateEmail.into());
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.inner.read().users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .inner
            .read()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn adjust_points(&self, user_id: Uuid, debit: i64, credit: i64) -> Result<bool> {
        let mut inner = self.inner.write();
        let Some(user) = inner.users.get_mut(&user_id) else {
            return Ok(false);
        };
        if user.loyalty_points < debit {
            return Ok(false);
        }
        user.loyalty_points = user.loyalty_points - debit + credit;
        user.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart(&self, key: &CartKey) -> Result<Option<Cart>> {
        Ok(self
            .inner
            .read()
            .carts
            .values()
            .find(|c| cart_matches(c, key))
            .cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.inner.write().carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, key: &CartKey) -> Result<()> {
        self.inner.write().carts.retain(|_, c| !cart_matches(c, key));
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        self.inner.write().orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn delete_order(&self, id: Uuid) -> Result<()> {
        self.inner.write().orders.remove(&id);
        Ok(())
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.inner.read().orders.get(&id).cloned())
    }

    async fn orders_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Order>, i64)> {
        let inner = self.inner.read();
        let mut all: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn record_status(&self, order: &Order) -> Result<()> {
        self.inner.write().orders.insert(order.id, order.clone());
        Ok(())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_token(&self, token_hash: &str, user_id: Uuid) -> Result<()> {
        self.inner
            .write()
            .tokens
            .insert(token_hash.to_string(), user_id);
        Ok(())
    }

    async fn user_for_token(&self, token_hash: &str) -> Result<Option<Uuid>> {
        Ok(self.inner.read().tokens.get(token_hash).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{DiscountCode, Sku};
    use crate::domain::{DiscountValueType, Variant};

    async fn seed_product(store: &MemoryStore, inventory: i64) -> (Uuid, Uuid) {
        let product = Product::create(
            "Widget",
            "Acme",
            "widgets",
            1_000,
            vec![
                Variant {
                    id: Uuid::now_v7(),
                    sku: Sku::new("W-1").unwrap(),
                    name: "Small".into(),
                    price: 1_000,
                    inventory,
                },
                Variant {
                    id: Uuid::now_v7(),
                    sku: Sku::new("W-2").unwrap(),
                    name: "Large".into(),
                    price: 2_000,
                    inventory,
                },
            ],
        )
        .unwrap();
        let ids = (product.id, product.variants[0].id);
        store.insert_product(&product).await.unwrap();
        ids
    }

    #[tokio::test]
    async fn test_reserve_respects_stock() {
        let store = MemoryStore::new();
        let (product_id, variant_id) = seed_product(&store, 3).await;
        assert!(store.reserve_stock(variant_id, 2).await.unwrap());
        assert!(!store.reserve_stock(variant_id, 2).await.unwrap());
        let product = store.product(product_id).await.unwrap().unwrap();
        assert_eq!(product.variants[0].inventory, 1);
        assert_eq!(product.sold_count, 2);
    }

    #[tokio::test]
    async fn test_redeem_stops_at_limit() {
        let store = MemoryStore::new();
        let discount = Discount::create(
            DiscountCode::new("AB123").unwrap(),
            DiscountValueType::Fixed,
            1_000,
            1,
            None,
        )
        .unwrap();
        store.insert_discount(&discount).await.unwrap();
        let (user, order) = (Uuid::now_v7(), Uuid::now_v7());
        assert!(store.redeem_discount("AB123", user, order).await.unwrap());
        assert!(!store.redeem_discount("AB123", user, order).await.unwrap());
        store.unredeem_discount("AB123", order).await.unwrap();
        let d = store.discount_by_code("AB123").await.unwrap().unwrap();
        assert_eq!(d.used_count, 0);
        assert!(store.discount_usage("AB123").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_points_is_one_write() {
        let store = MemoryStore::new();
        let mut user = User::new("p@example.com", "P");
        user.loyalty_points = 100;
        store.insert_user(&user).await.unwrap();
        assert!(store.adjust_points(user.id, 100, 40).await.unwrap());
        assert!(!store.adjust_points(user.id, 50, 0).await.unwrap());
        let u = store.user(user.id).await.unwrap().unwrap();
        assert_eq!(u.loyalty_points, 40);
    }
}
