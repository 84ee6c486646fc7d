//! Cart Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cart is owned by exactly one identity at a time: a registered user or
/// an anonymous session. Merge-on-login transfers ownership, never shares.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CartKey {
    User(Uuid),
    Session(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i64,
    /// Unit price captured when the item was added; checkout re-validates
    /// against the live catalog instead of trusting this.
    pub price: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub session_id: Option<String>,
    pub items: Vec<CartItem>,
    pub total_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(key: &CartKey) -> Self {
        let now = Utc::now();
        let (user_id, session_id) = match key {
            CartKey::User(id) => (Some(*id), None),
            CartKey::Session(sid) => (None, Some(sid.clone())),
        };
        Self {
            id: Uuid::now_v7(),
            user_id,
            session_id,
            items: vec![],
            total_amount: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> Option<CartKey> {
        match (self.user_id, &self.session_id) {
            (Some(id), None) => Some(CartKey::User(id)),
            (None, Some(sid)) => Some(CartKey::Session(sid.clone())),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sets the quantity for a (product, variant) pair. Quantity zero
    /// removes the line; a fresh price snapshot is taken either way.
    pub fn set_item(&mut self, product_id: Uuid, variant_id: Uuid, quantity: i64, price: i64) {
        let existing = self
            .items
            .iter()
            .position(|i| i.product_id == product_id && i.variant_id == variant_id);
        match existing {
            Some(idx) if quantity == 0 => {
                self.items.remove(idx);
            }
            Some(idx) => {
                self.items[idx].quantity = quantity;
                self.items[idx].price = price;
            }
            None if quantity > 0 => self.items.push(CartItem {
                product_id,
                variant_id,
                quantity,
                price,
            }),
            None => {}
        }
        self.recalculate();
    }

    /// Folds another cart's items into this one, summing quantities for
    /// lines both carts contain.
    pub fn merge_from(&mut self, other: &Cart) {
        for item in &other.items {
            match self
                .items
                .iter_mut()
                .find(|i| i.product_id == item.product_id && i.variant_id == item.variant_id)
            {
                Some(existing) => existing.quantity += item.quantity,
                None => self.items.push(item.clone()),
            }
        }
        self.recalculate();
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.recalculate();
    }

    fn recalculate(&mut self) {
        self.total_amount = self.items.iter().map(|i| i.price * i.quantity).sum();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_item_replaces_quantity() {
        let mut cart = Cart::new(&CartKey::Session("s1".into()));
        let (p, v) = (Uuid::now_v7(), Uuid::now_v7());
        cart.set_item(p, v, 2, 10_000);
        cart.set_item(p, v, 3, 10_000);
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.total_amount, 30_000);
    }

    #[test]
    fn test_zero_quantity_removes() {
        let mut cart = Cart::new(&CartKey::Session("s1".into()));
        let (p, v) = (Uuid::now_v7(), Uuid::now_v7());
        cart.set_item(p, v, 2, 10_000);
        cart.set_item(p, v, 0, 10_000);
        assert!(cart.is_empty());
        assert_eq!(cart.total_amount, 0);
    }

    #[test]
    fn test_merge_sums_quantities() {
        let user = Uuid::now_v7();
        let (p, v) = (Uuid::now_v7(), Uuid::now_v7());
        let mut mine = Cart::new(&CartKey::User(user));
        mine.set_item(p, v, 1, 5_000);
        let mut guest = Cart::new(&CartKey::Session("s1".into()));
        guest.set_item(p, v, 2, 5_000);
        guest.set_item(Uuid::now_v7(), Uuid::now_v7(), 1, 7_000);
        mine.merge_from(&guest);
        assert_eq!(mine.items.len(), 2);
        assert_eq!(mine.items[0].quantity, 3);
        assert_eq!(mine.total_amount, 22_000);
    }

    #[test]
    fn test_key_is_exclusive() {
        let cart = Cart::new(&CartKey::User(Uuid::now_v7()));
        assert!(matches!(cart.key(), Some(CartKey::User(_))));
        assert!(cart.session_id.is_none());
    }
}
