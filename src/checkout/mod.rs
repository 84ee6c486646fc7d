//! Checkout pipeline: cart validation, pricing and the committed order.
//!
//! A checkout moves through validation and pricing without touching any
//! ledger; the commit phase then applies every side effect of the
//! transaction (order persistence, stock decrement, discount usage,
//! loyalty balance, cart clearing) as a saga. If any step fails, the
//! completed steps are reversed before the error is surfaced, so a failed
//! checkout never leaves a partial transaction behind.

pub mod identity;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth;
use crate::domain::events::OrderEvent;
use crate::domain::{Address, CartKey, Discount, Order, OrderLine, PaymentMethod, User};
use crate::error::Conflict;
use crate::notify::Notifier;
use crate::pricing::{self, Breakdown};
use crate::store::Store;
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub cart_items: Vec<CartItemInput>,
    pub shipping_address_id: Option<Uuid>,
    #[validate]
    pub shipping_address: Option<AddressInput>,
    pub payment_method: Option<PaymentMethod>,
    pub discount_code: Option<String>,
    #[validate(range(min = 0, message = "points must not be negative"))]
    pub points_to_use: Option<i64>,
    #[validate]
    pub guest_info: Option<GuestInfoInput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    pub label: Option<String>,
    #[validate(length(min = 1, message = "recipient name is required"))]
    pub full_name: String,
    pub phone: Option<String>,
    #[validate(length(min = 1, message = "street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "province is required"))]
    pub province: String,
    pub country: Option<String>,
}

impl AddressInput {
    pub fn to_address(&self, is_default: bool) -> Address {
        Address {
            id: Uuid::now_v7(),
            label: self.label.clone().unwrap_or_else(|| "Home".to_string()),
            full_name: self.full_name.clone(),
            phone: self.phone.clone(),
            street: self.street.clone(),
            city: self.city.clone(),
            province: self.province.clone(),
            country: self.country.clone().unwrap_or_else(|| "Vietnam".to_string()),
            is_default,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GuestInfoInput {
    #[validate(email(message = "a valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "full name is required"))]
    pub full_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub cart_items: Vec<CartItemInput>,
    pub discount_code: Option<String>,
    #[validate(range(min = 0, message = "points must not be negative"))]
    pub points_to_use: Option<i64>,
}

/// Preview of the monetary breakdown, computed by the same pricing code
/// the commit path uses.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    pub subtotal: i64,
    pub discount_amount: i64,
    pub discount_valid: bool,
    pub points_discount: i64,
    pub available_points: i64,
    pub tax_amount: i64,
    pub shipping_fee: i64,
    pub total_amount: i64,
    pub points_earned: i64,
}

#[derive(Debug)]
pub struct CheckoutOutcome {
    pub order: Order,
    /// Present only when the acting identity was not already
    /// authenticated, so a guest can claim the order.
    pub token: Option<String>,
}

/// Runs the full checkout pipeline for one request.
pub async fn place_order(
    store: &dyn Store,
    notifier: &Notifier,
    actor: Option<User>,
    session_id: Option<String>,
    request: CheckoutRequest,
) -> Result<CheckoutOutcome> {
    request
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    let was_authenticated = actor.is_some();
    let resolved = identity::resolve(
        store,
        actor,
        request.guest_info.as_ref(),
        request.shipping_address.as_ref(),
    )
    .await?;
    let user = resolved.user().clone();

    let shipping_address = if let Some(address_id) = request.shipping_address_id {
        user.address(address_id)
            .cloned()
            .ok_or_else(|| Error::Validation("Shipping address not found".into()))?
    } else if let Some(input) = &request.shipping_address {
        input.to_address(true)
    } else {
        return Err(Error::Validation("Shipping address required".into()));
    };

    let lines = validate_lines(store, &request.cart_items).await?;

    let discount = match &request.discount_code {
        Some(code) => {
            let code = code.trim().to_uppercase();
            match store.discount_by_code(&code).await? {
                Some(d) if d.is_valid() => Some(d),
                _ => return Err(Conflict::DiscountInvalid.into()),
            }
        }
        None => None,
    };
    let points_requested = request.points_to_use.unwrap_or(0);
    if points_requested > user.loyalty_points {
        return Err(Conflict::InsufficientPoints.into());
    }
    let breakdown = pricing::price(&lines, discount.as_ref(), points_requested, user.loyalty_points);

    let order = Order::place(
        user.id,
        lines,
        shipping_address,
        request.payment_method.unwrap_or_default(),
        &breakdown,
        discount.as_ref().map(|d| d.code.clone()),
    );

    let mut undo = Undo::new(user.id);
    let committed = commit(
        store,
        &mut undo,
        &order,
        discount.as_ref(),
        &breakdown,
        was_authenticated,
        session_id.as_deref(),
    )
    .await;
    if let Err(err) = committed {
        if let Err(undo_err) = undo.unwind(store).await {
            tracing::error!(
                order_id = %order.id,
                error = %undo_err,
                "checkout rollback failed, ledgers may be inconsistent"
            );
            return Err(
                anyhow::anyhow!("checkout rollback failed after `{err}`: {undo_err}").into(),
            );
        }
        return Err(err);
    }

    notifier
        .publish(&OrderEvent::Created {
            order_id: order.id,
            order_number: order.order_number.clone(),
            user_id: order.user_id,
            total_amount: order.total_amount,
        })
        .await;

    let token = if was_authenticated {
        None
    } else {
        match auth::issue_token(store, user.id).await {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!(error = %e, user_id = %user.id, "failed to issue guest token");
                None
            }
        }
    };

    Ok(CheckoutOutcome { order, token })
}

/// Side-effect-free pricing preview.
pub async fn preview(
    store: &dyn Store,
    actor: Option<&User>,
    request: PreviewRequest,
) -> Result<Preview> {
    request
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;

    // Unknown products or variants price as zero here; the commit path
    // rejects them instead.
    let mut lines = Vec::with_capacity(request.cart_items.len());
    for item in &request.cart_items {
        if item.quantity < 1 {
            return Err(Error::Validation("quantity must be at least 1".into()));
        }
        let Some(product) = store.product(item.product_id).await? else {
            continue;
        };
        let Some(variant) = product.variant(item.variant_id) else {
            continue;
        };
        lines.push(line_snapshot(&product, variant, item.quantity));
    }

    let discount = match &request.discount_code {
        Some(code) => store.discount_by_code(&code.trim().to_uppercase()).await?,
        None => None,
    };
    let discount_valid = discount.as_ref().map(|d| d.is_valid()).unwrap_or(false);
    let available_points = actor.map(|u| u.loyalty_points).unwrap_or(0);
    let breakdown = pricing::price(
        &lines,
        discount.as_ref(),
        request.points_to_use.unwrap_or(0),
        available_points,
    );

    Ok(Preview {
        subtotal: breakdown.subtotal,
        discount_amount: breakdown.discount_amount,
        discount_valid,
        points_discount: breakdown.points_discount,
        available_points,
        tax_amount: breakdown.tax_amount,
        shipping_fee: breakdown.shipping_fee,
        total_amount: breakdown.total_amount,
        points_earned: breakdown.points_earned,
    })
}

/// Validates every line against the live catalog and snapshots it.
async fn validate_lines(store: &dyn Store, items: &[CartItemInput]) -> Result<Vec<OrderLine>> {
    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        if item.quantity < 1 {
            return Err(Error::Validation("quantity must be at least 1".into()));
        }
        let product = store
            .product(item.product_id)
            .await?
            .ok_or(Error::NotFound("product"))?;
        let variant = product
            .variant(item.variant_id)
            .ok_or(Error::NotFound("variant"))?;
        if variant.inventory < item.quantity {
            return Err(Conflict::InsufficientStock {
                product: product.name.clone(),
                variant: variant.name.clone(),
            }
            .into());
        }
        lines.push(line_snapshot(&product, variant, item.quantity));
    }
    Ok(lines)
}

fn line_snapshot(product: &crate::domain::Product, variant: &crate::domain::Variant, quantity: i64) -> OrderLine {
    OrderLine {
        product_id: product.id,
        product_name: product.name.clone(),
        variant_id: variant.id,
        variant_name: variant.name.clone(),
        variant_sku: variant.sku.to_string(),
        quantity,
        price: variant.price,
        subtotal: variant.price * quantity,
    }
}

/// Applies the commit-phase side effects in order, recording each one in
/// `undo` so a later failure can reverse them all.
async fn commit(
    store: &dyn Store,
    undo: &mut Undo,
    order: &Order,
    discount: Option<&Discount>,
    breakdown: &Breakdown,
    was_authenticated: bool,
    session_id: Option<&str>,
) -> Result<()> {
    store.insert_order(order).await?;
    undo.order_id = Some(order.id);

    for line in &order.items {
        if !store.reserve_stock(line.variant_id, line.quantity).await? {
            return Err(Conflict::InsufficientStock {
                product: line.product_name.clone(),
                variant: line.variant_name.clone(),
            }
            .into());
        }
        undo.reserved.push((line.variant_id, line.quantity));
    }

    if let Some(discount) = discount {
        if !store
            .redeem_discount(discount.code.as_str(), order.user_id, order.id)
            .await?
        {
            return Err(Conflict::DiscountInvalid.into());
        }
        undo.redeemed = Some(discount.code.as_str().to_string());
    }

    if breakdown.points_used > 0 || breakdown.points_earned > 0 {
        if !store
            .adjust_points(order.user_id, breakdown.points_used, breakdown.points_earned)
            .await?
        {
            return Err(Conflict::InsufficientPoints.into());
        }
        undo.points = Some((breakdown.points_used, breakdown.points_earned));
    }

    let cart_key = if was_authenticated {
        Some(CartKey::User(order.user_id))
    } else {
        session_id.map(|sid| CartKey::Session(sid.to_string()))
    };
    if let Some(key) = cart_key {
        store.delete_cart(&key).await?;
    }
    Ok(())
}

/// Compensation log for the commit saga, unwound in reverse order.
struct Undo {
    user_id: Uuid,
    order_id: Option<Uuid>,
    reserved: Vec<(Uuid, i64)>,
    redeemed: Option<String>,
    points: Option<(i64, i64)>,
}

impl Undo {
    fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            order_id: None,
            reserved: vec![],
            redeemed: None,
            points: None,
        }
    }

    async fn unwind(&self, store: &dyn Store) -> Result<()> {
        if let Some((debit, credit)) = self.points {
            if !store.adjust_points(self.user_id, credit, debit).await? {
                return Err(anyhow::anyhow!("could not restore loyalty balance").into());
            }
        }
        if let (Some(code), Some(order_id)) = (&self.redeemed, self.order_id) {
            store.unredeem_discount(code, order_id).await?;
        }
        for (variant_id, quantity) in self.reserved.iter().rev() {
            store.release_stock(*variant_id, *quantity).await?;
        }
        if let Some(order_id) = self.order_id {
            store.delete_order(order_id).await?;
        }
        Ok(())
    }
}
