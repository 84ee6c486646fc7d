//! HTTP surface: router and handlers.
//!
//! Responses use the `{"success": ..., ...}` envelope the storefront
//! clients already speak.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{AdminIdentity, Identity, OptionalIdentity};
use crate::checkout::{self, CheckoutRequest, PreviewRequest};
use crate::domain::events::OrderEvent;
use crate::domain::value_objects::{DiscountCode, Sku};
use crate::domain::{
    Cart, CartKey, Discount, DiscountValueType, OrderStatus, Product, User, Variant,
};
use crate::error::Conflict;
use crate::notify::Notifier;
use crate::store::Store;
use crate::{Error, Result};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub notifier: Notifier,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/checkout", post(place_order))
        .route("/api/v1/checkout/preview", post(preview_order))
        .route(
            "/api/v1/discounts",
            post(create_discount).get(list_discounts),
        )
        .route("/api/v1/discounts/:code/validate", get(validate_discount))
        .route("/api/v1/discounts/:code/usage", get(discount_usage))
        .route(
            "/api/v1/cart",
            get(get_cart).post(update_cart).delete(clear_cart),
        )
        .route("/api/v1/cart/merge", post(merge_cart))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/products", post(create_product))
        .route("/api/v1/products/:id", get(get_product))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "healthy", "service": "meridian-commerce"}))
}

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-session-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn cart_key(actor: Option<&User>, headers: &HeaderMap) -> Option<CartKey> {
    actor
        .map(|u| CartKey::User(u.id))
        .or_else(|| session_id(headers).map(CartKey::Session))
}

fn invalid(errors: validator::ValidationErrors) -> Error {
    Error::Validation(errors.to_string())
}

// -- checkout ---------------------------------------------------------------

async fn place_order(
    State(state): State<AppState>,
    OptionalIdentity(actor): OptionalIdentity,
    headers: HeaderMap,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let outcome = checkout::place_order(
        state.store.as_ref(),
        &state.notifier,
        actor,
        session_id(&headers),
        request,
    )
    .await?;
    let mut body = json!({
        "success": true,
        "order": outcome.order,
        "message": "Order created successfully",
    });
    // Token only appears when the acting identity was not authenticated.
    if let Some(token) = outcome.token {
        body["token"] = json!(token);
    }
    Ok((StatusCode::CREATED, Json(body)))
}

async fn preview_order(
    State(state): State<AppState>,
    OptionalIdentity(actor): OptionalIdentity,
    Json(request): Json<PreviewRequest>,
) -> Result<Json<serde_json::Value>> {
    let preview = checkout::preview(state.store.as_ref(), actor.as_ref(), request).await?;
    Ok(Json(json!({"success": true, "preview": preview})))
}

// -- discounts --------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateDiscountRequest {
    code: String,
    value_type: DiscountValueType,
    #[validate(range(min = 0, message = "value must not be negative"))]
    value: i64,
    #[validate(range(min = 1, max = 10, message = "Usage limit cannot exceed 10"))]
    usage_limit: i64,
}

async fn create_discount(
    State(state): State<AppState>,
    AdminIdentity(admin): AdminIdentity,
    Json(request): Json<CreateDiscountRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    request.validate().map_err(invalid)?;
    let code = DiscountCode::new(&request.code).map_err(|e| Error::Validation(e.to_string()))?;
    let discount = Discount::create(
        code,
        request.value_type,
        request.value,
        request.usage_limit,
        Some(admin.id),
    )
    .map_err(|e| Error::Validation(e.to_string()))?;
    state.store.insert_discount(&discount).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "discount": discount})),
    ))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    page: Option<u32>,
    limit: Option<u32>,
}

impl ListParams {
    fn window(&self) -> (u32, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = i64::from(self.limit.unwrap_or(20).clamp(1, 100));
        (page, limit, i64::from(page - 1) * limit)
    }
}

async fn list_discounts(
    State(state): State<AppState>,
    AdminIdentity(_admin): AdminIdentity,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>> {
    let (page, limit, offset) = params.window();
    let (discounts, total) = state.store.list_discounts(limit, offset).await?;
    Ok(Json(json!({
        "success": true,
        "discounts": discounts,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": (total + limit - 1) / limit,
        },
    })))
}

#[derive(Debug, Deserialize)]
struct ValidateParams {
    subtotal: Option<i64>,
}

async fn validate_discount(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<ValidateParams>,
) -> Result<Json<serde_json::Value>> {
    let code = code.trim().to_uppercase();
    let Some(discount) = state.store.discount_by_code(&code).await? else {
        return Ok(Json(json!({
            "success": true,
            "valid": false,
            "message": "Discount code not found",
        })));
    };
    if !discount.is_valid() {
        return Ok(Json(json!({
            "success": true,
            "valid": false,
            "message": "Discount code is no longer valid",
            "usedCount": discount.used_count,
            "usageLimit": discount.usage_limit,
        })));
    }
    let subtotal = params.subtotal.unwrap_or(0);
    Ok(Json(json!({
        "success": true,
        "valid": true,
        "discount": {
            "code": discount.code.as_str(),
            "valueType": discount.value_type,
            "value": discount.value,
            "remainingUses": discount.remaining_uses(),
            "discountAmount": discount.discount_for(subtotal),
        },
    })))
}

async fn discount_usage(
    State(state): State<AppState>,
    AdminIdentity(_admin): AdminIdentity,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let code = code.trim().to_uppercase();
    let discount = state
        .store
        .discount_by_code(&code)
        .await?
        .ok_or(Error::NotFound("discount"))?;
    let usage = state.store.discount_usage(&code).await?;
    Ok(Json(json!({
        "success": true,
        "discount": discount,
        "usageHistory": usage,
    })))
}

// -- cart -------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct UpdateCartRequest {
    product_id: Uuid,
    variant_id: Uuid,
    #[validate(range(min = 0, message = "quantity must not be negative"))]
    quantity: i64,
}

async fn get_cart(
    State(state): State<AppState>,
    OptionalIdentity(actor): OptionalIdentity,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    let cart = match cart_key(actor.as_ref(), &headers) {
        Some(key) => state.store.cart(&key).await?,
        None => None,
    };
    match cart {
        Some(cart) => Ok(Json(json!({"success": true, "cart": cart}))),
        None => Ok(Json(
            json!({"success": true, "cart": {"items": [], "totalAmount": 0}}),
        )),
    }
}

async fn update_cart(
    State(state): State<AppState>,
    OptionalIdentity(actor): OptionalIdentity,
    headers: HeaderMap,
    Json(request): Json<UpdateCartRequest>,
) -> Result<Json<serde_json::Value>> {
    request.validate().map_err(invalid)?;
    let product = state
        .store
        .product(request.product_id)
        .await?
        .ok_or(Error::NotFound("product"))?;
    let variant = product
        .variant(request.variant_id)
        .ok_or(Error::NotFound("variant"))?;
    if variant.inventory < request.quantity {
        return Err(Conflict::InsufficientStock {
            product: product.name.clone(),
            variant: variant.name.clone(),
        }
        .into());
    }
    let key = cart_key(actor.as_ref(), &headers)
        .ok_or_else(|| Error::Validation("Session ID required for guest cart".into()))?;
    let mut cart = match state.store.cart(&key).await? {
        Some(cart) => cart,
        None => Cart::new(&key),
    };
    cart.set_item(
        request.product_id,
        request.variant_id,
        request.quantity,
        variant.price,
    );
    state.store.save_cart(&cart).await?;
    Ok(Json(json!({"success": true, "cart": cart})))
}

async fn clear_cart(
    State(state): State<AppState>,
    OptionalIdentity(actor): OptionalIdentity,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>> {
    if let Some(key) = cart_key(actor.as_ref(), &headers) {
        if let Some(mut cart) = state.store.cart(&key).await? {
            cart.clear();
            state.store.save_cart(&cart).await?;
        }
    }
    Ok(Json(json!({"success": true, "message": "Cart cleared"})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeCartRequest {
    session_id: String,
}

async fn merge_cart(
    State(state): State<AppState>,
    Identity(user): Identity,
    Json(request): Json<MergeCartRequest>,
) -> Result<Json<serde_json::Value>> {
    let guest_key = CartKey::Session(request.session_id);
    let guest_cart = match state.store.cart(&guest_key).await? {
        Some(cart) if !cart.is_empty() => cart,
        _ => {
            return Ok(Json(
                json!({"success": true, "message": "No guest cart to merge"}),
            ))
        }
    };
    let cart = match state.store.cart(&CartKey::User(user.id)).await? {
        Some(mut cart) => {
            cart.merge_from(&guest_cart);
            state.store.save_cart(&cart).await?;
            state.store.delete_cart(&guest_key).await?;
            cart
        }
        None => {
            // No cart under the user key yet: transfer ownership wholesale.
            let mut cart = guest_cart;
            cart.user_id = Some(user.id);
            cart.session_id = None;
            state.store.save_cart(&cart).await?;
            cart
        }
    };
    Ok(Json(json!({"success": true, "cart": cart})))
}

// -- orders -----------------------------------------------------------------

async fn list_orders(
    State(state): State<AppState>,
    Identity(user): Identity,
    Query(params): Query<ListParams>,
) -> Result<Json<serde_json::Value>> {
    let (page, limit, offset) = params.window();
    let (orders, total) = state.store.orders_for_user(user.id, limit, offset).await?;
    Ok(Json(json!({
        "success": true,
        "orders": orders,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "totalPages": (total + limit - 1) / limit,
        },
    })))
}

async fn get_order(
    State(state): State<AppState>,
    Identity(user): Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let order = state.store.order(id).await?.ok_or(Error::NotFound("order"))?;
    if order.user_id != user.id && !user.is_admin() {
        return Err(Error::Forbidden);
    }
    Ok(Json(json!({"success": true, "order": order})))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusRequest {
    status: OrderStatus,
    note: Option<String>,
}

async fn update_order_status(
    State(state): State<AppState>,
    AdminIdentity(_admin): AdminIdentity,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<serde_json::Value>> {
    let mut order = state.store.order(id).await?.ok_or(Error::NotFound("order"))?;
    order.transition(request.status, request.note)?;
    state.store.record_status(&order).await?;
    state
        .notifier
        .publish(&OrderEvent::StatusUpdated {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.current_status.to_string(),
        })
        .await;
    Ok(Json(json!({"success": true, "order": order})))
}

// -- products ---------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CreateProductRequest {
    #[validate(length(min = 1, message = "name is required"))]
    name: String,
    #[validate(length(min = 1, message = "brand is required"))]
    brand: String,
    #[validate(length(min = 1, message = "category is required"))]
    category: String,
    #[validate(range(min = 0, message = "base price must not be negative"))]
    base_price: i64,
    variants: Vec<VariantInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariantInput {
    sku: String,
    name: String,
    price: i64,
    inventory: i64,
}

async fn create_product(
    State(state): State<AppState>,
    AdminIdentity(_admin): AdminIdentity,
    Json(request): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    request.validate().map_err(invalid)?;
    let variants = request
        .variants
        .iter()
        .map(|v| {
            Ok(Variant {
                id: Uuid::now_v7(),
                sku: Sku::new(&v.sku).map_err(|e| Error::Validation(e.to_string()))?,
                name: v.name.clone(),
                price: v.price,
                inventory: v.inventory,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    let product = Product::create(
        request.name,
        request.brand,
        request.category,
        request.base_price,
        variants,
    )
    .map_err(|e| Error::Validation(e.to_string()))?;
    state.store.insert_product(&product).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({"success": true, "product": product})),
    ))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let product = state
        .store
        .product(id)
        .await?
        .ok_or(Error::NotFound("product"))?;
    Ok(Json(json!({"success": true, "product": product})))
}
