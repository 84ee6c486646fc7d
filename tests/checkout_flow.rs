//! End-to-end checkout tests against the in-memory store.

use std::sync::Arc;

use uuid::Uuid;

use meridian_commerce::checkout::{
    self, AddressInput, CartItemInput, CheckoutRequest, GuestInfoInput, PreviewRequest,
};
use meridian_commerce::domain::value_objects::{DiscountCode, Sku};
use meridian_commerce::domain::{
    Cart, CartKey, Discount, DiscountValueType, Product, User, Variant,
};
use meridian_commerce::error::{Conflict, Error};
use meridian_commerce::notify::Notifier;
use meridian_commerce::store::memory::MemoryStore;
use meridian_commerce::store::{CartStore, CatalogStore, DiscountStore, OrderStore, UserStore};

fn address() -> AddressInput {
    AddressInput {
        label: None,
        full_name: "Pat Example".into(),
        phone: Some("555-0100".into()),
        street: "12 Riverside".into(),
        city: "Hanoi".into(),
        province: "HN".into(),
        country: None,
    }
}

fn guest(email: &str) -> GuestInfoInput {
    GuestInfoInput {
        email: email.into(),
        full_name: "Pat Example".into(),
        phone: None,
    }
}

fn item(product_id: Uuid, variant_id: Uuid, quantity: i64) -> CartItemInput {
    CartItemInput {
        product_id,
        variant_id,
        quantity,
    }
}

fn request(items: Vec<CartItemInput>) -> CheckoutRequest {
    CheckoutRequest {
        cart_items: items,
        shipping_address_id: None,
        shipping_address: Some(address()),
        payment_method: None,
        discount_code: None,
        points_to_use: None,
        guest_info: None,
    }
}

async fn seed_product(store: &MemoryStore, price: i64, inventory: i64) -> (Uuid, Uuid) {
    let suffix = Uuid::now_v7().simple().to_string();
    let product = Product::create(
        format!("Gadget {suffix}"),
        "Acme",
        "gadgets",
        price,
        vec![
            Variant {
                id: Uuid::now_v7(),
                sku: Sku::new(format!("G-{suffix}-1")).unwrap(),
                name: "Standard".into(),
                price,
                inventory,
            },
            Variant {
                id: Uuid::now_v7(),
                sku: Sku::new(format!("G-{suffix}-2")).unwrap(),
                name: "Deluxe".into(),
                price: price * 2,
                inventory,
            },
        ],
    )
    .unwrap();
    store.insert_product(&product).await.unwrap();
    (product.id, product.variants[0].id)
}

async fn seed_user(store: &MemoryStore, email: &str, points: i64) -> User {
    let mut user = User::new(email, "Pat Example");
    user.loyalty_points = points;
    store.insert_user(&user).await.unwrap();
    user
}

async fn seed_discount(
    store: &MemoryStore,
    code: &str,
    value_type: DiscountValueType,
    value: i64,
    usage_limit: i64,
) -> Discount {
    let discount = Discount::create(
        DiscountCode::new(code).unwrap(),
        value_type,
        value,
        usage_limit,
        None,
    )
    .unwrap();
    store.insert_discount(&discount).await.unwrap();
    discount
}

#[tokio::test]
async fn cod_checkout_totals_and_ledgers() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 0).await;
    let (product_id, variant_id) = seed_product(&store, 300_000, 10).await;

    let outcome = checkout::place_order(
        &store,
        &Notifier::disabled(),
        Some(user.clone()),
        None,
        request(vec![item(product_id, variant_id, 2)]),
    )
    .await
    .unwrap();

    let order = &outcome.order;
    assert_eq!(order.subtotal, 600_000);
    assert_eq!(order.tax_amount, 60_000);
    assert_eq!(order.shipping_fee, 0);
    assert_eq!(order.total_amount, 660_000);
    assert_eq!(order.points_earned, 66_000);
    assert_eq!(
        order.total_amount,
        order.subtotal - order.discount_amount - order.points_discount
            + order.tax_amount
            + order.shipping_fee
    );
    assert!(!order.is_paid);
    assert!(outcome.token.is_none(), "authenticated checkout mints no token");

    let product = store.product(product_id).await.unwrap().unwrap();
    assert_eq!(product.variants[0].inventory, 8);
    assert_eq!(product.sold_count, 2);

    let persisted = store.order(order.id).await.unwrap().unwrap();
    assert_eq!(persisted.order_number, order.order_number);
    assert_eq!(persisted.items.len(), 1);
    assert_eq!(persisted.items[0].variant_sku, product.variants[0].sku.to_string());

    let buyer = store.user(user.id).await.unwrap().unwrap();
    assert_eq!(buyer.loyalty_points, 66_000);
}

#[tokio::test]
async fn fixed_discount_scenario() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 0).await;
    let (product_id, variant_id) = seed_product(&store, 200_000, 10).await;
    seed_discount(&store, "FIX50", DiscountValueType::Fixed, 50_000, 5).await;

    let mut req = request(vec![item(product_id, variant_id, 2)]);
    req.discount_code = Some("fix50".into());
    let outcome = checkout::place_order(&store, &Notifier::disabled(), Some(user), None, req)
        .await
        .unwrap();

    let order = &outcome.order;
    assert_eq!(order.subtotal, 400_000);
    assert_eq!(order.discount_amount, 50_000);
    assert_eq!(order.tax_amount, 35_000);
    assert_eq!(order.shipping_fee, 30_000);
    assert_eq!(order.total_amount, 415_000);
    assert_eq!(order.discount_code.as_ref().unwrap().as_str(), "FIX50");

    let discount = store.discount_by_code("FIX50").await.unwrap().unwrap();
    assert_eq!(discount.used_count, 1);
    let usage = store.discount_usage("FIX50").await.unwrap();
    assert_eq!(usage.len(), 1);
    assert_eq!(usage[0].order_id, order.id);
}

#[tokio::test]
async fn preview_and_commit_agree() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 20_000).await;
    let (product_id, variant_id) = seed_product(&store, 150_000, 10).await;
    seed_discount(&store, "PCT10", DiscountValueType::Percent, 10, 5).await;

    let preview = checkout::preview(
        &store,
        Some(&user),
        PreviewRequest {
            cart_items: vec![item(product_id, variant_id, 3)],
            discount_code: Some("PCT10".into()),
            points_to_use: Some(20_000),
        },
    )
    .await
    .unwrap();

    let mut req = request(vec![item(product_id, variant_id, 3)]);
    req.discount_code = Some("PCT10".into());
    req.points_to_use = Some(20_000);
    let outcome = checkout::place_order(&store, &Notifier::disabled(), Some(user), None, req)
        .await
        .unwrap();

    let order = &outcome.order;
    assert!(preview.discount_valid);
    assert_eq!(preview.subtotal, order.subtotal);
    assert_eq!(preview.discount_amount, order.discount_amount);
    assert_eq!(preview.points_discount, order.points_discount);
    assert_eq!(preview.tax_amount, order.tax_amount);
    assert_eq!(preview.shipping_fee, order.shipping_fee);
    assert_eq!(preview.total_amount, order.total_amount);
    assert_eq!(preview.points_earned, order.points_earned);
}

#[tokio::test]
async fn exhausted_discount_always_rejects() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 0).await;
    let (product_id, variant_id) = seed_product(&store, 100_000, 10).await;
    seed_discount(&store, "ONE11", DiscountValueType::Fixed, 10_000, 1).await;

    let mut req = request(vec![item(product_id, variant_id, 1)]);
    req.discount_code = Some("ONE11".into());
    checkout::place_order(&store, &Notifier::disabled(), Some(user.clone()), None, req.clone())
        .await
        .unwrap();

    // The code is now at its usage limit: every resubmission fails the
    // same way and applies nothing.
    for _ in 0..2 {
        let err = checkout::place_order(
            &store,
            &Notifier::disabled(),
            Some(user.clone()),
            None,
            req.clone(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Conflict(Conflict::DiscountInvalid)));
    }

    let discount = store.discount_by_code("ONE11").await.unwrap().unwrap();
    assert_eq!(discount.used_count, 1);
    let (orders, total) = store.orders_for_user(user.id, 10, 0).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(orders.len(), 1);
    let product = store.product(product_id).await.unwrap().unwrap();
    assert_eq!(product.variants[0].inventory, 9);
}

#[tokio::test]
async fn concurrent_checkouts_cannot_oversell_last_unit() {
    let store = Arc::new(MemoryStore::new());
    let (product_id, variant_id) = seed_product(&store, 50_000, 1).await;
    let first = seed_user(&store, "first@example.com", 0).await;
    let second = seed_user(&store, "second@example.com", 0).await;

    let mut handles = vec![];
    for user in [first.clone(), second.clone()] {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            checkout::place_order(
                store.as_ref(),
                &Notifier::disabled(),
                Some(user),
                None,
                request(vec![item(product_id, variant_id, 1)]),
            )
            .await
        }));
    }
    let mut ok = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(Error::Conflict(Conflict::InsufficientStock { .. })) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(conflicts, 1);

    let product = store.product(product_id).await.unwrap().unwrap();
    assert_eq!(product.variants[0].inventory, 0);
    assert_eq!(product.sold_count, 1);

    // The losing checkout's order must have been rolled back.
    let (_, first_total) = store.orders_for_user(first.id, 10, 0).await.unwrap();
    let (_, second_total) = store.orders_for_user(second.id, 10, 0).await.unwrap();
    assert_eq!(first_total + second_total, 1);
}

#[tokio::test]
async fn concurrent_redemptions_respect_usage_limit() {
    let store = Arc::new(MemoryStore::new());
    let (product_id, variant_id) = seed_product(&store, 100_000, 100).await;
    seed_discount(&store, "LIM02", DiscountValueType::Fixed, 10_000, 2).await;

    let mut handles = vec![];
    for i in 0..5 {
        let store = Arc::clone(&store);
        let user = seed_user(&store, &format!("u{i}@example.com"), 0).await;
        handles.push(tokio::spawn(async move {
            let mut req = request(vec![item(product_id, variant_id, 1)]);
            req.discount_code = Some("LIM02".into());
            checkout::place_order(store.as_ref(), &Notifier::disabled(), Some(user), None, req)
                .await
        }));
    }
    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(outcome) => {
                ok += 1;
                assert_eq!(outcome.order.discount_amount, 10_000);
            }
            Err(Error::Conflict(Conflict::DiscountInvalid)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(ok, 2);

    let discount = store.discount_by_code("LIM02").await.unwrap().unwrap();
    assert_eq!(discount.used_count, 2);
    assert_eq!(store.discount_usage("LIM02").await.unwrap().len(), 2);

    // Rejected checkouts released their stock.
    let product = store.product(product_id).await.unwrap().unwrap();
    assert_eq!(product.variants[0].inventory, 98);
}

#[tokio::test]
async fn guest_checkout_creates_account_once() {
    let store = MemoryStore::new();
    let (product_id, variant_id) = seed_product(&store, 80_000, 10).await;

    let mut req = request(vec![item(product_id, variant_id, 1)]);
    req.guest_info = Some(guest("new.guest@example.com"));
    let first = checkout::place_order(&store, &Notifier::disabled(), None, None, req.clone())
        .await
        .unwrap();
    assert!(first.token.is_some(), "guest gets a token to claim the order");

    let created = store
        .user_by_email("new.guest@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(created.is_guest_account);
    assert!(created.password_hash.is_some());
    assert_eq!(created.addresses.len(), 1);

    let second = checkout::place_order(&store, &Notifier::disabled(), None, None, req)
        .await
        .unwrap();
    assert_eq!(second.order.user_id, created.id, "same email reuses the account");

    let (_, total) = store.orders_for_user(created.id, 10, 0).await.unwrap();
    assert_eq!(total, 2);
}

#[tokio::test]
async fn multi_line_failure_applies_nothing() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 0).await;
    let (p1, v1) = seed_product(&store, 50_000, 5).await;
    let (p2, v2) = seed_product(&store, 70_000, 2).await;

    let err = checkout::place_order(
        &store,
        &Notifier::disabled(),
        Some(user.clone()),
        None,
        request(vec![item(p1, v1, 1), item(p2, v2, 10)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Conflict(Conflict::InsufficientStock { .. })
    ));

    let product1 = store.product(p1).await.unwrap().unwrap();
    let product2 = store.product(p2).await.unwrap().unwrap();
    assert_eq!(product1.variants[0].inventory, 5);
    assert_eq!(product2.variants[0].inventory, 2);
    assert_eq!(product1.sold_count, 0);
    let (_, total) = store.orders_for_user(user.id, 10, 0).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn points_redemption_debits_and_credits_together() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 50_000).await;
    let (product_id, variant_id) = seed_product(&store, 300_000, 10).await;

    let mut req = request(vec![item(product_id, variant_id, 2)]);
    req.points_to_use = Some(50_000);
    let outcome = checkout::place_order(&store, &Notifier::disabled(), Some(user.clone()), None, req)
        .await
        .unwrap();

    let order = &outcome.order;
    assert_eq!(order.points_used, 50_000);
    assert_eq!(order.points_discount, 50_000);
    assert_eq!(order.tax_amount, 55_000);
    assert_eq!(order.total_amount, 605_000);
    assert_eq!(order.points_earned, 60_500);

    let buyer = store.user(user.id).await.unwrap().unwrap();
    assert_eq!(buyer.loyalty_points, 60_500);
}

#[tokio::test]
async fn requesting_more_points_than_owned_is_rejected() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 100).await;
    let (product_id, variant_id) = seed_product(&store, 300_000, 10).await;

    let mut req = request(vec![item(product_id, variant_id, 1)]);
    req.points_to_use = Some(500);
    let err = checkout::place_order(&store, &Notifier::disabled(), Some(user), None, req)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(Conflict::InsufficientPoints)));
}

#[tokio::test]
async fn checkout_clears_the_originating_cart() {
    let store = MemoryStore::new();
    let (product_id, variant_id) = seed_product(&store, 40_000, 10).await;

    // Guest cart lives under the session key.
    let session = CartKey::Session("sess-42".into());
    let mut cart = Cart::new(&session);
    cart.set_item(product_id, variant_id, 2, 40_000);
    store.save_cart(&cart).await.unwrap();

    let mut req = request(vec![item(product_id, variant_id, 2)]);
    req.guest_info = Some(guest("cart.guest@example.com"));
    checkout::place_order(
        &store,
        &Notifier::disabled(),
        None,
        Some("sess-42".into()),
        req,
    )
    .await
    .unwrap();
    assert!(store.cart(&session).await.unwrap().is_none());

    // An authenticated checkout clears the user-keyed cart instead.
    let user = seed_user(&store, "known@example.com", 0).await;
    let user_key = CartKey::User(user.id);
    let mut cart = Cart::new(&user_key);
    cart.set_item(product_id, variant_id, 1, 40_000);
    store.save_cart(&cart).await.unwrap();

    checkout::place_order(
        &store,
        &Notifier::disabled(),
        Some(user),
        None,
        request(vec![item(product_id, variant_id, 1)]),
    )
    .await
    .unwrap();
    assert!(store.cart(&user_key).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_product_or_variant_is_not_found() {
    let store = MemoryStore::new();
    let user = seed_user(&store, "buyer@example.com", 0).await;
    let (product_id, _variant_id) = seed_product(&store, 10_000, 5).await;

    let err = checkout::place_order(
        &store,
        &Notifier::disabled(),
        Some(user.clone()),
        None,
        request(vec![item(Uuid::now_v7(), Uuid::now_v7(), 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::NotFound("product")));

    let err = checkout::place_order(
        &store,
        &Notifier::disabled(),
        Some(user),
        None,
        request(vec![item(product_id, Uuid::now_v7(), 1)]),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::NotFound("variant")));
}
