//! Order pricing engine.
//!
//! Pure integer arithmetic over minor currency units. Both the checkout
//! preview and the commit path go through [`price`], so the two can never
//! disagree on a breakdown.

use serde::Serialize;

use crate::domain::{Discount, OrderLine};

/// Tax applied to the discounted subtotal.
pub const TAX_RATE_PERCENT: i64 = 10;
/// Orders strictly above this subtotal ship free.
pub const FREE_SHIPPING_THRESHOLD: i64 = 500_000;
pub const FLAT_SHIPPING_FEE: i64 = 30_000;
/// Share of the order total earned back as loyalty points.
pub const POINTS_EARN_RATE_PERCENT: i64 = 10;

/// Monetary breakdown of one order. The identity
/// `total = subtotal - discount - points_discount + tax + shipping`
/// holds exactly for every value this module produces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Breakdown {
    pub subtotal: i64,
    pub discount_amount: i64,
    pub points_used: i64,
    pub points_discount: i64,
    pub tax_amount: i64,
    pub shipping_fee: i64,
    pub total_amount: i64,
    pub points_earned: i64,
}

/// Prices a set of validated line items. Redemption rate is one point per
/// minor unit; requested points are clamped to the available balance.
pub fn price(
    lines: &[OrderLine],
    discount: Option<&Discount>,
    points_requested: i64,
    available_points: i64,
) -> Breakdown {
    let subtotal: i64 = lines.iter().map(|l| l.subtotal).sum();
    let discount_amount = discount.map(|d| d.discount_for(subtotal)).unwrap_or(0);
    let points_used = points_requested.max(0).min(available_points.max(0));
    let points_discount = points_used;

    let taxable = (subtotal - discount_amount - points_discount).max(0);
    let tax_amount = percent_round_half_up(taxable, TAX_RATE_PERCENT);
    let shipping_fee = if subtotal > FREE_SHIPPING_THRESHOLD {
        0
    } else {
        FLAT_SHIPPING_FEE
    };

    let total_amount = subtotal - discount_amount - points_discount + tax_amount + shipping_fee;
    let points_earned = floor_percent(total_amount, POINTS_EARN_RATE_PERCENT);

    Breakdown {
        subtotal,
        discount_amount,
        points_used,
        points_discount,
        tax_amount,
        shipping_fee,
        total_amount,
        points_earned,
    }
}

/// `amount * percent / 100`, rounded half-up. Intermediate math widens to
/// i128 so large carts cannot overflow.
pub(crate) fn percent_round_half_up(amount: i64, percent: i64) -> i64 {
    ((amount as i128 * percent as i128 + 50) / 100) as i64
}

fn floor_percent(amount: i64, percent: i64) -> i64 {
    ((amount as i128 * percent as i128).div_euclid(100)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::DiscountCode;
    use crate::domain::DiscountValueType;
    use uuid::Uuid;

    fn line(price: i64, quantity: i64) -> OrderLine {
        OrderLine {
            product_id: Uuid::now_v7(),
            product_name: "p".into(),
            variant_id: Uuid::now_v7(),
            variant_name: "v".into(),
            variant_sku: "SKU-1".into(),
            quantity,
            price,
            subtotal: price * quantity,
        }
    }

    fn fixed_discount(value: i64) -> Discount {
        Discount::create(
            DiscountCode::new("FIX50").unwrap(),
            DiscountValueType::Fixed,
            value,
            5,
            None,
        )
        .unwrap()
    }

    fn assert_identity(b: &Breakdown) {
        assert_eq!(
            b.total_amount,
            b.subtotal - b.discount_amount - b.points_discount + b.tax_amount + b.shipping_fee
        );
    }

    #[test]
    fn test_free_shipping_over_threshold() {
        // subtotal 600_000: tax 60_000, free shipping, total 660_000
        let b = price(&[line(300_000, 2)], None, 0, 0);
        assert_eq!(b.subtotal, 600_000);
        assert_eq!(b.tax_amount, 60_000);
        assert_eq!(b.shipping_fee, 0);
        assert_eq!(b.total_amount, 660_000);
        assert_eq!(b.points_earned, 66_000);
        assert_identity(&b);
    }

    #[test]
    fn test_fixed_discount_and_flat_shipping() {
        // subtotal 400_000 with fixed 50_000 off: taxable 350_000, tax
        // 35_000, shipping 30_000, total 415_000
        let d = fixed_discount(50_000);
        let b = price(&[line(200_000, 2)], Some(&d), 0, 0);
        assert_eq!(b.discount_amount, 50_000);
        assert_eq!(b.tax_amount, 35_000);
        assert_eq!(b.shipping_fee, 30_000);
        assert_eq!(b.total_amount, 415_000);
        assert_identity(&b);
    }

    #[test]
    fn test_threshold_is_strict() {
        let b = price(&[line(500_000, 1)], None, 0, 0);
        assert_eq!(b.shipping_fee, FLAT_SHIPPING_FEE);
        let b = price(&[line(500_001, 1)], None, 0, 0);
        assert_eq!(b.shipping_fee, 0);
    }

    #[test]
    fn test_tax_rounds_half_up() {
        // subtotal 1005: 10% tax is 100.5, rounds to 101
        let b = price(&[line(201, 5)], None, 0, 0);
        assert_eq!(b.tax_amount, 101);
        assert_identity(&b);
    }

    #[test]
    fn test_points_clamped_to_balance() {
        let b = price(&[line(100_000, 1)], None, 50_000, 20_000);
        assert_eq!(b.points_used, 20_000);
        assert_eq!(b.points_discount, 20_000);
        assert_identity(&b);
    }

    #[test]
    fn test_taxable_base_clamped_at_zero() {
        // discounts exceed the subtotal: tax must not go negative
        let d = fixed_discount(10_000);
        let b = price(&[line(10_000, 1)], Some(&d), 5_000, 5_000);
        assert_eq!(b.discount_amount, 10_000);
        assert_eq!(b.tax_amount, 0);
        assert_identity(&b);
    }

    #[test]
    fn test_invalid_discount_prices_as_zero() {
        let mut d = fixed_discount(10_000);
        d.is_active = false;
        let b = price(&[line(100_000, 1)], Some(&d), 0, 0);
        assert_eq!(b.discount_amount, 0);
        assert_identity(&b);
    }

    #[test]
    fn test_empty_lines() {
        let b = price(&[], None, 0, 0);
        assert_eq!(b.subtotal, 0);
        assert_eq!(b.total_amount, FLAT_SHIPPING_FEE);
        assert_identity(&b);
    }
}
