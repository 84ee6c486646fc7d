//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::DiscountCode;
use crate::pricing::Breakdown;

use super::user::Address;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipping,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Shipping => "shipping",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "shipping" => Ok(Self::Shipping),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash on delivery, the default; the only method that is not
    /// considered settled at commit time.
    #[default]
    Cod,
    BankTransfer,
    Card,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cod => "cod",
            Self::BankTransfer => "bank_transfer",
            Self::Card => "card",
        }
    }

    pub fn is_prepaid(self) -> bool {
        self != Self::Cod
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cod" => Ok(Self::Cod),
            "bank_transfer" => Ok(Self::BankTransfer),
            "card" => Ok(Self::Card),
            other => Err(OrderError::UnknownPaymentMethod(other.to_string())),
        }
    }
}

/// Line snapshot: product and variant identity plus name, sku and price
/// copied at order time, so later catalog edits never rewrite history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub variant_id: Uuid,
    pub variant_name: String,
    pub variant_sku: String,
    pub quantity: i64,
    pub price: i64,
    pub subtotal: i64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusEntry {
    pub status: OrderStatus,
    pub time: DateTime<Utc>,
    pub note: Option<String>,
}

/// A committed commercial transaction. Immutable after creation except for
/// the status fields and the append-only status history.
#[derive(Clone, Debug, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub items: Vec<OrderLine>,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
    pub subtotal: i64,
    pub discount_code: Option<DiscountCode>,
    pub discount_amount: i64,
    pub points_used: i64,
    pub points_discount: i64,
    pub tax_amount: i64,
    pub shipping_fee: i64,
    pub total_amount: i64,
    pub points_earned: i64,
    pub current_status: OrderStatus,
    pub status_history: Vec<StatusEntry>,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn place(
        user_id: Uuid,
        items: Vec<OrderLine>,
        shipping_address: Address,
        payment_method: PaymentMethod,
        pricing: &Breakdown,
        discount_code: Option<DiscountCode>,
    ) -> Self {
        let now = Utc::now();
        let prepaid = payment_method.is_prepaid();
        Self {
            id: Uuid::now_v7(),
            order_number: format!("ORD-{:08}", rand::random::<u32>()),
            user_id,
            items,
            shipping_address,
            payment_method,
            subtotal: pricing.subtotal,
            discount_code,
            discount_amount: pricing.discount_amount,
            points_used: pricing.points_used,
            points_discount: pricing.points_discount,
            tax_amount: pricing.tax_amount,
            shipping_fee: pricing.shipping_fee,
            total_amount: pricing.total_amount,
            points_earned: pricing.points_earned,
            current_status: OrderStatus::Pending,
            status_history: vec![StatusEntry {
                status: OrderStatus::Pending,
                time: now,
                note: None,
            }],
            is_paid: prepaid,
            paid_at: prepaid.then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends to the status history and moves the current status.
    /// Delivery settles cash-on-delivery payment.
    pub fn transition(
        &mut self,
        status: OrderStatus,
        note: Option<String>,
    ) -> Result<(), OrderError> {
        if status == OrderStatus::Cancelled && self.current_status == OrderStatus::Delivered {
            return Err(OrderError::CannotCancel);
        }
        let now = Utc::now();
        self.status_history.push(StatusEntry {
            status,
            time: now,
            note,
        });
        self.current_status = status;
        if status == OrderStatus::Delivered && !self.is_paid {
            self.is_paid = true;
            self.paid_at = Some(now);
        }
        self.updated_at = now;
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderError {
    #[error("cannot cancel a delivered order")]
    CannotCancel,
    #[error("unknown order status: {0}")]
    UnknownStatus(String),
    #[error("unknown payment method: {0}")]
    UnknownPaymentMethod(String),
}

impl From<OrderError> for crate::Error {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::CannotCancel => crate::error::Conflict::CannotCancel.into(),
            other => crate::Error::Validation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> Address {
        Address {
            id: Uuid::now_v7(),
            label: "Home".into(),
            full_name: "Test".into(),
            phone: None,
            street: "1 Main".into(),
            city: "Hanoi".into(),
            province: "HN".into(),
            country: "Vietnam".into(),
            is_default: true,
        }
    }

    fn breakdown() -> Breakdown {
        Breakdown {
            subtotal: 600_000,
            discount_amount: 0,
            points_used: 0,
            points_discount: 0,
            tax_amount: 60_000,
            shipping_fee: 0,
            total_amount: 660_000,
            points_earned: 66_000,
        }
    }

    #[test]
    fn test_cod_starts_unpaid() {
        let o = Order::place(
            Uuid::now_v7(),
            vec![],
            address(),
            PaymentMethod::Cod,
            &breakdown(),
            None,
        );
        assert!(!o.is_paid);
        assert!(o.paid_at.is_none());
        assert_eq!(o.current_status, OrderStatus::Pending);
        assert_eq!(o.status_history.len(), 1);
        assert!(o.order_number.starts_with("ORD-"));
    }

    #[test]
    fn test_prepaid_methods_settle_at_commit() {
        let o = Order::place(
            Uuid::now_v7(),
            vec![],
            address(),
            PaymentMethod::Card,
            &breakdown(),
            None,
        );
        assert!(o.is_paid);
        assert!(o.paid_at.is_some());
    }

    #[test]
    fn test_delivery_marks_paid() {
        let mut o = Order::place(
            Uuid::now_v7(),
            vec![],
            address(),
            PaymentMethod::Cod,
            &breakdown(),
            None,
        );
        o.transition(OrderStatus::Confirmed, None).unwrap();
        o.transition(OrderStatus::Delivered, Some("left at door".into()))
            .unwrap();
        assert!(o.is_paid);
        assert_eq!(o.status_history.len(), 3);
    }

    #[test]
    fn test_cannot_cancel_delivered() {
        let mut o = Order::place(
            Uuid::now_v7(),
            vec![],
            address(),
            PaymentMethod::Cod,
            &breakdown(),
            None,
        );
        o.transition(OrderStatus::Delivered, None).unwrap();
        assert!(o.transition(OrderStatus::Cancelled, None).is_err());
    }
}
