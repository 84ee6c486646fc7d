//! Discount Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::value_objects::DiscountCode;
use crate::pricing::percent_round_half_up;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountValueType {
    Percent,
    Fixed,
}

impl DiscountValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Percent => "percent",
            Self::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for DiscountValueType {
    type Err = DiscountError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent" => Ok(Self::Percent),
            "fixed" => Ok(Self::Fixed),
            other => Err(DiscountError::UnknownValueType(other.to_string())),
        }
    }
}

/// A redeemable discount code with a hard usage ceiling. The counters are
/// mutated only through the store's atomic redeem operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Discount {
    pub id: Uuid,
    pub code: DiscountCode,
    pub value_type: DiscountValueType,
    pub value: i64,
    pub usage_limit: i64,
    pub used_count: i64,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// One entry of a discount's append-only usage history.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct DiscountUsage {
    pub id: Uuid,
    pub discount_id: Uuid,
    pub user_id: Uuid,
    pub order_id: Uuid,
    pub used_at: DateTime<Utc>,
}

impl Discount {
    pub fn create(
        code: DiscountCode,
        value_type: DiscountValueType,
        value: i64,
        usage_limit: i64,
        created_by: Option<Uuid>,
    ) -> Result<Self, DiscountError> {
        if value < 0 {
            return Err(DiscountError::NegativeValue);
        }
        if !(1..=10).contains(&usage_limit) {
            return Err(DiscountError::UsageLimit);
        }
        Ok(Self {
            id: Uuid::now_v7(),
            code,
            value_type,
            value,
            usage_limit,
            used_count: 0,
            is_active: true,
            created_by,
            created_at: Utc::now(),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.is_active && self.used_count < self.usage_limit
    }

    pub fn remaining_uses(&self) -> i64 {
        (self.usage_limit - self.used_count).max(0)
    }

    /// Amount this code takes off the given subtotal; zero when the code
    /// is no longer valid.
    pub fn discount_for(&self, subtotal: i64) -> i64 {
        if !self.is_valid() {
            return 0;
        }
        match self.value_type {
            DiscountValueType::Percent => percent_round_half_up(subtotal, self.value),
            DiscountValueType::Fixed => self.value.min(subtotal),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DiscountError {
    #[error("discount value must not be negative")]
    NegativeValue,
    #[error("usage limit must be between 1 and 10")]
    UsageLimit,
    #[error("unknown discount value type: {0}")]
    UnknownValueType(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discount(value_type: DiscountValueType, value: i64, limit: i64) -> Discount {
        Discount::create(
            DiscountCode::new("SAVE5").unwrap(),
            value_type,
            value,
            limit,
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_validity_window() {
        let mut d = discount(DiscountValueType::Fixed, 1000, 2);
        assert!(d.is_valid());
        d.used_count = 2;
        assert!(!d.is_valid());
        assert_eq!(d.discount_for(10_000), 0);
        d.used_count = 1;
        d.is_active = false;
        assert!(!d.is_valid());
    }

    #[test]
    fn test_percent_rounds_half_up() {
        let d = discount(DiscountValueType::Percent, 10, 5);
        assert_eq!(d.discount_for(1005), 101); // 100.5 rounds up
        assert_eq!(d.discount_for(1004), 100); // 100.4 rounds down
    }

    #[test]
    fn test_fixed_clamps_to_subtotal() {
        let d = discount(DiscountValueType::Fixed, 50_000, 5);
        assert_eq!(d.discount_for(400_000), 50_000);
        assert_eq!(d.discount_for(30_000), 30_000);
    }

    #[test]
    fn test_usage_limit_bounds() {
        let code = DiscountCode::new("SAVE5").unwrap();
        assert!(Discount::create(code.clone(), DiscountValueType::Fixed, 1, 0, None).is_err());
        assert!(Discount::create(code, DiscountValueType::Fixed, 1, 11, None).is_err());
    }
}
