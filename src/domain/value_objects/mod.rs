//! Value objects shared across the domain.
//!
//! Monetary amounts are plain `i64` minor currency units throughout the
//! crate; only identifiers with format rules get newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() {
            return Err(SkuError::Empty);
        }
        if value.len() > 50 {
            return Err(SkuError::TooLong);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Sku {
    type Error = SkuError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Sku> for String {
    fn from(sku: Sku) -> Self {
        sku.0
    }
}

#[derive(Debug, Clone, Error)]
pub enum SkuError {
    #[error("SKU empty")]
    Empty,
    #[error("SKU too long")]
    TooLong,
}

/// Discount code value object. The format (exactly 5 uppercase
/// alphanumerics) is enforced here, at creation time only; redemption
/// looks codes up by string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiscountCode(String);

impl DiscountCode {
    pub fn new(value: impl Into<String>) -> Result<Self, DiscountCodeError> {
        let value = value.into().trim().to_uppercase();
        if value.len() != 5 || !value.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            return Err(DiscountCodeError::Format);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DiscountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DiscountCode {
    type Error = DiscountCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DiscountCode> for String {
    fn from(code: DiscountCode) -> Self {
        code.0
    }
}

#[derive(Debug, Clone, Error)]
pub enum DiscountCodeError {
    #[error("code must be 5 alphanumeric characters")]
    Format,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sku() {
        let sku = Sku::new("prod-001").unwrap();
        assert_eq!(sku.as_str(), "PROD-001");
        assert!(Sku::new("   ").is_err());
    }

    #[test]
    fn test_discount_code_format() {
        assert_eq!(DiscountCode::new("abc12").unwrap().as_str(), "ABC12");
        assert!(DiscountCode::new("AB12").is_err());
        assert!(DiscountCode::new("ABC123").is_err());
        assert!(DiscountCode::new("AB-12").is_err());
    }
}
