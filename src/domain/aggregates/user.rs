//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Address {
    pub id: Uuid,
    pub label: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub street: String,
    pub city: String,
    pub province: String,
    pub country: String,
    pub is_default: bool,
}

/// Account record. Guest accounts are created lazily during checkout and
/// carry a generated credential the customer never saw.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub role: Role,
    pub addresses: Vec<Address>,
    pub loyalty_points: i64,
    pub is_guest_account: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, full_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            email: email.into().trim().to_lowercase(),
            full_name: full_name.into(),
            password_hash: None,
            role: Role::Customer,
            addresses: vec![],
            loyalty_points: 0,
            is_guest_account: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn address(&self, id: Uuid) -> Option<&Address> {
        self.addresses.iter().find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let u = User::new("  Jo.Doe@Example.COM ", "Jo Doe");
        assert_eq!(u.email, "jo.doe@example.com");
    }

    #[test]
    fn test_address_lookup() {
        let mut u = User::new("a@b.c", "A");
        let address = Address {
            id: Uuid::now_v7(),
            label: "Home".into(),
            full_name: "A".into(),
            phone: None,
            street: "1 Main".into(),
            city: "Hanoi".into(),
            province: "HN".into(),
            country: "Vietnam".into(),
            is_default: false,
        };
        let id = address.id;
        u.addresses.push(address);
        assert!(u.address(id).is_some());
        assert!(u.address(Uuid::now_v7()).is_none());
    }
}
