//! Identity resolution for checkout.

use chrono::Utc;

use crate::auth;
use crate::domain::User;
use crate::error::Conflict;
use crate::store::Store;
use crate::{Error, Result};

use super::{AddressInput, GuestInfoInput};

/// Outcome of fixing the acting user for a checkout.
#[derive(Debug)]
pub enum ResolvedIdentity {
    Existing(User),
    NewGuest(User),
}

impl ResolvedIdentity {
    pub fn user(&self) -> &User {
        match self {
            Self::Existing(user) | Self::NewGuest(user) => user,
        }
    }

    pub fn is_new_guest(&self) -> bool {
        matches!(self, Self::NewGuest(_))
    }
}

/// Resolves to a single account: the authenticated user when present, an
/// existing account matched by guest email, or a freshly created guest.
/// Guests created from a bare shipping address get a synthesized
/// placeholder email.
pub async fn resolve(
    store: &dyn Store,
    authenticated: Option<User>,
    guest_info: Option<&GuestInfoInput>,
    shipping_address: Option<&AddressInput>,
) -> Result<ResolvedIdentity> {
    if let Some(user) = authenticated {
        return Ok(ResolvedIdentity::Existing(user));
    }

    let (email, full_name, phone) = match (guest_info, shipping_address) {
        (Some(info), _) => (
            info.email.trim().to_lowercase(),
            info.full_name.clone(),
            info.phone.clone(),
        ),
        (None, Some(address)) => (
            format!("guest_{}@temp.com", Utc::now().timestamp_millis()),
            address.full_name.clone(),
            address.phone.clone(),
        ),
        (None, None) => {
            return Err(Error::Validation(
                "user authentication or guest info required".into(),
            ))
        }
    };

    if let Some(existing) = store.user_by_email(&email).await? {
        return Ok(ResolvedIdentity::Existing(existing));
    }

    let mut user = User::new(email, full_name);
    user.is_guest_account = true;
    user.password_hash = Some(auth::hash_password(&auth::generate_credential())?);
    if let Some(address) = shipping_address {
        user.addresses.push(address.to_address(true));
    }
    if let Some(address) = user.addresses.first_mut() {
        if address.phone.is_none() {
            address.phone = phone;
        }
    }

    match store.insert_user(&user).await {
        Ok(()) => Ok(ResolvedIdentity::NewGuest(user)),
        // Lost a concurrent create for the same email; reuse the winner.
        Err(Error::Conflict(Conflict::DuplicateEmail)) => store
            .user_by_email(&user.email)
            .await?
            .map(ResolvedIdentity::Existing)
            .ok_or_else(|| anyhow::anyhow!("account vanished after duplicate email").into()),
        Err(e) => Err(e),
    }
}
