//! Messaging-network side: the client trait and user-ID helpers.

pub mod client;

pub use client::{joined_members, MatrixClient, MatrixError, RoomCreateOpts, StateEvent};

/// Localpart of a `@localpart:domain` user ID, or `None` if malformed.
pub fn localpart(user_id: &str) -> Option<&str> {
    let rest = user_id.strip_prefix('@')?;
    let (lp, domain) = rest.split_once(':')?;
    if lp.is_empty() || domain.is_empty() {
        return None;
    }
    Some(lp)
}

/// Mint a full user ID from a localpart and domain.
pub fn user_id(localpart: &str, domain: &str) -> String {
    format!("@{localpart}:{domain}")
}
