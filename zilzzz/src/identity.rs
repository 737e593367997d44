//! Identity provider: who is signed in.
//!
//! Credential handling lives outside this crate. The engine only needs the
//! owner id that scopes the feed subscription and every write.

use zilzzz_proto::task::OwnerId;

/// Exposes the identity of the signed-in user.
pub trait IdentityProvider: Send + Sync {
    /// Returns the current owner, or `None` if nobody is signed in.
    fn current_owner(&self) -> Option<OwnerId>;
}

/// An identity fixed at construction time (from configuration).
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    owner: Option<OwnerId>,
}

impl StaticIdentity {
    /// Signs in as `owner`. A blank owner counts as signed out.
    #[must_use]
    pub fn new(owner: OwnerId) -> Self {
        let owner = if owner.is_blank() { None } else { Some(owner) };
        Self { owner }
    }

    /// An identity with nobody signed in.
    #[must_use]
    pub const fn signed_out() -> Self {
        Self { owner: None }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_owner(&self) -> Option<OwnerId> {
        self.owner.clone()
    }
}
