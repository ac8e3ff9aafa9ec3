//! Identity of the signed-in seller.
//!
//! The builder never decodes transport credentials itself; whoever owns the
//! login session hands it an [`IdentityProvider`].

use thiserror::Error;

use crate::HierarchyError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no authenticated seller")]
pub struct Unauthenticated;

impl From<Unauthenticated> for HierarchyError {
    fn from(_: Unauthenticated) -> Self { HierarchyError::Unauthorized }
}

pub trait IdentityProvider: Send + Sync {
    fn current_seller_id(&self) -> Result<String, Unauthenticated>;

    /// Bearer token attached to marketplace requests, if any.
    fn bearer_token(&self) -> Option<String>;
}

/// Identity fixed at startup from configuration.
#[derive(Clone, Debug, Default)]
pub struct StaticIdentity {
    seller_id: Option<String>,
    token: Option<String>,
}

impl StaticIdentity {
    pub fn new(seller_id: Option<String>, token: Option<String>) -> Self {
        let seller_id = seller_id.filter(|id| !id.trim().is_empty());
        let token = token.filter(|t| !t.trim().is_empty());
        Self { seller_id, token }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_seller_id(&self) -> Result<String, Unauthenticated> {
        self.seller_id.clone().ok_or(Unauthenticated)
    }

    fn bearer_token(&self) -> Option<String> { self.token.clone() }
}
