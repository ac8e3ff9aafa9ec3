//! MarketplaceApi trait: the only boundary between the builder and the remote marketplace.
//! Pricing rules, approval decisions and inventory truth all live behind it.

pub mod http;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::aggregates::Hierarchy;
use crate::domain::value_objects::Territory;
use crate::{AddDownstreamCommand, CandidatePage, NetworkRelationship, Product, Result};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    pub seller_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl CandidateQuery {
    /// Normalizes the raw inputs: blank queries become `None`, page is at least 1.
    pub fn new(seller_id: impl Into<String>, query: Option<&str>, page: Option<u32>) -> Self {
        let query = query.map(str::trim).filter(|q| !q.is_empty()).map(str::to_string);
        Self { seller_id: seller_id.into(), query, page: page.unwrap_or(1).max(1), limit: DEFAULT_PAGE_SIZE }
    }
}

#[async_trait]
pub trait MarketplaceApi: Send + Sync {
    async fn hierarchy(&self, seller_id: &str) -> Result<Hierarchy>;

    async fn catalog(&self, seller_id: &str) -> Result<Vec<Product>>;

    /// Matching semantics for `query` belong to the marketplace.
    async fn search_candidates(&self, query: &CandidateQuery) -> Result<CandidatePage>;

    async fn add_downstream(&self, upstream_id: &str, command: &AddDownstreamCommand) -> Result<NetworkRelationship>;

    async fn remove_downstream(&self, upstream_id: &str, downstream_id: &str) -> Result<()>;

    async fn update_territories(&self, downstream_id: &str, territories: &[Territory]) -> Result<NetworkRelationship>;

    async fn approve_seller(&self, seller_id: &str) -> Result<()>;

    async fn reject_seller(&self, seller_id: &str, reason: Option<&str>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_normalization() {
        let q = CandidateQuery::new("U", Some("   "), Some(0));
        assert_eq!(q.query, None);
        assert_eq!(q.page, 1);
        let q = CandidateQuery::new("U", Some(" lah "), None);
        assert_eq!(q.query.as_deref(), Some("lah"));
        assert_eq!(q.limit, DEFAULT_PAGE_SIZE);
    }
}
