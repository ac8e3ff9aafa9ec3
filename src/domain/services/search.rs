//! Candidate Search Engine

use std::sync::Arc;
use tracing::debug;

use super::network::NetworkRepository;
use crate::api::CandidateQuery;
use crate::{CandidatePage, Result, SearchPage};

/// Lists sellers that could join an upstream seller's network.
#[derive(Clone)]
pub struct CandidateSearch {
    network: Arc<NetworkRepository>,
}

impl CandidateSearch {
    pub fn new(network: Arc<NetworkRepository>) -> Self { Self { network } }

    /// An empty or missing query returns the first page of every eligible candidate.
    pub async fn search(&self, seller_id: &str, query: Option<&str>, page: Option<u32>) -> Result<CandidatePage> {
        let query = CandidateQuery::new(seller_id, query, page);
        let hierarchy = self.network.load_hierarchy(seller_id).await?;
        let remote = self.network.api().search_candidates(&query).await?;

        let fetched = remote.candidates.len();
        let candidates: Vec<_> = remote
            .candidates
            .into_iter()
            .filter(|c| c.id != seller_id && !hierarchy.contains(&c.id))
            .collect();
        debug!(seller_id, query = ?query.query, page = query.page, fetched, kept = candidates.len(), "Candidate search");

        let pagination = SearchPage::new(query.page, remote.pagination.limit, remote.pagination.total);
        Ok(CandidatePage { candidates, pagination })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::{seller, InMemoryMarketplace};
    use crate::{HierarchyError, SellerCategory};

    fn engine(market: InMemoryMarketplace) -> (Arc<InMemoryMarketplace>, CandidateSearch) {
        let market = Arc::new(market);
        let network = Arc::new(NetworkRepository::new(market.clone()));
        (market, CandidateSearch::new(network))
    }

    fn dealer_market() -> InMemoryMarketplace {
        let mut sellers = vec![seller("U", SellerCategory::Dealer), seller("D2", SellerCategory::Dealer)];
        sellers.extend((1..=12).map(|i| seller(&format!("W{i:02}"), SellerCategory::Wholesaler)));
        InMemoryMarketplace::with_sellers(sellers)
    }

    #[tokio::test]
    async fn test_empty_query_lists_first_page() {
        let (_, search) = engine(dealer_market());
        let page = search.search("U", Some(""), None).await.unwrap();
        assert_eq!(page.candidates.len(), 10);
        assert_eq!(page.pagination.page, 1);
        assert_eq!(page.pagination.total, 12);
        assert_eq!(page.pagination.pages, 2);
        assert!(page.candidates.iter().all(|c| c.category == SellerCategory::Wholesaler));
    }

    #[tokio::test]
    async fn test_linked_sellers_never_returned() {
        let (market, search) = engine(dealer_market().leaking());
        market.link("U", "W01");
        market.link("U", "W05");
        for page in 1..=2 {
            let result = search.search("U", None, Some(page)).await.unwrap();
            assert!(result.candidates.iter().all(|c| c.id != "W01" && c.id != "W05"));
        }
    }

    #[tokio::test]
    async fn test_query_is_forwarded() {
        let (_, search) = engine(dealer_market());
        let page = search.search("U", Some("w03 SHOP"), None).await.unwrap();
        assert_eq!(page.candidates.len(), 1);
        assert_eq!(page.candidates[0].id, "W03");
    }

    #[tokio::test]
    async fn test_no_matches_is_not_an_error() {
        let (_, search) = engine(dealer_market());
        let page = search.search("U", Some("karachi"), None).await.unwrap();
        assert!(page.candidates.is_empty());
        assert_eq!(page.pagination.pages, 0);
    }

    #[tokio::test]
    async fn test_hierarchy_failure_fails_search() {
        let (market, search) = engine(dealer_market());
        market.fail_hierarchy(Some(HierarchyError::Transient("down".into())));
        assert!(matches!(search.search("U", None, None).await, Err(HierarchyError::Transient(_))));
    }
}
