//! Network Repository
//!
//! Local view of the seller's downstream network and product catalog. Reads are
//! cached per seller id; every mutation ends with [`NetworkRepository::invalidate`],
//! so consistency comes from full re-fetches, never from merging diffs.
//!
//! A fetch that was started before an invalidation never lands in the cache:
//! each store checks that the cache generation it read is still current.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::api::MarketplaceApi;
use crate::domain::aggregates::Hierarchy;
use crate::domain::events::NetworkEvent;
use crate::domain::value_objects::Territory;
use crate::{HierarchyError, NetworkRelationship, Product, Result};

struct Cached<T> {
    seller_id: String,
    value: Arc<T>,
}

pub struct NetworkRepository {
    api: Arc<dyn MarketplaceApi>,
    hierarchy: RwLock<Option<Cached<Hierarchy>>>,
    catalog: RwLock<Option<Cached<Vec<Product>>>>,
    generation: AtomicU64,
}

impl NetworkRepository {
    pub fn new(api: Arc<dyn MarketplaceApi>) -> Self {
        Self { api, hierarchy: RwLock::new(None), catalog: RwLock::new(None), generation: AtomicU64::new(0) }
    }

    pub fn api(&self) -> &Arc<dyn MarketplaceApi> { &self.api }

    pub async fn load_hierarchy(&self, seller_id: &str) -> Result<Arc<Hierarchy>> {
        if let Some(cached) = self.hierarchy.read().await.as_ref().filter(|c| c.seller_id == seller_id) {
            return Ok(cached.value.clone());
        }
        debug!(seller_id, "Fetching hierarchy");
        let generation = self.generation.load(Ordering::SeqCst);
        let value = Arc::new(self.api.hierarchy(seller_id).await?);
        let mut slot = self.hierarchy.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            *slot = Some(Cached { seller_id: seller_id.to_string(), value: value.clone() });
        } else {
            debug!(seller_id, "Hierarchy fetch outlived an invalidation, not cached");
        }
        Ok(value)
    }

    pub async fn load_catalog(&self, seller_id: &str) -> Result<Arc<Vec<Product>>> {
        if let Some(cached) = self.catalog.read().await.as_ref().filter(|c| c.seller_id == seller_id) {
            return Ok(cached.value.clone());
        }
        debug!(seller_id, "Fetching catalog");
        let generation = self.generation.load(Ordering::SeqCst);
        let value = Arc::new(self.api.catalog(seller_id).await?);
        let mut slot = self.catalog.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            *slot = Some(Cached { seller_id: seller_id.to_string(), value: value.clone() });
        } else {
            debug!(seller_id, "Catalog fetch outlived an invalidation, not cached");
        }
        Ok(value)
    }

    pub async fn invalidate(&self) {
        let mut hierarchy = self.hierarchy.write().await;
        let mut catalog = self.catalog.write().await;
        self.generation.fetch_add(1, Ordering::SeqCst);
        *hierarchy = None;
        *catalog = None;
        debug!("Network cache invalidated");
    }

    pub async fn remove_downstream(&self, upstream_id: &str, downstream_id: &str) -> Result<NetworkEvent> {
        self.api.remove_downstream(upstream_id, downstream_id).await?;
        self.invalidate().await;
        info!(upstream_id, downstream_id, "Downstream seller removed");
        Ok(NetworkEvent::DownstreamRemoved { upstream_id: upstream_id.into(), downstream_id: downstream_id.into() })
    }

    /// Replaces the authorized territories of one relationship. Blank entries
    /// are dropped and duplicates collapsed; at least one must remain.
    pub async fn update_territories(&self, downstream_id: &str, names: &[String]) -> Result<(NetworkRelationship, NetworkEvent)> {
        let mut territories: Vec<Territory> = Vec::with_capacity(names.len());
        for name in names.iter().filter(|n| !n.trim().is_empty()) {
            let territory = Territory::new(name.as_str())?;
            if !territories.contains(&territory) {
                territories.push(territory);
            }
        }
        if territories.is_empty() {
            return Err(HierarchyError::validation("at least one territory is required"));
        }
        let rel = self.api.update_territories(downstream_id, &territories).await?;
        self.invalidate().await;
        info!(downstream_id, count = territories.len(), "Territories updated");
        Ok((rel, NetworkEvent::TerritoriesUpdated { downstream_id: downstream_id.into(), territories }))
    }

    pub async fn approve_seller(&self, seller_id: &str) -> Result<NetworkEvent> {
        self.api.approve_seller(seller_id).await?;
        self.invalidate().await;
        info!(seller_id, "Seller approved");
        Ok(NetworkEvent::SellerApproved { seller_id: seller_id.into() })
    }

    pub async fn reject_seller(&self, seller_id: &str, reason: Option<&str>) -> Result<NetworkEvent> {
        self.api.reject_seller(seller_id, reason).await?;
        self.invalidate().await;
        info!(seller_id, "Seller rejected");
        Ok(NetworkEvent::SellerRejected { seller_id: seller_id.into(), reason: reason.map(str::to_string) })
    }
}
