//! In-memory marketplace used by the repository, search and session tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{CandidateQuery, MarketplaceApi};
use crate::domain::aggregates::Hierarchy;
use crate::domain::value_objects::Territory;
use crate::{
    AddDownstreamCommand, CandidatePage, HierarchyError, NetworkRelationship, Product, Result, SearchPage, Seller,
    SellerCategory, SellerStatus,
};

#[derive(Default)]
struct State {
    sellers: HashMap<String, Seller>,
    catalogs: HashMap<String, Vec<Product>>,
    relationships: Vec<NetworkRelationship>,
    fail_add: Option<HierarchyError>,
    fail_catalog: Option<HierarchyError>,
    fail_hierarchy: Option<HierarchyError>,
    hierarchy_gate: Option<Arc<Semaphore>>,
    add_delay: Option<Duration>,
}

#[derive(Default)]
pub(crate) struct InMemoryMarketplace {
    state: Mutex<State>,
    /// When set, search also returns sellers already linked to the caller.
    pub leak_linked: bool,
    pub hierarchy_calls: AtomicUsize,
    pub catalog_calls: AtomicUsize,
    pub add_calls: AtomicUsize,
    pub last_command: Mutex<Option<AddDownstreamCommand>>,
}

pub(crate) fn seller(id: &str, category: SellerCategory) -> Seller {
    Seller {
        id: id.into(),
        name: format!("{id} name"),
        shop_name: format!("{id} shop"),
        category,
        status: SellerStatus::Approved,
        verified: true,
        location: "Lahore".into(),
    }
}

pub(crate) fn product(id: &str, price: rust_decimal::Decimal) -> Product {
    Product { id: id.into(), name: format!("{id} product"), price, stock: Some(500), category: None }
}

impl InMemoryMarketplace {
    pub fn with_sellers(sellers: impl IntoIterator<Item = Seller>) -> Self {
        let market = Self::default();
        {
            let mut state = market.state.lock().unwrap();
            for s in sellers {
                state.sellers.insert(s.id.clone(), s);
            }
        }
        market
    }

    pub fn leaking(mut self) -> Self {
        self.leak_linked = true;
        self
    }

    pub fn set_catalog(&self, seller_id: &str, products: Vec<Product>) {
        self.state.lock().unwrap().catalogs.insert(seller_id.into(), products);
    }

    pub fn link(&self, upstream_id: &str, downstream_id: &str) {
        let mut state = self.state.lock().unwrap();
        let category = state.sellers[downstream_id].category;
        state.relationships.push(NetworkRelationship {
            upstream_id: upstream_id.into(),
            downstream_id: downstream_id.into(),
            downstream_category: category,
            authorized_territories: vec![],
            assigned_products: vec![],
            commission_margin: rust_decimal::Decimal::ZERO,
            contract_duration: None,
            expiry_date: None,
        });
    }

    pub fn fail_next_add(&self, err: HierarchyError) { self.state.lock().unwrap().fail_add = Some(err); }
    pub fn fail_catalog(&self, err: HierarchyError) { self.state.lock().unwrap().fail_catalog = Some(err); }
    pub fn fail_hierarchy(&self, err: Option<HierarchyError>) { self.state.lock().unwrap().fail_hierarchy = err; }

    /// Hierarchy reads build their answer, then wait for a permit on the returned gate.
    pub fn hold_hierarchy(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state.lock().unwrap().hierarchy_gate = Some(gate.clone());
        gate
    }

    pub fn release_hierarchy(&self) { self.state.lock().unwrap().hierarchy_gate = None; }

    /// `add_downstream` sleeps this long before touching any state.
    pub fn delay_add(&self, delay: Option<Duration>) { self.state.lock().unwrap().add_delay = delay; }

    pub fn relationships(&self) -> Vec<NetworkRelationship> { self.state.lock().unwrap().relationships.clone() }

    fn linked(state: &State, upstream_id: &str, downstream_id: &str) -> bool {
        state.relationships.iter().any(|r| r.upstream_id == upstream_id && r.downstream_id == downstream_id)
    }
}

#[async_trait]
impl MarketplaceApi for InMemoryMarketplace {
    async fn hierarchy(&self, seller_id: &str) -> Result<Hierarchy> {
        self.hierarchy_calls.fetch_add(1, Ordering::SeqCst);
        let (result, gate) = {
            let state = self.state.lock().unwrap();
            let result = match &state.fail_hierarchy {
                Some(err) => Err(err.clone()),
                None => state.sellers.get(seller_id).cloned()
                    .ok_or_else(|| HierarchyError::NotFound(seller_id.into()))
                    .map(|owner| {
                        let mut hierarchy = Hierarchy::new(owner);
                        for rel in state.relationships.iter().filter(|r| r.upstream_id == seller_id) {
                            if let Some(s) = state.sellers.get(&rel.downstream_id) {
                                hierarchy.insert(s.clone());
                            }
                        }
                        hierarchy
                    }),
            };
            (result, state.hierarchy_gate.clone())
        };
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.unwrap();
        }
        result
    }

    async fn catalog(&self, seller_id: &str) -> Result<Vec<Product>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_catalog.take() {
            return Err(err);
        }
        Ok(state.catalogs.get(seller_id).cloned().unwrap_or_default())
    }

    async fn search_candidates(&self, query: &CandidateQuery) -> Result<CandidatePage> {
        let state = self.state.lock().unwrap();
        let owner = state.sellers.get(&query.seller_id).ok_or_else(|| HierarchyError::NotFound(query.seller_id.clone()))?;
        let wanted = owner.category.downstream();
        let needle = query.query.as_deref().map(str::to_lowercase);
        let mut matches: Vec<Seller> = state
            .sellers
            .values()
            .filter(|s| Some(s.category) == wanted)
            .filter(|s| self.leak_linked || !Self::linked(&state, &query.seller_id, &s.id))
            .filter(|s| match &needle {
                Some(n) => [&s.name, &s.shop_name, &s.location].iter().any(|f| f.to_lowercase().contains(n.as_str())),
                None => true,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        let total = matches.len() as u64;
        let start = ((query.page - 1) * query.limit) as usize;
        let candidates = matches.into_iter().skip(start).take(query.limit as usize).collect();
        Ok(CandidatePage { candidates, pagination: SearchPage::new(query.page, query.limit, total) })
    }

    async fn add_downstream(&self, upstream_id: &str, command: &AddDownstreamCommand) -> Result<NetworkRelationship> {
        self.add_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_command.lock().unwrap() = Some(command.clone());
        let delay = self.state.lock().unwrap().add_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.fail_add.take() {
            return Err(err);
        }
        if Self::linked(&state, upstream_id, &command.downstream_id) {
            return Err(HierarchyError::Conflict(format!("{} already linked", command.downstream_id)));
        }
        let downstream = state
            .sellers
            .get(&command.downstream_id)
            .ok_or_else(|| HierarchyError::NotFound(command.downstream_id.clone()))?;
        let rel = NetworkRelationship {
            upstream_id: upstream_id.into(),
            downstream_id: command.downstream_id.clone(),
            downstream_category: downstream.category,
            authorized_territories: command.territories.clone(),
            assigned_products: command.assigned_products.clone(),
            commission_margin: command.commission_margin,
            contract_duration: command.contract_duration,
            expiry_date: command.expiry_date,
        };
        state.relationships.push(rel.clone());
        Ok(rel)
    }

    async fn remove_downstream(&self, upstream_id: &str, downstream_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.relationships.len();
        state.relationships.retain(|r| !(r.upstream_id == upstream_id && r.downstream_id == downstream_id));
        if state.relationships.len() == before {
            return Err(HierarchyError::NotFound(downstream_id.into()));
        }
        Ok(())
    }

    async fn update_territories(&self, downstream_id: &str, territories: &[Territory]) -> Result<NetworkRelationship> {
        let mut state = self.state.lock().unwrap();
        let rel = state
            .relationships
            .iter_mut()
            .find(|r| r.downstream_id == downstream_id)
            .ok_or_else(|| HierarchyError::NotFound(downstream_id.into()))?;
        rel.authorized_territories = territories.to_vec();
        Ok(rel.clone())
    }

    async fn approve_seller(&self, seller_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let s = state.sellers.get_mut(seller_id).ok_or_else(|| HierarchyError::NotFound(seller_id.into()))?;
        s.status = SellerStatus::Approved;
        Ok(())
    }

    async fn reject_seller(&self, seller_id: &str, _reason: Option<&str>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let s = state.sellers.get_mut(seller_id).ok_or_else(|| HierarchyError::NotFound(seller_id.into()))?;
        s.status = SellerStatus::Rejected;
        Ok(())
    }
}
