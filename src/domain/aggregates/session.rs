//! Assignment Session Aggregate
//!
//! One builder invocation: browse candidates, pick one, configure territories,
//! product pricing and contract terms, then commit a single "add downstream"
//! command. Only a committed session has a durable effect.
//!
//! ```text
//! Browsing --select--> Configuring --begin_submit--> Submitting --ok--> Committed
//!    |                     |  ^                          |
//!    +--cancel--+          |  +--------- err ------------+
//!               v          v
//!            Cancelled <-cancel
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::events::NetworkEvent;
use crate::domain::services::{CandidateSearch, NetworkRepository};
use crate::domain::value_objects::{Percentage, Price, Territory};
use crate::{
    AddDownstreamCommand, CandidatePage, HierarchyError, NetworkRelationship, Product, ProductAssignment, Result,
    SearchPage, Seller, SellerCategory,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState { Browsing, Configuring, Submitting, Committed, Cancelled }

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Browsing => "browsing",
            Self::Configuring => "configuring",
            Self::Submitting => "submitting",
            Self::Committed => "committed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Which tier is adding which; supplies the pricing defaults for new assignments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentRole { CompanyAddsDealer, DealerAddsWholesaler, WholesalerAddsTrader, TraderAddsStorekeeper }

impl AssignmentRole {
    pub fn for_upstream(category: SellerCategory) -> Option<Self> {
        match category {
            SellerCategory::Company => Some(Self::CompanyAddsDealer),
            SellerCategory::Dealer => Some(Self::DealerAddsWholesaler),
            SellerCategory::Wholesaler => Some(Self::WholesalerAddsTrader),
            SellerCategory::Trader => Some(Self::TraderAddsStorekeeper),
            SellerCategory::Storekeeper => None,
        }
    }

    pub fn upstream_category(&self) -> SellerCategory {
        match self {
            Self::CompanyAddsDealer => SellerCategory::Company,
            Self::DealerAddsWholesaler => SellerCategory::Dealer,
            Self::WholesalerAddsTrader => SellerCategory::Wholesaler,
            Self::TraderAddsStorekeeper => SellerCategory::Trader,
        }
    }

    pub fn downstream_category(&self) -> SellerCategory {
        match self {
            Self::CompanyAddsDealer => SellerCategory::Dealer,
            Self::DealerAddsWholesaler => SellerCategory::Wholesaler,
            Self::WholesalerAddsTrader => SellerCategory::Trader,
            Self::TraderAddsStorekeeper => SellerCategory::Storekeeper,
        }
    }

    /// Multiplier applied to the catalog price to get the default downstream price.
    pub fn discount_factor(&self) -> Decimal {
        match self {
            Self::TraderAddsStorekeeper => Decimal::new(9, 1),
            _ => Decimal::new(8, 1),
        }
    }

    pub fn default_stock_limit(&self) -> u32 {
        match self {
            Self::TraderAddsStorekeeper => 50,
            _ => 100,
        }
    }
}

/// Terms being configured for the selected candidate.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub candidate: Seller,
    pub territories: Vec<Territory>,
    pub products: Vec<ProductAssignment>,
    pub commission_margin: Percentage,
    pub contract_duration: u32,
    pub expiry_date: Option<NaiveDate>,
    #[serde(skip)]
    catalog_prices: HashMap<String, Price>,
}

impl Draft {
    fn new(candidate: Seller) -> Self {
        Self {
            candidate, territories: vec![], products: vec![], commission_margin: Percentage::zero(),
            contract_duration: 0, expiry_date: None, catalog_prices: HashMap::new(),
        }
    }

    fn product_mut(&mut self, product_id: &str) -> Result<&mut ProductAssignment> {
        self.products.iter_mut().find(|p| p.product_id == product_id)
            .ok_or_else(|| HierarchyError::NotFound(format!("product {product_id} is not assigned")))
    }

    fn to_command(&self) -> AddDownstreamCommand {
        AddDownstreamCommand {
            downstream_id: self.candidate.id.clone(),
            territories: self.territories.clone(),
            assigned_products: self.products.clone(),
            commission_margin: self.commission_margin.value(),
            expiry_date: self.expiry_date,
            contract_duration: (self.contract_duration > 0).then_some(self.contract_duration),
        }
    }
}

/// Edits to one product assignment, applied together or not at all.
/// `max_stock_limit: Some(None)` clears the cap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProductChanges {
    pub price: Option<Decimal>,
    pub commission_margin: Option<Decimal>,
    pub max_stock_limit: Option<Option<u32>>,
}

/// Edits to the relationship-level terms, applied together or not at all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TermsChanges {
    pub commission_margin: Option<Decimal>,
    pub contract_duration: Option<u32>,
    pub expiry_date: Option<Option<NaiveDate>>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentSession {
    id: Uuid,
    upstream_id: String,
    role: AssignmentRole,
    state: SessionState,
    query: Option<String>,
    candidates: Vec<Seller>,
    pagination: Option<SearchPage>,
    candidate_error: Option<String>,
    catalog: Vec<Product>,
    catalog_error: Option<String>,
    draft: Option<Draft>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<NetworkEvent>,
}

impl AssignmentSession {
    pub fn new(upstream_id: impl Into<String>, role: AssignmentRole) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), upstream_id: upstream_id.into(), role, state: SessionState::Browsing,
            query: None, candidates: vec![], pagination: None, candidate_error: None,
            catalog: vec![], catalog_error: None, draft: None, last_error: None,
            created_at: now, updated_at: now, events: vec![],
        }
    }

    /// Opens the builder: first candidate page (empty query) and the catalog are
    /// fetched together. Either failure is recorded on the session, not returned.
    pub async fn open(upstream_id: impl Into<String>, role: AssignmentRole, search: &CandidateSearch, network: &NetworkRepository) -> Self {
        let mut session = Self::new(upstream_id, role);
        let upstream = session.upstream_id.clone();
        let (candidates, catalog) = tokio::join!(search.search(&upstream, None, Some(1)), network.load_catalog(&upstream));
        session.apply_candidates(None, candidates);
        match catalog {
            Ok(products) => session.catalog = products.to_vec(),
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Catalog load failed");
                session.catalog_error = Some(e.to_string());
            }
        }
        session
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn upstream_id(&self) -> &str { &self.upstream_id }
    pub fn role(&self) -> AssignmentRole { self.role }
    pub fn state(&self) -> SessionState { self.state }
    pub fn candidates(&self) -> &[Seller] { &self.candidates }
    pub fn pagination(&self) -> Option<&SearchPage> { self.pagination.as_ref() }
    pub fn candidate_error(&self) -> Option<&str> { self.candidate_error.as_deref() }
    pub fn catalog(&self) -> &[Product] { &self.catalog }
    pub fn catalog_error(&self) -> Option<&str> { self.catalog_error.as_deref() }
    pub fn draft(&self) -> Option<&Draft> { self.draft.as_ref() }
    pub fn last_error(&self) -> Option<&str> { self.last_error.as_deref() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_closed(&self) -> bool { matches!(self.state, SessionState::Committed | SessionState::Cancelled) }

    /// Untouched for longer than `ttl`. A session with a submission in flight is never idle.
    pub fn is_idle(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.state != SessionState::Submitting && now - self.updated_at > ttl
    }

    pub async fn search(&mut self, search: &CandidateSearch, query: Option<&str>, page: Option<u32>) -> Result<()> {
        self.require(SessionState::Browsing, "search candidates")?;
        let result = search.search(&self.upstream_id, query, page).await;
        let err = result.as_ref().err().cloned();
        self.apply_candidates(query.map(str::to_string), result);
        err.map_or(Ok(()), Err)
    }

    pub async fn reload_catalog(&mut self, network: &NetworkRepository) -> Result<()> {
        if self.is_closed() || self.state == SessionState::Submitting {
            return Err(HierarchyError::InvalidTransition { action: "reload catalog", state: self.state });
        }
        match network.load_catalog(&self.upstream_id).await {
            Ok(products) => {
                self.catalog = products.to_vec();
                self.catalog_error = None;
                Ok(())
            }
            Err(e) => {
                self.catalog_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn select(&mut self, candidate_id: &str) -> Result<()> {
        self.require(SessionState::Browsing, "select a candidate")?;
        let candidate = self.candidates.iter().find(|c| c.id == candidate_id).cloned()
            .ok_or_else(|| HierarchyError::NotFound(format!("candidate {candidate_id}")))?;
        if candidate.category != self.role.downstream_category() {
            return Err(HierarchyError::validation(format!(
                "{} cannot be added as a {}", candidate.category, self.role.downstream_category()
            )));
        }
        self.draft = Some(Draft::new(candidate));
        self.state = SessionState::Configuring;
        self.touch();
        Ok(())
    }

    /// Returns whether the territory was added; blank names and exact duplicates are ignored.
    pub fn add_territory(&mut self, name: &str) -> Result<bool> {
        let draft = self.draft_mut("add a territory")?;
        if name.trim().is_empty() { return Ok(false); }
        let territory = Territory::new(name)?;
        if draft.territories.contains(&territory) { return Ok(false); }
        draft.territories.push(territory);
        self.touch();
        Ok(true)
    }

    pub fn remove_territory(&mut self, index: usize) -> Result<Option<Territory>> {
        let draft = self.draft_mut("remove a territory")?;
        if index >= draft.territories.len() { return Ok(None); }
        let removed = draft.territories.remove(index);
        self.touch();
        Ok(Some(removed))
    }

    /// Returns whether the product was added; a product already assigned is left as is.
    pub fn add_product(&mut self, product: &Product) -> Result<bool> {
        let role = self.role;
        let draft = self.draft_mut("add a product")?;
        if draft.products.iter().any(|p| p.product_id == product.id) { return Ok(false); }
        let catalog_price = Price::new(product.price)?;
        draft.products.push(ProductAssignment {
            product_id: product.id.clone(),
            downstream_price: catalog_price.discounted(role.discount_factor()).amount(),
            commission_margin: draft.commission_margin.value(),
            max_stock_limit: Some(role.default_stock_limit()),
        });
        draft.catalog_prices.insert(product.id.clone(), catalog_price);
        self.touch();
        Ok(true)
    }

    /// Adds a product from the session's loaded catalog.
    pub fn add_catalog_product(&mut self, product_id: &str) -> Result<bool> {
        self.draft_mut("add a product")?;
        let product = self.catalog.iter().find(|p| p.id == product_id).cloned()
            .ok_or_else(|| HierarchyError::NotFound(format!("product {product_id} is not in the catalog")))?;
        self.add_product(&product)
    }

    pub fn remove_product(&mut self, product_id: &str) -> Result<bool> {
        let draft = self.draft_mut("remove a product")?;
        let before = draft.products.len();
        draft.products.retain(|p| p.product_id != product_id);
        let removed = draft.products.len() != before;
        if removed {
            draft.catalog_prices.remove(product_id);
            self.touch();
        }
        Ok(removed)
    }

    /// Every field is checked before any is written. Price must be non-negative
    /// and no higher than the product's catalog price.
    pub fn update_product(&mut self, product_id: &str, changes: ProductChanges) -> Result<()> {
        let draft = self.draft_mut("update a product")?;
        let ceiling = draft.catalog_prices.get(product_id).copied();
        let price = match changes.price {
            Some(amount) => {
                let price = Price::new(amount)?;
                Some(match ceiling { Some(ceiling) => price.capped_at(ceiling)?, None => price })
            }
            None => None,
        };
        let commission = changes.commission_margin.map(Percentage::new).transpose()?;
        let assignment = draft.product_mut(product_id)?;
        if let Some(price) = price { assignment.downstream_price = price.amount(); }
        if let Some(pct) = commission { assignment.commission_margin = pct.value(); }
        if let Some(limit) = changes.max_stock_limit { assignment.max_stock_limit = limit; }
        self.touch();
        Ok(())
    }

    pub fn update_product_price(&mut self, product_id: &str, price: Decimal) -> Result<()> {
        self.update_product(product_id, ProductChanges { price: Some(price), ..Default::default() })
    }

    pub fn update_product_commission(&mut self, product_id: &str, pct: Decimal) -> Result<()> {
        self.update_product(product_id, ProductChanges { commission_margin: Some(pct), ..Default::default() })
    }

    pub fn update_product_stock_limit(&mut self, product_id: &str, limit: Option<u32>) -> Result<()> {
        self.update_product(product_id, ProductChanges { max_stock_limit: Some(limit), ..Default::default() })
    }

    /// A new global commission applies to products added afterwards; existing
    /// assignments keep their snapshot.
    pub fn update_terms(&mut self, changes: TermsChanges) -> Result<()> {
        let commission = changes.commission_margin.map(Percentage::new).transpose()?;
        let draft = self.draft_mut("update the terms")?;
        if let Some(pct) = commission { draft.commission_margin = pct; }
        if let Some(months) = changes.contract_duration { draft.contract_duration = months; }
        if let Some(date) = changes.expiry_date { draft.expiry_date = date; }
        self.touch();
        Ok(())
    }

    pub fn set_global_commission(&mut self, pct: Decimal) -> Result<()> {
        self.update_terms(TermsChanges { commission_margin: Some(pct), ..Default::default() })
    }

    pub fn set_contract_duration(&mut self, months: u32) -> Result<()> {
        self.update_terms(TermsChanges { contract_duration: Some(months), ..Default::default() })
    }

    pub fn set_expiry_date(&mut self, date: Option<NaiveDate>) -> Result<()> {
        self.update_terms(TermsChanges { expiry_date: Some(date), ..Default::default() })
    }

    /// Guards the draft and moves to `Submitting`. A failed guard leaves the
    /// session in `Configuring` and nothing is sent.
    pub fn begin_submit(&mut self) -> Result<AddDownstreamCommand> {
        let draft = self.draft_mut("submit")?;
        if draft.territories.is_empty() {
            return Err(HierarchyError::validation("at least one territory is required"));
        }
        if draft.products.is_empty() {
            return Err(HierarchyError::validation("at least one product is required"));
        }
        let command = draft.to_command();
        self.state = SessionState::Submitting;
        self.last_error = None;
        self.touch();
        Ok(command)
    }

    /// Records the marketplace's answer. Failure returns to `Configuring` with the draft intact.
    pub fn complete_submit(&mut self, outcome: Result<NetworkRelationship>) -> Result<NetworkRelationship> {
        self.require(SessionState::Submitting, "complete a submission")?;
        self.touch();
        match outcome {
            Ok(rel) => {
                self.state = SessionState::Committed;
                info!(session_id = %self.id, upstream_id = %self.upstream_id, downstream_id = %rel.downstream_id, "Downstream seller committed");
                self.raise_event(NetworkEvent::RelationshipAdded {
                    upstream_id: self.upstream_id.clone(),
                    downstream_id: rel.downstream_id.clone(),
                    category: rel.downstream_category,
                    products: rel.assigned_products.len(),
                });
                Ok(rel)
            }
            Err(e) => {
                self.state = SessionState::Configuring;
                warn!(session_id = %self.id, error = %e, "Submission failed");
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Sends the command and, once acknowledged, invalidates the network cache.
    /// If this future is dropped mid-flight the session falls back to `Configuring`.
    pub async fn submit(&mut self, network: &NetworkRepository) -> Result<NetworkRelationship> {
        let command = self.begin_submit()?;
        let upstream_id = self.upstream_id.clone();
        let guard = SubmitGuard(self);
        let outcome = network.api().add_downstream(&upstream_id, &command).await;
        let rel = guard.0.complete_submit(outcome)?;
        network.invalidate().await;
        Ok(rel)
    }

    /// Abandons an in-flight submission, leaving the draft editable again.
    pub fn interrupt_submit(&mut self) {
        if self.state == SessionState::Submitting {
            self.state = SessionState::Configuring;
            let err = HierarchyError::Transient("submission interrupted before the marketplace answered".into());
            warn!(session_id = %self.id, "Submission interrupted");
            self.last_error = Some(err.to_string());
            self.touch();
        }
    }

    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            SessionState::Browsing | SessionState::Configuring => {
                self.state = SessionState::Cancelled;
                self.touch();
                Ok(())
            }
            state => Err(HierarchyError::InvalidTransition { action: "cancel", state }),
        }
    }

    pub fn take_events(&mut self) -> Vec<NetworkEvent> { std::mem::take(&mut self.events) }

    fn apply_candidates(&mut self, query: Option<String>, result: Result<CandidatePage>) {
        match result {
            Ok(page) => {
                self.query = query;
                self.candidates = page.candidates;
                self.pagination = Some(page.pagination);
                self.candidate_error = None;
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "Candidate search failed");
                self.candidate_error = Some(e.to_string());
            }
        }
        self.touch();
    }

    fn require(&self, state: SessionState, action: &'static str) -> Result<()> {
        if self.state != state { return Err(HierarchyError::InvalidTransition { action, state: self.state }); }
        Ok(())
    }

    fn draft_mut(&mut self, action: &'static str) -> Result<&mut Draft> {
        match (self.state, self.draft.as_mut()) {
            (SessionState::Configuring, Some(draft)) => Ok(draft),
            (state, _) => Err(HierarchyError::InvalidTransition { action, state }),
        }
    }

    fn raise_event(&mut self, e: NetworkEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

struct SubmitGuard<'a>(&'a mut AssignmentSession);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) { self.0.interrupt_submit(); }
}
