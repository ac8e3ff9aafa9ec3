//! GoSeller Hierarchy Builder
//!
//! Client-side core for building a seller's downstream reseller network
//! (Company → Dealer → Wholesaler → Trader → Storekeeper).
//!
//! ## Features
//! - Cached view of the seller's network and product catalog
//! - Candidate search that never offers an already-linked seller
//! - Assignment sessions: territories, per-product pricing, contract terms
//! - Typed client for the marketplace REST API

pub mod api;
pub mod config;
pub mod domain;
pub mod identity;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::aggregates::SessionState;
use crate::domain::value_objects::Territory;

// =============================================================================
// Core Types
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SellerCategory {
    Company,
    Dealer,
    Wholesaler,
    Trader,
    Storekeeper,
}

impl SellerCategory {
    /// The tier this category is allowed to add to its network.
    pub fn downstream(&self) -> Option<SellerCategory> {
        match self {
            Self::Company => Some(Self::Dealer),
            Self::Dealer => Some(Self::Wholesaler),
            Self::Wholesaler => Some(Self::Trader),
            Self::Trader => Some(Self::Storekeeper),
            Self::Storekeeper => None,
        }
    }
}

impl fmt::Display for SellerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Company => "Company",
            Self::Dealer => "Dealer",
            Self::Wholesaler => "Wholesaler",
            Self::Trader => "Trader",
            Self::Storekeeper => "Storekeeper",
        };
        f.write_str(label)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SellerStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seller {
    pub id: String,
    pub name: String,
    pub shop_name: String,
    pub category: SellerCategory,
    #[serde(default)]
    pub status: SellerStatus,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub location: String,
}

/// A product from the upstream seller's own catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub stock: Option<u32>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAssignment {
    pub product_id: String,
    pub downstream_price: Decimal,
    pub commission_margin: Decimal,
    pub max_stock_limit: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRelationship {
    pub upstream_id: String,
    pub downstream_id: String,
    pub downstream_category: SellerCategory,
    pub authorized_territories: Vec<Territory>,
    pub assigned_products: Vec<ProductAssignment>,
    pub commission_margin: Decimal,
    #[serde(default)]
    pub contract_duration: Option<u32>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

impl NetworkRelationship {
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| today > expiry)
    }
}

/// Pagination cursor; `page` is 1-indexed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

impl SearchPage {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(u64::from(limit)) };
        Self { page: page.max(1), limit, total, pages }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CandidatePage {
    pub candidates: Vec<Seller>,
    pub pagination: SearchPage,
}

/// The single outbound command produced by a committed assignment session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddDownstreamCommand {
    pub downstream_id: String,
    pub territories: Vec<Territory>,
    pub assigned_products: Vec<ProductAssignment>,
    pub commission_margin: Decimal,
    pub expiry_date: Option<NaiveDate>,
    pub contract_duration: Option<u32>,
}

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HierarchyError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rejected by marketplace: {0}")]
    Rejected(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Malformed marketplace response: {0}")]
    Protocol(String),

    #[error("Cannot {action} while session is {state}")]
    InvalidTransition { action: &'static str, state: SessionState },
}

impl HierarchyError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, HierarchyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_page_rounds_up() {
        let page = SearchPage::new(1, 10, 21);
        assert_eq!(page.pages, 3);
        assert_eq!(SearchPage::new(0, 10, 0).page, 1);
        assert_eq!(SearchPage::new(2, 0, 5).pages, 0);
    }

    #[test]
    fn test_category_chain() {
        assert_eq!(SellerCategory::Dealer.downstream(), Some(SellerCategory::Wholesaler));
        assert_eq!(SellerCategory::Storekeeper.downstream(), None);
    }

    #[test]
    fn test_relationship_expiry() {
        let mut rel = NetworkRelationship {
            upstream_id: "U".into(), downstream_id: "W".into(), downstream_category: SellerCategory::Wholesaler,
            authorized_territories: vec![], assigned_products: vec![], commission_margin: Decimal::ZERO,
            contract_duration: None, expiry_date: None,
        };
        let today = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        assert!(!rel.is_expired(today));
        rel.expiry_date = NaiveDate::from_ymd_opt(2026, 5, 1);
        assert!(!rel.is_expired(today));
        rel.expiry_date = NaiveDate::from_ymd_opt(2026, 4, 30);
        assert!(rel.is_expired(today));
    }

    #[test]
    fn test_seller_wire_format() {
        let json = r#"{"id":"s1","name":"Ali","shopName":"Ali Traders","category":"Wholesaler","status":"approved","verified":true,"location":"Lahore"}"#;
        let seller: Seller = serde_json::from_str(json).unwrap();
        assert_eq!(seller.category, SellerCategory::Wholesaler);
        assert_eq!(seller.status, SellerStatus::Approved);
        assert!(seller.verified);
    }
}
