//! Hierarchy Aggregate

use serde::{Deserialize, Serialize};
use crate::{Seller, SellerCategory, SellerStatus};

/// A seller's downstream network, grouped by tier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    #[serde(rename = "self")]
    pub owner: Seller,
    #[serde(default)]
    pub dealers: Vec<Seller>,
    #[serde(default)]
    pub wholesalers: Vec<Seller>,
    #[serde(default)]
    pub traders: Vec<Seller>,
    #[serde(default)]
    pub storekeepers: Vec<Seller>,
}

impl Hierarchy {
    pub fn new(owner: Seller) -> Self {
        Self { owner, dealers: vec![], wholesalers: vec![], traders: vec![], storekeepers: vec![] }
    }

    pub fn owner_id(&self) -> &str { &self.owner.id }

    pub fn by_category(&self, category: SellerCategory) -> &[Seller] {
        match category {
            SellerCategory::Dealer => &self.dealers,
            SellerCategory::Wholesaler => &self.wholesalers,
            SellerCategory::Trader => &self.traders,
            SellerCategory::Storekeeper => &self.storekeepers,
            SellerCategory::Company => &[],
        }
    }

    /// Adds a downstream member to the list for its category. Companies have no list and are ignored.
    pub fn insert(&mut self, seller: Seller) {
        if self.contains(&seller.id) { return; }
        let list = match seller.category {
            SellerCategory::Dealer => &mut self.dealers,
            SellerCategory::Wholesaler => &mut self.wholesalers,
            SellerCategory::Trader => &mut self.traders,
            SellerCategory::Storekeeper => &mut self.storekeepers,
            SellerCategory::Company => return,
        };
        list.push(seller);
    }

    pub fn members(&self) -> impl Iterator<Item = &Seller> {
        self.dealers.iter().chain(&self.wholesalers).chain(&self.traders).chain(&self.storekeepers)
    }

    pub fn contains(&self, seller_id: &str) -> bool { self.members().any(|s| s.id == seller_id) }

    /// Members still awaiting marketplace approval.
    pub fn pending(&self) -> Vec<&Seller> {
        self.members().filter(|s| s.status == SellerStatus::Pending).collect()
    }

    pub fn len(&self) -> usize { self.members().count() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
}
