//! Network change events
use crate::domain::value_objects::Territory;
use crate::SellerCategory;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NetworkEvent {
    #[serde(rename_all = "camelCase")]
    RelationshipAdded { upstream_id: String, downstream_id: String, category: SellerCategory, products: usize },
    #[serde(rename_all = "camelCase")]
    DownstreamRemoved { upstream_id: String, downstream_id: String },
    #[serde(rename_all = "camelCase")]
    TerritoriesUpdated { downstream_id: String, territories: Vec<Territory> },
    #[serde(rename_all = "camelCase")]
    SellerApproved { seller_id: String },
    #[serde(rename_all = "camelCase")]
    SellerRejected { seller_id: String, reason: Option<String> },
}

impl NetworkEvent {
    /// NATS subject the event is published under.
    pub fn subject(&self) -> String {
        let kind = match self {
            Self::RelationshipAdded { .. } => "relationship_added",
            Self::DownstreamRemoved { .. } => "downstream_removed",
            Self::TerritoriesUpdated { .. } => "territories_updated",
            Self::SellerApproved { .. } => "seller_approved",
            Self::SellerRejected { .. } => "seller_rejected",
        };
        format!("goseller.network.{}", kind)
    }
}
