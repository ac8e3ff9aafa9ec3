//! Marketplace REST client
//!
//! Thin reqwest wrapper: attaches the bearer token, maps HTTP status codes onto
//! [`HierarchyError`] and unwraps the `{ "data": ... }` envelope when present.
//! Nothing here retries; callers decide whether to re-trigger.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CandidateQuery, MarketplaceApi};
use crate::domain::aggregates::Hierarchy;
use crate::domain::value_objects::Territory;
use crate::identity::IdentityProvider;
use crate::{AddDownstreamCommand, CandidatePage, HierarchyError, NetworkRelationship, Product, Result};

pub struct HttpMarketplaceApi {
    client: Client,
    base_url: Url,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpMarketplaceApi {
    pub fn new(base_url: &str, timeout: Duration, identity: Arc<dyn IdentityProvider>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| HierarchyError::validation(format!("invalid marketplace URL {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(HierarchyError::validation(format!("marketplace URL {base_url} cannot be a base")));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HierarchyError::Transient(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, base_url, identity })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.identity.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_raw(&self, request: RequestBuilder) -> Result<String> {
        let response = self.authorize(request).send().await.map_err(transport_error)?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "Marketplace response received");
        let body = response.text().await.map_err(transport_error)?;
        if !status.is_success() {
            let err = classify(status, &body);
            warn!(status = status.as_u16(), error = %err, "Marketplace request failed");
            return Err(err);
        }
        Ok(body)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let body = self.send_raw(request).await?;
        decode(&body)
    }
}

#[async_trait]
impl MarketplaceApi for HttpMarketplaceApi {
    async fn hierarchy(&self, seller_id: &str) -> Result<Hierarchy> {
        self.send(self.client.get(self.endpoint(&["sellers", seller_id, "hierarchy"]))).await
    }

    async fn catalog(&self, seller_id: &str) -> Result<Vec<Product>> {
        self.send(self.client.get(self.endpoint(&["sellers", seller_id, "products"]))).await
    }

    async fn search_candidates(&self, query: &CandidateQuery) -> Result<CandidatePage> {
        let mut params = vec![("page", query.page.to_string()), ("limit", query.limit.to_string())];
        if let Some(q) = &query.query {
            params.push(("query", q.clone()));
        }
        let url = self.endpoint(&["sellers", &query.seller_id, "candidates"]);
        self.send(self.client.get(url).query(&params)).await
    }

    async fn add_downstream(&self, upstream_id: &str, command: &AddDownstreamCommand) -> Result<NetworkRelationship> {
        debug!(upstream_id, downstream_id = %command.downstream_id, "Adding downstream seller");
        self.send(self.client.post(self.endpoint(&["sellers", upstream_id, "network"])).json(command)).await
    }

    async fn remove_downstream(&self, upstream_id: &str, downstream_id: &str) -> Result<()> {
        let url = self.endpoint(&["sellers", upstream_id, "network", downstream_id]);
        self.send_raw(self.client.delete(url)).await.map(|_| ())
    }

    async fn update_territories(&self, downstream_id: &str, territories: &[Territory]) -> Result<NetworkRelationship> {
        let url = self.endpoint(&["network", downstream_id, "territories"]);
        self.send(self.client.put(url).json(&serde_json::json!({ "territories": territories }))).await
    }

    async fn approve_seller(&self, seller_id: &str) -> Result<()> {
        self.send_raw(self.client.post(self.endpoint(&["sellers", seller_id, "approve"]))).await.map(|_| ())
    }

    async fn reject_seller(&self, seller_id: &str, reason: Option<&str>) -> Result<()> {
        let url = self.endpoint(&["sellers", seller_id, "reject"]);
        self.send_raw(self.client.post(url).json(&serde_json::json!({ "reason": reason }))).await.map(|_| ())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload<T> {
    Wrapped { data: T },
    Bare(T),
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    match serde_json::from_str::<Payload<T>>(body) {
        Ok(Payload::Wrapped { data }) | Ok(Payload::Bare(data)) => Ok(data),
        Err(e) => Err(HierarchyError::Protocol(e.to_string())),
    }
}

fn transport_error(e: reqwest::Error) -> HierarchyError {
    if e.is_decode() {
        HierarchyError::Protocol(e.to_string())
    } else {
        HierarchyError::Transient(e.to_string())
    }
}

/// Maps a non-success status and its body onto the error taxonomy.
fn classify(status: StatusCode, body: &str) -> HierarchyError {
    let message = error_message(body).unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HierarchyError::Unauthorized,
        StatusCode::NOT_FOUND => HierarchyError::NotFound(message),
        StatusCode::CONFLICT => HierarchyError::Conflict(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => HierarchyError::Transient(message),
        s if s.is_server_error() => HierarchyError::Transient(message),
        _ => HierarchyError::Rejected(message),
    }
}

fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}
