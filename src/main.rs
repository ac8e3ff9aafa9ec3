//! GoSeller Hierarchy Builder - JSON service in front of the marketplace API

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, routing::{delete, get, post, put}, Json, Router};
use chrono::NaiveDate;
use goseller_hierarchy::api::http::HttpMarketplaceApi;
use goseller_hierarchy::config::Config;
use goseller_hierarchy::domain::aggregates::{AssignmentRole, AssignmentSession, Hierarchy, ProductChanges, TermsChanges};
use goseller_hierarchy::domain::events::NetworkEvent;
use goseller_hierarchy::domain::services::{CandidateSearch, NetworkRepository};
use goseller_hierarchy::identity::{IdentityProvider, StaticIdentity};
use goseller_hierarchy::{HierarchyError, NetworkRelationship, Product};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

type SessionHandle = Arc<Mutex<AssignmentSession>>;
type Sessions = Arc<RwLock<HashMap<Uuid, SessionHandle>>>;
type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    network: Arc<NetworkRepository>,
    search: CandidateSearch,
    identity: Arc<dyn IdentityProvider>,
    sessions: Sessions,
    nats: Option<async_nats::Client>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();

    let config = Config::from_env()?;
    let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentity::new(config.seller_id.clone(), config.api_token.clone()));
    let api = Arc::new(HttpMarketplaceApi::new(&config.api_url, config.request_timeout, identity.clone())?);
    let network = Arc::new(NetworkRepository::new(api));
    let search = CandidateSearch::new(network.clone());
    let nats = match config.nats_url.as_deref() {
        Some(url) => match async_nats::connect(url).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, network events will not be published"); None }
        },
        None => None,
    };
    let state = AppState { network, search, identity, sessions: Arc::new(RwLock::new(HashMap::new())), nats };
    tokio::spawn(sweep_idle_sessions(state.sessions.clone(), config.session_ttl));

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "goseller-hierarchy"})) }))
        .route("/api/v1/hierarchy", get(get_hierarchy))
        .route("/api/v1/catalog", get(get_catalog))
        .route("/api/v1/builder/sessions", post(open_session))
        .route("/api/v1/builder/sessions/:id", get(get_session).delete(cancel_session))
        .route("/api/v1/builder/sessions/:id/candidates", get(search_candidates))
        .route("/api/v1/builder/sessions/:id/select", post(select_candidate))
        .route("/api/v1/builder/sessions/:id/territories", post(add_territory))
        .route("/api/v1/builder/sessions/:id/territories/:index", delete(remove_territory))
        .route("/api/v1/builder/sessions/:id/products", post(add_product))
        .route("/api/v1/builder/sessions/:id/products/:product_id", put(update_product).delete(remove_product))
        .route("/api/v1/builder/sessions/:id/terms", put(update_terms))
        .route("/api/v1/builder/sessions/:id/submit", post(submit_session))
        .route("/api/v1/network/:downstream_id", delete(remove_downstream))
        .route("/api/v1/network/:downstream_id/territories", put(update_territories))
        .route("/api/v1/sellers/:id/approve", post(approve_seller))
        .route("/api/v1/sellers/:id/reject", post(reject_seller))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("GoSeller hierarchy builder listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

fn api_error(e: HierarchyError) -> ApiError {
    let status = match &e {
        HierarchyError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        HierarchyError::NotFound(_) => StatusCode::NOT_FOUND,
        HierarchyError::Unauthorized => StatusCode::UNAUTHORIZED,
        HierarchyError::Conflict(_) | HierarchyError::InvalidTransition { .. } => StatusCode::CONFLICT,
        HierarchyError::Rejected(_) => StatusCode::BAD_REQUEST,
        HierarchyError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        HierarchyError::Protocol(_) => StatusCode::BAD_GATEWAY,
    };
    (status, e.to_string())
}

fn invalid(e: validator::ValidationErrors) -> ApiError { (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()) }

fn current_seller(s: &AppState) -> Result<String, ApiError> {
    s.identity.current_seller_id().map_err(|e| api_error(e.into()))
}

async fn session(s: &AppState, id: Uuid) -> Result<SessionHandle, ApiError> {
    s.sessions.read().await.get(&id).cloned().ok_or((StatusCode::NOT_FOUND, "Session not found".to_string()))
}

async fn sweep_idle_sessions(sessions: Sessions, ttl: std::time::Duration) {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        tracing::warn!(?ttl, "Session TTL out of range, idle sessions will not be swept");
        return;
    };
    let mut tick = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        tick.tick().await;
        let now = chrono::Utc::now();
        let mut sessions = sessions.write().await;
        let before = sessions.len();
        // A locked session is in use right now, so it is not idle.
        sessions.retain(|_, handle| handle.try_lock().map_or(true, |session| !session.is_idle(now, ttl)));
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "Idle builder sessions dropped");
        }
    }
}

async fn publish(nats: &Option<async_nats::Client>, events: Vec<NetworkEvent>) {
    let Some(client) = nats else { return };
    for event in events {
        let payload = match serde_json::to_vec(&event) { Ok(p) => p, Err(e) => { tracing::warn!(error = %e, "Event serialization failed"); continue } };
        if let Err(e) = client.publish(event.subject(), payload.into()).await {
            tracing::warn!(subject = %event.subject(), error = %e, "Event publish failed");
        }
    }
}

async fn get_hierarchy(State(s): State<AppState>) -> Result<Json<Hierarchy>, ApiError> {
    let seller_id = current_seller(&s)?;
    let h = s.network.load_hierarchy(&seller_id).await.map_err(api_error)?;
    Ok(Json(Hierarchy::clone(&h)))
}

async fn get_catalog(State(s): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    let seller_id = current_seller(&s)?;
    let c = s.network.load_catalog(&seller_id).await.map_err(api_error)?;
    Ok(Json(c.to_vec()))
}

#[derive(Debug, Default, Deserialize)] #[serde(rename_all = "camelCase")] pub struct OpenSessionRequest { pub role: Option<AssignmentRole> }

async fn open_session(State(s): State<AppState>, Json(r): Json<OpenSessionRequest>) -> Result<(StatusCode, Json<AssignmentSession>), ApiError> {
    let seller_id = current_seller(&s)?;
    let owner = s.network.load_hierarchy(&seller_id).await.map_err(api_error)?.owner.category;
    let role = match r.role {
        Some(role) if role.upstream_category() == owner => role,
        Some(role) => return Err(api_error(HierarchyError::validation(format!("a {} cannot act as {:?}", owner, role)))),
        None => AssignmentRole::for_upstream(owner).ok_or_else(|| api_error(HierarchyError::validation(format!("a {} has no downstream tier", owner))))?,
    };
    let session = AssignmentSession::open(seller_id, role, &s.search, &s.network).await;
    s.sessions.write().await.insert(session.id(), Arc::new(Mutex::new(session.clone())));
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<AssignmentSession>, ApiError> {
    let handle = session(&s, id).await?;
    let snapshot = handle.lock().await.clone();
    Ok(Json(snapshot))
}

async fn cancel_session(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    let handle = session(&s, id).await?;
    handle.lock().await.cancel().map_err(api_error)?;
    s.sessions.write().await.remove(&id);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct SearchParams { #[validate(length(max = 100))] pub q: Option<String>, #[validate(range(min = 1))] pub page: Option<u32> }

async fn search_candidates(State(s): State<AppState>, Path(id): Path<Uuid>, Query(p): Query<SearchParams>) -> Result<Json<AssignmentSession>, ApiError> {
    p.validate().map_err(invalid)?;
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    session.search(&s.search, p.q.as_deref(), p.page).await.map_err(api_error)?;
    Ok(Json(session.clone()))
}

#[derive(Debug, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct SelectRequest { #[validate(length(min = 1))] pub candidate_id: String }

async fn select_candidate(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<SelectRequest>) -> Result<Json<AssignmentSession>, ApiError> {
    r.validate().map_err(invalid)?;
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    session.select(&r.candidate_id).map_err(api_error)?;
    Ok(Json(session.clone()))
}

#[derive(Debug, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct TerritoryRequest { #[validate(length(max = 120))] pub name: String }

async fn add_territory(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<TerritoryRequest>) -> Result<Json<AssignmentSession>, ApiError> {
    r.validate().map_err(invalid)?;
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    session.add_territory(&r.name).map_err(api_error)?;
    Ok(Json(session.clone()))
}

async fn remove_territory(State(s): State<AppState>, Path((id, index)): Path<(Uuid, usize)>) -> Result<Json<AssignmentSession>, ApiError> {
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    session.remove_territory(index).map_err(api_error)?;
    Ok(Json(session.clone()))
}

#[derive(Debug, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct AddProductRequest { #[validate(length(min = 1))] pub product_id: String }

async fn add_product(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<AddProductRequest>) -> Result<Json<AssignmentSession>, ApiError> {
    r.validate().map_err(invalid)?;
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    session.add_catalog_product(&r.product_id).map_err(api_error)?;
    Ok(Json(session.clone()))
}

#[derive(Debug, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct UpdateProductRequest { pub price: Option<Decimal>, pub commission_margin: Option<Decimal>, #[validate(range(min = 1))] pub max_stock_limit: Option<u32>, #[serde(default)] pub clear_stock_limit: bool }

async fn update_product(State(s): State<AppState>, Path((id, product_id)): Path<(Uuid, String)>, Json(r): Json<UpdateProductRequest>) -> Result<Json<AssignmentSession>, ApiError> {
    r.validate().map_err(invalid)?;
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    let max_stock_limit = if r.clear_stock_limit { Some(None) } else { r.max_stock_limit.map(Some) };
    let changes = ProductChanges { price: r.price, commission_margin: r.commission_margin, max_stock_limit };
    session.update_product(&product_id, changes).map_err(api_error)?;
    Ok(Json(session.clone()))
}

async fn remove_product(State(s): State<AppState>, Path((id, product_id)): Path<(Uuid, String)>) -> Result<Json<AssignmentSession>, ApiError> {
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    session.remove_product(&product_id).map_err(api_error)?;
    Ok(Json(session.clone()))
}

#[derive(Debug, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct TermsRequest { pub commission_margin: Option<Decimal>, #[validate(range(max = 600))] pub contract_duration: Option<u32>, pub expiry_date: Option<NaiveDate>, #[serde(default)] pub clear_expiry: bool }

async fn update_terms(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<TermsRequest>) -> Result<Json<AssignmentSession>, ApiError> {
    r.validate().map_err(invalid)?;
    let handle = session(&s, id).await?;
    let mut session = handle.lock().await;
    let expiry_date = if r.clear_expiry { Some(None) } else { r.expiry_date.map(Some) };
    let changes = TermsChanges { commission_margin: r.commission_margin, contract_duration: r.contract_duration, expiry_date };
    session.update_terms(changes).map_err(api_error)?;
    Ok(Json(session.clone()))
}

async fn submit_session(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<(StatusCode, Json<NetworkRelationship>), ApiError> {
    let handle = session(&s, id).await?;
    // The session lock is released while the command is in flight; other calls see `Submitting`.
    let (upstream_id, command) = {
        let mut session = handle.lock().await;
        let command = session.begin_submit().map_err(api_error)?;
        (session.upstream_id().to_string(), command)
    };
    // Spawned so a client disconnect cannot strand the session in `Submitting`.
    let task = tokio::spawn({
        let (s, handle) = (s.clone(), handle.clone());
        async move {
            let outcome = s.network.api().add_downstream(&upstream_id, &command).await;
            let (rel, events) = {
                let mut session = handle.lock().await;
                let rel = session.complete_submit(outcome)?;
                (rel, session.take_events())
            };
            s.network.invalidate().await;
            s.sessions.write().await.remove(&id);
            publish(&s.nats, events).await;
            Ok::<_, HierarchyError>(rel)
        }
    });
    match task.await {
        Ok(outcome) => outcome.map(|rel| (StatusCode::CREATED, Json(rel))).map_err(api_error),
        Err(e) => {
            handle.lock().await.interrupt_submit();
            tracing::error!(session_id = %id, error = %e, "Submission task failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Submission failed".to_string()))
        }
    }
}

async fn remove_downstream(State(s): State<AppState>, Path(downstream_id): Path<String>) -> Result<StatusCode, ApiError> {
    let seller_id = current_seller(&s)?;
    let event = s.network.remove_downstream(&seller_id, &downstream_id).await.map_err(api_error)?;
    publish(&s.nats, vec![event]).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct TerritoriesRequest { #[validate(length(min = 1, max = 200))] pub territories: Vec<String> }

async fn update_territories(State(s): State<AppState>, Path(downstream_id): Path<String>, Json(r): Json<TerritoriesRequest>) -> Result<Json<NetworkRelationship>, ApiError> {
    r.validate().map_err(invalid)?;
    current_seller(&s)?;
    let (rel, event) = s.network.update_territories(&downstream_id, &r.territories).await.map_err(api_error)?;
    publish(&s.nats, vec![event]).await;
    Ok(Json(rel))
}

async fn approve_seller(State(s): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    current_seller(&s)?;
    let event = s.network.approve_seller(&id).await.map_err(api_error)?;
    publish(&s.nats, vec![event]).await;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize, Validate)] #[serde(rename_all = "camelCase")] pub struct RejectRequest { #[validate(length(max = 500))] pub reason: Option<String> }

async fn reject_seller(State(s): State<AppState>, Path(id): Path<String>, Json(r): Json<RejectRequest>) -> Result<StatusCode, ApiError> {
    r.validate().map_err(invalid)?;
    current_seller(&s)?;
    let event = s.network.reject_seller(&id, r.reason.as_deref()).await.map_err(api_error)?;
    publish(&s.nats, vec![event]).await;
    Ok(StatusCode::NO_CONTENT)
}
