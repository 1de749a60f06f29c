//! Minimal REST front-end over the token vending machine, gated behind the
//! `server` feature — not part of the core library's scope (spec §1 lists
//! CLI/web front-ends as out-of-scope external collaborators), but kept as
//! a runnable demonstration of the RPC interceptor surface, the way the
//! teacher ships its own demo binary.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use tvm::config::VendingConfig;
use tvm::error::{Result, TvmError};
use tvm::identity::{RequestContext, StaticEmailProvider};
use tvm::scope::{EntityScope, EntityType, Scope};
use tvm::store::lmdb::LmdbQuerier;
use tvm::vending::{Principal, VendingMachine};

type Store = LmdbQuerier;

struct AppState {
    machine: VendingMachine<Store>,
}

#[derive(Serialize)]
struct R<T> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn ok<T: Serialize>(v: T) -> Json<R<T>> {
    Json(R { ok: true, data: Some(v), error: None })
}

fn wrap<T: Serialize>(r: Result<T>) -> Json<R<T>> {
    match r {
        Ok(v) => ok(v),
        Err(e) => Json(R { ok: false, data: None, error: Some(e.to_string()) }),
    }
}

#[derive(Deserialize)]
struct EntityRef {
    entity_type: EntityType,
    entity_id: i64,
}

#[derive(Deserialize)]
struct ScopeRef {
    entity_type: EntityType,
    entity_id: i64,
    scope: Scope,
}

impl From<ScopeRef> for EntityScope {
    fn from(s: ScopeRef) -> Self {
        EntityScope::new(s.entity_type, s.entity_id, s.scope)
    }
}

#[derive(Deserialize)]
struct ExchangeReq {
    email: String,
}

async fn h_exchange(State(state): State<Arc<AppState>>, Json(r): Json<ExchangeReq>) -> Json<R<String>> {
    let provider = StaticEmailProvider::new(r.email);
    let cancellation = CancellationToken::new();
    wrap(state.machine.exchange(&provider, &RequestContext::default(), &cancellation).await)
}

#[derive(Deserialize)]
struct IssueReq {
    name: String,
    requesting_user_id: i64,
    target: EntityRef,
    requested_scopes: Vec<ScopeRef>,
    duration_secs: u64,
}

async fn h_issue(State(state): State<Arc<AppState>>, Json(r): Json<IssueReq>) -> Json<R<String>> {
    let cancellation = CancellationToken::new();
    wrap(
        state
            .machine
            .issue(
                &r.name,
                r.requesting_user_id,
                Principal::new(r.target.entity_type, r.target.entity_id),
                r.requested_scopes.into_iter().map(Into::into).collect(),
                std::time::Duration::from_secs(r.duration_secs),
                &cancellation,
            )
            .await,
    )
}

#[derive(Deserialize)]
struct VerifyReq {
    token: String,
    required: ScopeRef,
}

async fn h_verify(State(state): State<Arc<AppState>>, Json(r): Json<VerifyReq>) -> Json<R<bool>> {
    let cancellation = CancellationToken::new();
    wrap(
        state
            .machine
            .verify(&r.token, r.required.into(), &cancellation)
            .await
            .map(|()| true)
            .or_else(|e| if matches!(e, TvmError::InsufficientPermissions) { Ok(false) } else { Err(e) }),
    )
}

#[derive(Deserialize)]
struct RevokeReq {
    token: String,
}

async fn h_revoke(State(state): State<Arc<AppState>>, Json(r): Json<RevokeReq>) -> Json<R<bool>> {
    let cancellation = CancellationToken::new();
    wrap(state.machine.revoke(&r.token, &cancellation).await.map(|_| true))
}

#[derive(Deserialize)]
struct ListQuery {
    entity_type: EntityType,
    entity_id: i64,
}

async fn h_list(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Json<R<Vec<String>>> {
    let cancellation = CancellationToken::new();
    wrap(
        state
            .machine
            .list_tokens_for_entity(q.entity_type, q.entity_id, &cancellation)
            .await
            .map(|heads| heads.into_iter().map(|h| h.name).collect()),
    )
}

async fn h_index() -> Html<&'static str> {
    Html("<h1>tvm-server</h1><p>see /exchange /issue /verify /revoke /list</p>")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let db = std::env::var("TVM_DB").unwrap_or_else(|_| "./data/tvm.mdb".into());
    let store = Arc::new(LmdbQuerier::open(&db).expect("failed to open store"));

    let max_token_duration_secs: u64 = std::env::var("TVM_MAX_TOKEN_DURATION_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(365 * 24 * 3600);
    let config = VendingConfig { max_token_duration_secs, ..VendingConfig::default() };

    let state = Arc::new(AppState { machine: VendingMachine::new(store, config) });

    let app = Router::new()
        .route("/", get(h_index))
        .route("/exchange", post(h_exchange))
        .route("/issue", post(h_issue))
        .route("/verify", post(h_verify))
        .route("/revoke", post(h_revoke))
        .route("/list", get(h_list))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let port: u16 = std::env::var("PORT").unwrap_or_else(|_| "3000".into()).parse().unwrap();
    println!("tvm-server at http://localhost:{port}");
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await.unwrap();
    axum::serve(listener, app).await.ok();
}
