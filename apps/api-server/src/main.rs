//! api-server — Local development HTTP API for the questionnaire responses workspace.
//!
//! Exposes the `questionnaire_responses` resource:
//! - `GET /questionnaire_responses/:id` — stored document or 404.
//! - `POST /questionnaire_responses` — store (create or replace) a JSON document.
//! - `DELETE /questionnaire_responses/:id` — remove the row; absent ids succeed.
//!
//! Storage: In-memory, SQLite (file, `sqlite` feature, default) or DynamoDB
//! (`dynamo` feature). CORS: Configurable via CORS_ALLOW_ORIGIN.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # against DynamoDB
//! STORAGE_PROVIDER=dynamo \
//! DYNAMO_TABLE_QUESTIONNAIRE_RESPONSES=questionnaire_responses \
//!   cargo run -p api-server --features dynamo
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.
//!

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::HeaderValue;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use domain::adapters::memory_repo::InMemoryRepo;
use domain::id::RandomIdGenerator;
use domain::service::ResponseService;
use domain::{CoreError, QuestionnaireResponse, ResponseId, ResponseRepository};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// Local repo abstraction supporting memory, sqlite or dynamo (feature-gated).
enum RepoKind {
    Memory(InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite_adapter::SqliteRepo),
    #[cfg(feature = "dynamo")]
    Dynamo(aws_dynamo::DynamoRepo),
}

#[derive(Clone)]
struct AnyRepo {
    kind: Arc<RepoKind>,
}

impl AnyRepo {
    fn memory() -> Self {
        Self {
            kind: Arc::new(RepoKind::Memory(InMemoryRepo::new())),
        }
    }

    #[cfg(feature = "sqlite")]
    fn sqlite(path: Option<&std::path::Path>) -> Result<Self, CoreError> {
        let repo = match path {
            Some(p) => {
                if let Some(dir) = p.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                sqlite_adapter::SqliteRepo::new(p)?
            }
            None => sqlite_adapter::SqliteRepo::from_env()?,
        };
        Ok(Self {
            kind: Arc::new(RepoKind::Sqlite(repo)),
        })
    }

    #[cfg(feature = "dynamo")]
    fn dynamo(table: &str) -> Result<Self, CoreError> {
        Ok(Self {
            kind: Arc::new(RepoKind::Dynamo(aws_dynamo::DynamoRepo::new(table)?)),
        })
    }
}

impl ResponseRepository for AnyRepo {
    fn get(&self, id: &ResponseId) -> Result<Option<QuestionnaireResponse>, CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.get(id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.get(id),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.get(id),
        }
    }

    fn put(&self, response: QuestionnaireResponse) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.put(response),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.put(response),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.put(response),
        }
    }

    fn delete(&self, id: &ResponseId) -> Result<(), CoreError> {
        match &*self.kind {
            RepoKind::Memory(r) => r.delete(id),
            #[cfg(feature = "sqlite")]
            RepoKind::Sqlite(r) => r.delete(id),
            #[cfg(feature = "dynamo")]
            RepoKind::Dynamo(r) => r.delete(id),
        }
    }
}

#[derive(Clone)]
struct AppState {
    svc: Arc<ResponseService<AnyRepo, RandomIdGenerator>>,
}

impl AppState {
    fn new(repo: AnyRepo) -> Self {
        Self {
            svc: Arc::new(ResponseService::new(repo, RandomIdGenerator::new())),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);
    cfg.warn_if_ephemeral();

    let repo = match build_repo(&cfg) {
        Ok(r) => r,
        Err(e) => {
            error!(err = %e, "failed to initialise storage");
            std::process::exit(1);
        }
    };
    let state = AppState::new(repo);

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = routes()
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .with_state(state);

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin.clone()]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, storage = ?cfg.storage_provider, "api-server listening");
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(%addr, err = %e, "bind failed");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!(err = %e, "server error");
        std::process::exit(1);
    }
}

fn routes() -> Router<AppState> {
    Router::new()
        .route("/questionnaire_responses", post(create_response))
        .route("/questionnaire_responses/", post(create_response))
        .route(
            "/questionnaire_responses/:id",
            get(get_response).delete(delete_response),
        )
        .fallback(not_found)
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

// Construct a repository instance based on config and feature flags.
fn build_repo(cfg: &config::Config) -> Result<AnyRepo, CoreError> {
    match cfg.storage_provider {
        config::StorageProvider::Memory => Ok(AnyRepo::memory()),
        #[cfg(feature = "sqlite")]
        config::StorageProvider::Sqlite => AnyRepo::sqlite(cfg.db_path.as_deref()),
        #[cfg(not(feature = "sqlite"))]
        config::StorageProvider::Sqlite => Err(CoreError::Repository(
            "sqlite storage is not compiled in".into(),
        )),
        #[cfg(feature = "dynamo")]
        config::StorageProvider::Dynamo => AnyRepo::dynamo(&cfg.dynamo_table),
        #[cfg(not(feature = "dynamo"))]
        config::StorageProvider::Dynamo => Err(CoreError::Repository(
            "dynamo storage is not compiled in".into(),
        )),
    }
}

fn error_response(err: &CoreError) -> Response {
    let (status, body) = http_common::core_error_response(err);
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body)).into_response()
}

fn parse_id(raw: String) -> Result<ResponseId, Response> {
    ResponseId::new(raw).map_err(|e| {
        warn!(err = %e, "bad id in path");
        error_response(&e)
    })
}

async fn get_response(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.svc.get(&id) {
        Ok(found) => {
            info!(id = %id, "get ok");
            (StatusCode::OK, Json(found.into_document())).into_response()
        }
        Err(CoreError::NotFound) => {
            warn!(id = %id, "get 404");
            error_response(&CoreError::NotFound)
        }
        Err(e) => {
            error!(id = %id, err = ?e, "get error");
            error_response(&e)
        }
    }
}

async fn create_response(State(state): State<AppState>, body: Bytes) -> Response {
    // Parse by hand so malformed bodies get the shared error shape.
    let document: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            warn!(err = %e, "invalid json body");
            return (
                StatusCode::BAD_REQUEST,
                Json(http_common::json_error_with_message(
                    "bad_request",
                    "body must be a JSON document",
                )),
            )
                .into_response();
        }
    };
    match state.svc.create(document) {
        Ok(stored) => {
            info!(id = %stored.id, "create ok");
            (StatusCode::OK, Json(stored.into_document())).into_response()
        }
        Err(e @ (CoreError::InvalidId(_) | CoreError::InvalidDocument(_))) => {
            warn!(err = %e, "create rejected");
            error_response(&e)
        }
        Err(e) => {
            error!(err = ?e, "create error");
            error_response(&e)
        }
    }
}

async fn delete_response(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match state.svc.delete(&id) {
        Ok(()) => {
            info!(id = %id, "delete ok");
            (StatusCode::OK, Json(http_common::deleted_body(id.as_str()))).into_response()
        }
        Err(e) => {
            error!(id = %id, err = ?e, "delete error");
            error_response(&e)
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(http_common::json_err("not_found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use domain::TABLE_QUESTIONNAIRE_RESPONSES as TABLE;
    use fixtures::{FixtureDir, Harness, QUESTIONNAIRE_RESPONSES_BODY};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    const FIXTURE_ID: &str = "1025655242481777";

    // Router and harness share one in-memory table.
    fn app() -> (Router, Harness) {
        let repo = AnyRepo::memory();
        let harness = Harness::new(FixtureDir::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../fixtures"
        )))
        .with_table(TABLE, Arc::new(repo.clone()));
        (routes().with_state(AppState::new(repo)), harness)
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn get_returns_inserted_fixture() {
        let (router, harness) = app();
        harness.insert_from_file(TABLE, QUESTIONNAIRE_RESPONSES_BODY).unwrap();

        let (status, body) = send(
            &router,
            "GET",
            "/questionnaire_responses/1025655242481777",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let expected = harness.fixtures().load(QUESTIONNAIRE_RESPONSES_BODY).unwrap();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn post_makes_document_retrievable_from_table() {
        let (router, harness) = app();
        harness.delete_by_id(TABLE, FIXTURE_ID).unwrap();
        assert!(harness.lookup(TABLE, FIXTURE_ID).unwrap().is_none());

        let fixture = harness.fixtures().load(QUESTIONNAIRE_RESPONSES_BODY).unwrap();
        let (status, body) = send(
            &router,
            "POST",
            "/questionnaire_responses",
            Body::from(fixture.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, fixture);
        assert_eq!(harness.lookup(TABLE, FIXTURE_ID).unwrap(), Some(fixture));
    }

    #[tokio::test]
    async fn delete_removes_row_from_table() {
        let (router, harness) = app();
        harness.insert_from_file(TABLE, QUESTIONNAIRE_RESPONSES_BODY).unwrap();

        let (status, body) = send(
            &router,
            "DELETE",
            "/questionnaire_responses/1025655242481777",
            Body::empty(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"id": FIXTURE_ID, "deleted": true}));
        assert!(harness.lookup(TABLE, FIXTURE_ID).unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_of_absent_id_succeeds() {
        let (router, harness) = app();
        harness.delete_by_id(TABLE, FIXTURE_ID).unwrap();
        for _ in 0..2 {
            let (status, _) = send(
                &router,
                "DELETE",
                "/questionnaire_responses/1025655242481777",
                Body::empty(),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn get_missing_and_malformed_ids() {
        let (router, _harness) = app();
        let (status, body) =
            send(&router, "GET", "/questionnaire_responses/404404", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");

        let (status, body) =
            send(&router, "GET", "/questionnaire_responses/abc", Body::empty()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_id");
    }

    #[tokio::test]
    async fn post_replaces_existing_document() {
        let (router, harness) = app();
        harness.insert_from_file(TABLE, QUESTIONNAIRE_RESPONSES_BODY).unwrap();

        let amended = json!({"id": FIXTURE_ID, "resourceType": "QuestionnaireResponse", "status": "amended"});
        let (status, _) = send(
            &router,
            "POST",
            "/questionnaire_responses",
            Body::from(amended.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(harness.lookup(TABLE, FIXTURE_ID).unwrap(), Some(amended));
    }

    #[tokio::test]
    async fn post_without_id_gets_generated_key() {
        let (router, harness) = app();
        let (status, body) = send(
            &router,
            "POST",
            "/questionnaire_responses",
            Body::from(r#"{"status":"in-progress"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let id = body["id"].as_str().unwrap().to_string();
        assert_eq!(id.len(), 16);
        assert_eq!(harness.lookup(TABLE, &id).unwrap().unwrap()["status"], "in-progress");
    }

    #[tokio::test]
    async fn post_rejects_bad_bodies() {
        let (router, _harness) = app();
        let (status, body) =
            send(&router, "POST", "/questionnaire_responses", Body::from("{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");

        let (status, _) =
            send(&router, "POST", "/questionnaire_responses", Body::from("[1,2]")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &router,
            "POST",
            "/questionnaire_responses",
            Body::from(r#"{"id":"12-ab"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_id");
    }

    #[tokio::test]
    async fn post_accepts_trailing_slash_like_lambda() {
        let (router, harness) = app();
        let fixture = harness.fixtures().load(QUESTIONNAIRE_RESPONSES_BODY).unwrap();
        let (status, _) = send(
            &router,
            "POST",
            "/questionnaire_responses/",
            Body::from(fixture.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(harness.lookup(TABLE, FIXTURE_ID).unwrap(), Some(fixture));
    }

    fn memory_config() -> config::Config {
        config::Config::from_lookup(|k| (k == "STORAGE_PROVIDER").then(|| "memory".to_string()))
            .unwrap()
    }

    #[test]
    fn build_repo_memory_only_when_asked() {
        let cfg = memory_config();
        assert!(matches!(&*build_repo(&cfg).unwrap().kind, RepoKind::Memory(_)));
    }

    #[cfg(not(feature = "sqlite"))]
    #[test]
    fn build_repo_refuses_missing_sqlite_backend() {
        let mut cfg = memory_config();
        cfg.storage_provider = config::StorageProvider::Sqlite;
        assert!(matches!(build_repo(&cfg), Err(CoreError::Repository(_))));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn build_repo_opens_sqlite_file() {
        let dir = std::env::temp_dir().join(format!("qr-api-{}", std::process::id()));
        let mut cfg = memory_config();
        cfg.storage_provider = config::StorageProvider::Sqlite;
        cfg.db_path = Some(dir.join("t.db"));
        let repo = build_repo(&cfg).unwrap();
        assert!(matches!(&*repo.kind, RepoKind::Sqlite(_)));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn unknown_path_is_json_404() {
        let (router, _harness) = app();
        let (status, body) = send(&router, "GET", "/locations/1", Body::empty()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "not_found");
    }
}
