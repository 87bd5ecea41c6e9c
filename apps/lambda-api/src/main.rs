//! lambda-api — AWS Lambda entrypoint for the questionnaire responses resource.
//!
//! Purpose
//! - Handle API Gateway HTTP API (v2) events for:
//!   - `GET /questionnaire_responses/{id}` — stored document.
//!   - `POST /questionnaire_responses` — store (create or replace) a document.
//!   - `DELETE /questionnaire_responses/{id}` — remove the row.
//! - Use `ResponseService` with `DynamoRepo` for persistence.
//! - Initialize structured logging compatible with Lambda.
//!
//! Responses mirror api-server; error bodies come from `http-common`.

use std::sync::Arc;

use lambda_http::{run, service_fn, Body, Error, Request, Response};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aws_dynamo::DynamoRepo;
use domain::id::RandomIdGenerator;
use domain::service::ResponseService;
use domain::{CoreError, ResponseId, ResponseRepository};
use http_common::lambda::{resp, resp_for_core_error, resp_with_error, with_cors};
use http_common::ResourceRoute;

struct AppState<R: ResponseRepository> {
    svc: Arc<ResponseService<R, RandomIdGenerator>>,
}

// Manual impl: cloning only bumps the Arc, whatever `R` is.
impl<R: ResponseRepository> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            svc: Arc::clone(&self.svc),
        }
    }
}

impl<R: ResponseRepository> AppState<R> {
    fn new(repo: R) -> Self {
        Self {
            svc: Arc::new(ResponseService::new(repo, RandomIdGenerator::new())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    init_tracing();

    // Build repo from env; if it fails, crash early to surface misconfiguration.
    let repo = DynamoRepo::from_env().map_err(|e| format!("dynamo init error: {e}"))?;
    info!(table = %repo.table(), "lambda-api starting");
    let state = AppState::new(repo);

    let handler = service_fn(move |req: Request| {
        let st = state.clone();
        async move { route(st, req).await }
    });
    run(handler).await?;
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .init();
}

async fn route<R: ResponseRepository>(
    state: AppState<R>,
    req: Request,
) -> Result<Response<Body>, Error> {
    let raw_path = req.uri().path().to_string();
    let method = req.method().as_str().to_string();

    let Some(target) = http_common::match_resource_path(&raw_path) else {
        warn!(path = %raw_path, "no route");
        return Ok(with_cors(resp(
            404,
            None,
            Some(http_common::json_err("not_found")),
        )));
    };

    let response = match (target, method.as_str()) {
        (_, "OPTIONS") => resp(204, None, None),
        (ResourceRoute::Collection, "POST") => create_response(&state, &req),
        (ResourceRoute::Item(id), "GET") => get_response(&state, id),
        (ResourceRoute::Item(id), "DELETE") => delete_response(&state, id),
        _ => resp(405, None, Some(http_common::json_err("method_not_allowed"))),
    };
    Ok(with_cors(response))
}

fn parse_id(raw: &str) -> Result<ResponseId, Response<Body>> {
    ResponseId::new(raw).map_err(|e| {
        warn!(err = %e, "bad id in path");
        resp_for_core_error(&e)
    })
}

fn get_response<R: ResponseRepository>(state: &AppState<R>, raw_id: &str) -> Response<Body> {
    let id = match parse_id(raw_id) {
        Ok(id) => id,
        Err(r) => return r,
    };
    match state.svc.get(&id) {
        Ok(found) => {
            info!(id = %id, "get ok");
            resp(200, None, Some(found.into_document()))
        }
        Err(CoreError::NotFound) => {
            warn!(id = %id, "get 404");
            resp_for_core_error(&CoreError::NotFound)
        }
        Err(e) => {
            error!(id = %id, err = ?e, "get error");
            resp_for_core_error(&e)
        }
    }
}

fn create_response<R: ResponseRepository>(state: &AppState<R>, req: &Request) -> Response<Body> {
    let body: &[u8] = req.body().as_ref();
    let document: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(e) => {
            warn!(err = %e, "invalid json body");
            return resp_with_error(400, "bad_request", "body must be a JSON document");
        }
    };
    match state.svc.create(document) {
        Ok(stored) => {
            info!(id = %stored.id, "create ok");
            resp(200, None, Some(stored.into_document()))
        }
        Err(e @ (CoreError::InvalidId(_) | CoreError::InvalidDocument(_))) => {
            warn!(err = %e, "create rejected");
            resp_for_core_error(&e)
        }
        Err(e) => {
            error!(err = ?e, "create error");
            resp_for_core_error(&e)
        }
    }
}

fn delete_response<R: ResponseRepository>(state: &AppState<R>, raw_id: &str) -> Response<Body> {
    let id = match parse_id(raw_id) {
        Ok(id) => id,
        Err(r) => return r,
    };
    match state.svc.delete(&id) {
        Ok(()) => {
            info!(id = %id, "delete ok");
            resp(200, None, Some(http_common::deleted_body(id.as_str())))
        }
        Err(e) => {
            error!(id = %id, err = ?e, "delete error");
            resp_for_core_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::adapters::memory_repo::InMemoryRepo;
    use domain::TABLE_QUESTIONNAIRE_RESPONSES as TABLE;
    use fixtures::{FixtureDir, Harness, QUESTIONNAIRE_RESPONSES_BODY};
    use serde_json::Value;

    const FIXTURE_ID: &str = "1025655242481777";

    fn setup() -> (AppState<Arc<InMemoryRepo>>, Harness) {
        let repo = Arc::new(InMemoryRepo::new());
        let harness = Harness::new(FixtureDir::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../../fixtures"
        )))
        .with_table(TABLE, repo.clone());
        (AppState::new(repo), harness)
    }

    fn request(method: &str, path: &str, body: Body) -> Request {
        lambda_http::http::Request::builder()
            .method(method)
            .uri(path)
            .body(body)
            .unwrap()
    }

    fn body_json(r: &Response<Body>) -> Value {
        match r.body() {
            Body::Text(t) => serde_json::from_str(t).unwrap(),
            Body::Binary(b) => serde_json::from_slice(b).unwrap(),
            _ => Value::Null,
        }
    }

    #[tokio::test]
    async fn get_returns_inserted_fixture_behind_stage_prefix() {
        let (state, harness) = setup();
        harness.insert_from_file(TABLE, QUESTIONNAIRE_RESPONSES_BODY).unwrap();

        let r = route(
            state,
            request("GET", "/dev/questionnaire_responses/1025655242481777", Body::Empty),
        )
        .await
        .unwrap();
        assert_eq!(r.status(), 200);
        let expected = harness.fixtures().load(QUESTIONNAIRE_RESPONSES_BODY).unwrap();
        assert_eq!(body_json(&r), expected);
        assert!(r.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn post_then_table_lookup() {
        let (state, harness) = setup();
        harness.delete_by_id(TABLE, FIXTURE_ID).unwrap();
        let fixture = harness.fixtures().load(QUESTIONNAIRE_RESPONSES_BODY).unwrap();

        let r = route(
            state,
            request("POST", "/questionnaire_responses", Body::Text(fixture.to_string())),
        )
        .await
        .unwrap();
        assert_eq!(r.status(), 200);
        assert_eq!(harness.lookup(TABLE, FIXTURE_ID).unwrap(), Some(fixture));
    }

    #[tokio::test]
    async fn delete_then_table_lookup_is_empty() {
        let (state, harness) = setup();
        harness.insert_from_file(TABLE, QUESTIONNAIRE_RESPONSES_BODY).unwrap();

        let r = route(
            state.clone(),
            request("DELETE", "/questionnaire_responses/1025655242481777", Body::Empty),
        )
        .await
        .unwrap();
        assert_eq!(r.status(), 200);
        assert!(harness.lookup(TABLE, FIXTURE_ID).unwrap().is_none());

        // Again, now absent
        let r = route(
            state,
            request("DELETE", "/questionnaire_responses/1025655242481777", Body::Empty),
        )
        .await
        .unwrap();
        assert_eq!(r.status(), 200);
    }

    #[tokio::test]
    async fn routing_errors() {
        let (state, _harness) = setup();
        let r = route(state.clone(), request("GET", "/locations", Body::Empty)).await.unwrap();
        assert_eq!(r.status(), 404);

        let r = route(state.clone(), request("PUT", "/questionnaire_responses/1", Body::Empty))
            .await
            .unwrap();
        assert_eq!(r.status(), 405);
        assert_eq!(body_json(&r)["error"]["code"], "method_not_allowed");

        let r = route(state.clone(), request("OPTIONS", "/questionnaire_responses", Body::Empty))
            .await
            .unwrap();
        assert_eq!(r.status(), 204);

        let r = route(state.clone(), request("GET", "/questionnaire_responses/999", Body::Empty))
            .await
            .unwrap();
        assert_eq!(r.status(), 404);

        let r = route(state, request("POST", "/questionnaire_responses", Body::Text("nope".into())))
            .await
            .unwrap();
        assert_eq!(r.status(), 400);
    }
}
