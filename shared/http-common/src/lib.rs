//! Shared HTTP utilities for the questionnaire responses workspace.
//!
//! Provides common error bodies, path matching, and domain-error mapping used
//! by both api-server and lambda-api so the two surfaces answer identically.

use domain::CoreError;

/// Path segment of the resource collection.
pub const RESOURCE: &str = "questionnaire_responses";

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" => "Bad request",
        "invalid_id" => "Invalid id format",
        "method_not_allowed" => "Method not allowed",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Body returned after a successful delete.
pub fn deleted_body(id: &str) -> serde_json::Value {
    serde_json::json!({"id": id, "deleted": true})
}

// ============================================================================
// Domain error mapping
// ============================================================================

/// Map a domain error to an HTTP status and error body.
///
/// Repository failures never leak their message to clients.
pub fn core_error_response(err: &CoreError) -> (u16, serde_json::Value) {
    match err {
        CoreError::NotFound => (404, json_err("not_found")),
        CoreError::InvalidId(msg) => (400, json_error_with_message("invalid_id", msg)),
        CoreError::InvalidDocument(msg) => (400, json_error_with_message("bad_request", msg)),
        CoreError::Repository(_) => (500, json_error_with_message("internal", "server error")),
    }
}

// ============================================================================
// Path matching
// ============================================================================

/// Route target inside the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceRoute<'a> {
    /// `/questionnaire_responses`
    Collection,
    /// `/questionnaire_responses/{id}`
    Item(&'a str),
}

/// Match a raw request path against the resource routes.
///
/// API Gateway HTTP API includes the stage in rawPath (e.g. `/dev/questionnaire_responses/1`),
/// so anything before the resource segment is ignored. A trailing slash is tolerated.
pub fn match_resource_path(raw_path: &str) -> Option<ResourceRoute<'_>> {
    let mut segments = raw_path.split('/').filter(|s| !s.is_empty());
    segments.by_ref().find(|s| *s == RESOURCE)?;
    match (segments.next(), segments.next()) {
        (None, _) => Some(ResourceRoute::Collection),
        (Some(id), None) => Some(ResourceRoute::Item(id)),
        _ => None,
    }
}

// ============================================================================
// Lambda HTTP Helpers (feature-gated)
// ============================================================================

#[cfg(feature = "lambda")]
pub mod lambda {
    //! Lambda-specific HTTP response builders using `lambda_http` types.

    use lambda_http::{Body, Response};

    /// Build an HTTP response with optional header and JSON body.
    ///
    /// # Panics
    /// Panics if JSON serialization or response construction fails (should not happen
    /// for well-formed JSON values).
    pub fn resp(
        status: u16,
        header: Option<(&str, String)>,
        body_json: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut rb = Response::builder().status(status);
        if let Some((k, v)) = header {
            rb = rb.header(k, v);
        }
        if let Some(val) = body_json {
            rb.header("content-type", "application/json")
                .body(Body::Text(
                    serde_json::to_string(&val).expect("JSON value serialization"),
                ))
                .expect("response body construction")
        } else {
            rb.body(Body::Empty)
                .expect("empty response body construction")
        }
    }

    /// Build an error response with status code and structured error body.
    pub fn resp_with_error(status: u16, code: &str, message: &str) -> Response<Body> {
        let body = crate::json_error_with_message(code, message);
        resp(status, None, Some(body))
    }

    /// Build the response for a domain error.
    pub fn resp_for_core_error(err: &domain::CoreError) -> Response<Body> {
        let (status, body) = crate::core_error_response(err);
        resp(status, None, Some(body))
    }

    /// Add CORS headers to a response.
    ///
    /// Uses `CORS_ALLOW_ORIGIN` env var, defaulting to `*`.
    pub fn with_cors(mut resp: Response<Body>) -> Response<Body> {
        use http::header::{HeaderName, HeaderValue};
        let headers = resp.headers_mut();
        let allow_origin =
            std::env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string());
        headers.insert(
            HeaderName::from_static("access-control-allow-origin"),
            HeaderValue::from_str(&allow_origin).unwrap_or(HeaderValue::from_static("*")),
        );
        headers.insert(
            HeaderName::from_static("access-control-allow-headers"),
            HeaderValue::from_static("content-type"),
        );
        headers.insert(
            HeaderName::from_static("access-control-allow-methods"),
            HeaderValue::from_static("OPTIONS, GET, POST, DELETE"),
        );
        resp
    }
}
