//! DynamoDB adapter implementing the `ResponseRepository` port.
//!
//! Backed by `aws-sdk-dynamodb`.
//! - Stores questionnaire responses in a single table with partition key `id` (S).
//! - Every top-level member of the JSON document becomes a native attribute, so
//!   rows written by other tools (console, boto3 loaders) read back unchanged.
//! - Provides `from_env()` wiring for Lambda/apps using
//!   `DYNAMO_TABLE_QUESTIONNAIRE_RESPONSES` (defaults to `questionnaire_responses`).
//!
//! Notes:
//! - The domain `ResponseRepository` trait is synchronous. We bridge to the async
//!   AWS SDK using an internal `tokio::runtime::Runtime` and `block_on`.

use aws_sdk_dynamodb::{types::AttributeValue, Client};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use domain::{CoreError, QuestionnaireResponse, ResponseId, ResponseRepository, ID_FIELD};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Environment variable naming the responses table.
pub const TABLE_ENV: &str = "DYNAMO_TABLE_QUESTIONNAIRE_RESPONSES";

/// Repository backed by AWS DynamoDB.
///
/// Supports both standalone mode (creates its own Tokio runtime) and Lambda mode
/// (reuses the existing runtime via `Handle::current()`).
#[derive(Clone)]
pub struct DynamoRepo {
    table: String,
    client: Client,
    // Optional runtime - None when running inside Lambda (reuses existing runtime)
    rt: Option<Arc<tokio::runtime::Runtime>>,
}

impl DynamoRepo {
    /// Create a new repo from an explicit table name and an AWS SDK client.
    ///
    /// If called from within a Tokio runtime (e.g., Lambda), reuses the existing runtime.
    /// Otherwise creates a new runtime.
    pub fn with_client(table: impl Into<String>, client: Client) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        Ok(Self {
            table: table.into(),
            client,
            rt,
        })
    }

    /// Construct with a table name but create a default AWS SDK client using env/IMDS.
    pub fn new(table: impl Into<String>) -> Result<Self, CoreError> {
        let rt = Self::maybe_create_runtime()?;
        let conf = Self::block_on_with_rt(&rt, aws_config::load_from_env());
        let client = Client::new(&conf);
        Ok(Self {
            table: table.into(),
            client,
            rt,
        })
    }

    /// Construct from `DYNAMO_TABLE_QUESTIONNAIRE_RESPONSES`, falling back to the
    /// canonical table name.
    pub fn from_env() -> Result<Self, CoreError> {
        let table = std::env::var(TABLE_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| domain::TABLE_QUESTIONNAIRE_RESPONSES.to_string());
        Self::new(table)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Check if we're inside a Tokio runtime. If yes, return None (reuse existing).
    /// If no, create a new runtime.
    fn maybe_create_runtime() -> Result<Option<Arc<tokio::runtime::Runtime>>, CoreError> {
        if tokio::runtime::Handle::try_current().is_ok() {
            Ok(None)
        } else {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .map_err(|e| CoreError::Repository(format!("tokio runtime init: {e}")))?;
            Ok(Some(Arc::new(rt)))
        }
    }

    /// Run an async future, using either our owned runtime or the current runtime.
    fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        Self::block_on_with_rt(&self.rt, fut)
    }

    fn block_on_with_rt<F: std::future::Future>(
        rt: &Option<Arc<tokio::runtime::Runtime>>,
        fut: F,
    ) -> F::Output {
        match rt {
            Some(rt) => rt.block_on(fut),
            None => {
                // Inside an existing runtime - use block_in_place + Handle::current()
                tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(fut))
            }
        }
    }
}

impl ResponseRepository for DynamoRepo {
    fn get(&self, id: &ResponseId) -> Result<Option<QuestionnaireResponse>, CoreError> {
        let table = self.table.clone();
        let key = id.as_str().to_string();
        // Strongly consistent so a read right after a write sees it.
        let fut = async {
            self.client
                .get_item()
                .table_name(table)
                .key(ID_FIELD, AttributeValue::S(key))
                .consistent_read(true)
                .send()
                .await
        };
        let out = self.block_on(fut).map_err(map_sdk_err)?;
        match out.item() {
            Some(item) => Ok(Some(item_to_domain(item)?)),
            None => Ok(None),
        }
    }

    fn put(&self, response: QuestionnaireResponse) -> Result<(), CoreError> {
        let table = self.table.clone();
        let item = domain_to_item(&response)?;
        let fut = async {
            self.client
                .put_item()
                .table_name(table)
                .set_item(Some(item))
                .send()
                .await
        };
        self.block_on(fut).map_err(map_sdk_err)?;
        tracing::debug!(id = %response.id, table = %self.table, "put item");
        Ok(())
    }

    fn delete(&self, id: &ResponseId) -> Result<(), CoreError> {
        let table = self.table.clone();
        let key = id.as_str().to_string();
        // No condition: deleting a missing key is a no-op in DynamoDB.
        let fut = async {
            self.client
                .delete_item()
                .table_name(table)
                .key(ID_FIELD, AttributeValue::S(key))
                .send()
                .await
        };
        self.block_on(fut).map_err(map_sdk_err)?;
        tracing::debug!(id = %id, table = %self.table, "delete item");
        Ok(())
    }
}

fn map_sdk_err<E: ProvideErrorMetadata + std::fmt::Display>(e: E) -> CoreError {
    if let Some(code) = e.code() {
        if code == "ResourceNotFoundException" {
            return CoreError::Repository("missing table".into());
        }
    }
    CoreError::Repository(format!("dynamo error: {e}"))
}

fn domain_to_item(
    response: &QuestionnaireResponse,
) -> Result<HashMap<String, AttributeValue>, CoreError> {
    let obj = response
        .document
        .as_object()
        .ok_or_else(|| CoreError::InvalidDocument("expected a JSON object".into()))?;
    let mut m: HashMap<String, AttributeValue> = obj
        .iter()
        .map(|(k, v)| (k.clone(), json_to_attr(v)))
        .collect();
    // Key attribute must be S regardless of how the document spelled it.
    m.insert(ID_FIELD.into(), AttributeValue::S(response.id.as_str().to_string()));
    Ok(m)
}

fn item_to_domain(item: &HashMap<String, AttributeValue>) -> Result<QuestionnaireResponse, CoreError> {
    let mut obj = Map::new();
    for (k, v) in item {
        obj.insert(k.clone(), attr_to_json(v)?);
    }
    QuestionnaireResponse::from_document(Value::Object(obj))
}

fn json_to_attr(v: &Value) -> AttributeValue {
    match v {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(items) => AttributeValue::L(items.iter().map(json_to_attr).collect()),
        Value::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attr(v)))
                .collect(),
        ),
    }
}

fn attr_to_json(av: &AttributeValue) -> Result<Value, CoreError> {
    match av {
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::N(n) => parse_number(n).map(Value::Number),
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::L(items) => items
            .iter()
            .map(attr_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        AttributeValue::M(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), attr_to_json(v)?);
            }
            Ok(Value::Object(obj))
        }
        // Sets carry no order; surface them as arrays.
        AttributeValue::Ss(items) => Ok(Value::Array(
            items.iter().cloned().map(Value::String).collect(),
        )),
        AttributeValue::Ns(items) => items
            .iter()
            .map(|n| parse_number(n).map(Value::Number))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Err(CoreError::Repository(
            "unsupported attribute type in item".into(),
        )),
    }
}

fn parse_number(n: &str) -> Result<Number, CoreError> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Number::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Number::from(u));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(|| CoreError::Repository(format!("bad number attribute: {n}")))
}
