//! Domain library for the questionnaire responses service.
//!
//! Holds the entity types, ports (traits), and error definitions. The only
//! external types that leak through are `serde_json::Value` for the opaque
//! document payload. Keep adapters and IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the key-value table holding questionnaire responses.
pub const TABLE_QUESTIONNAIRE_RESPONSES: &str = "questionnaire_responses";

/// Name of the document member that carries the primary key.
pub const ID_FIELD: &str = "id";

const MAX_ID_LEN: usize = 64;

/// Primary key of a questionnaire response: a numeric string such as
/// `"1025655242481777"`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResponseId(String);

impl ResponseId {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        if val.is_empty() {
            return Err(CoreError::InvalidId("empty".into()));
        }
        if val.len() > MAX_ID_LEN {
            return Err(CoreError::InvalidId("too long".into()));
        }
        if !val.chars().all(|c| c.is_ascii_digit()) {
            return Err(CoreError::InvalidId("must contain only digits".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResponseId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ResponseId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResponseId> for String {
    fn from(id: ResponseId) -> Self {
        id.0
    }
}

/// A stored questionnaire response row.
///
/// `document` is the JSON object exactly as it was inserted or posted. Its
/// `id` member always equals `id` as a JSON string.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionnaireResponse {
    pub id: ResponseId,
    pub document: Value,
}

impl QuestionnaireResponse {
    /// Build a row from a JSON document, reading the key from its `id` member.
    ///
    /// Integer ids are accepted and rewritten as strings so the stored key
    /// always has one shape.
    pub fn from_document(mut document: Value) -> Result<Self, CoreError> {
        let obj = document
            .as_object_mut()
            .ok_or_else(|| CoreError::InvalidDocument("expected a JSON object".into()))?;
        let id = match obj.get(ID_FIELD) {
            Some(Value::String(s)) => ResponseId::new(s.clone())?,
            Some(Value::Number(n)) if n.is_u64() => ResponseId::new(n.to_string())?,
            Some(_) => return Err(CoreError::InvalidId("id must be a numeric string".into())),
            None => return Err(CoreError::InvalidDocument("missing id".into())),
        };
        obj.insert(ID_FIELD.into(), Value::String(id.as_str().to_string()));
        Ok(Self { id, document })
    }

    /// Build a row for `id`, overwriting whatever `id` member the document had.
    pub fn with_id(id: ResponseId, mut document: Value) -> Result<Self, CoreError> {
        let obj = document
            .as_object_mut()
            .ok_or_else(|| CoreError::InvalidDocument("expected a JSON object".into()))?;
        obj.insert(ID_FIELD.into(), Value::String(id.as_str().to_string()));
        Ok(Self { id, document })
    }

    pub fn into_document(self) -> Value {
        self.document
    }
}

/// Source of fresh ids for documents posted without one.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> ResponseId;
}

/// Repository port for the questionnaire responses table.
///
/// Existence is binary: a row is either present under its id or absent.
pub trait ResponseRepository: Send + Sync {
    fn get(&self, id: &ResponseId) -> Result<Option<QuestionnaireResponse>, CoreError>;
    /// Insert or replace the row keyed by `response.id`.
    fn put(&self, response: QuestionnaireResponse) -> Result<(), CoreError>;
    /// Remove the row if present. Removing an absent id is not an error.
    fn delete(&self, id: &ResponseId) -> Result<(), CoreError>;
}

impl<R: ResponseRepository + ?Sized> ResponseRepository for std::sync::Arc<R> {
    fn get(&self, id: &ResponseId) -> Result<Option<QuestionnaireResponse>, CoreError> {
        (**self).get(id)
    }

    fn put(&self, response: QuestionnaireResponse) -> Result<(), CoreError> {
        (**self).put(response)
    }

    fn delete(&self, id: &ResponseId) -> Result<(), CoreError> {
        (**self).delete(id)
    }
}

/// Core domain errors (no external error crates to keep deps minimal).
#[derive(Debug)]
pub enum CoreError {
    InvalidId(String),
    InvalidDocument(String),
    NotFound,
    Repository(String),
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidId(msg) => write!(f, "invalid id: {}", msg),
            CoreError::InvalidDocument(msg) => write!(f, "invalid document: {}", msg),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Repository(msg) => write!(f, "repository error: {}", msg),
        }
    }
}

impl Error for CoreError {}

pub mod adapters;
pub mod id;
pub mod service;
