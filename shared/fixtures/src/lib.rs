//! Fixture harness for questionnaire response tables.
//!
//! Sets up scenario preconditions directly against a table, bypassing the HTTP
//! surface:
//! - insert-from-file: load `<FIXTURES_DIR>/<name>.json` and write it as a row
//!   keyed by its `id` member.
//! - reset-by-delete: remove an id so the row is known to be absent.
//! - lookup: read a row back to assert on what the service stored.
//!
//! Tables are registered by name so one harness can drive several stores.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use domain::{CoreError, QuestionnaireResponse, ResponseId, ResponseRepository};
use serde_json::Value;
use tracing::{debug, info};

/// Environment variable pointing at the fixture directory.
pub const FIXTURES_DIR_ENV: &str = "FIXTURES_DIR";

/// Fixture used by the questionnaire response scenarios.
pub const QUESTIONNAIRE_RESPONSES_BODY: &str = "questionnaire_responses_body";

/// Errors raised while loading fixtures or touching tables.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("failed to read fixture {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("fixture {name} is not valid JSON: {source}")]
    Json {
        name: String,
        source: serde_json::Error,
    },
    #[error("invalid fixture name: {0}")]
    InvalidName(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Directory holding `<name>.json` fixture files.
#[derive(Clone, Debug)]
pub struct FixtureDir {
    root: PathBuf,
}

impl FixtureDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Read `FIXTURES_DIR`, defaulting to `./fixtures`.
    pub fn from_env() -> Self {
        let root = std::env::var(FIXTURES_DIR_ENV)
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "./fixtures".to_string());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a fixture name to its file. Names are bare file stems.
    pub fn path_for(&self, name: &str) -> Result<PathBuf, FixtureError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(FixtureError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(format!("{name}.json")))
    }

    /// Load and parse a fixture.
    pub fn load(&self, name: &str) -> Result<Value, FixtureError> {
        let path = self.path_for(name)?;
        let text = std::fs::read_to_string(&path).map_err(|source| FixtureError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| FixtureError::Json {
            name: name.to_string(),
            source,
        })
    }
}

/// Named tables plus the fixtures used to seed them.
pub struct Harness {
    fixtures: FixtureDir,
    tables: HashMap<String, Arc<dyn ResponseRepository>>,
}

impl Harness {
    pub fn new(fixtures: FixtureDir) -> Self {
        Self {
            fixtures,
            tables: HashMap::new(),
        }
    }

    /// Register a table under `name`, builder style.
    pub fn with_table(mut self, name: impl Into<String>, repo: Arc<dyn ResponseRepository>) -> Self {
        self.register(name, repo);
        self
    }

    pub fn register(&mut self, name: impl Into<String>, repo: Arc<dyn ResponseRepository>) {
        self.tables.insert(name.into(), repo);
    }

    pub fn fixtures(&self) -> &FixtureDir {
        &self.fixtures
    }

    pub fn table(&self, name: &str) -> Result<&Arc<dyn ResponseRepository>, FixtureError> {
        self.tables
            .get(name)
            .ok_or_else(|| FixtureError::UnknownTable(name.to_string()))
    }

    /// Load `fixture` and write it into `table`, replacing any row with the same id.
    pub fn insert_from_file(&self, table: &str, fixture: &str) -> Result<ResponseId, FixtureError> {
        let repo = self.table(table)?;
        let row = QuestionnaireResponse::from_document(self.fixtures.load(fixture)?)?;
        let id = row.id.clone();
        repo.put(row)?;
        info!(table, fixture, id = %id, "fixture inserted");
        Ok(id)
    }

    /// Like [`Harness::insert_from_file`] but leaves an existing row untouched.
    ///
    /// Returns whether a row was written.
    pub fn insert_if_absent(&self, table: &str, fixture: &str) -> Result<bool, FixtureError> {
        let repo = self.table(table)?;
        let row = QuestionnaireResponse::from_document(self.fixtures.load(fixture)?)?;
        if repo.get(&row.id)?.is_some() {
            debug!(table, fixture, id = %row.id, "fixture already present");
            return Ok(false);
        }
        let id = row.id.clone();
        repo.put(row)?;
        info!(table, fixture, id = %id, "fixture inserted");
        Ok(true)
    }

    /// Remove `id` from `table`; succeeds whether or not the row existed.
    pub fn delete_by_id(&self, table: &str, id: &str) -> Result<(), FixtureError> {
        let repo = self.table(table)?;
        let id = ResponseId::new(id)?;
        repo.delete(&id)?;
        info!(table, id = %id, "row reset");
        Ok(())
    }

    /// Read a row straight from the table.
    pub fn lookup(&self, table: &str, id: &str) -> Result<Option<Value>, FixtureError> {
        let repo = self.table(table)?;
        let id = ResponseId::new(id)?;
        Ok(repo.get(&id)?.map(QuestionnaireResponse::into_document))
    }
}
