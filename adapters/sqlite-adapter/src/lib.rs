//! sqlite-adapter — SQLite implementation of the ResponseRepository port for local/dev.
//!
//! Purpose
//! - Provide a lightweight, file-based table to run the service and the fixture
//!   CLI locally without cloud dependencies.
//! - Implements the `ResponseRepository` trait from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Documents are stored as JSON text next to their id.

use std::path::Path;

use domain::{CoreError, QuestionnaireResponse, ResponseId, ResponseRepository};
use rusqlite::{params, Connection, OptionalExtension};

/// SQLite-backed table for local development.
pub struct SqliteRepo {
    conn: std::sync::Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self { conn: std::sync::Mutex::new(conn) })
    }

    /// Open a private in-memory database; handy for tests.
    pub fn in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self { conn: std::sync::Mutex::new(conn) })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/questionnaire_responses.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH")
            .unwrap_or_else(|_| "./data/questionnaire_responses.db".to_string());
        // Ensure directory exists
        if let Some(dir) = Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        Self::new(path)
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS questionnaire_responses (
            id TEXT PRIMARY KEY,
            document TEXT NOT NULL
        );
        "#,
    )
    .map_err(map_sqerr)
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError { CoreError::Repository(format!("sqlite error: {e}")) }

impl ResponseRepository for SqliteRepo {
    fn get(&self, id: &ResponseId) -> Result<Option<QuestionnaireResponse>, CoreError> {
        let conn = self.conn.lock().map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        let text: Option<String> = conn
            .query_row(
                "SELECT document FROM questionnaire_responses WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(map_sqerr)?;
        match text {
            Some(t) => {
                let doc: serde_json::Value = serde_json::from_str(&t).map_err(map_sqerr)?;
                Ok(Some(QuestionnaireResponse::from_document(doc)?))
            }
            None => Ok(None),
        }
    }

    fn put(&self, response: QuestionnaireResponse) -> Result<(), CoreError> {
        let text = serde_json::to_string(&response.document).map_err(map_sqerr)?;
        let conn = self.conn.lock().map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        conn.execute(
            "INSERT INTO questionnaire_responses (id, document) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET document = excluded.document",
            params![response.id.as_str(), text],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }

    fn delete(&self, id: &ResponseId) -> Result<(), CoreError> {
        let conn = self.conn.lock().map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        conn.execute(
            "DELETE FROM questionnaire_responses WHERE id = ?1",
            params![id.as_str()],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tmp_db() -> (SqliteRepo, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.db");
        let repo = SqliteRepo::new(path).unwrap();
        (repo, dir)
    }

    fn row(id: &str, status: &str) -> QuestionnaireResponse {
        QuestionnaireResponse::from_document(json!({
            "id": id,
            "resourceType": "QuestionnaireResponse",
            "status": status,
            "item": [{"linkId": "1", "answer": [{"valueDecimal": 2.5}]}]
        }))
        .unwrap()
    }

    #[test]
    fn put_get_roundtrip() {
        let (repo, _dir) = tmp_db();
        let r = row("1025655242481777", "completed");
        repo.put(r.clone()).unwrap();
        let got = repo.get(&r.id).unwrap().unwrap();
        assert_eq!(got, r);
    }

    #[test]
    fn put_replaces_existing_document() {
        let (repo, _dir) = tmp_db();
        repo.put(row("12", "in-progress")).unwrap();
        repo.put(row("12", "completed")).unwrap();
        let got = repo.get(&ResponseId::new("12").unwrap()).unwrap().unwrap();
        assert_eq!(got.document["status"], "completed");
    }

    #[test]
    fn delete_removes_row_and_tolerates_absent() {
        let (repo, _dir) = tmp_db();
        let r = row("99", "completed");
        repo.put(r.clone()).unwrap();
        repo.delete(&r.id).unwrap();
        assert!(repo.get(&r.id).unwrap().is_none());
        repo.delete(&r.id).unwrap();
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.db");
        {
            let repo = SqliteRepo::new(&path).unwrap();
            repo.put(row("5", "completed")).unwrap();
        }
        let repo = SqliteRepo::new(&path).unwrap();
        assert!(repo.get(&ResponseId::new("5").unwrap()).unwrap().is_some());
    }

    #[test]
    fn in_memory_database_works() {
        let repo = SqliteRepo::in_memory().unwrap();
        assert!(repo.get(&ResponseId::new("1").unwrap()).unwrap().is_none());
    }
}
