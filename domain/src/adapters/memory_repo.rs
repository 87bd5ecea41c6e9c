use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::{CoreError, QuestionnaireResponse, ResponseId, ResponseRepository};

/// Simple in-memory table keyed by id. Not built for high concurrency beyond
/// the internal mutex guarding the map.
pub struct InMemoryRepo {
    inner: Mutex<BTreeMap<String, QuestionnaireResponse>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of rows currently stored.
    pub fn len(&self) -> Result<usize, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map.len())
    }

    pub fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len()? == 0)
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseRepository for InMemoryRepo {
    fn get(&self, id: &ResponseId) -> Result<Option<QuestionnaireResponse>, CoreError> {
        let map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        Ok(map.get(id.as_str()).cloned())
    }

    fn put(&self, response: QuestionnaireResponse) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        map.insert(response.id.as_str().to_string(), response);
        Ok(())
    }

    fn delete(&self, id: &ResponseId) -> Result<(), CoreError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| CoreError::Repository("mutex poisoned".into()))?;
        map.remove(id.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn mk_row(id: &str) -> QuestionnaireResponse {
        QuestionnaireResponse::from_document(json!({"id": id, "status": "completed"})).unwrap()
    }

    #[test]
    fn put_get_roundtrip() {
        let repo = InMemoryRepo::new();
        let row = mk_row("1025655242481777");
        repo.put(row.clone()).unwrap();
        let got = repo.get(&row.id).unwrap().unwrap();
        assert_eq!(got, row);
    }

    #[test]
    fn put_overwrites() {
        let repo = InMemoryRepo::new();
        repo.put(mk_row("1")).unwrap();
        let replacement =
            QuestionnaireResponse::from_document(json!({"id": "1", "status": "amended"})).unwrap();
        repo.put(replacement).unwrap();
        assert_eq!(repo.len().unwrap(), 1);
        let got = repo.get(&ResponseId::new("1").unwrap()).unwrap().unwrap();
        assert_eq!(got.document["status"], "amended");
    }

    #[test]
    fn delete_absent_is_ok() {
        let repo = InMemoryRepo::new();
        repo.delete(&ResponseId::new("9").unwrap()).unwrap();
        assert!(repo.is_empty().unwrap());
    }
}
