use serde_json::Value;

use crate::{CoreError, IdGenerator, QuestionnaireResponse, ResponseId, ResponseRepository, ID_FIELD};

/// Application service behind the `questionnaire_responses` resource.
///
/// Generic over the repository and the id generator so the HTTP layers can
/// run against DynamoDB, SQLite or memory without changing behavior.
pub struct ResponseService<R: ResponseRepository, G: IdGenerator> {
    repo: R,
    ids: G,
}

impl<R: ResponseRepository, G: IdGenerator> ResponseService<R, G> {
    pub fn new(repo: R, ids: G) -> Self {
        Self { repo, ids }
    }

    /// Fetch a stored response; `NotFound` when the row is absent.
    pub fn get(&self, id: &ResponseId) -> Result<QuestionnaireResponse, CoreError> {
        self.repo.get(id)?.ok_or(CoreError::NotFound)
    }

    /// Store a posted document, replacing any row with the same id.
    ///
    /// A document without an `id` member gets one from the generator.
    pub fn create(&self, document: Value) -> Result<QuestionnaireResponse, CoreError> {
        let Some(obj) = document.as_object() else {
            return Err(CoreError::InvalidDocument("expected a JSON object".into()));
        };
        let response = if obj.contains_key(ID_FIELD) {
            QuestionnaireResponse::from_document(document)?
        } else {
            QuestionnaireResponse::with_id(self.ids.next_id(), document)?
        };
        self.repo.put(response.clone())?;
        Ok(response)
    }

    /// Remove a stored response. Deleting an absent id succeeds.
    pub fn delete(&self, id: &ResponseId) -> Result<(), CoreError> {
        self.repo.delete(id)
    }

    /// Expose the underlying repository for direct table access.
    pub fn repo(&self) -> &R {
        &self.repo
    }
}
