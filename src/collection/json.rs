//! Collection served from a JSON fixture file.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{EditionResult, Entity, Question, SurveyMetadata, Token, NO_ANSWER};

use super::{AggregationQuery, Collection, CollectionError, Enricher, RespondentStats};

/// On-disk layout of a fixture.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionFixture {
    pub survey: SurveyMetadata,
    #[serde(default)]
    pub questions: Vec<Question>,
    /// Raw results keyed by [`result_key`].
    #[serde(default)]
    pub results: HashMap<String, Vec<EditionResult>>,
    #[serde(default)]
    pub total_respondents: HashMap<String, u64>,
    #[serde(default)]
    pub completion: HashMap<String, u64>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

/// `<dbPath>` for single-axis queries, `<dbPath>/<facetQuestionId>` when a
/// facet is present.
pub fn result_key(query: &AggregationQuery) -> String {
    match &query.axis2 {
        Some(_) => format!("{}/{}", query.db_path, query.axis1.question.id),
        None => query.db_path.clone(),
    }
}

pub struct JsonCollection {
    fixture: CollectionFixture,
}

impl JsonCollection {
    pub fn new(fixture: CollectionFixture) -> Self {
        Self { fixture }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CollectionError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let fixture: CollectionFixture = serde_json::from_str(&raw)?;
        Ok(Self::new(fixture))
    }

    pub fn survey(&self) -> &SurveyMetadata {
        &self.fixture.survey
    }

    pub fn questions(&self) -> &[Question] {
        &self.fixture.questions
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.fixture.questions.iter().find(|q| q.id == id)
    }
}

#[async_trait::async_trait]
impl Collection for JsonCollection {
    async fn aggregate(
        &self,
        query: &AggregationQuery,
    ) -> Result<Vec<EditionResult>, CollectionError> {
        let mut editions = self
            .fixture
            .results
            .get(&result_key(query))
            .cloned()
            .unwrap_or_default();

        if let Some(selected) = &query.selected_edition_id {
            editions.retain(|e| &e.edition_id == selected);
        }
        if !query.show_no_answer {
            for edition in editions.iter_mut() {
                edition.buckets.retain(|b| b.id != NO_ANSWER);
                for bucket in edition.buckets.iter_mut() {
                    bucket.facet_buckets.retain(|fb| fb.id != NO_ANSWER);
                }
            }
        }
        Ok(editions)
    }
}

#[async_trait::async_trait]
impl RespondentStats for JsonCollection {
    async fn total_respondents(
        &self,
        _survey: &SurveyMetadata,
    ) -> Result<HashMap<String, u64>, CollectionError> {
        Ok(self.fixture.total_respondents.clone())
    }

    async fn completion(
        &self,
        _survey: &SurveyMetadata,
        _match_filter: &Value,
    ) -> Result<HashMap<String, u64>, CollectionError> {
        Ok(self.fixture.completion.clone())
    }
}

#[async_trait::async_trait]
impl Enricher for JsonCollection {
    async fn entities(&self, ids: &[String]) -> Result<Vec<Entity>, CollectionError> {
        Ok(self
            .fixture
            .entities
            .iter()
            .filter(|e| ids.contains(&e.id))
            .cloned()
            .collect())
    }

    async fn tokens(&self, ids: &[String]) -> Result<Vec<Token>, CollectionError> {
        Ok(self
            .fixture
            .tokens
            .iter()
            .filter(|t| ids.contains(&t.id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SubField;

    const FIXTURE: &str = r#"{
        "survey": {"id": "sojs", "editions": [{"id": "js2022", "year": 2022}, {"id": "js2023", "year": 2023}]},
        "results": {
            "tools.vite.experience": [
                {"editionId": "js2022", "buckets": [{"id": "used", "count": 4}, {"id": "no_answer", "count": 2}]},
                {"editionId": "js2023", "buckets": [{"id": "used", "count": 9}]}
            ]
        },
        "entities": [{"id": "vite", "name": "Vite"}]
    }"#;

    fn query(selected: Option<&str>, show_no_answer: bool) -> AggregationQuery {
        AggregationQuery {
            survey_id: "sojs".into(),
            db_path: "tools.vite.experience".into(),
            match_filter: Value::Null,
            axis1: crate::stages::sort::tests::test_axis(
                crate::model::SortProperty::Count,
                crate::model::SortOrder::Desc,
            ),
            axis2: None,
            sub_field: SubField::Responses,
            show_no_answer,
            selected_edition_id: selected.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn serves_results_by_path_and_edition() {
        let fixture: CollectionFixture = serde_json::from_str(FIXTURE).unwrap();
        let collection = JsonCollection::new(fixture);

        let all = collection.aggregate(&query(None, false)).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].buckets.len(), 1);

        let with_no_answer = collection.aggregate(&query(None, true)).await.unwrap();
        assert_eq!(with_no_answer[0].buckets.len(), 2);

        let one = collection
            .aggregate(&query(Some("js2023"), false))
            .await
            .unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].buckets[0].data.count, 9);
    }

    #[tokio::test]
    async fn enriches_known_ids_only() {
        let fixture: CollectionFixture = serde_json::from_str(FIXTURE).unwrap();
        let collection = JsonCollection::new(fixture);
        let entities = collection
            .entities(&["vite".to_string(), "webpack".to_string()])
            .await
            .unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name.as_deref(), Some("Vite"));
    }
}
