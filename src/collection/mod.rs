//! Storage-side collaborators: raw aggregation, respondent statistics,
//! entity enrichment and filter compilation.
//!
//! The engine never talks to a database directly. Everything it needs from
//! storage goes through the traits below; [`JsonCollection`] implements all
//! of them over a JSON fixture.

pub mod error;
pub mod json;

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::warn;

use crate::axes::AxisParameters;
use crate::model::{EditionResult, Entity, SubField, SurveyMetadata, Token};

pub use error::CollectionError;
pub use json::{CollectionFixture, JsonCollection};

/// Everything a backend needs to run one raw aggregation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationQuery {
    pub survey_id: String,
    /// Storage path of the answers being aggregated.
    pub db_path: String,
    pub match_filter: Value,
    pub axis1: AxisParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub axis2: Option<AxisParameters>,
    pub sub_field: SubField,
    pub show_no_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_edition_id: Option<String>,
}

#[async_trait::async_trait]
pub trait Collection: Send + Sync {
    /// One entry per edition, buckets unmerged and unlabeled.
    async fn aggregate(&self, query: &AggregationQuery)
        -> Result<Vec<EditionResult>, CollectionError>;
}

#[async_trait::async_trait]
pub trait RespondentStats: Send + Sync {
    /// Everyone who took the survey, by edition id.
    async fn total_respondents(
        &self,
        survey: &SurveyMetadata,
    ) -> Result<HashMap<String, u64>, CollectionError>;

    /// Everyone matching `match_filter`, by edition id.
    async fn completion(
        &self,
        survey: &SurveyMetadata,
        match_filter: &Value,
    ) -> Result<HashMap<String, u64>, CollectionError>;
}

#[async_trait::async_trait]
pub trait Enricher: Send + Sync {
    async fn entities(&self, ids: &[String]) -> Result<Vec<Entity>, CollectionError>;
    async fn tokens(&self, ids: &[String]) -> Result<Vec<Token>, CollectionError>;
}

/// Turns a caller's filter tree into match-filter clauses.
pub trait FilterCompiler: Send + Sync {
    fn compile(&self, filters: &Value) -> Result<Map<String, Value>, CollectionError>;
}

/// Accepts filters that are already in match-filter form.
pub struct PassthroughFilters;

impl FilterCompiler for PassthroughFilters {
    fn compile(&self, filters: &Value) -> Result<Map<String, Value>, CollectionError> {
        match filters {
            Value::Null => Ok(Map::new()),
            Value::Object(map) => Ok(map.clone()),
            other => Err(CollectionError::invalid_filter(format!(
                "expected an object, got {other}"
            ))),
        }
    }
}

// =============================================================================
// Retries
// =============================================================================

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_base_delay: Duration::from_millis(250),
        }
    }
}

/// Retries retryable aggregation failures with exponential backoff.
pub struct RetryingCollection<C: Collection> {
    inner: C,
    config: RetryConfig,
}

impl<C: Collection> RetryingCollection<C> {
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<C: Collection> Collection for RetryingCollection<C> {
    async fn aggregate(
        &self,
        query: &AggregationQuery,
    ) -> Result<Vec<EditionResult>, CollectionError> {
        let mut attempt = 0;
        loop {
            match self.inner.aggregate(query).await {
                Ok(results) => return Ok(results),
                Err(err) => {
                    if !err.is_retryable() || attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    warn!(
                        code = err.code(),
                        attempt,
                        db_path = %query.db_path,
                        "aggregation failed; retrying"
                    );
                    sleep(backoff_delay(self.config.retry_base_delay, attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}
