//! Request orchestration: resolve axes, fetch raw results and statistics,
//! run the stage plan.
//!
//! ```text
//! request ─► question + axes ─► cache? ─► match filter ─► fetch (raw, freeform, stats)
//!         ─► stage plan ─► cache put ─► results
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::axes::{resolve_axes, FacetKind, FacetSelector, ResolvedAxes};
use crate::cache::{GenericCacheKey, ResultCache};
use crate::collection::{
    AggregationQuery, Collection, Enricher, FilterCompiler, PassthroughFilters, RespondentStats,
};
use crate::error::ComputeError;
use crate::inspect::{Artifact, InspectionRecord, InspectionSink, JsonlInspectionSink};
use crate::model::{EditionMetadata, EditionResult, Question, SubField, SurveyMetadata};
use crate::request::ComputeRequest;
use crate::stages::shape::merge_freeform;
use crate::stages::{AxisMode, EditionStats, PipelineState, StageContext, StagePlan};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeResponse {
    pub request_id: Uuid,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    pub facet: FacetKind,
    pub results: Vec<EditionResult>,
}

/// Collaborators for one survey. Everything is borrowed, so an engine is
/// cheap to build per request.
pub struct ComputeEngine<'a> {
    survey: &'a SurveyMetadata,
    questions: &'a [Question],
    collection: &'a dyn Collection,
    stats: &'a dyn RespondentStats,
    enricher: Option<&'a dyn Enricher>,
    filters: &'a dyn FilterCompiler,
    cache: Option<&'a dyn ResultCache>,
    inspection: Option<&'a dyn InspectionSink>,
}

impl<'a> ComputeEngine<'a> {
    pub fn new(
        survey: &'a SurveyMetadata,
        questions: &'a [Question],
        collection: &'a dyn Collection,
        stats: &'a dyn RespondentStats,
    ) -> Self {
        Self {
            survey,
            questions,
            collection,
            stats,
            enricher: None,
            filters: &PassthroughFilters,
            cache: None,
            inspection: None,
        }
    }

    pub fn with_enricher(mut self, enricher: &'a dyn Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_filters(mut self, filters: &'a dyn FilterCompiler) -> Self {
        self.filters = filters;
        self
    }

    pub fn with_cache(mut self, cache: &'a dyn ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_inspection(mut self, sink: &'a dyn InspectionSink) -> Self {
        self.inspection = Some(sink);
        self
    }

    pub fn question(&self, id: &str) -> Option<&'a Question> {
        self.questions
            .iter()
            .find(|q| q.id == id && q.survey_id == self.survey.id)
    }

    /// Compute one request end to end. Any fetch or stage failure aborts
    /// the whole request.
    pub async fn compute(&self, request: &ComputeRequest) -> Result<ComputeResponse, ComputeError> {
        let request_id = Uuid::new_v4();
        let start = Instant::now();
        let params = &request.parameters;
        info!(
            %request_id,
            question = %request.question_id,
            facet = request.facet.as_deref().unwrap_or(""),
            sub_field = request.sub_field.as_str(),
            "compute started"
        );
        self.inspect(request_id, Artifact::Request, request);

        let question = self.question(&request.question_id).ok_or_else(|| {
            ComputeError::invalid_request(format!(
                "unknown question `{}` in survey `{}`",
                request.question_id, self.survey.id
            ))
        })?;
        let selected_edition = match request.edition_id.as_deref() {
            Some(id) => Some(self.survey.edition(id).ok_or_else(|| {
                ComputeError::invalid_request(format!("unknown edition `{id}`"))
            })?),
            None => None,
        };

        let facet = FacetSelector::parse(request.facet.as_deref());
        let axes = resolve_axes(question, params, &facet, self.questions);
        self.inspect(request_id, Artifact::Axes, &axes);

        let db_path = question.storage_path(request.sub_field).ok_or_else(|| {
            ComputeError::config(format!(
                "no storage path for question `{}` with sub-field `{}`",
                question.id,
                request.sub_field.as_str()
            ))
        })?;

        let cache_key = self.cache_key(request);
        if let (Some(cache), Some(key)) = (self.cache, cache_key.as_ref()) {
            match cache.get(key).await {
                Ok(Some(results)) => {
                    info!(%request_id, key = %key.key_hash, "cache hit");
                    return Ok(ComputeResponse {
                        request_id,
                        cached: true,
                        cache_key: Some(key.key_hash.clone()),
                        facet: axes.facet,
                        results,
                    });
                }
                Ok(None) => debug!(%request_id, key = %key.key_hash, "cache miss"),
                Err(err) => warn!(%request_id, error = %err, "cache lookup failed"),
            }
        }

        let compiled = match request.filters.as_ref() {
            Some(filters) => self.filters.compile(filters)?,
            None => Map::new(),
        };
        let match_filter = build_match_filter(self.survey, selected_edition, db_path, compiled);
        self.inspect(request_id, Artifact::MatchFilter, &match_filter);

        let query = AggregationQuery {
            survey_id: self.survey.id.clone(),
            db_path: db_path.to_string(),
            match_filter: match_filter.clone(),
            axis1: axes.axis1.clone(),
            axis2: axes.axis2.clone(),
            sub_field: request.sub_field,
            show_no_answer: params.show_no_answer(),
            selected_edition_id: selected_edition.map(|e| e.id.clone()),
        };
        self.inspect(request_id, Artifact::Query, &query);
        let freeform_query = freeform_query(question, &query);

        let freeform = async {
            match &freeform_query {
                Some(q) => self.collection.aggregate(q).await,
                None => Ok(Vec::new()),
            }
        };
        let (raw, freeform, total_respondents, completion) = futures::try_join!(
            self.collection.aggregate(&query),
            freeform,
            self.stats.total_respondents(self.survey),
            self.stats.completion(self.survey, &match_filter),
        )?;
        self.inspect(request_id, Artifact::RawResults, &raw);
        debug!(
            %request_id,
            editions = raw.len(),
            freeform_editions = freeform.len(),
            "raw results fetched"
        );

        let editions = if freeform_query.is_some() {
            merge_freeform(raw, freeform)
        } else {
            raw
        };
        let results = self
            .post_process(&axes, request, editions, total_respondents, completion)
            .await?;
        self.inspect(request_id, Artifact::Results, &results);

        if let (Some(cache), Some(key)) = (self.cache, cache_key.as_ref()) {
            if let Err(err) = cache.put(key, &results).await {
                warn!(%request_id, error = %err, "cache write failed");
            }
        }

        info!(
            %request_id,
            editions = results.len(),
            buckets = results.iter().map(|e| e.buckets.len()).sum::<usize>(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "compute finished"
        );
        Ok(ComputeResponse {
            request_id,
            cached: false,
            cache_key: cache_key.map(|k| k.key_hash),
            facet: axes.facet,
            results,
        })
    }

    async fn post_process(
        &self,
        axes: &ResolvedAxes,
        request: &ComputeRequest,
        editions: Vec<EditionResult>,
        total_respondents: HashMap<String, u64>,
        completion: HashMap<String, u64>,
    ) -> Result<Vec<EditionResult>, ComputeError> {
        let params = &request.parameters;
        let mode = if axes.is_faceted() {
            AxisMode::Faceted
        } else {
            AxisMode::Single
        };
        let include_overall =
            params.enable_add_overall_bucket() && axes.facet != FacetKind::Sentiment;
        let plan = StagePlan::standard(mode, include_overall)?;

        let stats = EditionStats {
            total_respondents,
            completion,
        };
        let ctx = StageContext {
            survey: self.survey,
            stats: &stats,
            enricher: self.enricher,
            dataset_cutoff: params.dataset_cutoff(),
        };
        let mut state = PipelineState {
            editions,
            main: axes.bucket_axis().clone(),
            facet: axes.facet_axis().cloned(),
        };
        plan.run(&mut state, &ctx).await?;
        Ok(state.editions)
    }

    fn cache_key(&self, request: &ComputeRequest) -> Option<GenericCacheKey> {
        if self.cache.is_none() || !request.parameters.enable_cache() {
            return None;
        }
        match GenericCacheKey::new(&self.survey.id, request) {
            Ok(key) => Some(key),
            Err(err) => {
                warn!(error = %err, "could not build cache key; computing uncached");
                None
            }
        }
    }

    fn inspect<T: Serialize + ?Sized>(&self, request_id: Uuid, artifact: Artifact, payload: &T) {
        let Some(sink) = self.inspection else {
            return;
        };
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(?artifact, error = %err, "could not serialize inspection artifact");
                return;
            }
        };
        if let Err(err) = sink.record(InspectionRecord::new(request_id, artifact, payload)) {
            warn!(?artifact, error = %err, "inspection sink rejected artifact");
        }
    }
}

// =============================================================================
// Match filter
// =============================================================================

/// Editions a request may aggregate over when none is selected: the latest
/// edition and everything before it.
fn edition_scope(survey: &SurveyMetadata, selected: Option<&EditionMetadata>) -> Option<Value> {
    if let Some(edition) = selected {
        return Some(Value::String(edition.id.clone()));
    }
    let latest = survey.editions.iter().max_by_key(|e| e.year)?;
    let ids: Vec<Value> = survey
        .past_editions(latest)
        .into_iter()
        .map(|e| Value::String(e.id.clone()))
        .collect();
    Some(json!({ "$in": ids }))
}

/// Responses of this survey with a non-empty answer at `db_path`, narrowed
/// by the compiled filters and the edition scope.
pub fn build_match_filter(
    survey: &SurveyMetadata,
    selected: Option<&EditionMetadata>,
    db_path: &str,
    compiled: Map<String, Value>,
) -> Value {
    let mut filter = Map::new();
    filter.insert("surveyId".into(), Value::String(survey.id.clone()));
    filter.insert(
        db_path.to_string(),
        json!({ "$nin": [null, "", [], {}] }),
    );
    filter.extend(compiled);
    if let Some(scope) = edition_scope(survey, selected) {
        filter.insert("editionId".into(), scope);
    }
    Value::Object(filter)
}

/// Combined results also read the freeform answers, from the `other` path.
fn freeform_query(question: &Question, query: &AggregationQuery) -> Option<AggregationQuery> {
    if query.sub_field != SubField::Combined {
        return None;
    }
    let other_path = question.storage_path(SubField::Other)?;
    let mut freeform = query.clone();
    freeform.db_path = other_path.to_string();
    freeform.sub_field = SubField::Other;
    if let Value::Object(map) = &mut freeform.match_filter {
        map.remove(query.db_path.as_str());
        map.insert(
            other_path.to_string(),
            json!({ "$nin": [null, "", [], {}] }),
        );
    }
    Some(freeform)
}

/// Run `compute` with inspection records written to `inspection_path`.
///
/// The file is complete once this returns; sink failures are logged and
/// never change the result.
pub async fn compute_with_inspection_file(
    engine: ComputeEngine<'_>,
    inspection_path: Option<PathBuf>,
    request: &ComputeRequest,
) -> Result<ComputeResponse, ComputeError> {
    let (sink, worker) = match inspection_path {
        Some(path) => match JsonlInspectionSink::new(&path) {
            Ok((sink, worker)) => (Some(sink), Some(worker)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not open inspection file");
                (None, None)
            }
        },
        None => (None, None),
    };
    let engine = match sink.as_ref() {
        Some(sink) => engine.with_inspection(sink),
        None => engine,
    };

    let result = engine.compute(request).await;

    drop(engine);
    drop(sink);
    if let Some(worker) = worker {
        match worker.join() {
            Ok(lines) => debug!(lines, "inspection file written"),
            Err(err) => warn!(error = %err, "inspection worker failed"),
        }
    }
    result
}
