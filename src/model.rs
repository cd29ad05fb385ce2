//! Survey, question and result types shared by the resolver and every stage.

use serde::{Deserialize, Deserializer, Serialize};

// =============================================================================
// Reserved bucket ids
// =============================================================================

/// Respondent skipped the question.
pub const NO_ANSWER: &str = "no_answer";
pub const NOT_APPLICABLE: &str = "not_applicable";
pub const PREFER_NOT_TO_SAY: &str = "prefer_not_to_say";

/// Buckets that failed the cutoff test.
pub const CUTOFF_ANSWERS: &str = "cutoff_answers";
/// Buckets that fell past the axis limit.
pub const OVERLIMIT_ANSWERS: &str = "overlimit_answers";
/// Final catch-all for every non-standard bucket.
pub const OTHER_ANSWERS: &str = "other_answers";
/// Non-faceted baseline injected in two-axis results.
pub const OVERALL: &str = "overall";
/// Wrapper id produced by single-axis raw aggregations.
pub const DEFAULT_BUCKET: &str = "default";

/// Reserved facet selector that turns sentiment into the inner axis.
pub const SENTIMENT_FACET: &str = "_sentiment";

pub const SENTINEL_IDS: &[&str] = &[NO_ANSWER, NOT_APPLICABLE, PREFER_NOT_TO_SAY];
pub const SYNTHETIC_IDS: &[&str] = &[CUTOFF_ANSWERS, OVERLIMIT_ANSWERS, OTHER_ANSWERS];

pub fn is_sentinel(id: &str) -> bool {
    SENTINEL_IDS.contains(&id)
}

pub fn is_synthetic(id: &str) -> bool {
    SYNTHETIC_IDS.contains(&id)
}

/// Sentinels, synthetic merge buckets and the overall baseline. None of these
/// are ever absorbed by a merge, counted against a limit, or sorted among
/// regular answers.
pub fn is_special(id: &str) -> bool {
    is_sentinel(id) || is_synthetic(id) || id == OVERALL
}

// =============================================================================
// Survey metadata
// =============================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionMetadata {
    pub id: String,
    pub year: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyMetadata {
    pub id: String,
    #[serde(default)]
    pub editions: Vec<EditionMetadata>,
}

impl SurveyMetadata {
    pub fn edition(&self, edition_id: &str) -> Option<&EditionMetadata> {
        self.editions.iter().find(|e| e.id == edition_id)
    }

    /// Editions up to and including `edition`, so aggregations never pick up
    /// results from a later year.
    pub fn past_editions(&self, edition: &EditionMetadata) -> Vec<&EditionMetadata> {
        self.editions
            .iter()
            .filter(|e| e.year <= edition.year)
            .collect()
    }
}

// =============================================================================
// Questions
// =============================================================================

/// Which stored representation of an answer to read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubField {
    #[default]
    Responses,
    Combined,
    Prenormalized,
    Other,
}

impl SubField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Responses => "responses",
            Self::Combined => "combined",
            Self::Prenormalized => "prenormalized",
            Self::Other => "other",
        }
    }
}

/// Storage paths of a question's answer representations.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormPaths {
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub other: Option<String>,
    #[serde(default)]
    pub prenormalized: Option<String>,
}

/// A predeclared answer category.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Numeric value standing for this option (e.g. the midpoint of a range).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
}

impl QuestionOption {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            average: None,
        }
    }
}

/// A named consolidation of several options.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionGroup {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SortProperty {
    Options,
    Count,
    Id,
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Caller-supplied sort override; either field may be omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpecifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<SortProperty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<SortOrder>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub survey_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<OptionGroup>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sort: Option<SortProperty>,
    /// Option ids are successive integers (rating scales, years of experience).
    #[serde(default)]
    pub options_are_sequential: bool,
    #[serde(default)]
    pub norm_paths: NormPaths,
}

impl Question {
    /// Storage path to aggregate on for `sub_field`.
    ///
    /// The `source` question only exists as freeform data and always reads
    /// the `other` path.
    pub fn storage_path(&self, sub_field: SubField) -> Option<&str> {
        let paths = &self.norm_paths;
        let path = if self.id == "source" {
            paths.other.as_deref()
        } else {
            match sub_field {
                SubField::Responses | SubField::Combined => paths.response.as_deref(),
                SubField::Prenormalized => paths.prenormalized.as_deref(),
                SubField::Other => paths.other.as_deref(),
            }
        };
        path.filter(|p| !p.is_empty())
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Percentiles {
    pub p0: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p100: f64,
}

impl Percentiles {
    pub const RANKS: [f64; 5] = [0.0, 25.0, 50.0, 75.0, 100.0];

    pub fn values(&self) -> [f64; 5] {
        [self.p0, self.p25, self.p50, self.p75, self.p100]
    }

    pub fn from_values(values: [f64; 5]) -> Self {
        Self {
            p0: values[0],
            p25: values[1],
            p50: values[2],
            p75: values[3],
            p100: values[4],
        }
    }
}

/// Statistics carried by both buckets and facet buckets.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BucketData {
    pub count: u64,
    pub percentage_question: f64,
    pub percentage_survey: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentiles: Option<Percentiles>,
}

impl BucketData {
    pub fn with_count(count: u64) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Normalization token a freeform bucket id was matched against.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacetBucket {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(flatten)]
    pub data: BucketData,
    /// Share of the parent bucket's count.
    #[serde(default)]
    pub percentage_bucket: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_bucket_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FacetBucket {
    pub fn new(id: impl Into<String>, count: u64) -> Self {
        Self {
            id: id.into(),
            data: BucketData::with_count(count),
            percentage_bucket: 0.0,
            grouped_bucket_ids: None,
            entity: None,
            token: None,
            label: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(flatten)]
    pub data: BucketData,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facet_buckets: Vec<FacetBucket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouped_bucket_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<Entity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<Token>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_count: Option<u64>,
}

impl Bucket {
    pub fn new(id: impl Into<String>, count: u64) -> Self {
        Self {
            id: id.into(),
            data: BucketData::with_count(count),
            facet_buckets: Vec::new(),
            grouped_bucket_ids: None,
            entity: None,
            token: None,
            label: None,
            completion_count: None,
        }
    }

    pub fn with_facets(mut self, facet_buckets: Vec<FacetBucket>) -> Self {
        self.facet_buckets = facet_buckets;
        self
    }
}

impl From<FacetBucket> for Bucket {
    fn from(fb: FacetBucket) -> Self {
        Self {
            id: fb.id,
            data: fb.data,
            facet_buckets: Vec::new(),
            grouped_bucket_ids: fb.grouped_bucket_ids,
            entity: fb.entity,
            token: fb.token,
            label: fb.label,
            completion_count: None,
        }
    }
}

/// Respondent totals for one edition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionCompletion {
    /// Everyone who took the survey that edition.
    pub total_respondents: u64,
    /// Everyone who answered this question (under the active filters).
    pub count: u64,
    pub percentage_survey: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionResult {
    pub edition_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<EditionCompletion>,
    #[serde(default)]
    pub buckets: Vec<Bucket>,
}

impl EditionResult {
    pub fn new(edition_id: impl Into<String>, buckets: Vec<Bucket>) -> Self {
        Self {
            edition_id: edition_id.into(),
            year: None,
            completion: None,
            buckets,
        }
    }
}

/// Raw aggregations emit ids as strings, numbers or null; null becomes the
/// empty id that the cleaning stage discards.
fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_follows_sub_field() {
        let question = Question {
            id: "tools".into(),
            survey_id: "state_of_js".into(),
            template: None,
            options: None,
            groups: None,
            default_sort: None,
            options_are_sequential: false,
            norm_paths: NormPaths {
                base: Some("tools.vite".into()),
                response: Some("tools.vite.choices".into()),
                other: Some("tools.vite.others.normalized".into()),
                prenormalized: None,
            },
        };
        assert_eq!(
            question.storage_path(SubField::Combined),
            Some("tools.vite.choices")
        );
        assert_eq!(
            question.storage_path(SubField::Other),
            Some("tools.vite.others.normalized")
        );
        assert_eq!(question.storage_path(SubField::Prenormalized), None);

        let source = Question {
            id: "source".into(),
            ..question
        };
        assert_eq!(
            source.storage_path(SubField::Responses),
            Some("tools.vite.others.normalized")
        );
    }

    #[test]
    fn bucket_ids_accept_numbers_and_null() {
        let raw = r#"[{"id": 3, "count": 4}, {"id": null, "count": 1}, {"id": "a"}]"#;
        let buckets: Vec<Bucket> = serde_json::from_str(raw).unwrap();
        assert_eq!(buckets[0].id, "3");
        assert_eq!(buckets[0].data.count, 4);
        assert_eq!(buckets[1].id, "");
        assert_eq!(buckets[2].data.count, 0);
    }

    #[test]
    fn special_ids() {
        assert!(is_special(NO_ANSWER));
        assert!(is_special(CUTOFF_ANSWERS));
        assert!(is_special(OVERALL));
        assert!(!is_special("react"));
        assert!(!is_sentinel(OTHER_ANSWERS));
    }
}
