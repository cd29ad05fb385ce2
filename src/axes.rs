//! Aggregation axes: which question each dimension reads and the sort,
//! cutoff and limit policy applied to it.
//!
//! ## Swapping
//!
//! When a facet is requested the facet becomes `axis1` and the base question
//! `axis2`. The raw aggregation groups by `axis1` first; post-processing then
//! treats `axis2` as the top-level bucket axis and `axis1` as the facet-bucket
//! axis (see [`ResolvedAxes::bucket_axis`]).
//!
//! Sentiment is not a real question: it is resolved into a pseudo-question
//! reading `<base>.sentiment` and always ends up as the inner dimension.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{
    OptionGroup, Question, QuestionOption, SortOrder, SortProperty, SortSpecifier, SENTIMENT_FACET,
};
use crate::request::ResponsesParameters;

// =============================================================================
// Axis parameters
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisParameters {
    pub question: Question,
    pub sort: SortProperty,
    pub order: SortOrder,
    pub cutoff: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff_percent: Option<f64>,
    /// Zero means unlimited.
    pub limit: usize,
    pub group_under_cutoff: bool,
    pub group_over_limit: bool,
    pub merge_other_buckets: bool,
    pub enable_bucket_groups: bool,
    pub enable_add_missing_buckets: bool,
    /// Working option list. Starts as the question's options and is replaced
    /// by its groups once grouping is final.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<QuestionOption>>,
}

impl AxisParameters {
    /// Groups to consolidate buckets into, if grouping applies to this axis.
    pub fn active_groups(&self) -> Option<&[OptionGroup]> {
        if !self.enable_bucket_groups {
            return None;
        }
        self.question
            .groups
            .as_deref()
            .filter(|groups| !groups.is_empty())
    }

    /// Copy of this axis whose working options are the question's groups.
    ///
    /// Returns `None` when grouping does not apply, so callers keep the
    /// current value.
    pub fn with_groups_as_options(&self) -> Option<AxisParameters> {
        let groups = self.active_groups()?;
        let options = groups
            .iter()
            .map(|g| QuestionOption {
                id: g.id.clone(),
                label: g.label.clone(),
                average: None,
            })
            .collect();
        Some(AxisParameters {
            options: Some(options),
            ..self.clone()
        })
    }

    pub fn option_position(&self, id: &str) -> Option<usize> {
        self.options.as_ref()?.iter().position(|o| o.id == id)
    }

    pub fn option(&self, id: &str) -> Option<&QuestionOption> {
        self.options.as_ref()?.iter().find(|o| o.id == id)
    }

    pub fn cutoff_percent(&self) -> Option<f64> {
        self.cutoff_percent.filter(|p| *p > 0.0)
    }

    /// Whether the cutoff test can reject anything on this axis. A count
    /// cutoff of 1 would only catch synthesized zero-count buckets, which
    /// must stay visible.
    pub fn has_cutoff(&self) -> bool {
        self.cutoff > 1 || self.cutoff_percent().is_some()
    }
}

// =============================================================================
// Facet selection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacetSelector {
    NoFacet,
    Question { id: String },
    Sentiment,
}

impl FacetSelector {
    /// Parse the raw selector. Question selectors look like
    /// `section__question` or `section__question__sub`; the section prefix is
    /// not part of the question id.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Self::NoFacet;
        };
        if raw == SENTIMENT_FACET {
            return Self::Sentiment;
        }
        let parts: Vec<&str> = raw.split("__").collect();
        let id = match parts.as_slice() {
            [single] => (*single).to_string(),
            [_section, field] => (*field).to_string(),
            [_section, field, sub, ..] => format!("{field}__{sub}"),
            [] => return Self::NoFacet,
        };
        Self::Question { id }
    }
}

/// Outcome of facet resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FacetKind {
    None,
    Question,
    Sentiment,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedAxes {
    pub axis1: AxisParameters,
    pub axis2: Option<AxisParameters>,
    pub facet: FacetKind,
}

impl ResolvedAxes {
    /// Axis the top-level buckets are grouped by.
    pub fn bucket_axis(&self) -> &AxisParameters {
        self.axis2.as_ref().unwrap_or(&self.axis1)
    }

    /// Axis the facet buckets are grouped by, if any.
    pub fn facet_axis(&self) -> Option<&AxisParameters> {
        self.axis2.as_ref().map(|_| &self.axis1)
    }

    pub fn is_faceted(&self) -> bool {
        self.axis2.is_some()
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Default sort for a question, with field-by-field explicit overrides.
pub fn question_sort(
    question: &Question,
    specifier: Option<&SortSpecifier>,
    enable_bucket_groups: bool,
) -> (SortProperty, SortOrder) {
    let mut order = SortOrder::Desc;
    let has_groups = question.groups.as_ref().is_some_and(|g| !g.is_empty());
    let sort = if enable_bucket_groups && has_groups {
        SortProperty::Options
    } else if let Some(default_sort) = question.default_sort {
        default_sort
    } else if question.options_are_sequential {
        if question.options.is_some() {
            SortProperty::Options
        } else {
            // numeric values without declared options: plot them as a curve
            order = SortOrder::Asc;
            SortProperty::Id
        }
    } else {
        SortProperty::Count
    };

    let specifier = specifier.cloned().unwrap_or_default();
    (
        specifier.property.unwrap_or(sort),
        specifier.order.unwrap_or(order),
    )
}

struct AxisPolicy<'a> {
    sort: Option<&'a SortSpecifier>,
    cutoff: u64,
    cutoff_percent: Option<f64>,
    limit: usize,
}

fn build_axis(
    question: &Question,
    policy: AxisPolicy<'_>,
    params: &ResponsesParameters,
) -> AxisParameters {
    let enable_bucket_groups = params.enable_bucket_groups();
    let (sort, order) = question_sort(question, policy.sort, enable_bucket_groups);
    AxisParameters {
        question: question.clone(),
        sort,
        order,
        cutoff: policy.cutoff,
        cutoff_percent: policy.cutoff_percent,
        limit: policy.limit,
        group_under_cutoff: true,
        group_over_limit: true,
        merge_other_buckets: params.merge_other_buckets(),
        enable_bucket_groups,
        enable_add_missing_buckets: params.enable_add_missing_buckets(),
        options: question.options.clone(),
    }
}

fn sentiment_axis(base: &AxisParameters) -> AxisParameters {
    let question = &base.question;
    let pseudo = Question {
        id: format!("{}__sentiment", question.id),
        survey_id: question.survey_id.clone(),
        template: question.template.clone(),
        options: None,
        groups: None,
        default_sort: None,
        options_are_sequential: false,
        norm_paths: crate::model::NormPaths {
            response: question
                .norm_paths
                .base
                .as_ref()
                .map(|b| format!("{b}.sentiment")),
            ..Default::default()
        },
    };
    AxisParameters {
        question: pseudo,
        sort: base.sort,
        order: base.order,
        cutoff: base.cutoff,
        cutoff_percent: None,
        limit: base.limit,
        group_under_cutoff: true,
        group_over_limit: true,
        merge_other_buckets: false,
        enable_bucket_groups: false,
        enable_add_missing_buckets: false,
        options: None,
    }
}

/// Resolve the axes of a request.
///
/// `pool` is searched for question facets by id and survey; a facet that
/// cannot be found is dropped and the request runs single-axis.
pub fn resolve_axes(
    question: &Question,
    params: &ResponsesParameters,
    facet: &FacetSelector,
    pool: &[Question],
) -> ResolvedAxes {
    let axis1 = build_axis(
        question,
        AxisPolicy {
            sort: params.sort.as_ref(),
            cutoff: params.cutoff(),
            cutoff_percent: params.cutoff_percent,
            limit: params.limit(),
        },
        params,
    );

    match facet {
        FacetSelector::NoFacet => ResolvedAxes {
            axis1,
            axis2: None,
            facet: FacetKind::None,
        },
        FacetSelector::Sentiment => ResolvedAxes {
            axis1: sentiment_axis(&axis1),
            axis2: Some(axis1),
            facet: FacetKind::Sentiment,
        },
        FacetSelector::Question { id } => {
            let facet_question = pool
                .iter()
                .find(|q| q.id == *id && q.survey_id == question.survey_id);
            match facet_question {
                Some(facet_question) => {
                    let facet_axis = build_axis(
                        facet_question,
                        AxisPolicy {
                            sort: params.facet_sort.as_ref(),
                            cutoff: params.facet_cutoff(),
                            cutoff_percent: params.facet_cutoff_percent,
                            limit: params.facet_limit(),
                        },
                        params,
                    );
                    ResolvedAxes {
                        axis1: facet_axis,
                        axis2: Some(axis1),
                        facet: FacetKind::Question,
                    }
                }
                None => {
                    warn!(facet = %id, question = %question.id, "facet question not found; ignoring facet");
                    ResolvedAxes {
                        axis1,
                        axis2: None,
                        facet: FacetKind::None,
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NormPaths;

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            survey_id: "sojs".to_string(),
            template: None,
            options: None,
            groups: None,
            default_sort: None,
            options_are_sequential: false,
            norm_paths: NormPaths {
                base: Some(format!("user_info.{id}")),
                response: Some(format!("user_info.{id}.choices")),
                ..Default::default()
            },
        }
    }

    fn options(ids: &[&str]) -> Option<Vec<QuestionOption>> {
        Some(ids.iter().map(|id| QuestionOption::new(*id)).collect())
    }

    #[test]
    fn default_sort_is_count_desc() {
        let q = question("tools");
        assert_eq!(
            question_sort(&q, None, true),
            (SortProperty::Count, SortOrder::Desc)
        );
    }

    #[test]
    fn groups_win_over_default_sort() {
        let mut q = question("salary");
        q.default_sort = Some(SortProperty::Count);
        q.groups = Some(vec![OptionGroup {
            id: "low".into(),
            label: None,
            items: vec!["a".into()],
        }]);
        assert_eq!(question_sort(&q, None, true).0, SortProperty::Options);
        assert_eq!(question_sort(&q, None, false).0, SortProperty::Count);
    }

    #[test]
    fn sequential_without_options_sorts_by_id_asc() {
        let mut q = question("years");
        q.options_are_sequential = true;
        assert_eq!(
            question_sort(&q, None, true),
            (SortProperty::Id, SortOrder::Asc)
        );
        q.options = options(&["1", "2"]);
        assert_eq!(question_sort(&q, None, true).0, SortProperty::Options);
    }

    #[test]
    fn explicit_sort_overrides_field_by_field() {
        let q = question("tools");
        let spec = SortSpecifier {
            property: None,
            order: Some(SortOrder::Asc),
        };
        assert_eq!(
            question_sort(&q, Some(&spec), true),
            (SortProperty::Count, SortOrder::Asc)
        );
        let spec = SortSpecifier {
            property: Some(SortProperty::Id),
            order: None,
        };
        assert_eq!(
            question_sort(&q, Some(&spec), true),
            (SortProperty::Id, SortOrder::Desc)
        );
    }

    #[test]
    fn facet_selector_parsing() {
        assert_eq!(FacetSelector::parse(None), FacetSelector::NoFacet);
        assert_eq!(FacetSelector::parse(Some("")), FacetSelector::NoFacet);
        assert_eq!(
            FacetSelector::parse(Some(SENTIMENT_FACET)),
            FacetSelector::Sentiment
        );
        assert_eq!(
            FacetSelector::parse(Some("user_info__gender")),
            FacetSelector::Question {
                id: "gender".into()
            }
        );
        assert_eq!(
            FacetSelector::parse(Some("tools__vite__experience")),
            FacetSelector::Question {
                id: "vite__experience".into()
            }
        );
    }

    #[test]
    fn question_facet_swaps_axes() {
        let q = question("tools");
        let f = question("gender");
        let params = ResponsesParameters {
            facet_limit: Some(7),
            limit: Some(3),
            ..Default::default()
        };
        let axes = resolve_axes(
            &q,
            &params,
            &FacetSelector::Question {
                id: "gender".into(),
            },
            &[q.clone(), f],
        );
        assert_eq!(axes.facet, FacetKind::Question);
        assert_eq!(axes.axis1.question.id, "gender");
        assert_eq!(axes.axis1.limit, 7);
        let axis2 = axes.axis2.as_ref().unwrap();
        assert_eq!(axis2.question.id, "tools");
        assert_eq!(axis2.limit, 3);
        assert_eq!(axes.bucket_axis().question.id, "tools");
        assert_eq!(axes.facet_axis().unwrap().question.id, "gender");
    }

    #[test]
    fn facet_from_other_survey_is_dropped() {
        let q = question("tools");
        let mut f = question("gender");
        f.survey_id = "sotc".into();
        let axes = resolve_axes(
            &q,
            &ResponsesParameters::default(),
            &FacetSelector::Question {
                id: "gender".into(),
            },
            &[f],
        );
        assert!(axes.axis2.is_none());
        assert_eq!(axes.facet, FacetKind::None);
        assert_eq!(axes.axis1.question.id, "tools");
    }

    #[test]
    fn sentiment_becomes_inner_axis() {
        let q = question("tools");
        let params = ResponsesParameters {
            cutoff: Some(4),
            ..Default::default()
        };
        let axes = resolve_axes(&q, &params, &FacetSelector::Sentiment, &[]);
        assert_eq!(axes.facet, FacetKind::Sentiment);
        assert_eq!(axes.axis1.question.id, "tools__sentiment");
        assert_eq!(
            axes.axis1.question.norm_paths.response.as_deref(),
            Some("user_info.tools.sentiment")
        );
        assert_eq!(axes.axis1.cutoff, 4);
        assert_eq!(axes.axis2.unwrap().question.id, "tools");
    }

    #[test]
    fn groups_replace_options_without_touching_original() {
        let mut q = question("salary");
        q.options = options(&["a", "b", "c"]);
        q.groups = Some(vec![OptionGroup {
            id: "ab".into(),
            label: Some("A or B".into()),
            items: vec!["a".into(), "b".into()],
        }]);
        let axes = resolve_axes(&q, &ResponsesParameters::default(), &FacetSelector::NoFacet, &[]);
        let grouped = axes.axis1.with_groups_as_options().unwrap();
        assert_eq!(grouped.option_position("ab"), Some(0));
        assert_eq!(grouped.option("ab").unwrap().label.as_deref(), Some("A or B"));
        assert_eq!(axes.axis1.option_position("ab"), None);
    }
}
