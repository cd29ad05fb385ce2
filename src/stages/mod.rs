//! Post-processing of raw aggregation results.
//!
//! A [`StagePlan`] is an ordered list of named [`Stage`]s. Every stage
//! declares the [`Fact`]s it needs about the data and the facts it
//! establishes; [`StagePlan::compose`] refuses plans where a stage would run
//! before its inputs exist, so ordering mistakes surface when the plan is
//! built rather than as silently wrong percentages.

mod counts;
mod cutoff;
mod enrich;
mod facet_stats;
mod groups;
mod labels;
mod limit;
pub(crate) mod merge;
mod missing;
mod percentages;
pub(crate) mod shape;
pub(crate) mod sort;

use std::collections::HashSet;

use thiserror::Error;
use tracing::debug;

use crate::axes::AxisParameters;
use crate::collection::{CollectionError, Enricher};
use crate::model::{EditionResult, SurveyMetadata};
use crate::request::DatasetCutoff;

pub use counts::EditionStats;
pub use merge::BucketLike;
pub use sort::sort_buckets;

// =============================================================================
// Facts and stages
// =============================================================================

/// Something a stage can rely on having happened to the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fact {
    Normalized,
    Cleaned,
    Enriched,
    Counted,
    MissingFilled,
    CompletionAttached,
    OverallAdded,
    Percentages,
    DatasetCut,
    Years,
    FacetStats,
    Sorted,
    Grouped,
    OptionsFinal,
    CutOff,
    Limited,
    OthersGrouped,
    Labeled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    NormalizeShape,
    DiscardEmpty,
    Enrich,
    DefaultBucketCounts,
    AddMissingBuckets,
    AddCompletionCounts,
    AddOverallBucket,
    AddPercentages,
    DatasetCutoff,
    AddEditionYears,
    FacetStatistics,
    Sort,
    GroupBuckets,
    UseGroupsAsOptions,
    Cutoff,
    Limit,
    GroupOtherBuckets,
    AddLabels,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Self::NormalizeShape => "normalize_shape",
            Self::DiscardEmpty => "discard_empty",
            Self::Enrich => "enrich",
            Self::DefaultBucketCounts => "default_bucket_counts",
            Self::AddMissingBuckets => "add_missing_buckets",
            Self::AddCompletionCounts => "add_completion_counts",
            Self::AddOverallBucket => "add_overall_bucket",
            Self::AddPercentages => "add_percentages",
            Self::DatasetCutoff => "dataset_cutoff",
            Self::AddEditionYears => "add_edition_years",
            Self::FacetStatistics => "facet_statistics",
            Self::Sort => "sort",
            Self::GroupBuckets => "group_buckets",
            Self::UseGroupsAsOptions => "use_groups_as_options",
            Self::Cutoff => "cutoff",
            Self::Limit => "limit",
            Self::GroupOtherBuckets => "group_other_buckets",
            Self::AddLabels => "add_labels",
        }
    }

    pub fn requires(self) -> &'static [Fact] {
        use Fact::*;
        match self {
            Self::NormalizeShape => &[],
            Self::DiscardEmpty => &[Normalized],
            Self::Enrich => &[Cleaned],
            Self::DefaultBucketCounts => &[Cleaned],
            Self::AddMissingBuckets => &[Counted],
            Self::AddCompletionCounts => &[Cleaned],
            Self::AddOverallBucket => &[Counted, MissingFilled],
            Self::AddPercentages => &[Counted, MissingFilled, CompletionAttached],
            Self::DatasetCutoff => &[Percentages],
            Self::AddEditionYears => &[Cleaned],
            Self::FacetStatistics => &[Percentages],
            Self::Sort => &[Percentages],
            Self::GroupBuckets => &[Sorted, Percentages],
            Self::UseGroupsAsOptions => &[Grouped],
            Self::Cutoff => &[Percentages, Grouped],
            Self::Limit => &[OptionsFinal, CutOff],
            Self::GroupOtherBuckets => &[Limited],
            Self::AddLabels => &[OptionsFinal],
        }
    }

    pub fn establishes(self) -> Fact {
        match self {
            Self::NormalizeShape => Fact::Normalized,
            Self::DiscardEmpty => Fact::Cleaned,
            Self::Enrich => Fact::Enriched,
            Self::DefaultBucketCounts => Fact::Counted,
            Self::AddMissingBuckets => Fact::MissingFilled,
            Self::AddCompletionCounts => Fact::CompletionAttached,
            Self::AddOverallBucket => Fact::OverallAdded,
            Self::AddPercentages => Fact::Percentages,
            Self::DatasetCutoff => Fact::DatasetCut,
            Self::AddEditionYears => Fact::Years,
            Self::FacetStatistics => Fact::FacetStats,
            Self::Sort => Fact::Sorted,
            Self::GroupBuckets => Fact::Grouped,
            Self::UseGroupsAsOptions => Fact::OptionsFinal,
            Self::Cutoff => Fact::CutOff,
            Self::Limit => Fact::Limited,
            Self::GroupOtherBuckets => Fact::OthersGrouped,
            Self::AddLabels => Fact::Labeled,
        }
    }

    /// Stages that only make sense with nested facet buckets.
    pub fn facet_only(self) -> bool {
        matches!(
            self,
            Self::DefaultBucketCounts | Self::AddOverallBucket | Self::FacetStatistics
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisMode {
    Single,
    Faceted,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("stage `{stage}` requires {fact:?}, which no earlier stage establishes")]
    MissingPrecondition { stage: &'static str, fact: Fact },
    #[error("stage `{stage}` only applies to faceted results")]
    FacetOnly { stage: &'static str },
    #[error("stage `{stage}` appears more than once")]
    Duplicate { stage: &'static str },
}

// =============================================================================
// Plan
// =============================================================================

#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<Stage>,
    mode: AxisMode,
}

impl StagePlan {
    /// Validate `stages` in order. Single-axis raw results already carry
    /// final counts, so `Counted` holds from the start in that mode.
    pub fn compose(stages: Vec<Stage>, mode: AxisMode) -> Result<Self, PlanError> {
        let mut facts: HashSet<Fact> = HashSet::new();
        if mode == AxisMode::Single {
            facts.insert(Fact::Counted);
        }
        let mut seen: HashSet<Stage> = HashSet::new();
        for stage in &stages {
            if !seen.insert(*stage) {
                return Err(PlanError::Duplicate {
                    stage: stage.name(),
                });
            }
            if mode == AxisMode::Single && stage.facet_only() {
                return Err(PlanError::FacetOnly {
                    stage: stage.name(),
                });
            }
            if let Some(fact) = stage.requires().iter().find(|f| !facts.contains(f)) {
                return Err(PlanError::MissingPrecondition {
                    stage: stage.name(),
                    fact: *fact,
                });
            }
            facts.insert(stage.establishes());
        }
        Ok(Self { stages, mode })
    }

    /// The standard stage order. The overall baseline bucket is only added
    /// to faceted results, and only when `include_overall` is set.
    pub fn standard(mode: AxisMode, include_overall: bool) -> Result<Self, PlanError> {
        use Stage::*;
        let faceted = mode == AxisMode::Faceted;
        let mut stages = vec![NormalizeShape, DiscardEmpty, Enrich];
        if faceted {
            stages.push(DefaultBucketCounts);
        }
        stages.extend([AddMissingBuckets, AddCompletionCounts]);
        if faceted && include_overall {
            stages.push(AddOverallBucket);
        }
        stages.extend([AddPercentages, DatasetCutoff, AddEditionYears]);
        if faceted {
            stages.push(FacetStatistics);
        }
        stages.extend([
            Sort,
            GroupBuckets,
            UseGroupsAsOptions,
            Cutoff,
            Limit,
            GroupOtherBuckets,
            AddLabels,
        ]);
        Self::compose(stages, mode)
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Apply every stage in order. Only enrichment can fail; its error
    /// aborts the run.
    pub async fn run(
        &self,
        state: &mut PipelineState,
        ctx: &StageContext<'_>,
    ) -> Result<(), CollectionError> {
        debug!(mode = ?self.mode, stages = self.stages.len(), "running stage plan");
        for stage in &self.stages {
            apply(*stage, state, ctx).await?;
            debug!(
                stage = stage.name(),
                editions = state.editions.len(),
                buckets = state.editions.iter().map(|e| e.buckets.len()).sum::<usize>(),
                "stage applied"
            );
        }
        Ok(())
    }
}

// =============================================================================
// State
// =============================================================================

/// Results plus the axes they are currently interpreted against.
///
/// `main` is the top-level bucket axis and `facet` the nested facet-bucket
/// axis. Both may be replaced by [`Stage::UseGroupsAsOptions`].
#[derive(Debug, Clone)]
pub struct PipelineState {
    pub editions: Vec<EditionResult>,
    pub main: AxisParameters,
    pub facet: Option<AxisParameters>,
}

/// Read-only inputs shared by all stages of one run.
pub struct StageContext<'a> {
    pub survey: &'a SurveyMetadata,
    pub stats: &'a EditionStats,
    pub enricher: Option<&'a dyn Enricher>,
    pub dataset_cutoff: DatasetCutoff,
}

async fn apply(
    stage: Stage,
    state: &mut PipelineState,
    ctx: &StageContext<'_>,
) -> Result<(), CollectionError> {
    let facet = state.facet.as_ref();
    match stage {
        Stage::NormalizeShape => {
            if facet.is_none() {
                shape::move_default_buckets_up(&mut state.editions);
            }
        }
        Stage::DiscardEmpty => {
            shape::discard_empty_ids(&mut state.editions);
            state.editions = shape::discard_empty_editions(std::mem::take(&mut state.editions));
        }
        Stage::Enrich => {
            if let Some(enricher) = ctx.enricher {
                enrich::add_entities_and_tokens(&mut state.editions, enricher).await?;
            }
        }
        Stage::DefaultBucketCounts => counts::add_default_bucket_counts(&mut state.editions),
        Stage::AddMissingBuckets => {
            missing::add_missing_buckets(&mut state.editions, &state.main, facet)
        }
        Stage::AddCompletionCounts => counts::add_completion_counts(&mut state.editions, ctx.stats),
        Stage::AddOverallBucket => {
            if let Some(facet) = facet {
                counts::add_overall_bucket(&mut state.editions, facet);
            }
        }
        Stage::AddPercentages => percentages::add_percentages(&mut state.editions),
        Stage::DatasetCutoff => {
            percentages::apply_dataset_cutoff(&mut state.editions, ctx.dataset_cutoff)
        }
        Stage::AddEditionYears => labels::add_edition_years(&mut state.editions, ctx.survey),
        Stage::FacetStatistics => {
            if let Some(facet) = facet {
                facet_stats::add_facet_statistics(&mut state.editions, facet);
            }
        }
        Stage::Sort => sort::sort_data(&mut state.editions, &state.main, facet),
        Stage::GroupBuckets => groups::group_buckets(&mut state.editions, &state.main, facet),
        Stage::UseGroupsAsOptions => {
            if let Some(main) = state.main.with_groups_as_options() {
                state.main = main;
            }
            if let Some(grouped) = facet.and_then(AxisParameters::with_groups_as_options) {
                state.facet = Some(grouped);
            }
        }
        Stage::Cutoff => cutoff::cutoff_data(&mut state.editions, &state.main, facet),
        Stage::Limit => limit::limit_data(&mut state.editions, &state.main, facet),
        Stage::GroupOtherBuckets => {
            limit::group_other_buckets(&mut state.editions, &state.main, facet)
        }
        Stage::AddLabels => labels::add_labels(&mut state.editions, &state.main, facet),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_plans_compose() {
        let single = StagePlan::standard(AxisMode::Single, true).unwrap();
        assert!(!single.stages().iter().any(|s| s.facet_only()));
        let faceted = StagePlan::standard(AxisMode::Faceted, true).unwrap();
        assert!(faceted.stages().contains(&Stage::AddOverallBucket));
        let no_overall = StagePlan::standard(AxisMode::Faceted, false).unwrap();
        assert!(!no_overall.stages().contains(&Stage::AddOverallBucket));
    }

    #[test]
    fn percentages_before_completion_is_rejected() {
        let err = StagePlan::compose(
            vec![
                Stage::NormalizeShape,
                Stage::DiscardEmpty,
                Stage::AddMissingBuckets,
                Stage::AddPercentages,
                Stage::AddCompletionCounts,
            ],
            AxisMode::Single,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::MissingPrecondition {
                stage: "add_percentages",
                fact: Fact::CompletionAttached,
            }
        );
    }

    #[test]
    fn faceted_missing_buckets_need_default_counts() {
        let err = StagePlan::compose(
            vec![
                Stage::NormalizeShape,
                Stage::DiscardEmpty,
                Stage::AddMissingBuckets,
            ],
            AxisMode::Faceted,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            PlanError::MissingPrecondition {
                fact: Fact::Counted,
                ..
            }
        ));
    }

    #[test]
    fn limit_requires_final_options() {
        let mut stages = StagePlan::standard(AxisMode::Single, false)
            .unwrap()
            .stages()
            .to_vec();
        stages.retain(|s| *s != Stage::UseGroupsAsOptions);
        let err = StagePlan::compose(stages, AxisMode::Single).unwrap_err();
        assert!(matches!(
            err,
            PlanError::MissingPrecondition {
                stage: "limit",
                fact: Fact::OptionsFinal,
            }
        ));
    }

    #[test]
    fn facet_only_stage_rejected_in_single_mode() {
        let err = StagePlan::compose(vec![Stage::FacetStatistics], AxisMode::Single).unwrap_err();
        assert_eq!(
            err,
            PlanError::FacetOnly {
                stage: "facet_statistics"
            }
        );
    }

    #[test]
    fn duplicate_stage_rejected() {
        let err = StagePlan::compose(
            vec![Stage::NormalizeShape, Stage::NormalizeShape],
            AxisMode::Single,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::Duplicate { .. }));
    }
}
