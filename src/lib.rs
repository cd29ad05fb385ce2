#![forbid(unsafe_code)]

//! # survey-tally
//!
//! Turns raw survey aggregations into presentation-ready results.
//!
//! A request names a question and optionally a facet (a second question, or
//! sentiment). The engine resolves both into aggregation axes, fetches raw
//! per-edition bucket counts from a [`Collection`], then runs an ordered
//! [`StagePlan`] over them: counts and percentages, option groups, cutoffs,
//! limits, overflow merging, labels and facet statistics. Results are cached
//! under a deterministic key of the request.
//!
//! The stage plan validates its own ordering: every stage declares the facts
//! it needs and the facts it establishes, and a plan that would run a stage
//! before its preconditions hold is rejected up front.

pub mod axes;
pub mod cache;
pub mod collection;
pub mod error;
pub mod inspect;
pub mod model;
pub mod pipeline;
pub mod request;
pub mod stages;

pub use axes::{resolve_axes, AxisParameters, FacetKind, FacetSelector, ResolvedAxes};
pub use cache::{GenericCacheKey, ResultCache, SqliteResultCache};
pub use collection::{
    AggregationQuery, Collection, CollectionError, CollectionFixture, Enricher, FilterCompiler,
    JsonCollection, RespondentStats, RetryConfig, RetryingCollection,
};
pub use error::ComputeError;
pub use inspect::{InspectionSink, InspectionWorker, JsonlInspectionSink};
pub use pipeline::{compute_with_inspection_file, ComputeEngine, ComputeResponse};
pub use request::{ComputeRequest, ResponsesParameters};
pub use stages::{AxisMode, PlanError, Stage, StagePlan};
