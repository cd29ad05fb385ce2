//! Inbound compute request.
//!
//! Parameters are kept exactly as the caller sent them (every field optional)
//! so the cache key only reflects what was actually specified; defaults are
//! applied through the accessor methods.

use serde::{Deserialize, Serialize};

use crate::model::{SortSpecifier, SubField};

pub const DEFAULT_CUTOFF: u64 = 1;
pub const DEFAULT_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsesParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutoff_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortSpecifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_sort: Option<SortSpecifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_cutoff: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet_cutoff_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_no_answer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge_other_buckets: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_bucket_groups: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_add_overall_bucket: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_add_missing_buckets: Option<bool>,
    /// Cache control only; never part of the cache key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_cache: Option<bool>,
    /// Drop whole categories whose count is below this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_cutoff: Option<u64>,
    /// Drop whole categories whose question percentage is below this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_cutoff_percent: Option<f64>,
}

impl ResponsesParameters {
    pub fn cutoff(&self) -> u64 {
        self.cutoff.unwrap_or(DEFAULT_CUTOFF)
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn facet_cutoff(&self) -> u64 {
        self.facet_cutoff.unwrap_or(DEFAULT_CUTOFF)
    }

    pub fn facet_limit(&self) -> usize {
        self.facet_limit.unwrap_or(DEFAULT_LIMIT)
    }

    pub fn show_no_answer(&self) -> bool {
        self.show_no_answer.unwrap_or(false)
    }

    pub fn merge_other_buckets(&self) -> bool {
        self.merge_other_buckets.unwrap_or(true)
    }

    pub fn enable_bucket_groups(&self) -> bool {
        self.enable_bucket_groups.unwrap_or(true)
    }

    pub fn enable_add_overall_bucket(&self) -> bool {
        self.enable_add_overall_bucket.unwrap_or(true)
    }

    pub fn enable_add_missing_buckets(&self) -> bool {
        self.enable_add_missing_buckets.unwrap_or(false)
    }

    pub fn enable_cache(&self) -> bool {
        self.enable_cache.unwrap_or(true)
    }

    pub fn dataset_cutoff(&self) -> DatasetCutoff {
        DatasetCutoff {
            count: self.dataset_cutoff.filter(|c| *c > 0),
            percent: self.dataset_cutoff_percent.filter(|p| *p > 0.0),
        }
    }
}

/// Request-wide threshold below which whole categories are discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DatasetCutoff {
    pub count: Option<u64>,
    pub percent: Option<f64>,
}

impl DatasetCutoff {
    pub fn is_active(&self) -> bool {
        self.count.is_some() || self.percent.is_some()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeRequest {
    /// Restrict to one edition; all past editions otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edition_id: Option<String>,
    pub question_id: String,
    /// `section__question[__sub]`, or the sentiment token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facet: Option<String>,
    #[serde(default)]
    pub sub_field: SubField,
    /// Opaque filter tree handed to the filter compiler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<serde_json::Value>,
    #[serde(default)]
    pub parameters: ResponsesParameters,
}
