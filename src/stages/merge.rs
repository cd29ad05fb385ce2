//! Bucket merging shared by the grouping, cutoff, limit and "other" stages.
//!
//! Sum-based units are summed and rounded to two decimals. `average` is the
//! plain mean of the inputs' averages and percentiles are averaged per key
//! over *all* inputs, present or not. Neither is a statistically correct
//! recombination; both reproduce the figures existing consumers expect.

use std::collections::HashMap;

use crate::axes::AxisParameters;
use crate::model::{is_synthetic, Bucket, BucketData, FacetBucket, Percentiles};

use super::sort::sort_buckets;

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage of `part` in `total`, 0 when the total is empty.
pub(crate) fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

/// Common view over top-level buckets and facet buckets.
pub trait BucketLike: Sized {
    fn id(&self) -> &str;
    fn data(&self) -> &BucketData;
    fn data_mut(&mut self) -> &mut BucketData;
    fn grouped_bucket_ids(&self) -> Option<&[String]>;
    fn set_label(&mut self, label: Option<String>);
    fn entity_name(&self) -> Option<&str>;

    /// Percentage compared against `cutoffPercent`: the question share for
    /// buckets, the parent-bucket share for facet buckets.
    fn cutoff_percentage(&self) -> f64;

    /// Build one bucket out of `inputs`. `facet_axis` is only consulted by
    /// top-level buckets, to recombine their facet buckets.
    fn merge(id: &str, inputs: Vec<Self>, facet_axis: Option<&AxisParameters>) -> Self;

    fn empty(id: &str) -> Self;
}

impl BucketLike for Bucket {
    fn id(&self) -> &str {
        &self.id
    }

    fn data(&self) -> &BucketData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut BucketData {
        &mut self.data
    }

    fn grouped_bucket_ids(&self) -> Option<&[String]> {
        self.grouped_bucket_ids.as_deref()
    }

    fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    fn entity_name(&self) -> Option<&str> {
        self.entity.as_ref().and_then(|e| e.name.as_deref())
    }

    fn cutoff_percentage(&self) -> f64 {
        self.data.percentage_question
    }

    fn merge(id: &str, inputs: Vec<Self>, facet_axis: Option<&AxisParameters>) -> Self {
        let data = merge_data(&inputs);
        let grouped = grouped_ids(&inputs);
        let completion_count = inputs.iter().find_map(|b| b.completion_count);
        let facet_buckets = match facet_axis {
            Some(axis) => combine_facet_buckets(&inputs, data.count, axis),
            None => Vec::new(),
        };
        Bucket {
            id: id.to_string(),
            data,
            facet_buckets,
            grouped_bucket_ids: Some(grouped),
            entity: None,
            token: None,
            label: None,
            completion_count,
        }
    }

    fn empty(id: &str) -> Self {
        Bucket::new(id, 0)
    }
}

impl BucketLike for FacetBucket {
    fn id(&self) -> &str {
        &self.id
    }

    fn data(&self) -> &BucketData {
        &self.data
    }

    fn data_mut(&mut self) -> &mut BucketData {
        &mut self.data
    }

    fn grouped_bucket_ids(&self) -> Option<&[String]> {
        self.grouped_bucket_ids.as_deref()
    }

    fn set_label(&mut self, label: Option<String>) {
        self.label = label;
    }

    fn entity_name(&self) -> Option<&str> {
        self.entity.as_ref().and_then(|e| e.name.as_deref())
    }

    fn cutoff_percentage(&self) -> f64 {
        self.percentage_bucket
    }

    fn merge(id: &str, inputs: Vec<Self>, _facet_axis: Option<&AxisParameters>) -> Self {
        let data = merge_data(&inputs);
        let percentage_bucket = round2(inputs.iter().map(|b| b.percentage_bucket).sum());
        FacetBucket {
            id: id.to_string(),
            data,
            percentage_bucket,
            grouped_bucket_ids: Some(grouped_ids(&inputs)),
            entity: None,
            token: None,
            label: None,
        }
    }

    fn empty(id: &str) -> Self {
        FacetBucket::new(id, 0)
    }
}

/// Ids of the merged inputs, in input order. A synthetic input is listed
/// under its own id.
pub(crate) fn grouped_ids<T: BucketLike>(inputs: &[T]) -> Vec<String> {
    inputs.iter().map(|b| b.id().to_string()).collect()
}

/// Union of the ids already absorbed by same-id buckets, first seen first.
fn union_grouped_ids<T: BucketLike>(group: &[T]) -> Option<Vec<String>> {
    let mut ids: Vec<String> = Vec::new();
    for id in group.iter().flat_map(|b| b.grouped_bucket_ids().unwrap_or_default()) {
        if !ids.contains(id) {
            ids.push(id.clone());
        }
    }
    (!ids.is_empty()).then_some(ids)
}

pub(crate) fn merge_data<T: BucketLike>(inputs: &[T]) -> BucketData {
    let n = inputs.len();
    let count = inputs.iter().map(|b| b.data().count).sum();
    let percentage_question = round2(inputs.iter().map(|b| b.data().percentage_question).sum());
    let percentage_survey = round2(inputs.iter().map(|b| b.data().percentage_survey).sum());

    let average = if n > 0 {
        let total: f64 = inputs.iter().map(|b| b.data().average.unwrap_or(0.0)).sum();
        round2(total / n as f64)
    } else {
        0.0
    };

    BucketData {
        count,
        percentage_question,
        percentage_survey,
        average: Some(average),
        percentiles: Some(merge_percentiles(inputs)),
    }
}

/// Per-key sum of the present values divided by the number of inputs.
/// Inputs without percentiles count as zeros.
pub(crate) fn merge_percentiles<T: BucketLike>(inputs: &[T]) -> Percentiles {
    if inputs.is_empty() {
        return Percentiles::default();
    }
    let present: Vec<&Percentiles> = inputs
        .iter()
        .filter_map(|b| b.data().percentiles.as_ref())
        .collect();
    let n = inputs.len() as f64;
    let mut values = [0.0; 5];
    for (idx, slot) in values.iter_mut().enumerate() {
        let sum: f64 = present.iter().map(|p| p.values()[idx]).sum();
        *slot = round2(sum / n);
    }
    Percentiles::from_values(values)
}

/// Combine the facet buckets of several top-level buckets, keyed by facet id.
///
/// Counts and percentages are summed like any other merge; `percentageBucket`
/// is then recomputed against the combined parent count since summing shares
/// of different parents is meaningless.
pub(crate) fn combine_facet_buckets(
    buckets: &[Bucket],
    parent_count: u64,
    facet_axis: &AxisParameters,
) -> Vec<FacetBucket> {
    let mut order: Vec<String> = Vec::new();
    let mut by_id: HashMap<String, Vec<FacetBucket>> = HashMap::new();
    for fb in buckets.iter().flat_map(|b| b.facet_buckets.iter()) {
        if !by_id.contains_key(&fb.id) {
            order.push(fb.id.clone());
        }
        by_id.entry(fb.id.clone()).or_default().push(fb.clone());
    }

    let mut combined: Vec<FacetBucket> = order
        .into_iter()
        .filter_map(|id| {
            let group = by_id.remove(&id)?;
            let first = group.first().cloned()?;
            let data = merge_data(&group);
            let grouped_bucket_ids = if is_synthetic(&id) {
                union_grouped_ids(&group)
            } else {
                first.grouped_bucket_ids.clone()
            };
            Some(FacetBucket {
                percentage_bucket: percentage(data.count, parent_count),
                data,
                grouped_bucket_ids,
                ..first
            })
        })
        .collect();
    sort_buckets(&mut combined, facet_axis);
    combined
}

/// Split `buckets` with `keep`, merging the rejected ones into a single `id`
/// bucket appended after the kept ones. Nothing is appended when nothing was
/// rejected. With `emit_group == false` rejected buckets are simply dropped.
pub(crate) fn merge_rejected<T, F>(
    buckets: Vec<T>,
    id: &str,
    emit_group: bool,
    facet_axis: Option<&AxisParameters>,
    mut keep: F,
) -> Vec<T>
where
    T: BucketLike,
    F: FnMut(&T) -> bool,
{
    let (mut kept, rejected): (Vec<T>, Vec<T>) = buckets.into_iter().partition(|b| keep(b));
    if !rejected.is_empty() && emit_group {
        kept.push(T::merge(id, rejected, facet_axis));
    }
    kept
}
