//! Truncation to the axis limit and the final "other" catch-all.

use crate::axes::AxisParameters;
use crate::model::{
    is_sentinel, is_special, is_synthetic, EditionResult, OTHER_ANSWERS, OVERALL,
    OVERLIMIT_ANSWERS,
};

use super::merge::{merge_rejected, BucketLike};
use super::sort::sort_buckets;

/// Keep the first `limit` regular buckets in sort order. Special buckets are
/// kept and do not use up the limit.
fn limit_buckets<T: BucketLike>(
    mut buckets: Vec<T>,
    axis: &AxisParameters,
    facet_axis: Option<&AxisParameters>,
) -> Vec<T> {
    sort_buckets(&mut buckets, axis);
    if axis.limit == 0 {
        return buckets;
    }
    let mut regular = 0usize;
    merge_rejected(
        buckets,
        OVERLIMIT_ANSWERS,
        axis.group_over_limit,
        facet_axis,
        |b| {
            if is_special(b.id()) {
                return true;
            }
            regular += 1;
            regular <= axis.limit
        },
    )
}

/// Sorting happens here again because grouping and cutoff may have changed
/// the bucket set and the working options.
pub(crate) fn limit_data(
    editions: &mut [EditionResult],
    main: &AxisParameters,
    facet: Option<&AxisParameters>,
) {
    for edition in editions.iter_mut() {
        edition.buckets = limit_buckets(std::mem::take(&mut edition.buckets), main, facet);
        if let Some(facet_axis) = facet {
            for bucket in edition.buckets.iter_mut() {
                bucket.facet_buckets =
                    limit_buckets(std::mem::take(&mut bucket.facet_buckets), facet_axis, None);
            }
        }
    }
}

/// Synthetic merge buckets, plus anything that matches no declared option
/// when the axis has options.
fn is_other<T: BucketLike>(bucket: &T, axis: &AxisParameters) -> bool {
    let id = bucket.id();
    if is_synthetic(id) {
        return true;
    }
    if is_sentinel(id) || id == OVERALL {
        return false;
    }
    match axis.options.as_deref() {
        Some(options) if !options.is_empty() => axis.option(id).is_none(),
        _ => false,
    }
}

fn group_other<T: BucketLike>(
    buckets: Vec<T>,
    axis: &AxisParameters,
    facet_axis: Option<&AxisParameters>,
) -> Vec<T> {
    merge_rejected(buckets, OTHER_ANSWERS, true, facet_axis, |b| !is_other(b, axis))
}

pub(crate) fn group_other_buckets(
    editions: &mut [EditionResult],
    main: &AxisParameters,
    facet: Option<&AxisParameters>,
) {
    let facet_other = facet.filter(|f| f.merge_other_buckets);
    for edition in editions.iter_mut() {
        if main.merge_other_buckets {
            edition.buckets = group_other(std::mem::take(&mut edition.buckets), main, facet);
        }
        if let Some(facet_axis) = facet_other {
            for bucket in edition.buckets.iter_mut() {
                bucket.facet_buckets =
                    group_other(std::mem::take(&mut bucket.facet_buckets), facet_axis, None);
            }
        }
    }
}
