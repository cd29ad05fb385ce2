//! Merge buckets that fail the cutoff test into `cutoff_answers`.

use crate::axes::AxisParameters;
use crate::model::{is_special, EditionResult, SortProperty, CUTOFF_ANSWERS};

use super::merge::{merge_rejected, BucketLike};

/// `cutoffPercent` wins over the count cutoff when set. Special buckets
/// always pass.
fn keep<T: BucketLike>(bucket: &T, axis: &AxisParameters) -> bool {
    if is_special(bucket.id()) {
        return true;
    }
    match axis.cutoff_percent() {
        Some(min) => bucket.cutoff_percentage() >= min,
        None => bucket.data().count >= axis.cutoff,
    }
}

pub(crate) fn group_under_cutoff<T: BucketLike>(
    buckets: Vec<T>,
    axis: &AxisParameters,
    facet_axis: Option<&AxisParameters>,
) -> Vec<T> {
    merge_rejected(buckets, CUTOFF_ANSWERS, axis.group_under_cutoff, facet_axis, |b| {
        keep(b, axis)
    })
}

/// Top-level cutoff is skipped for fixed-position option axes that are not
/// merging "other" answers, so a scale never loses one of its steps.
/// Facet-level cutoff follows the facet axis' own thresholds.
pub(crate) fn cutoff_data(
    editions: &mut [EditionResult],
    main: &AxisParameters,
    facet: Option<&AxisParameters>,
) {
    let fixed_scale = !main.merge_other_buckets && main.sort == SortProperty::Options;
    let cut_top = main.has_cutoff() && !fixed_scale;
    let cut_facets = facet.filter(|f| f.has_cutoff());

    for edition in editions.iter_mut() {
        if cut_top {
            edition.buckets = group_under_cutoff(std::mem::take(&mut edition.buckets), main, facet);
        }
        if let Some(facet_axis) = cut_facets {
            for bucket in edition.buckets.iter_mut() {
                bucket.facet_buckets =
                    group_under_cutoff(std::mem::take(&mut bucket.facet_buckets), facet_axis, None);
            }
        }
    }
}
