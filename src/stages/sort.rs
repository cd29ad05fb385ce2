//! Bucket ordering.

use std::cmp::Ordering;

use crate::axes::AxisParameters;
use crate::model::{is_special, EditionResult, SortOrder, SortProperty};

use super::merge::BucketLike;

/// Numeric ids in numeric order, then every other id in string order.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

/// Sort regular buckets by the axis' sort key; special buckets follow them
/// in their current relative order.
///
/// Options order is the declared position (unlisted ids last) and ignores
/// the direction. Every sort is stable, so ties keep their input order.
pub fn sort_buckets<T: BucketLike>(buckets: &mut Vec<T>, axis: &AxisParameters) {
    let (mut regular, special): (Vec<T>, Vec<T>) =
        std::mem::take(buckets).into_iter().partition(|b| !is_special(b.id()));

    match axis.sort {
        SortProperty::Options => {
            regular.sort_by_key(|b| axis.option_position(b.id()).unwrap_or(usize::MAX));
        }
        SortProperty::Count => {
            regular.sort_by(|a, b| directed(a.data().count.cmp(&b.data().count), axis.order));
        }
        SortProperty::Id => {
            regular.sort_by(|a, b| directed(compare_ids(a.id(), b.id()), axis.order));
        }
        SortProperty::Average => {
            regular.sort_by(|a, b| {
                let x = a.data().average.unwrap_or(f64::NEG_INFINITY);
                let y = b.data().average.unwrap_or(f64::NEG_INFINITY);
                directed(x.partial_cmp(&y).unwrap_or(Ordering::Equal), axis.order)
            });
        }
    }

    regular.extend(special);
    *buckets = regular;
}

pub(crate) fn sort_data(
    editions: &mut [EditionResult],
    bucket_axis: &AxisParameters,
    facet_axis: Option<&AxisParameters>,
) {
    for edition in editions.iter_mut() {
        sort_buckets(&mut edition.buckets, bucket_axis);
        if let Some(facet_axis) = facet_axis {
            for bucket in edition.buckets.iter_mut() {
                sort_buckets(&mut bucket.facet_buckets, facet_axis);
            }
        }
    }
}
