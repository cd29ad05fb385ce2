//! Zero-count buckets for declared options that got no answers.

use crate::axes::AxisParameters;
use crate::model::{Bucket, EditionResult, FacetBucket};

use super::merge::BucketLike;

fn fill<T: BucketLike>(buckets: &mut Vec<T>, axis: &AxisParameters) {
    if !axis.enable_add_missing_buckets {
        return;
    }
    let Some(options) = axis.options.as_ref() else {
        return;
    };
    for option in options {
        if !buckets.iter().any(|b| b.id() == option.id) {
            buckets.push(T::empty(&option.id));
        }
    }
}

/// With a facet axis this is a full cross product: every bucket, including
/// the ones added here, gets every declared facet option.
pub(crate) fn add_missing_buckets(
    editions: &mut [EditionResult],
    main: &AxisParameters,
    facet: Option<&AxisParameters>,
) {
    for edition in editions.iter_mut() {
        fill::<Bucket>(&mut edition.buckets, main);
        if let Some(facet) = facet {
            for bucket in edition.buckets.iter_mut() {
                fill::<FacetBucket>(&mut bucket.facet_buckets, facet);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QuestionOption, SortOrder, SortProperty};
    use crate::stages::sort::tests::test_axis;

    fn axis_with(ids: &[&str]) -> AxisParameters {
        let mut axis = test_axis(SortProperty::Options, SortOrder::Asc);
        axis.enable_add_missing_buckets = true;
        axis.options = Some(ids.iter().map(|id| QuestionOption::new(*id)).collect());
        axis
    }

    #[test]
    fn missing_options_are_added_once() {
        let axis = axis_with(&["1", "2", "3"]);
        let mut editions = vec![EditionResult::new("e1", vec![Bucket::new("2", 4)])];
        add_missing_buckets(&mut editions, &axis, None);
        let snapshot = editions.clone();
        add_missing_buckets(&mut editions, &axis, None);
        assert_eq!(editions, snapshot);
        let ids: Vec<&str> = editions[0].buckets.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1", "3"]);
        assert_eq!(editions[0].buckets[1].data.count, 0);
    }

    #[test]
    fn facets_form_a_cross_product() {
        let main = axis_with(&["a", "b"]);
        let facet = axis_with(&["x", "y"]);
        let mut editions = vec![EditionResult::new(
            "e1",
            vec![Bucket::new("a", 2).with_facets(vec![FacetBucket::new("y", 2)])],
        )];
        add_missing_buckets(&mut editions, &main, Some(&facet));
        for bucket in &editions[0].buckets {
            let mut ids: Vec<&str> = bucket.facet_buckets.iter().map(|f| f.id.as_str()).collect();
            ids.sort();
            assert_eq!(ids, vec!["x", "y"], "bucket {}", bucket.id);
        }
        assert_eq!(editions[0].buckets.len(), 2);
    }

    #[test]
    fn disabled_or_optionless_axes_are_untouched() {
        let mut axis = axis_with(&["1"]);
        axis.enable_add_missing_buckets = false;
        let mut editions = vec![EditionResult::new("e1", vec![Bucket::new("2", 4)])];
        add_missing_buckets(&mut editions, &axis, None);
        assert_eq!(editions[0].buckets.len(), 1);

        let mut axis = axis_with(&[]);
        axis.options = None;
        add_missing_buckets(&mut editions, &axis, None);
        assert_eq!(editions[0].buckets.len(), 1);
    }
}
