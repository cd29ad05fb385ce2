//! Consolidation of buckets into the question's declared option groups.

use crate::axes::AxisParameters;
use crate::model::{is_special, EditionResult, OptionGroup};

use super::merge::BucketLike;

/// Groups come first, in declared order, followed by every bucket that did
/// not fall into one. A group nobody answered is not emitted. Special
/// buckets never join a group.
fn group<T: BucketLike>(
    buckets: Vec<T>,
    groups: &[OptionGroup],
    facet_axis: Option<&AxisParameters>,
) -> Vec<T> {
    let mut rest = buckets;
    let mut grouped = Vec::with_capacity(groups.len() + rest.len());
    for option_group in groups {
        let (members, remaining): (Vec<T>, Vec<T>) = rest.into_iter().partition(|b| {
            !is_special(b.id()) && option_group.items.iter().any(|item| item == b.id())
        });
        rest = remaining;
        if !members.is_empty() {
            grouped.push(T::merge(&option_group.id, members, facet_axis));
        }
    }
    grouped.extend(rest);
    grouped
}

pub(crate) fn group_buckets(
    editions: &mut [EditionResult],
    main: &AxisParameters,
    facet: Option<&AxisParameters>,
) {
    let main_groups = main.active_groups();
    let facet_groups = facet.and_then(AxisParameters::active_groups);
    if main_groups.is_none() && facet_groups.is_none() {
        return;
    }
    for edition in editions.iter_mut() {
        if let Some(groups) = main_groups {
            edition.buckets = group(std::mem::take(&mut edition.buckets), groups, facet);
        }
        if let Some(groups) = facet_groups {
            for bucket in edition.buckets.iter_mut() {
                bucket.facet_buckets = group(std::mem::take(&mut bucket.facet_buckets), groups, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bucket, FacetBucket, SortOrder, SortProperty, NO_ANSWER};
    use crate::stages::sort::tests::test_axis;

    fn groups() -> Vec<OptionGroup> {
        vec![
            OptionGroup {
                id: "junior".into(),
                label: Some("Junior".into()),
                items: vec!["0_1".into(), "1_2".into()],
            },
            OptionGroup {
                id: "senior".into(),
                label: None,
                items: vec!["10_20".into(), "20_plus".into()],
            },
            OptionGroup {
                id: "unused".into(),
                label: None,
                items: vec!["nobody".into()],
            },
        ]
    }

    fn grouped_axis() -> AxisParameters {
        let mut axis = test_axis(SortProperty::Options, SortOrder::Asc);
        axis.question.groups = Some(groups());
        axis
    }

    #[test]
    fn buckets_merge_into_declared_groups() {
        let mut editions = vec![EditionResult::new(
            "e1",
            vec![
                Bucket::new("1_2", 5),
                Bucket::new("weird", 1),
                Bucket::new("0_1", 3),
                Bucket::new(NO_ANSWER, 7),
                Bucket::new("20_plus", 2),
            ],
        )];
        group_buckets(&mut editions, &grouped_axis(), None);
        let buckets = &editions[0].buckets;
        let ids: Vec<&str> = buckets.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["junior", "senior", "weird", NO_ANSWER]);
        assert_eq!(buckets[0].data.count, 8);
        assert_eq!(
            buckets[0].grouped_bucket_ids,
            Some(vec!["1_2".to_string(), "0_1".to_string()])
        );
    }

    #[test]
    fn disabled_groups_do_nothing() {
        let mut axis = grouped_axis();
        axis.enable_bucket_groups = false;
        let mut editions = vec![EditionResult::new("e1", vec![Bucket::new("1_2", 5)])];
        group_buckets(&mut editions, &axis, None);
        assert_eq!(editions[0].buckets[0].id, "1_2");
    }

    #[test]
    fn facet_buckets_are_grouped_too() {
        let main = test_axis(SortProperty::Count, SortOrder::Desc);
        let facet = grouped_axis();
        let mut editions = vec![EditionResult::new(
            "e1",
            vec![Bucket::new("react", 10).with_facets(vec![
                FacetBucket::new("0_1", 4),
                FacetBucket::new("10_20", 6),
            ])],
        )];
        group_buckets(&mut editions, &main, Some(&facet));
        let facets = &editions[0].buckets[0].facet_buckets;
        let ids: Vec<&str> = facets.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["junior", "senior"]);
    }
}
