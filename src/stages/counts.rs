//! Counts that have to be final before any percentage is computed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::axes::AxisParameters;
use crate::model::{Bucket, EditionCompletion, EditionResult, OVERALL};

use super::merge::{combine_facet_buckets, percentage};

/// Per-edition respondent statistics supplied by the collection.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditionStats {
    /// Everyone who took the survey, by edition id.
    #[serde(default)]
    pub total_respondents: HashMap<String, u64>,
    /// Everyone who answered the question under the active filters.
    #[serde(default)]
    pub completion: HashMap<String, u64>,
}

/// Faceted aggregations only count facet buckets; derive the parent count
/// where the raw result left it empty.
pub(crate) fn add_default_bucket_counts(editions: &mut [EditionResult]) {
    for bucket in editions.iter_mut().flat_map(|e| e.buckets.iter_mut()) {
        if bucket.data.count == 0 && !bucket.facet_buckets.is_empty() {
            bucket.data.count = bucket.facet_buckets.iter().map(|fb| fb.data.count).sum();
        }
    }
}

pub(crate) fn add_completion_counts(editions: &mut [EditionResult], stats: &EditionStats) {
    for edition in editions.iter_mut() {
        let Some(&count) = stats.completion.get(&edition.edition_id) else {
            continue;
        };
        let total_respondents = stats
            .total_respondents
            .get(&edition.edition_id)
            .copied()
            .unwrap_or(0);
        edition.completion = Some(EditionCompletion {
            total_respondents,
            count,
            percentage_survey: percentage(count, total_respondents),
        });
        for bucket in edition.buckets.iter_mut() {
            bucket.completion_count = Some(count);
        }
    }
}

/// Append a baseline bucket combining every answer, with the facet
/// distribution across all of them.
pub(crate) fn add_overall_bucket(editions: &mut [EditionResult], facet_axis: &AxisParameters) {
    for edition in editions.iter_mut() {
        if edition.buckets.iter().any(|b| b.id == OVERALL) {
            continue;
        }
        let count = edition.buckets.iter().map(|b| b.data.count).sum();
        let mut overall = Bucket::new(OVERALL, count);
        overall.facet_buckets = combine_facet_buckets(&edition.buckets, count, facet_axis);
        overall.completion_count = edition.completion.as_ref().map(|c| c.count);
        edition.buckets.push(overall);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FacetBucket, SortOrder, SortProperty};
    use crate::stages::sort::tests::test_axis;

    #[test]
    fn parent_count_comes_from_facets() {
        let mut editions = vec![EditionResult::new(
            "e1",
            vec![
                Bucket::new("a", 0).with_facets(vec![
                    FacetBucket::new("x", 3),
                    FacetBucket::new("y", 4),
                ]),
                Bucket::new("b", 9).with_facets(vec![FacetBucket::new("x", 1)]),
            ],
        )];
        add_default_bucket_counts(&mut editions);
        assert_eq!(editions[0].buckets[0].data.count, 7);
        assert_eq!(editions[0].buckets[1].data.count, 9);
    }

    #[test]
    fn completion_is_attached_per_edition() {
        let mut editions = vec![
            EditionResult::new("e1", vec![Bucket::new("a", 1)]),
            EditionResult::new("e2", vec![Bucket::new("a", 1)]),
        ];
        let stats = EditionStats {
            total_respondents: HashMap::from([("e1".to_string(), 200)]),
            completion: HashMap::from([("e1".to_string(), 50)]),
        };
        add_completion_counts(&mut editions, &stats);
        let completion = editions[0].completion.as_ref().unwrap();
        assert_eq!(completion.count, 50);
        assert_eq!(completion.percentage_survey, 25.0);
        assert_eq!(editions[0].buckets[0].completion_count, Some(50));
        assert!(editions[1].completion.is_none());
    }

    #[test]
    fn overall_combines_facets() {
        let mut editions = vec![EditionResult::new(
            "e1",
            vec![
                Bucket::new("a", 5).with_facets(vec![
                    FacetBucket::new("x", 3),
                    FacetBucket::new("y", 2),
                ]),
                Bucket::new("b", 5).with_facets(vec![FacetBucket::new("x", 5)]),
            ],
        )];
        let axis = test_axis(SortProperty::Count, SortOrder::Desc);
        add_overall_bucket(&mut editions, &axis);
        add_overall_bucket(&mut editions, &axis);
        let buckets = &editions[0].buckets;
        assert_eq!(buckets.len(), 3);
        let overall = &buckets[2];
        assert_eq!(overall.id, OVERALL);
        assert_eq!(overall.data.count, 10);
        assert_eq!(overall.facet_buckets[0].id, "x");
        assert_eq!(overall.facet_buckets[0].data.count, 8);
        assert_eq!(overall.facet_buckets[0].percentage_bucket, 80.0);
    }
}
