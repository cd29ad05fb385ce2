//! Display labels and edition years.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::axes::AxisParameters;
use crate::model::{
    EditionResult, SurveyMetadata, CUTOFF_ANSWERS, NOT_APPLICABLE, NO_ANSWER, OTHER_ANSWERS,
    OVERALL, OVERLIMIT_ANSWERS, PREFER_NOT_TO_SAY,
};

use super::merge::BucketLike;

static SPECIAL_LABELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (NO_ANSWER, "No answer"),
        (NOT_APPLICABLE, "Not applicable"),
        (PREFER_NOT_TO_SAY, "Prefer not to say"),
        (CUTOFF_ANSWERS, "Below cutoff"),
        (OVERLIMIT_ANSWERS, "Over limit"),
        (OTHER_ANSWERS, "Other answers"),
        (OVERALL, "Overall"),
    ])
});

/// Option or group label first, then the fixed label of a reserved id, then
/// the enriched entity name.
fn label_for<T: BucketLike>(bucket: &T, axis: &AxisParameters) -> Option<String> {
    axis.option(bucket.id())
        .and_then(|o| o.label.clone())
        .or_else(|| SPECIAL_LABELS.get(bucket.id()).map(|s| s.to_string()))
        .or_else(|| bucket.entity_name().map(str::to_string))
}

fn label_all<T: BucketLike>(buckets: &mut [T], axis: &AxisParameters) {
    for bucket in buckets.iter_mut() {
        let label = label_for(bucket, axis);
        bucket.set_label(label);
    }
}

pub(crate) fn add_labels(
    editions: &mut [EditionResult],
    main: &AxisParameters,
    facet: Option<&AxisParameters>,
) {
    for edition in editions.iter_mut() {
        label_all(&mut edition.buckets, main);
        if let Some(facet_axis) = facet {
            for bucket in edition.buckets.iter_mut() {
                label_all(&mut bucket.facet_buckets, facet_axis);
            }
        }
    }
}

pub(crate) fn add_edition_years(editions: &mut [EditionResult], survey: &SurveyMetadata) {
    for edition in editions.iter_mut() {
        edition.year = survey.edition(&edition.edition_id).map(|e| e.year);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bucket, EditionMetadata, Entity, QuestionOption, SortOrder, SortProperty};
    use crate::stages::sort::tests::test_axis;

    #[test]
    fn labels_resolve_in_priority_order() {
        let mut axis = test_axis(SortProperty::Count, SortOrder::Desc);
        axis.options = Some(vec![QuestionOption {
            id: "ts".into(),
            label: Some("TypeScript".into()),
            average: None,
        }]);
        let mut entity_bucket = Bucket::new("vite", 2);
        entity_bucket.entity = Some(Entity {
            id: "vite".into(),
            name: Some("Vite".into()),
            description: None,
            homepage_url: None,
            tags: Vec::new(),
        });
        let mut editions = vec![EditionResult::new(
            "e1",
            vec![
                Bucket::new("ts", 5),
                entity_bucket,
                Bucket::new(NO_ANSWER, 1),
                Bucket::new("plain", 1),
            ],
        )];
        add_labels(&mut editions, &axis, None);
        let labels: Vec<Option<&str>> = editions[0]
            .buckets
            .iter()
            .map(|b| b.label.as_deref())
            .collect();
        assert_eq!(
            labels,
            vec![Some("TypeScript"), Some("Vite"), Some("No answer"), None]
        );
    }

    #[test]
    fn years_come_from_survey_editions() {
        let survey = SurveyMetadata {
            id: "sojs".into(),
            editions: vec![EditionMetadata {
                id: "js2023".into(),
                year: 2023,
            }],
        };
        let mut editions = vec![
            EditionResult::new("js2023", vec![]),
            EditionResult::new("unknown", vec![]),
        ];
        add_edition_years(&mut editions, &survey);
        assert_eq!(editions[0].year, Some(2023));
        assert_eq!(editions[1].year, None);
    }
}
