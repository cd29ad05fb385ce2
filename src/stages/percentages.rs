//! Percentage units and the request-wide dataset cutoff.

use crate::model::{is_special, EditionResult, OVERALL};
use crate::request::DatasetCutoff;

use super::merge::percentage;

/// `percentageQuestion` is relative to everyone who answered the question,
/// `percentageSurvey` to everyone who took the survey and `percentageBucket`
/// to the parent bucket. Without completion statistics the question total
/// falls back to the sum of bucket counts.
pub(crate) fn add_percentages(editions: &mut [EditionResult]) {
    for edition in editions.iter_mut() {
        let bucket_total: u64 = edition
            .buckets
            .iter()
            .filter(|b| b.id != OVERALL)
            .map(|b| b.data.count)
            .sum();
        let question_total = edition
            .completion
            .as_ref()
            .map(|c| c.count)
            .filter(|c| *c > 0)
            .unwrap_or(bucket_total);
        let survey_total = edition
            .completion
            .as_ref()
            .map(|c| c.total_respondents)
            .filter(|c| *c > 0)
            .unwrap_or(question_total);

        for bucket in edition.buckets.iter_mut() {
            bucket.data.percentage_question = percentage(bucket.data.count, question_total);
            bucket.data.percentage_survey = percentage(bucket.data.count, survey_total);
            let parent = bucket.data.count;
            for fb in bucket.facet_buckets.iter_mut() {
                fb.data.percentage_question = percentage(fb.data.count, question_total);
                fb.data.percentage_survey = percentage(fb.data.count, survey_total);
                fb.percentage_bucket = percentage(fb.data.count, parent);
            }
        }
    }
}

/// Drop categories below the dataset threshold, at both levels. Special
/// buckets are exempt.
pub(crate) fn apply_dataset_cutoff(editions: &mut [EditionResult], cutoff: DatasetCutoff) {
    if !cutoff.is_active() {
        return;
    }
    let passes = |id: &str, count: u64, percentage_question: f64| {
        is_special(id)
            || (cutoff.count.map_or(true, |min| count >= min)
                && cutoff.percent.map_or(true, |min| percentage_question >= min))
    };
    for edition in editions.iter_mut() {
        edition
            .buckets
            .retain(|b| passes(&b.id, b.data.count, b.data.percentage_question));
        for bucket in edition.buckets.iter_mut() {
            bucket
                .facet_buckets
                .retain(|fb| passes(&fb.id, fb.data.count, fb.data.percentage_question));
        }
    }
}
