//! Averages and percentiles of each bucket's facet distribution, for facet
//! axes whose options carry numeric values.

use crate::axes::AxisParameters;
use crate::model::{is_special, Bucket, EditionResult, Percentiles};

use super::merge::round2;

/// Numeric value a facet bucket stands for: the option's declared average,
/// or the id itself on sequential scales.
fn facet_value(axis: &AxisParameters, id: &str) -> Option<f64> {
    if let Some(average) = axis.option(id).and_then(|o| o.average) {
        return Some(average);
    }
    if axis.question.options_are_sequential {
        return id.parse::<f64>().ok();
    }
    None
}

fn distribution(bucket: &Bucket, axis: &AxisParameters) -> Vec<(f64, u64)> {
    let mut points: Vec<(f64, u64)> = bucket
        .facet_buckets
        .iter()
        .filter(|fb| !is_special(&fb.id))
        .filter_map(|fb| facet_value(axis, &fb.id).map(|v| (v, fb.data.count)))
        .collect();
    points.sort_by(|a, b| a.0.total_cmp(&b.0));
    points
}

fn weighted_average(points: &[(f64, u64)], total: u64) -> f64 {
    let sum: f64 = points.iter().map(|(v, c)| v * *c as f64).sum();
    round2(sum / total as f64)
}

/// Nearest-rank percentiles over a sorted, count-weighted distribution.
fn percentiles(points: &[(f64, u64)], total: u64) -> Percentiles {
    let mut values = [0.0; 5];
    for (slot, rank) in values.iter_mut().zip(Percentiles::RANKS) {
        let threshold = total as f64 * rank / 100.0;
        let mut cumulative = 0u64;
        let mut found = None;
        for (value, count) in points.iter().filter(|(_, c)| *c > 0) {
            cumulative += count;
            if rank == 0.0 || cumulative as f64 >= threshold {
                found = Some(*value);
                break;
            }
        }
        *slot = round2(found.unwrap_or(0.0));
    }
    Percentiles::from_values(values)
}

pub(crate) fn add_facet_statistics(editions: &mut [EditionResult], facet_axis: &AxisParameters) {
    for bucket in editions.iter_mut().flat_map(|e| e.buckets.iter_mut()) {
        let points = distribution(bucket, facet_axis);
        let total: u64 = points.iter().map(|(_, c)| c).sum();
        if total == 0 {
            continue;
        }
        bucket.data.average = Some(weighted_average(&points, total));
        bucket.data.percentiles = Some(percentiles(&points, total));
    }
}
