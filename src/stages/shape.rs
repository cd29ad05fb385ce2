//! Raw result clean-up: single-axis flattening, freeform merging and
//! discarding empty ids and editions.

use std::collections::HashMap;

use crate::model::{Bucket, EditionResult, FacetBucket, DEFAULT_BUCKET};

/// Single-axis aggregations come back wrapped in a `default` bucket whose
/// facet buckets are the real answers; lift them one level up.
pub(crate) fn move_default_buckets_up(editions: &mut [EditionResult]) {
    for edition in editions.iter_mut() {
        if !edition.buckets.iter().any(|b| b.id == DEFAULT_BUCKET) {
            continue;
        }
        let mut flattened = Vec::with_capacity(edition.buckets.len());
        for bucket in edition.buckets.drain(..) {
            if bucket.id == DEFAULT_BUCKET {
                flattened.extend(bucket.facet_buckets.into_iter().map(Bucket::from));
            } else {
                flattened.push(bucket);
            }
        }
        edition.buckets = flattened;
    }
}

pub(crate) fn discard_empty_ids(editions: &mut [EditionResult]) {
    for edition in editions.iter_mut() {
        edition.buckets.retain(|b| !b.id.trim().is_empty());
        for bucket in edition.buckets.iter_mut() {
            bucket.facet_buckets.retain(|fb| !fb.id.trim().is_empty());
        }
    }
}

pub(crate) fn discard_empty_editions(editions: Vec<EditionResult>) -> Vec<EditionResult> {
    editions
        .into_iter()
        .filter(|e| !e.buckets.is_empty())
        .collect()
}

fn add_facet_counts(into: &mut Vec<FacetBucket>, from: Vec<FacetBucket>) {
    for fb in from {
        match into.iter_mut().find(|f| f.id == fb.id) {
            Some(existing) => existing.data.count += fb.data.count,
            None => into.push(fb),
        }
    }
}

/// Fold freeform results into the main results: same-id buckets add their
/// counts, new ids and new editions are appended.
pub(crate) fn merge_freeform(
    mut main: Vec<EditionResult>,
    freeform: Vec<EditionResult>,
) -> Vec<EditionResult> {
    let mut index: HashMap<String, usize> = main
        .iter()
        .enumerate()
        .map(|(idx, e)| (e.edition_id.clone(), idx))
        .collect();

    for edition in freeform {
        let Some(&idx) = index.get(&edition.edition_id) else {
            index.insert(edition.edition_id.clone(), main.len());
            main.push(edition);
            continue;
        };
        let target = &mut main[idx];
        for bucket in edition.buckets {
            match target.buckets.iter_mut().find(|b| b.id == bucket.id) {
                Some(existing) => {
                    existing.data.count += bucket.data.count;
                    add_facet_counts(&mut existing.facet_buckets, bucket.facet_buckets);
                }
                None => target.buckets.push(bucket),
            }
        }
    }
    main
}
