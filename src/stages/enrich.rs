//! Entity and token lookup for bucket ids.

use std::collections::{BTreeSet, HashMap};

use crate::collection::{CollectionError, Enricher};
use crate::model::{is_special, EditionResult};

fn lookup_ids(editions: &[EditionResult]) -> Vec<String> {
    let mut ids = BTreeSet::new();
    for bucket in editions.iter().flat_map(|e| e.buckets.iter()) {
        if !is_special(&bucket.id) {
            ids.insert(bucket.id.clone());
        }
        for fb in &bucket.facet_buckets {
            if !is_special(&fb.id) {
                ids.insert(fb.id.clone());
            }
        }
    }
    ids.into_iter().collect()
}

pub(crate) async fn add_entities_and_tokens(
    editions: &mut [EditionResult],
    enricher: &dyn Enricher,
) -> Result<(), CollectionError> {
    let ids = lookup_ids(editions);
    if ids.is_empty() {
        return Ok(());
    }
    let entities: HashMap<String, _> = enricher
        .entities(&ids)
        .await?
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect();
    let tokens: HashMap<String, _> = enricher
        .tokens(&ids)
        .await?
        .into_iter()
        .map(|t| (t.id.clone(), t))
        .collect();
    if entities.is_empty() && tokens.is_empty() {
        return Ok(());
    }

    for bucket in editions.iter_mut().flat_map(|e| e.buckets.iter_mut()) {
        if let Some(entity) = entities.get(&bucket.id) {
            bucket.entity = Some(entity.clone());
        }
        if let Some(token) = tokens.get(&bucket.id) {
            bucket.token = Some(token.clone());
        }
        for fb in bucket.facet_buckets.iter_mut() {
            if let Some(entity) = entities.get(&fb.id) {
                fb.entity = Some(entity.clone());
            }
            if let Some(token) = tokens.get(&fb.id) {
                fb.token = Some(token.clone());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Bucket, Entity, FacetBucket, Token, NO_ANSWER};

    struct Catalog;

    #[async_trait::async_trait]
    impl Enricher for Catalog {
        async fn entities(&self, ids: &[String]) -> Result<Vec<Entity>, CollectionError> {
            assert!(!ids.iter().any(|id| id == NO_ANSWER));
            Ok(vec![Entity {
                id: "vite".into(),
                name: Some("Vite".into()),
                description: None,
                homepage_url: None,
                tags: Vec::new(),
            }])
        }

        async fn tokens(&self, _ids: &[String]) -> Result<Vec<Token>, CollectionError> {
            Ok(vec![Token {
                id: "fr".into(),
                parent_id: Some("europe".into()),
                label: None,
            }])
        }
    }

    #[tokio::test]
    async fn attaches_to_buckets_and_facets() {
        let mut editions = vec![EditionResult::new(
            "e1",
            vec![
                Bucket::new("vite", 3).with_facets(vec![FacetBucket::new("fr", 3)]),
                Bucket::new(NO_ANSWER, 1),
            ],
        )];
        add_entities_and_tokens(&mut editions, &Catalog).await.unwrap();
        let bucket = &editions[0].buckets[0];
        assert_eq!(bucket.entity.as_ref().unwrap().id, "vite");
        assert_eq!(bucket.facet_buckets[0].token.as_ref().unwrap().id, "fr");
        assert!(editions[0].buckets[1].entity.is_none());
    }
}
