use serde_json::json;
use survey_tally::cache::GenericCacheKey;
use survey_tally::ComputeRequest;

fn key(value: serde_json::Value) -> GenericCacheKey {
    let request: ComputeRequest = serde_json::from_value(value).unwrap();
    GenericCacheKey::new("sojs", &request).unwrap()
}

#[test]
fn cache_key_is_stable_and_sensitive_to_inputs() {
    let base = json!({
        "editionId": "js2023",
        "questionId": "framework",
        "parameters": {"limit": 10, "cutoff": 5}
    });
    let key1 = key(base.clone());
    let key2 = key(base);
    assert_eq!(key1, key2);
    assert_eq!(key1.question_id, "framework");
    assert!(key1.description.starts_with("generic{"));
    assert_eq!(key1.key_hash.len(), 64);

    let key3 = key(json!({
        "editionId": "js2023",
        "questionId": "framework",
        "parameters": {"limit": 11, "cutoff": 5}
    }));
    assert_ne!(key1.key_hash, key3.key_hash);

    let faceted = key(json!({
        "editionId": "js2023",
        "questionId": "framework",
        "facet": "user_info__country",
        "parameters": {"limit": 10, "cutoff": 5}
    }));
    assert_ne!(key1.key_hash, faceted.key_hash);

    let filtered = key(json!({
        "editionId": "js2023",
        "questionId": "framework",
        "filters": {"user_info.country": {"$eq": "FRA"}},
        "parameters": {"limit": 10, "cutoff": 5}
    }));
    assert_ne!(key1.key_hash, filtered.key_hash);
}

#[test]
fn cache_key_ignores_field_order() {
    let a = key(json!({
        "questionId": "framework",
        "filters": {"a": {"$eq": 1}, "b": {"$in": [1, 2]}},
        "parameters": {"cutoff": 5, "limit": 10}
    }));
    let b = key(json!({
        "parameters": {"limit": 10, "cutoff": 5},
        "filters": {"b": {"$in": [1, 2]}, "a": {"$eq": 1}},
        "questionId": "framework"
    }));
    assert_eq!(a.key_hash, b.key_hash);
}

#[test]
fn cache_key_omits_empty_groups_and_cache_flag() {
    let bare = key(json!({"questionId": "framework"}));
    let empty = key(json!({
        "questionId": "framework",
        "filters": {},
        "facet": "",
        "parameters": {"enableCache": false}
    }));
    assert_eq!(bare.key_hash, empty.key_hash);
    assert!(bare.description.contains("allEditions(sojs)"));
    assert!(!bare.description.contains("parameters"));
    assert!(!bare.description.contains("filters"));
}

#[test]
fn cache_key_depends_on_sub_field_and_edition() {
    let responses = key(json!({"questionId": "framework"}));
    let combined = key(json!({"questionId": "framework", "subField": "combined"}));
    let edition = key(json!({"questionId": "framework", "editionId": "js2023"}));
    assert_ne!(responses.key_hash, combined.key_hash);
    assert_ne!(responses.key_hash, edition.key_hash);
}
