use std::process::Command;

use serde_json::json;
use tempfile::tempdir;

fn write(path: &std::path::Path, value: &serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

#[test]
fn cli_compute_writes_response() {
    let dir = tempdir().unwrap();
    let fixture = dir.path().join("fixture.json");
    let request = dir.path().join("request.json");
    let out = dir.path().join("response.json");
    let cache = dir.path().join("cache.sqlite");

    write(
        &fixture,
        &json!({
            "survey": {"id": "sojs", "editions": [{"id": "js2023", "year": 2023}]},
            "questions": [{
                "id": "framework",
                "surveyId": "sojs",
                "normPaths": {"response": "tools.framework.choices"}
            }],
            "results": {
                "tools.framework.choices": [
                    {"editionId": "js2023", "buckets": [{"id": "default", "facetBuckets": [
                        {"id": "react", "count": 8},
                        {"id": "vue", "count": 2}
                    ]}]}
                ]
            }
        }),
    );
    write(
        &request,
        &json!({"editionId": "js2023", "questionId": "framework"}),
    );

    let status = Command::new(env!("CARGO_BIN_EXE_survey-tally"))
        .args(["compute", "--fixture"])
        .arg(&fixture)
        .arg("--request")
        .arg(&request)
        .arg("--out")
        .arg(&out)
        .arg("--cache")
        .arg(&cache)
        .status()
        .unwrap();
    assert!(status.success());

    let response: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(response["cached"], false);
    let buckets = response["results"][0]["buckets"].as_array().unwrap();
    assert_eq!(buckets[0]["id"], "react");
    assert_eq!(buckets[0]["percentageQuestion"], 80.0);

    let export = dir.path().join("export.jsonl");
    let status = Command::new(env!("CARGO_BIN_EXE_survey-tally"))
        .args(["cache-export", "--db"])
        .arg(&cache)
        .arg("--out")
        .arg(&export)
        .status()
        .unwrap();
    assert!(status.success());
    assert_eq!(std::fs::read_to_string(&export).unwrap().lines().count(), 1);
}

#[test]
fn cli_cache_prune_requires_a_bound() {
    let dir = tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_survey-tally"))
        .args(["cache-prune", "--db"])
        .arg(dir.path().join("cache.sqlite"))
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn cli_lists_faceted_stages() {
    let output = Command::new(env!("CARGO_BIN_EXE_survey-tally"))
        .args(["stages", "--faceted"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("add_overall_bucket"));
    assert!(stdout.contains("facet_statistics"));
    assert!(stdout.lines().last().unwrap().ends_with("add_labels"));
}
