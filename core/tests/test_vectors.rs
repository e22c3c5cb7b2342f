//! Verify URL resolution and response classification against the JSON test
//! vectors stored in `test-vectors/`.
//!
//! Each vector file lists named cases; failures report the case name so a
//! broken vector is easy to find.

use transport_core::{classify, ApiError, HttpResponse, RequestDescriptor, StatusBand};

fn string_map(value: &serde_json::Value) -> Vec<(String, String)> {
    value
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), v.as_str().unwrap().to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// URL resolution
// ---------------------------------------------------------------------------

#[test]
fn url_test_vectors() {
    let raw = include_str!("../../test-vectors/urls.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let mut req = RequestDescriptor::get(case["url"].as_str().unwrap());
        for (key, value) in string_map(&case["query"]) {
            req = req.query(key, value);
        }
        for (key, value) in string_map(&case["params"]) {
            req = req.param(key, value);
        }

        let resolved = req.resolved_url().unwrap();
        assert_eq!(resolved.as_str(), case["expected"].as_str().unwrap(), "{name}: url");
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

fn parse_band(s: &str) -> StatusBand {
    match s {
        "1xx" => StatusBand::Informational,
        "2xx" => StatusBand::Success,
        "3xx" => StatusBand::Redirection,
        "4xx" => StatusBand::ClientError,
        "5xx" => StatusBand::ServerError,
        other => panic!("unknown band: {other}"),
    }
}

#[test]
fn classify_test_vectors() {
    let raw = include_str!("../../test-vectors/classify.json");
    let vectors: serde_json::Value = serde_json::from_str(raw).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let status = case["status"].as_u64().unwrap() as u16;
        let body = case["body"].as_str().unwrap().as_bytes().to_vec();
        let response = HttpResponse {
            status,
            url: "http://svc/vector".to_string(),
            headers: Vec::new(),
            body: body.clone(),
        };

        let result = classify::<serde_json::Value>(response);
        match case["expect"].as_str().unwrap() {
            "ok" => {
                let parsed = result.unwrap_or_else(|e| panic!("{name}: {e}"));
                assert_eq!(parsed.status(), status, "{name}: status");
                assert_eq!(parsed.raw_body(), body.as_slice(), "{name}: body");
            }
            "server_error" => {
                let err = result.err().unwrap_or_else(|| panic!("{name}: expected error"));
                assert!(matches!(err, ApiError::ServerError { .. }), "{name}: {err:?}");
                assert_eq!(err.raw_body(), Some(body.as_slice()), "{name}: body");
            }
            "decode_error" => {
                let err = result.err().unwrap_or_else(|| panic!("{name}: expected error"));
                let expected_band = parse_band(case["band"].as_str().unwrap());
                match &err {
                    ApiError::Decode { band, .. } => assert_eq!(*band, expected_band, "{name}: band"),
                    other => panic!("{name}: unexpected error {other:?}"),
                }
                assert_eq!(err.status(), Some(status), "{name}: status");
                assert!(
                    err.to_string().starts_with(&format!("(unexpected {expected_band})")),
                    "{name}: message"
                );
            }
            other => panic!("{name}: unknown expectation {other}"),
        }
    }
}
