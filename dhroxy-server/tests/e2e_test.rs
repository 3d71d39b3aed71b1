//! End-to-end integration test
//!
//! Starts the full router against a fixture labsvar upstream and drives it
//! over HTTP: metadata, search, read and transaction Bundles.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::StatusCode;
use dhroxy_core::RawHeaders;
use dhroxy_server::upstream::{UpstreamClient, UpstreamError, UpstreamResponse};
use dhroxy_server::{AppState, build_router, config::ServerConfig};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};

const LABSVAR_FIXTURE: &str = r#"{
  "svaroversigt": {
    "laboratorieresultater": [
      {
        "rekvisitionsId": "REK-1",
        "resultatStatuskode": "SvarEndeligt",
        "resultatdato": "2024-03-01T10:15:00+01:00",
        "referenceIntervalTekst": "3.5 - 4.6",
        "undersoegelser": [{
          "quantitativeFindings": {"data": [
            ["0","1","2","3","4","5","6","7","8","9","10"],
            ["x","NPU03230","","","P-Kalium","","","","","4.2","mmol/L"]
          ]}
        }]
      },
      {
        "proevenummerLaboratorie": "MIK 22",
        "resultatStatus": "Foreloebigt",
        "konklusionHtml": "Ingen v&#230;kst<br/>efter 48 timer"
      }
    ],
    "rekvisitioner": [
      {"id": "REK-1", "patientCpr": "0101011234", "rekvirentsOrganisation": "Lægehuset"}
    ]
  }
}"#;

/// Answers every fetch with the fixture, or with a fixed status when the
/// session cookie is `expired`. Records what it was asked.
#[derive(Default)]
struct FixtureUpstream {
    calls: Mutex<Vec<(RawHeaders, Vec<(String, String)>)>>,
}

#[async_trait]
impl UpstreamClient for FixtureUpstream {
    async fn fetch(
        &self,
        headers: &RawHeaders,
        terms: &[(&'static str, String)],
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.calls.lock().unwrap().push((
            headers.clone(),
            terms.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        ));

        let cookie = headers.get("cookie").and_then(|v| v.first()).map(String::as_str);
        match cookie {
            Some("expired") => Ok(UpstreamResponse {
                status: StatusCode::UNAUTHORIZED,
                body: Bytes::new(),
            }),
            Some("offline") => Err(UpstreamError::Transport("connection refused".to_string())),
            _ => Ok(UpstreamResponse {
                status: StatusCode::OK,
                body: Bytes::from_static(LABSVAR_FIXTURE.as_bytes()),
            }),
        }
    }
}

/// Start a test server on a random port, returns (base_url, upstream)
async fn start_test_server() -> (String, Arc<FixtureUpstream>) {
    let upstream = Arc::new(FixtureUpstream::default());
    let state = AppState::new(ServerConfig::default(), upstream.clone());
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), upstream)
}

#[tokio::test]
async fn test_health_check() {
    let (base_url, _upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["fhirVersion"], "4.0.1");
}

#[tokio::test]
async fn test_metadata() {
    let (base_url, _upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/fhir/metadata", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["resourceType"], "CapabilityStatement");
    assert_eq!(body["rest"][0]["resource"][0]["type"], "Observation");
    assert_eq!(body["rest"][0]["interaction"][0]["code"], "transaction");
}

#[tokio::test]
async fn test_observation_search() {
    let (base_url, upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!(
            "{}/fhir/Observation?date=ge2024-01-01&date=le2024-03-31&category=laboratory%7Cmikrobiologi",
            base_url
        ))
        .header("Cookie", "session=abc")
        .header("X-XSRF-Token", "tok")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/fhir+json")
    );

    let bundle: Value = resp.json().await.unwrap();
    assert_eq!(bundle["resourceType"], "Bundle");
    assert_eq!(bundle["type"], "searchset");
    assert_eq!(bundle["total"], 2);
    assert!(
        bundle["link"][0]["url"]
            .as_str()
            .unwrap()
            .starts_with("/fhir/Observation?date=ge2024-01-01")
    );

    let potassium = &bundle["entry"][0]["resource"];
    assert_eq!(potassium["id"], "lab-rek-1");
    assert_eq!(potassium["status"], "final");
    assert_eq!(potassium["code"]["text"], "P-Kalium");
    assert_eq!(potassium["valueQuantity"]["value"], 4.2);
    assert_eq!(potassium["valueQuantity"]["unit"], "mmol/L");
    assert_eq!(potassium["subject"]["identifier"]["value"], "0101011234");
    assert_eq!(potassium["performer"][0]["display"], "Lægehuset");

    let culture = &bundle["entry"][1]["resource"];
    assert_eq!(culture["id"], "lab-mik-22");
    assert_eq!(culture["status"], "preliminary");
    assert_eq!(culture["valueString"], "Ingen vækst\nefter 48 timer");
    assert_eq!(culture["subject"]["identifier"]["system"], "urn:dhroxy:pseudonym");

    let calls = upstream.calls.lock().unwrap();
    let (headers, terms) = &calls[0];
    assert_eq!(headers["cookie"], vec!["session=abc"]);
    assert_eq!(headers["x-xsrf-token"], vec!["tok"]);
    assert_eq!(
        *terms,
        vec![
            ("fra".to_string(), "2024-01-01T00:00:00".to_string()),
            ("til".to_string(), "2024-03-31T23:59:59".to_string()),
            ("omraade".to_string(), "Mikrobiologi".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_observation_read() {
    let (base_url, _upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/fhir/Observation/lab-mik-22", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let observation: Value = resp.json().await.unwrap();
    assert_eq!(observation["resourceType"], "Observation");
    assert_eq!(observation["identifier"][0]["value"], "MIK 22");

    let resp = client
        .get(format!("{}/fhir/Observation/lab-nope", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert_eq!(outcome["issue"][0]["code"], "not-found");
}

#[tokio::test]
async fn test_unsupported_resource_type() {
    let (base_url, upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/fhir/Patient", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["code"], "not-supported");
    assert!(upstream.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_upstream_failures() {
    let (base_url, _upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/fhir/Observation", base_url))
        .header("Cookie", "expired")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["issue"][0]["code"], "login");

    let resp = client
        .get(format!("{}/fhir/Observation", base_url))
        .header("Cookie", "offline")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 502);
}

#[tokio::test]
async fn test_transaction_bundle() {
    let (base_url, upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let transaction = json!({
        "resourceType": "Bundle",
        "type": "transaction",
        "entry": [
            {"request": {"method": "GET", "url": "Observation/lab-rek-1"}},
            {"request": {"method": "GET", "url": "Patient/1"}},
            {"request": {"method": "DELETE", "url": "Observation/lab-rek-1"}},
            {"request": {"method": "GET", "url": "Observation/lab-missing"}},
            {"request": {"method": "GET", "url": "Observation?category=klinisk biokemi"}}
        ]
    });

    let resp = client
        .post(format!("{}/fhir", base_url))
        .header("Content-Type", "application/fhir+json")
        .header("Cookie", "session=abc")
        .body(transaction.to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["type"], "transaction-response");
    let entries = body["entry"].as_array().unwrap();
    assert_eq!(entries.len(), 5);

    assert_eq!(entries[0]["response"]["status"], "200 OK");
    assert_eq!(entries[0]["resource"]["id"], "lab-rek-1");

    // Unknown resource type fails only its own slot
    assert_eq!(entries[1]["response"]["status"], "500 Internal Server Error");
    assert_eq!(entries[1]["resource"]["resourceType"], "OperationOutcome");
    assert!(
        entries[1]["resource"]["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .starts_with("Failed to fetch Patient/1: status 404")
    );

    assert_eq!(entries[2]["response"]["status"], "500 Internal Server Error");
    assert_eq!(entries[2]["resource"]["issue"][0]["code"], "exception");

    assert_eq!(entries[3]["response"]["status"], "500 Internal Server Error");
    assert!(
        entries[3]["resource"]["issue"][0]["diagnostics"]
            .as_str()
            .unwrap()
            .starts_with("Failed to fetch Observation/lab-missing: status 404")
    );

    assert_eq!(entries[4]["response"]["status"], "200 OK");
    assert_eq!(entries[4]["resource"]["type"], "searchset");

    // Session headers reach upstream through the nested requests
    let calls = upstream.calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(headers, _)| headers["cookie"] == vec!["session=abc"]));
    assert_eq!(calls[2].1.last().unwrap().1, "KliniskBiokemi");
}

#[tokio::test]
async fn test_transaction_envelope_rejected() {
    let (base_url, _upstream) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/fhir", base_url))
        .header("Content-Type", "application/json")
        .body(json!({"resourceType": "Bundle", "type": "batch", "entry": []}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["resourceType"], "OperationOutcome");
    assert_eq!(outcome["issue"][0]["code"], "invalid");

    let resp = client
        .post(format!("{}/fhir", base_url))
        .header("Content-Type", "application/json")
        .body(json!({"resourceType": "Bundle", "type": "transaction"}).to_string())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["entry"], json!([]));
}
