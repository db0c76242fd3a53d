//! Round trip of a webhook payload from disk into a run, the way the
//! binary drives it.

use std::io::Write as _;

use cad_core::payload::{AlertPayload, EventType};
use cad_e2e_tests::{sample_cluster, MockEnv};

const PAYLOAD: &str = r#"{
  "event": {
    "event_type": "incident.triggered",
    "data": {
      "id": "PINC1",
      "title": "FrobnicatorOverload",
      "service": { "id": "PSVC1" },
      "alerts": [
        { "body": { "details": { "cluster_id": "ext-cluster-1" } } }
      ]
    }
  }
}"#;

#[tokio::test]
async fn payload_file_drives_a_full_run() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(PAYLOAD.as_bytes()).expect("payload written");

    let raw = tokio::fs::read_to_string(file.path())
        .await
        .expect("payload read back");
    let payload = AlertPayload::parse(&raw).expect("payload parses");
    assert_eq!(payload.event_type, EventType::Triggered);
    assert_eq!(payload.external_cluster_id, "ext-cluster-1");

    let env = MockEnv::new(sample_cluster());
    let controller = env.controller(cad_investigations::registry().expect("registry"));
    controller
        .run_webhook(payload)
        .await
        .expect("unknown alert handled");

    let calls = env.recorded_calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1], "escalate");
}
