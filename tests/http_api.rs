//! End-to-end API tests: a real engine behind a real listener, driven with
//! a plain HTTP client.

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};

use fabhub::engine::Engine;
use fabhub::http;

const H: i64 = 3_600_000;
const DAY: i64 = 1_735_689_600_000;

fn at(hour: i64, minute: i64) -> i64 {
    DAY + hour * H + minute * 60_000
}

/// Boot the server on an ephemeral port with a fresh WAL; returns the API
/// base URL.
async fn spawn_server(name: &str) -> String {
    let dir = std::env::temp_dir().join("fabhub_test_http");
    std::fs::create_dir_all(&dir).unwrap();
    let wal = dir.join(name);
    let _ = std::fs::remove_file(&wal);

    let engine = Arc::new(Engine::new(wal).unwrap());
    let app = http::router(engine);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1")
}

async fn create_machine(client: &reqwest::Client, base: &str, kind: &str, name: &str) -> Value {
    let resp = client
        .post(format!("{base}/machines"))
        .json(&json!({
            "type": kind,
            "fablabId": "fablab-1",
            "deviceName": name,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    resp.json::<Value>().await.unwrap()["machine"].clone()
}

fn schedule_body(machine: &Value, start: i64, end: i64) -> Value {
    json!({
        "startDate": start,
        "endDate": end,
        "machine": { "type": machine["type"], "id": machine["id"] },
        "fablabId": "fablab-1",
        "orderId": ulid::Ulid::new().to_string(),
    })
}

#[tokio::test]
async fn machine_crud_roundtrip() {
    let base = spawn_server("machine_crud.wal").await;
    let client = reqwest::Client::new();

    let machine = create_machine(&client, &base, "printer", "Ultimaker 2+").await;
    let id = machine["id"].as_str().unwrap();
    assert_eq!(machine["type"], "printer");
    assert_eq!(machine["schedules"], json!([]));

    let resp = client
        .get(format!("{base}/machines/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .put(format!("{base}/machines/{id}"))
        .json(&json!({ "deviceName": "Ultimaker 3", "activated": false }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let updated = resp.json::<Value>().await.unwrap();
    assert_eq!(updated["machine"]["deviceName"], "Ultimaker 3");
    assert_eq!(updated["machine"]["activated"], false);

    let resp = client
        .get(format!("{base}/machines?type=printer"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let listed = resp.json::<Value>().await.unwrap();
    assert_eq!(listed["machines"].as_array().unwrap().len(), 1);

    let resp = client
        .delete(format!("{base}/machines/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base}/machines/{id}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn overlapping_booking_is_rejected() {
    let base = spawn_server("overlap_400.wal").await;
    let client = reqwest::Client::new();
    let machine = create_machine(&client, &base, "printer", "Ultimaker 2+").await;

    let resp = client
        .post(format!("{base}/schedules"))
        .json(&schedule_body(&machine, at(10, 0), at(11, 0)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = resp.json::<Value>().await.unwrap();
    assert_eq!(created["schedule"]["startDate"], at(10, 0));

    // Contained interval: rejected, error names the machine
    let resp = client
        .post(format!("{base}/schedules"))
        .json(&schedule_body(&machine, at(10, 30), at(10, 45)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err = resp.json::<Value>().await.unwrap();
    assert!(
        err["error"]
            .as_str()
            .unwrap()
            .contains(machine["id"].as_str().unwrap())
    );

    // Abutting interval: fine
    let resp = client
        .post(format!("{base}/schedules"))
        .json(&schedule_body(&machine, at(11, 0), at(12, 0)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn reversed_dates_are_malformed() {
    let base = spawn_server("reversed_400.wal").await;
    let client = reqwest::Client::new();
    let machine = create_machine(&client, &base, "printer", "Ultimaker 2+").await;

    let resp = client
        .post(format!("{base}/schedules"))
        .json(&schedule_body(&machine, at(11, 0), at(10, 0)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_required_field_is_malformed() {
    let base = spawn_server("missing_field_400.wal").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/schedules"))
        .json(&json!({ "startDate": at(10, 0), "endDate": at(11, 0) }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rescheduling_moves_machine_bookkeeping() {
    let base = spawn_server("move_machine.wal").await;
    let client = reqwest::Client::new();
    let m1 = create_machine(&client, &base, "printer", "Ultimaker 2+").await;
    let m2 = create_machine(&client, &base, "lasercutter", "Epilog Zing").await;

    let resp = client
        .post(format!("{base}/schedules"))
        .json(&schedule_body(&m1, at(10, 0), at(11, 0)))
        .send()
        .await
        .unwrap();
    let sid = resp.json::<Value>().await.unwrap()["schedule"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = client
        .put(format!("{base}/schedules/{sid}"))
        .json(&json!({ "machine": { "type": m2["type"], "id": m2["id"] } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let old_machine = client
        .get(format!("{base}/machines/{}", m1["id"].as_str().unwrap()))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(old_machine["machine"]["schedules"], json!([]));

    let new_machine = client
        .get(format!("{base}/machines/{}", m2["id"].as_str().unwrap()))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(new_machine["machine"]["schedules"], json!([sid]));
}

#[tokio::test]
async fn deleting_schedule_clears_machine_and_404s() {
    let base = spawn_server("delete_schedule.wal").await;
    let client = reqwest::Client::new();
    let machine = create_machine(&client, &base, "millingMachine", "Roland MDX-40").await;

    let resp = client
        .post(format!("{base}/schedules"))
        .json(&schedule_body(&machine, at(10, 0), at(11, 0)))
        .send()
        .await
        .unwrap();
    let sid = resp.json::<Value>().await.unwrap()["schedule"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = client
        .delete(format!("{base}/schedules/{sid}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = client
        .get(format!("{base}/schedules/{sid}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let m = client
        .get(format!("{base}/machines/{}", machine["id"].as_str().unwrap()))
        .send()
        .await
        .unwrap()
        .json::<Value>()
        .await
        .unwrap();
    assert_eq!(m["machine"]["schedules"], json!([]));
}

#[tokio::test]
async fn list_status_codes_follow_window_convention() {
    let base = spawn_server("list_codes.wal").await;
    let client = reqwest::Client::new();

    // Empty collection
    let resp = client
        .get(format!("{base}/schedules"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let machine = create_machine(&client, &base, "printer", "Ultimaker 2+").await;
    for slot in 0..3 {
        let resp = client
            .post(format!("{base}/schedules"))
            .json(&schedule_body(&machine, at(slot * 2, 0), at(slot * 2 + 1, 0)))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    // Full listing
    let resp = client
        .get(format!("{base}/schedules"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.json::<Value>().await.unwrap();
    assert_eq!(body["schedules"].as_array().unwrap().len(), 3);

    // limit alone is still a full response
    let resp = client
        .get(format!("{base}/schedules?limit=2"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // limit + skip marks the response partial
    let resp = client
        .get(format!("{base}/schedules?limit=2&skip=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    let body = resp.json::<Value>().await.unwrap();
    assert_eq!(body["schedules"].as_array().unwrap().len(), 2);

    // A window past the end of the collection is empty
    let resp = client
        .get(format!("{base}/schedules?limit=5&skip=10"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_and_unknown_ids() {
    let base = spawn_server("bad_ids.wal").await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/schedules/not-a-ulid"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client
        .get(format!("{base}/schedules/{}", ulid::Ulid::new()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn busy_machine_cannot_be_deleted() {
    let base = spawn_server("busy_machine.wal").await;
    let client = reqwest::Client::new();
    let machine = create_machine(&client, &base, "otherMachine", "Vinyl cutter").await;

    let resp = client
        .post(format!("{base}/schedules"))
        .json(&schedule_body(&machine, at(10, 0), at(11, 0)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);

    let resp = client
        .delete(format!("{base}/machines/{}", machine["id"].as_str().unwrap()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn order_lifecycle_over_http() {
    let base = spawn_server("order_flow.wal").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{base}/orders"))
        .json(&json!({ "owner": "alice", "files": ["print.stl"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let order = resp.json::<Value>().await.unwrap()["order"].clone();
    let oid = order["id"].as_str().unwrap();
    assert_eq!(order["status"], "new");

    let resp = client
        .get(format!("{base}/orders/count"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap()["count"], 1);

    let resp = client
        .post(format!("{base}/orders/{oid}/comments"))
        .json(&json!({ "author": "bob", "content": "please use PLA" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let commented = resp.json::<Value>().await.unwrap();
    let comments = commented["order"]["comments"].as_array().unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["author"], "bob");
    assert!(comments[0]["createdAt"].as_i64().unwrap() > 0);

    let resp = client
        .put(format!("{base}/orders/{oid}"))
        .json(&json!({ "status": "production" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    // Delete parks the order in the deleted status
    let resp = client
        .delete(format!("{base}/orders/{oid}"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap()["order"]["status"],
        "deleted"
    );

    let resp = client
        .get(format!("{base}/orders?status=deleted"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.json::<Value>().await.unwrap()["orders"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
}
