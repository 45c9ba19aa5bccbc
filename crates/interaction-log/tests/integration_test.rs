// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use common::helpers::{body_as_string, post_json, send_tcp_request, TestServer};
use interaction_log::analyze::{self, AnalyzePaths};
use interaction_log::model::LogRecord;
use serde_json::json;
use std::fs;

fn read_lines(path: &std::path::Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn test_root_returns_greeting() {
    let server = TestServer::start().await;

    let response = send_tcp_request(server.addr, "/", "GET", &[], None)
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);
    assert_eq!(body_as_string(response).await, "Hello, World!");

    server.shutdown().await;
}

#[tokio::test]
async fn test_single_log_end_to_end() {
    let server = TestServer::start().await;

    let (status, body) = post_json(
        server.addr,
        "/log",
        r#"{"log":{"action":"click","node":{"node":1,"position":[0.1,0.2]},"time":100}}"#,
    )
    .await
    .expect("Failed to send request");
    assert_eq!(status, 201);
    assert_eq!(body, "Persisted log successfully!");

    let lines = read_lines(&server.logs_path());
    assert_eq!(
        lines,
        vec![
            r#"{"action":"click","node":{"node":1,"position":[0.1,0.2],"edges":null,"toplabel":null,"botlabel":null},"time":100}"#
        ]
    );
    assert!(read_lines(&server.local_storage_logs_path()).is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_each_single_log_appends_one_line() {
    let server = TestServer::start().await;

    let records = vec![
        json!({"action": "click", "node": {"node": 4, "edges": [["a", "b"]], "toplabel": ["t"], "botlabel": []}, "time": 1}),
        json!({"action": "pan", "time": 2}),
        json!({"action": "click", "node": {"position": [1.5, -2.25]}, "time": 3}),
    ];
    for record in &records {
        let (status, _) = post_json(server.addr, "/log", &json!({ "log": record }).to_string())
            .await
            .expect("Failed to send request");
        assert_eq!(status, 201);
    }

    let lines = read_lines(&server.logs_path());
    assert_eq!(lines.len(), records.len());
    for (line, record) in lines.iter().zip(&records) {
        let stored: LogRecord = serde_json::from_str(line).unwrap();
        let submitted: LogRecord = serde_json::from_value(record.clone()).unwrap();
        assert_eq!(stored, submitted);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn test_batch_appends_one_array_line() {
    let server = TestServer::start().await;

    let batch = json!([
        {"action": "click", "time": 10},
        {"action": "zoom", "node": {"node": 2}, "time": 11}
    ]);
    let (status, body) = post_json(server.addr, "/logs", &json!({ "logs": batch }).to_string())
        .await
        .expect("Failed to send request");
    assert_eq!(status, 201);
    assert_eq!(body, "Persisted logs successfully!");

    let (status, _) = post_json(server.addr, "/logs", r#"{"logs":[]}"#)
        .await
        .expect("Failed to send request");
    assert_eq!(status, 201);

    let lines = read_lines(&server.local_storage_logs_path());
    assert_eq!(lines.len(), 2);
    let stored: Vec<LogRecord> = serde_json::from_str(&lines[0]).unwrap();
    let submitted: Vec<LogRecord> = serde_json::from_value(batch).unwrap();
    assert_eq!(stored, submitted);
    assert_eq!(lines[1], "[]");
    assert!(read_lines(&server.logs_path()).is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_malformed_bodies_still_answer_created() {
    let server = TestServer::start().await;

    let (status, body) = post_json(server.addr, "/log", "{\"log\": [")
        .await
        .expect("Failed to send request");
    assert_eq!(status, 201);
    assert_eq!(body, "Persisted log successfully!");

    let (status, body) = post_json(server.addr, "/logs", r#"{"logs":"nope"}"#)
        .await
        .expect("Failed to send request");
    assert_eq!(status, 201);
    assert_eq!(body, "Persisted logs successfully!");

    // the zero-valued envelope is what gets persisted
    let lines = read_lines(&server.logs_path());
    assert_eq!(
        lines,
        vec![
            r#"{"action":"","node":{"node":0,"position":null,"edges":null,"toplabel":null,"botlabel":null},"time":0}"#
        ]
    );
    assert_eq!(read_lines(&server.local_storage_logs_path()), vec!["[]"]);

    server.shutdown().await;
}

#[tokio::test]
async fn test_oversized_body_is_treated_as_malformed() {
    let server = TestServer::start().await;

    let padding = "x".repeat(server.config.max_request_content_length);
    let body = json!({"log": {"action": padding}}).to_string();
    let (status, _) = post_json(server.addr, "/log", &body)
        .await
        .expect("Failed to send request");
    assert_eq!(status, 201);

    let lines = read_lines(&server.logs_path());
    assert_eq!(lines.len(), 1);
    let stored: LogRecord = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(stored, LogRecord::default());

    server.shutdown().await;
}

#[tokio::test]
async fn test_cors_headers() {
    let server = TestServer::start().await;

    let response = send_tcp_request(
        server.addr,
        "/log",
        "OPTIONS",
        &[
            ("Origin", "http://localhost:3000"),
            ("Access-Control-Request-Method", "POST"),
            ("Access-Control-Request-Headers", "content-type"),
        ],
        None,
    )
    .await
    .expect("Failed to send request");
    assert_eq!(response.status(), 204);
    let headers = response.headers();
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert_eq!(
        headers["access-control-allow-methods"],
        "GET,HEAD,PUT,PATCH,POST,DELETE"
    );
    assert_eq!(headers["access-control-allow-headers"], "content-type");
    assert_eq!(headers.get_all("vary").iter().count(), 3);

    let response = send_tcp_request(
        server.addr,
        "/log",
        "POST",
        &[("Origin", "http://localhost:3000")],
        Some(r#"{"log":{"action":"click"}}"#),
    )
    .await
    .expect("Failed to send request");
    assert_eq!(response.status(), 201);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(response.headers()["vary"], "Origin");

    let response = send_tcp_request(server.addr, "/", "GET", &[], None)
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["vary"], "Origin");
    assert!(!response.headers().contains_key("access-control-allow-origin"));

    server.shutdown().await;
}

#[tokio::test]
async fn test_null_batch_elements_are_persisted_as_zero_records() {
    let server = TestServer::start().await;

    let (status, _) = post_json(server.addr, "/logs", r#"{"logs":[{"action":"a"},null]}"#)
        .await
        .expect("Failed to send request");
    assert_eq!(status, 201);

    let lines = read_lines(&server.local_storage_logs_path());
    assert_eq!(lines.len(), 1);
    let stored: Vec<LogRecord> = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].action, "a");
    assert_eq!(stored[1], LogRecord::default());

    server.shutdown().await;
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let server = TestServer::start().await;

    let response = send_tcp_request(server.addr, "/events", "POST", &[], Some("{}"))
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 404);

    server.shutdown().await;
}

#[tokio::test]
async fn test_stored_batches_round_trip_through_analyzer() {
    let server = TestServer::start().await;

    let batch_sizes = [3usize, 0, 1, 5];
    let actions = ["click", "pan", "zoom"];
    for size in batch_sizes {
        let logs: Vec<_> = (0..size)
            .map(|i| json!({"action": actions[i % actions.len()], "time": i}))
            .collect();
        let (status, _) = post_json(server.addr, "/logs", &json!({ "logs": logs }).to_string())
            .await
            .expect("Failed to send request");
        assert_eq!(status, 201);
    }
    for action in ["click", "drag"] {
        let (status, _) = post_json(
            server.addr,
            "/log",
            &json!({"log": {"action": action}}).to_string(),
        )
        .await
        .expect("Failed to send request");
        assert_eq!(status, 201);
    }

    let array_path = server.local_storage_logs_path();
    let lines_path = server.logs_path();
    let dir = server.shutdown().await;

    let batched = analyze::read_json_lines_array(&array_path).unwrap();
    assert_eq!(batched.total(), batch_sizes.iter().sum::<usize>() as u64);

    let json_path = dir.path().join("localStorage.json");
    fs::write(&json_path, r#"[{"action":"pan"},{"action":"scroll"}]"#).unwrap();

    let count = analyze::run(AnalyzePaths {
        json: &json_path,
        json_lines: &lines_path,
        json_lines_array: &array_path,
    })
    .unwrap();

    let mut out = Vec::new();
    analyze::write_csv(&count, &mut out).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "click,5\ndrag,1\npan,4\nscroll,1\nzoom,2\n"
    );
}
