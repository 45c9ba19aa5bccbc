// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use interaction_log::{config::Config, ingest::IngestServer, storage::FileLogStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// An ingestion server running on an ephemeral port, writing into a scratch directory
pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: TempDir,
    pub config: Arc<Config>,
    cancel_token: CancellationToken,
    handle: JoinHandle<Result<(), String>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = Arc::new(Config {
            logs_path: dir.path().join("logs.jsonl"),
            local_storage_logs_path: dir.path().join("localStorageLogs.jsonl"),
            local_storage_path: dir.path().join("localStorage.json"),
            max_request_content_length: 1024,
            ..Config::default()
        });
        let store = FileLogStore::open(&config.logs_path, &config.local_storage_logs_path)
            .expect("Failed to open log files");

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let server = IngestServer {
            config: Arc::clone(&config),
            sink: Arc::new(store),
        };
        let cancel_token = CancellationToken::new();
        let server_token = cancel_token.clone();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, server_token)
                .await
                .map_err(|e| e.to_string())
        });

        TestServer {
            addr,
            dir,
            config,
            cancel_token,
            handle,
        }
    }

    pub fn logs_path(&self) -> PathBuf {
        self.config.logs_path.clone()
    }

    pub fn local_storage_logs_path(&self) -> PathBuf {
        self.config.local_storage_logs_path.clone()
    }

    /// Cancels the server and waits for it to stop
    pub async fn shutdown(self) -> TempDir {
        self.cancel_token.cancel();
        timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("Server did not shut down in time")
            .expect("Server task panicked")
            .expect("Server returned an error");
        self.dir
    }
}

/// Send an HTTP request over TCP and return the response
pub async fn send_tcp_request(
    addr: SocketAddr,
    uri: &str,
    method: &str,
    headers: &[(&str, &str)],
    body: Option<&str>,
) -> Result<Response<hyper::body::Incoming>, Box<dyn std::error::Error>> {
    let stream = timeout(Duration::from_secs(2), tokio::net::TcpStream::connect(addr)).await??;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    tokio::spawn(async move {
        let _ = conn.await;
    });

    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("Host", addr.to_string());
    for (name, value) in headers {
        request_builder = request_builder.header(*name, *value);
    }

    let request = match body {
        Some(body_data) => {
            request_builder = request_builder
                .header("Content-Type", "application/json")
                .header("Content-Length", body_data.len().to_string());
            request_builder.body(Full::new(Bytes::from(body_data.to_string())))?
        }
        None => request_builder.body(Full::new(Bytes::new()))?,
    };

    let response = timeout(Duration::from_secs(2), sender.send_request(request)).await??;
    Ok(response)
}

pub async fn post_json(
    addr: SocketAddr,
    uri: &str,
    body: &str,
) -> Result<(u16, String), Box<dyn std::error::Error>> {
    let response = send_tcp_request(addr, uri, "POST", &[], Some(body)).await?;
    let status = response.status().as_u16();
    Ok((status, body_as_string(response).await))
}

pub async fn body_as_string(response: Response<hyper::body::Incoming>) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read response body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("Response body is not UTF-8")
}
