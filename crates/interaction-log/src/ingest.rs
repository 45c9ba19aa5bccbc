// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use hyper::body::Body;
use hyper::service::service_fn;
use hyper::{header, http, Method, Request, Response, StatusCode};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::http_utils::{
    apply_cors_headers, create_preflight_response, decode_json_body, log_and_create_http_response,
    HttpResponse,
};
use crate::model::{LogBatchRequest, SingleLogRequest};
use crate::storage::LogSink;

pub const ROOT_ENDPOINT_PATH: &str = "/";
pub const LOG_ENDPOINT_PATH: &str = "/log";
pub const LOGS_ENDPOINT_PATH: &str = "/logs";

const GREETING: &str = "Hello, World!";
const LOG_PERSISTED: &str = "Persisted log successfully!";
const LOGS_PERSISTED: &str = "Persisted logs successfully!";

/// HTTP front of the ingestion service.
///
/// Ingestion is best-effort: a body that cannot be decoded is replaced by an empty envelope and a
/// failed append is only logged. `POST /log` and `POST /logs` always answer `201 Created`.
pub struct IngestServer {
    pub config: Arc<Config>,
    pub sink: Arc<dyn LogSink + Send + Sync>,
}

impl IngestServer {
    /// Binds the configured address and serves until `cancel_token` is cancelled.
    pub async fn start(
        &self,
        cancel_token: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        self.serve(listener, cancel_token).await
    }

    /// Serves connections accepted on `listener` until `cancel_token` is cancelled, then waits for
    /// in-flight connections to finish.
    pub async fn serve(
        &self,
        listener: TcpListener,
        cancel_token: CancellationToken,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let now = Instant::now();
        let sink = self.sink.clone();
        let endpoint_config = self.config.clone();

        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            // called for each http request
            let sink = sink.clone();
            let endpoint_config = endpoint_config.clone();
            IngestServer::logged_endpoint_handler(endpoint_config, req, sink)
        });

        info!("Ingestion server listening on {}", listener.local_addr()?);
        debug!(
            "Time taken to start the ingestion server: {} ms",
            now.elapsed().as_millis()
        );

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let conn = tokio::select! {
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill server on panic - log and continue
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                _ = cancel_token.cancelled() => {
                    info!("Shutting down ingestion server");
                    break;
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            let conn_cancel_token = cancel_token.clone();
            joinset.spawn(async move {
                let conn = server.serve_connection(conn, service);
                tokio::pin!(conn);
                let res = tokio::select! {
                    res = conn.as_mut() => res,
                    _ = conn_cancel_token.cancelled() => {
                        // finish the in-flight request, then close
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                };
                if let Err(e) = res {
                    error!("Connection error: {e}");
                }
            });
        }

        while let Some(finished) = joinset.join_next().await {
            if let Err(e) = finished {
                if e.is_panic() {
                    error!("Connection handler panicked: {:?}", e);
                }
            }
        }
        Ok(())
    }

    async fn logged_endpoint_handler<B>(
        config: Arc<Config>,
        req: Request<B>,
        sink: Arc<dyn LogSink + Send + Sync>,
    ) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        let start = Instant::now();
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_headers = req.headers().clone();

        let mut response = Self::endpoint_handler(config, req, sink).await?;
        // preflight responses carry their own CORS headers
        if method != Method::OPTIONS {
            apply_cors_headers(&request_headers, &mut response);
        }

        info!(
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            latency_us = start.elapsed().as_micros() as u64,
            "Handled request"
        );
        Ok(response)
    }

    /// Routes a single request. Exposed for driving the handlers without a socket.
    pub async fn endpoint_handler<B>(
        config: Arc<Config>,
        req: Request<B>,
        sink: Arc<dyn LogSink + Send + Sync>,
    ) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        if *req.method() == Method::OPTIONS {
            return create_preflight_response(req.headers());
        }

        match (req.method(), req.uri().path()) {
            (&Method::GET, ROOT_ENDPOINT_PATH) => Self::root_handler(),
            (&Method::POST, LOG_ENDPOINT_PATH) => {
                Self::persist_single_log_handler(config, req, sink).await
            }
            (&Method::POST, LOGS_ENDPOINT_PATH) => {
                Self::persist_logs_handler(config, req, sink).await
            }
            (_, ROOT_ENDPOINT_PATH) => Self::method_not_allowed("GET, OPTIONS"),
            (_, LOG_ENDPOINT_PATH | LOGS_ENDPOINT_PATH) => {
                Self::method_not_allowed("POST, OPTIONS")
            }
            _ => {
                let mut not_found = Response::default();
                *not_found.status_mut() = StatusCode::NOT_FOUND;
                Ok(not_found)
            }
        }
    }

    fn root_handler() -> http::Result<HttpResponse> {
        log_and_create_http_response(GREETING, StatusCode::OK)
    }

    fn method_not_allowed(allow: &'static str) -> http::Result<HttpResponse> {
        let mut response = log_and_create_http_response(
            "Method Not Allowed",
            StatusCode::METHOD_NOT_ALLOWED,
        )?;
        response
            .headers_mut()
            .insert(header::ALLOW, header::HeaderValue::from_static(allow));
        Ok(response)
    }

    async fn persist_single_log_handler<B>(
        config: Arc<Config>,
        req: Request<B>,
        sink: Arc<dyn LogSink + Send + Sync>,
    ) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        debug!("Received log to persist");
        let (parts, body) = req.into_parts();

        let request: SingleLogRequest =
            match decode_json_body(&parts.headers, body, config.max_request_content_length).await {
                Ok(request) => request,
                Err(err) => {
                    error!("Error binding log request, persisting an empty log: {err}");
                    SingleLogRequest::default()
                }
            };

        if let Err(err) = sink.append_log(&request.log).await {
            error!("Error persisting log: {err}");
        }

        log_and_create_http_response(LOG_PERSISTED, StatusCode::CREATED)
    }

    async fn persist_logs_handler<B>(
        config: Arc<Config>,
        req: Request<B>,
        sink: Arc<dyn LogSink + Send + Sync>,
    ) -> http::Result<HttpResponse>
    where
        B: Body<Data = Bytes>,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        debug!("Received log batch to persist");
        let (parts, body) = req.into_parts();

        let request: LogBatchRequest =
            match decode_json_body(&parts.headers, body, config.max_request_content_length).await {
                Ok(request) => request,
                Err(err) => {
                    error!("Error binding log batch request, persisting an empty batch: {err}");
                    LogBatchRequest::default()
                }
            };

        debug!("Persisting batch of {} logs", request.logs.len());
        if let Err(err) = sink.append_batch(&request.logs).await {
            error!("Error persisting log batch: {err}");
        }

        log_and_create_http_response(LOGS_PERSISTED, StatusCode::CREATED)
    }
}
