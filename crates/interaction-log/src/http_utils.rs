// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::Body,
    header::{self, HeaderValue},
    http::{self, HeaderMap},
    Response, StatusCode,
};
use serde::de::{Deserialize, DeserializeOwned};
use tracing::{debug, error};

use crate::error::DecodeError;

pub type HttpResponse = Response<Full<Bytes>>;

const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=UTF-8";
const APPLICATION_JSON: &str = "application/json";

/// Does two things:
/// 1. Logs the given message. A success status code (within 200-299) will cause a debug log to be
///    written, otherwise error will be written.
/// 2. Returns the given message as a plain text body with the given status code.
pub fn log_and_create_http_response(message: &str, status: StatusCode) -> http::Result<HttpResponse> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)
        .body(Full::new(Bytes::from(message.to_string())))
}

/// Binds a JSON request body to `T`.
///
/// An empty body binds to `T::default()`. A non-empty body must be declared as
/// `application/json` and must not exceed `max_content_length` bytes. Only the first JSON value
/// of the body is read; anything after it is ignored.
pub async fn decode_json_body<T, B>(
    header_map: &HeaderMap,
    body: B,
    max_content_length: usize,
) -> Result<T, DecodeError>
where
    T: DeserializeOwned + Default,
    B: Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if let Some(content_length) = header_map
        .get(header::CONTENT_LENGTH)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<usize>().ok())
    {
        if content_length > max_content_length {
            return Err(DecodeError::PayloadTooLarge(content_length));
        }
    }

    // double check the size in case transfer encoding is used
    let bytes = match Limited::new(body, max_content_length).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => {
            return Err(DecodeError::PayloadTooLarge(max_content_length));
        }
        Err(err) => return Err(DecodeError::Body(err)),
    };

    if bytes.is_empty() {
        return Ok(T::default());
    }

    let content_type = header_map
        .get(header::CONTENT_TYPE)
        .and_then(|val| val.to_str().ok())
        .unwrap_or_default();
    if !content_type
        .to_ascii_lowercase()
        .starts_with(APPLICATION_JSON)
    {
        return Err(DecodeError::UnsupportedMediaType(content_type.to_string()));
    }

    let mut deserializer = serde_json::Deserializer::from_slice(&bytes);
    Ok(T::deserialize(&mut deserializer)?)
}

/// Adds the headers sent on actual (non-preflight) responses. Every response varies on `Origin`;
/// only requests carrying one are granted access.
pub fn apply_cors_headers(request_headers: &HeaderMap, response: &mut HttpResponse) {
    let headers = response.headers_mut();
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
    if !request_headers.contains_key(header::ORIGIN) {
        return;
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
}

/// Answers an `OPTIONS` request. Any origin and the configured methods are allowed, and the
/// requested headers are echoed back.
pub fn create_preflight_response(request_headers: &HeaderMap) -> http::Result<HttpResponse> {
    let mut builder = Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(header::VARY, "Origin");
    if !request_headers.contains_key(header::ORIGIN) {
        return builder.body(Full::default());
    }

    builder = builder
        .header(header::VARY, "Access-Control-Request-Method")
        .header(header::VARY, "Access-Control-Request-Headers")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, CORS_ALLOW_ORIGIN)
        .header(header::ACCESS_CONTROL_ALLOW_METHODS, CORS_ALLOW_METHODS);
    if let Some(requested) = request_headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
        builder = builder.header(header::ACCESS_CONTROL_ALLOW_HEADERS, requested);
    }
    builder.body(Full::default())
}
