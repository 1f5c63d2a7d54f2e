//! HTTP dispatch for the relay
//!
//! Each endpoint forwards to exactly one cloud operation. Queue reads go
//! through the [`QueueConsumer`] so that acknowledgments are tracked; every
//! other endpoint is a one-shot forward.
//!
//! ## Endpoints
//!
//! - `GET  /ping`: liveness, answers `pong`
//! - `GET  /health`: consumer state and ack mode
//! - `POST /queue/read?max=N`: poll the queue, body `{"ack_handle": "..."}` or empty
//! - `POST /queue/send`: enqueue the body, `x-deduplication-id` header required
//! - `POST /object/upload`: store the body under the `x-object-key` header
//! - `GET  /object/download`: fetch the object named by `x-object-key`
//! - `POST /topic/publish`: publish the body to the configured topic
//! - `POST /item/write`: store the body under `x-hash-key` / `x-range-key`
//! - `GET  /item/read`: fetch the item under `x-hash-key` / `x-range-key`

use crate::aws::AwsClients;
use crate::config::{ResponseShape, MAX_RECEIVE_BATCH};
use crate::dynamodb::ItemKey;
use crate::error::{RelayError, Result};
use crate::queue::consumer::QueueConsumer;
use crate::queue::QueueHandle;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde::Deserialize;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Header carrying the deduplication key of a queue send
pub const DEDUPLICATION_ID_HEADER: &str = "x-deduplication-id";

/// Header naming the object to upload or download
pub const OBJECT_KEY_HEADER: &str = "x-object-key";

/// Headers naming the item to read or write
pub const HASH_KEY_HEADER: &str = "x-hash-key";
pub const RANGE_KEY_HEADER: &str = "x-range-key";

/// Body of a queue read
#[derive(Debug, Default, Deserialize)]
pub struct ReadRequest {
    /// Handle of the message the caller has finished with
    #[serde(default)]
    pub ack_handle: Option<QueueHandle>,
}

/// Request dispatcher for the relay
pub struct RelayHandler {
    consumer: Arc<QueueConsumer>,
    response_shape: ResponseShape,
    default_max_messages: u32,
    aws_clients: Option<Arc<AwsClients>>,
}

impl RelayHandler {
    /// Creates a handler that only serves the queue endpoints
    pub fn new(
        consumer: Arc<QueueConsumer>,
        response_shape: ResponseShape,
        default_max_messages: u32,
    ) -> Self {
        Self {
            consumer,
            response_shape,
            default_max_messages,
            aws_clients: None,
        }
    }

    /// Creates a handler serving every endpoint
    pub fn with_aws(
        consumer: Arc<QueueConsumer>,
        response_shape: ResponseShape,
        default_max_messages: u32,
        aws_clients: Arc<AwsClients>,
    ) -> Self {
        Self {
            aws_clients: Some(aws_clients),
            ..Self::new(consumer, response_shape, default_max_messages)
        }
    }

    fn aws(&self) -> Result<&AwsClients> {
        self.aws_clients
            .as_deref()
            .ok_or_else(|| RelayError::Config("AWS clients not configured".to_string()))
    }

    /// Handles one HTTP request; failures become JSON error responses
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        debug!(method = %method, path = %path, "Relaying request");

        match self.dispatch(req).await {
            Ok(response) => response,
            Err(e) => {
                let status = e.status_code();
                if status.is_server_error() {
                    error!(method = %method, path = %path, error = %e, "Request failed");
                } else {
                    warn!(method = %method, path = %path, error = %e, "Request rejected");
                }
                json_response(status, &serde_json::json!({ "error": e.to_string() }))
            }
        }
    }

    async fn dispatch<B>(&self, req: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();
        let method = parts.method;
        let headers = parts.headers;

        match (&method, parts.uri.path()) {
            (&Method::GET, "/ping") => Ok(text_response(StatusCode::OK, "text/plain", "pong")),
            (&Method::GET, "/health") => self.handle_health().await,
            (&Method::POST, "/queue/read") => {
                let max_count = self.max_count(parts.uri.query())?;
                let body = read_body(body).await?;
                self.handle_queue_read(max_count, &body).await
            }
            (&Method::POST, "/queue/send") => {
                let body = read_body(body).await?;
                self.handle_queue_send(&headers, body).await
            }
            (&Method::POST, "/object/upload") => {
                let body = read_body(body).await?;
                self.handle_object_upload(&headers, body).await
            }
            (&Method::GET, "/object/download") => self.handle_object_download(&headers).await,
            (&Method::POST, "/topic/publish") => {
                let body = read_body(body).await?;
                self.handle_topic_publish(body).await
            }
            (&Method::POST, "/item/write") => {
                let body = read_body(body).await?;
                self.handle_item_write(&headers, body).await
            }
            (&Method::GET, "/item/read") => self.handle_item_read(&headers).await,
            _ => Ok(json_response(
                StatusCode::NOT_FOUND,
                &serde_json::json!({ "error": "Not found" }),
            )),
        }
    }

    async fn handle_health(&self) -> Result<Response<Full<Bytes>>> {
        let state = self.consumer.state().await;
        Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({
                "status": "ok",
                "queue": {
                    "state": state,
                    "ack_mode": self.consumer.ack_mode().to_string(),
                }
            }),
        ))
    }

    // ========================================================================
    // Queue
    // ========================================================================

    /// Batch size from the `max` query parameter, or the configured default
    fn max_count(&self, query: Option<&str>) -> Result<u32> {
        let Some(raw) = query_param(query, "max") else {
            return Ok(self.default_max_messages);
        };
        match raw.parse::<u32>() {
            Ok(max) if (1..=MAX_RECEIVE_BATCH).contains(&max) => Ok(max),
            _ => Err(RelayError::InvalidRequest(format!(
                "max must be between 1 and {}, got {:?}",
                MAX_RECEIVE_BATCH, raw
            ))),
        }
    }

    async fn handle_queue_read(&self, max_count: u32, body: &[u8]) -> Result<Response<Full<Bytes>>> {
        let request = if body.iter().all(u8::is_ascii_whitespace) {
            ReadRequest::default()
        } else {
            serde_json::from_slice::<ReadRequest>(body)
                .map_err(|e| RelayError::InvalidRequest(format!("Invalid read request: {}", e)))?
        };

        let messages = self.consumer.poll(max_count, request.ack_handle).await?;

        let payload = match self.response_shape {
            ResponseShape::Batch => serde_json::to_value(&messages)?,
            ResponseShape::Latest => serde_json::to_value(messages.last())?,
        };
        Ok(json_response(StatusCode::OK, &payload))
    }

    async fn handle_queue_send(&self, headers: &HeaderMap, body: Bytes) -> Result<Response<Full<Bytes>>> {
        let deduplication_key = required_header(headers, DEDUPLICATION_ID_HEADER)?;
        let message = utf8_body(body)?;

        self.consumer.send(deduplication_key, &message).await?;
        Ok(json_response(StatusCode::OK, &serde_json::json!({ "success": true })))
    }

    // ========================================================================
    // Object storage
    // ========================================================================

    async fn handle_object_upload(&self, headers: &HeaderMap, body: Bytes) -> Result<Response<Full<Bytes>>> {
        let key = required_header(headers, OBJECT_KEY_HEADER)?;
        let aws = self.aws()?;
        aws.objects.upload(key, body).await?;
        Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "success": true, "key": key }),
        ))
    }

    async fn handle_object_download(&self, headers: &HeaderMap) -> Result<Response<Full<Bytes>>> {
        let key = required_header(headers, OBJECT_KEY_HEADER)?;
        let aws = self.aws()?;
        let data = aws.objects.download(key).await?;

        let content_length = HeaderValue::from(data.len());
        let mut response = text_response(StatusCode::OK, "application/octet-stream", data);
        response.headers_mut().insert(CONTENT_LENGTH, content_length);
        Ok(response)
    }

    // ========================================================================
    // Topic
    // ========================================================================

    async fn handle_topic_publish(&self, body: Bytes) -> Result<Response<Full<Bytes>>> {
        let message = utf8_body(body)?;
        let aws = self.aws()?;
        let message_id = aws.topic.publish(&message).await?;
        Ok(json_response(
            StatusCode::OK,
            &serde_json::json!({ "message_id": message_id }),
        ))
    }

    // ========================================================================
    // Items
    // ========================================================================

    async fn handle_item_write(&self, headers: &HeaderMap, body: Bytes) -> Result<Response<Full<Bytes>>> {
        let key = item_key(headers)?;
        let data = utf8_body(body)?;
        let aws = self.aws()?;
        aws.items.write(&key, &data).await?;
        Ok(json_response(StatusCode::OK, &serde_json::json!({ "success": true })))
    }

    async fn handle_item_read(&self, headers: &HeaderMap) -> Result<Response<Full<Bytes>>> {
        let key = item_key(headers)?;
        let aws = self.aws()?;
        match aws.items.read(&key).await? {
            Some(data) => Ok(text_response(StatusCode::OK, "text/plain", data)),
            None => Err(RelayError::NotFound(format!(
                "item {}/{}",
                key.hash_key, key.range_key
            ))),
        }
    }
}

async fn read_body<B>(body: B) -> Result<Bytes>
where
    B: Body,
    B::Error: Display,
{
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| RelayError::InvalidRequest(format!("Failed to read request body: {}", e)))
}

fn utf8_body(body: Bytes) -> Result<String> {
    let text = String::from_utf8(body.to_vec())
        .map_err(|_| RelayError::InvalidRequest("Body must be valid UTF-8".to_string()))?;
    if text.is_empty() {
        return Err(RelayError::InvalidRequest("Body must not be empty".to_string()));
    }
    Ok(text)
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| RelayError::InvalidRequest(format!("Missing {} header", name)))
}

fn item_key(headers: &HeaderMap) -> Result<ItemKey> {
    ItemKey::new(
        required_header(headers, HASH_KEY_HEADER)?,
        required_header(headers, RANGE_KEY_HEADER)?,
    )
}

/// Percent-decoded value of the first `name` parameter in `query`
fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn json_response(status: StatusCode, value: &serde_json::Value) -> Response<Full<Bytes>> {
    text_response(status, "application/json", value.to_string())
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
