//! AWS client initialization
//!
//! All clients share one SDK config, built once at startup from the relay
//! configuration. Credentials come from the standard provider chain of the
//! host the relay runs on.
//!
//! ## Local development
//!
//! Point `AWS_ENDPOINT_URL` at LocalStack to run the relay without AWS:
//!
//! ```bash
//! AWS_ENDPOINT_URL=http://localhost:4566 RELAY_QUEUE_NAME=enclave-queue.fifo enclave-relay
//! ```

use crate::config::RelayConfig;
use crate::dynamodb::ItemStore;
use crate::error::Result;
use crate::queue::sqs::SqsBackend;
use crate::storage::ObjectStore;
use crate::topic::TopicPublisher;
use aws_config::{BehaviorVersion, Region};
use tracing::info;

/// Clients for every service the relay forwards to
pub struct AwsClients {
    /// Resolved queue
    pub queue: SqsBackend,
    /// Object storage
    pub objects: ObjectStore,
    /// Topic publishing
    pub topic: TopicPublisher,
    /// Item storage
    pub items: ItemStore,
}

impl AwsClients {
    /// Builds every client and resolves the queue URL
    ///
    /// Fails when the queue cannot be resolved; the relay must not start
    /// serving in that case.
    pub async fn new(config: &RelayConfig) -> Result<Self> {
        info!(
            region = %config.region,
            endpoint_url = ?config.endpoint_url,
            queue = %config.queue.name,
            bucket = %config.s3_bucket,
            table = %config.dynamodb_table,
            "Initializing AWS clients"
        );

        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }
        let sdk_config = loader.load().await;

        let queue = SqsBackend::resolve(
            aws_sdk_sqs::Client::new(&sdk_config),
            &config.queue.name,
            config.queue.wait_time_seconds,
        )
        .await?;

        // LocalStack serves buckets on the path, not as subdomains
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint_url.is_some())
            .build();
        let objects = ObjectStore::new(aws_sdk_s3::Client::from_conf(s3_config), &config.s3_bucket);

        let topic = TopicPublisher::new(
            aws_sdk_sns::Client::new(&sdk_config),
            config.sns_topic_arn.clone(),
        );

        let items = ItemStore::new(
            aws_sdk_dynamodb::Client::new(&sdk_config),
            &config.dynamodb_table,
        );

        info!("AWS clients initialized successfully");

        Ok(Self {
            queue,
            objects,
            topic,
            items,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Local HTTP endpoint standing in for an AWS service
    //!
    //! Real SDK clients are pointed at it, so the requests it records are
    //! exactly what the relay would put on the wire.

    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use hyper::body::Incoming;
    use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper::{Request, Response, StatusCode};
    use hyper_util::rt::TokioIo;
    use std::collections::VecDeque;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    const ACCESS_KEY: &str = "AKIDRELAYTEST";
    const SECRET_KEY: &str = "relay-test-secret";
    const REGION: &str = "us-east-1";

    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: String,
        pub path: String,
        pub headers: HeaderMap,
        pub body: Bytes,
    }

    impl RecordedRequest {
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name).and_then(|v| v.to_str().ok())
        }

        pub fn json(&self) -> serde_json::Value {
            serde_json::from_slice(&self.body).unwrap()
        }

        pub fn text(&self) -> String {
            String::from_utf8_lossy(&self.body).into_owned()
        }
    }

    pub struct StubResponse {
        status: u16,
        content_type: &'static str,
        body: Bytes,
    }

    impl StubResponse {
        /// AWS JSON 1.0 protocol body (SQS, DynamoDB)
        pub fn json(body: serde_json::Value) -> Self {
            Self {
                status: 200,
                content_type: "application/x-amz-json-1.0",
                body: Bytes::from(body.to_string()),
            }
        }

        /// XML body (SNS, S3)
        pub fn xml(status: u16, body: &str) -> Self {
            Self {
                status,
                content_type: "text/xml",
                body: Bytes::from(body.to_string()),
            }
        }

        pub fn bytes(body: &'static [u8]) -> Self {
            Self {
                status: 200,
                content_type: "application/octet-stream",
                body: Bytes::from_static(body),
            }
        }
    }

    struct Exchange {
        responses: VecDeque<StubResponse>,
        requests: Vec<RecordedRequest>,
    }

    pub struct StubEndpoint {
        url: String,
        exchange: Arc<Mutex<Exchange>>,
    }

    impl StubEndpoint {
        /// Starts serving; `responses` are handed out one per request, in order
        pub async fn start(responses: Vec<StubResponse>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            let exchange = Arc::new(Mutex::new(Exchange {
                responses: responses.into(),
                requests: Vec::new(),
            }));

            let server_exchange = Arc::clone(&exchange);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let exchange = Arc::clone(&server_exchange);
                    tokio::spawn(async move {
                        let service = service_fn(move |req| respond(Arc::clone(&exchange), req));
                        let _ = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await;
                    });
                }
            });

            Self { url, exchange }
        }

        pub fn requests(&self) -> Vec<RecordedRequest> {
            self.exchange.lock().unwrap().requests.clone()
        }

        pub fn sqs_client(&self) -> aws_sdk_sqs::Client {
            use aws_sdk_sqs::config::{BehaviorVersion, Credentials, Region};
            let config = aws_sdk_sqs::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(REGION))
                .endpoint_url(&self.url)
                .credentials_provider(Credentials::new(ACCESS_KEY, SECRET_KEY, None, None, "stub"))
                .build();
            aws_sdk_sqs::Client::from_conf(config)
        }

        pub fn s3_client(&self) -> aws_sdk_s3::Client {
            use aws_sdk_s3::config::{
                BehaviorVersion, Credentials, Region, RequestChecksumCalculation,
                ResponseChecksumValidation,
            };
            let config = aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(REGION))
                .endpoint_url(&self.url)
                .force_path_style(true)
                .request_checksum_calculation(RequestChecksumCalculation::WhenRequired)
                .response_checksum_validation(ResponseChecksumValidation::WhenRequired)
                .credentials_provider(Credentials::new(ACCESS_KEY, SECRET_KEY, None, None, "stub"))
                .build();
            aws_sdk_s3::Client::from_conf(config)
        }

        pub fn sns_client(&self) -> aws_sdk_sns::Client {
            use aws_sdk_sns::config::{BehaviorVersion, Credentials, Region};
            let config = aws_sdk_sns::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(REGION))
                .endpoint_url(&self.url)
                .credentials_provider(Credentials::new(ACCESS_KEY, SECRET_KEY, None, None, "stub"))
                .build();
            aws_sdk_sns::Client::from_conf(config)
        }

        pub fn dynamodb_client(&self) -> aws_sdk_dynamodb::Client {
            use aws_sdk_dynamodb::config::{BehaviorVersion, Credentials, Region};
            let config = aws_sdk_dynamodb::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(Region::new(REGION))
                .endpoint_url(&self.url)
                .credentials_provider(Credentials::new(ACCESS_KEY, SECRET_KEY, None, None, "stub"))
                .build();
            aws_sdk_dynamodb::Client::from_conf(config)
        }
    }

    async fn respond(
        exchange: Arc<Mutex<Exchange>>,
        req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();
        let body = body
            .collect()
            .await
            .map(|collected| collected.to_bytes())
            .unwrap_or_default();

        let stub = {
            let mut exchange = exchange.lock().unwrap();
            exchange.requests.push(RecordedRequest {
                method: parts.method.to_string(),
                path: parts.uri.path().to_string(),
                headers: parts.headers,
                body,
            });
            // 400 so an unscripted call fails fast instead of being retried
            exchange.responses.pop_front().unwrap_or(StubResponse {
                status: 400,
                content_type: "text/plain",
                body: Bytes::from_static(b"no response scripted"),
            })
        };

        let mut response = Response::new(Full::new(stub.body));
        *response.status_mut() = StatusCode::from_u16(stub.status).unwrap();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(stub.content_type));
        Ok(response)
    }
}
