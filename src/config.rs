//! Relay configuration
//!
//! Every setting has a constant default and can be overridden through an
//! environment variable. The configuration is loaded once at startup and
//! handed to the components that need it; nothing reads the environment
//! after that.

use crate::error::{RelayError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::Level;

/// AWS region
pub const DEFAULT_REGION: &str = "us-east-1";

/// Logical queue name, resolved to a URL at startup
pub const DEFAULT_QUEUE_NAME: &str = "enclave-queue.fifo";

/// Bucket used by the object relay
pub const DEFAULT_S3_BUCKET: &str = "enclave-relay-objects";

/// Table used by the item relay
pub const DEFAULT_DYNAMODB_TABLE: &str = "enclave-relay-items";

/// TCP port for the HTTP listener
pub const DEFAULT_HTTP_PORT: u16 = 3333;

/// vsock port for the HTTP listener
pub const DEFAULT_VSOCK_PORT: u32 = 5005;

/// Upper bound SQS accepts for a single receive
pub const MAX_RECEIVE_BATCH: u32 = 10;

/// Longest receive wait SQS accepts
pub const MAX_WAIT_TIME_SECONDS: i32 = 20;

/// How the consumer decides which message to acknowledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AckMode {
    /// The consumer deletes the message it handed out last, on the next poll
    #[default]
    Implicit,
    /// The caller names the handle to delete on each poll
    ///
    /// The handle is deleted as given, without checking it against what was
    /// delivered, so deletes are bounded by what callers send rather than by
    /// the number of earlier deliveries. Blank handles are ignored.
    Explicit,
}

impl FromStr for AckMode {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "implicit" | "implicit-ack" => Ok(AckMode::Implicit),
            "explicit" | "explicit-ack" => Ok(AckMode::Explicit),
            other => Err(RelayError::Config(format!("unknown ack mode: {}", other))),
        }
    }
}

impl fmt::Display for AckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AckMode::Implicit => f.write_str("implicit"),
            AckMode::Explicit => f.write_str("explicit"),
        }
    }
}

/// Shape of the body returned from a queue read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseShape {
    /// Every received message, in delivery order
    #[default]
    Batch,
    /// Only the last received message
    Latest,
}

impl FromStr for ResponseShape {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "batch" => Ok(ResponseShape::Batch),
            "latest" => Ok(ResponseShape::Latest),
            other => Err(RelayError::Config(format!(
                "unknown queue response shape: {}",
                other
            ))),
        }
    }
}

/// Queue consumer settings
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Logical queue name
    pub name: String,
    /// Acknowledgment protocol
    pub ack_mode: AckMode,
    /// Read response shape
    pub response_shape: ResponseShape,
    /// Batch size used when the caller does not ask for one
    pub default_max_messages: u32,
    /// Receive wait time in seconds (0 = short poll)
    pub wait_time_seconds: i32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_QUEUE_NAME.to_string(),
            ack_mode: AckMode::default(),
            response_shape: ResponseShape::default(),
            default_max_messages: 1,
            wait_time_seconds: 0,
        }
    }
}

/// Listener settings
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP port used when not serving over vsock
    pub http_port: u16,
    /// Serve over vsock instead of TCP
    pub use_vsock: bool,
    /// vsock port
    pub vsock_port: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            use_vsock: false,
            vsock_port: DEFAULT_VSOCK_PORT,
        }
    }
}

/// Full relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// AWS region
    pub region: String,
    /// Endpoint override, e.g. a LocalStack URL
    pub endpoint_url: Option<String>,
    /// Queue settings
    pub queue: QueueConfig,
    /// Bucket for object uploads and downloads
    pub s3_bucket: String,
    /// Topic ARN for publishes (publishing is rejected when unset)
    pub sns_topic_arn: Option<String>,
    /// Table for item reads and writes
    pub dynamodb_table: String,
    /// Maximum log level
    pub log_level: Level,
    /// Listener settings
    pub server: ServerConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            queue: QueueConfig::default(),
            s3_bucket: DEFAULT_S3_BUCKET.to_string(),
            sns_topic_arn: None,
            dynamodb_table: DEFAULT_DYNAMODB_TABLE.to_string(),
            log_level: Level::INFO,
            server: ServerConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Loads the configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(region) = var("AWS_REGION") {
            config.region = region;
        }
        config.endpoint_url = var("AWS_ENDPOINT_URL");

        if let Some(name) = var("RELAY_QUEUE_NAME") {
            config.queue.name = name;
        }
        if let Some(mode) = var("RELAY_ACK_MODE") {
            config.queue.ack_mode = mode.parse()?;
        }
        if let Some(shape) = var("RELAY_QUEUE_RESPONSE") {
            config.queue.response_shape = shape.parse()?;
        }
        if let Some(max) = var("RELAY_MAX_MESSAGES") {
            let max: u32 = parse_number("RELAY_MAX_MESSAGES", &max)?;
            if max == 0 || max > MAX_RECEIVE_BATCH {
                return Err(RelayError::Config(format!(
                    "RELAY_MAX_MESSAGES must be between 1 and {}, got {}",
                    MAX_RECEIVE_BATCH, max
                )));
            }
            config.queue.default_max_messages = max;
        }
        if let Some(wait) = var("RELAY_WAIT_TIME_SECONDS") {
            let wait: i32 = parse_number("RELAY_WAIT_TIME_SECONDS", &wait)?;
            if !(0..=MAX_WAIT_TIME_SECONDS).contains(&wait) {
                return Err(RelayError::Config(format!(
                    "RELAY_WAIT_TIME_SECONDS must be between 0 and {}, got {}",
                    MAX_WAIT_TIME_SECONDS, wait
                )));
            }
            config.queue.wait_time_seconds = wait;
        }

        if let Some(bucket) = var("RELAY_S3_BUCKET") {
            config.s3_bucket = bucket;
        }
        config.sns_topic_arn = var("RELAY_SNS_TOPIC_ARN");
        if let Some(table) = var("RELAY_DYNAMODB_TABLE") {
            config.dynamodb_table = table;
        }
        if let Some(level) = var("RELAY_LOG_LEVEL") {
            config.log_level = level
                .parse()
                .map_err(|_| RelayError::Config(format!("invalid log level: {}", level)))?;
        }

        if let Some(port) = var("PORT") {
            config.server.http_port = parse_number("PORT", &port)?;
        }
        config.server.use_vsock = lookup("USE_VSOCK").is_some();
        if let Some(port) = var("RELAY_VSOCK_PORT") {
            config.server.vsock_port = parse_number("RELAY_VSOCK_PORT", &port)?;
        }

        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RelayError::Config(format!("{} is not a valid number: {}", key, value)))
}
