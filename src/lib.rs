//! Enclave Relay - HTTP relay between a network-isolated enclave and AWS
//!
//! The enclave has no network egress of its own. It talks HTTP to this relay,
//! which forwards each request to exactly one cloud operation:
//! - SQS queue reads (with deferred acknowledgment) and sends
//! - S3 object upload and download
//! - SNS topic publish
//! - DynamoDB item read and write

pub mod aws;
pub mod config;
pub mod dynamodb;
pub mod error;
pub mod queue;
pub mod relay;
pub mod storage;
pub mod topic;
