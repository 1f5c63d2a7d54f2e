//! DynamoDB item relay
//!
//! ## Table Schema
//!
//! - `hash_key` (Number): partition key
//! - `range_key` (String): sort key
//! - `data` (String): item payload written by the enclave

use crate::error::{RelayError, Result};
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use std::collections::HashMap;
use tracing::{debug, info};

/// Primary key of an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemKey {
    /// Numeric partition key, kept as the decimal string DynamoDB expects
    pub hash_key: String,
    pub range_key: String,
}

impl ItemKey {
    /// Builds a key, rejecting a hash key that is not a number
    pub fn new(hash_key: impl Into<String>, range_key: impl Into<String>) -> Result<Self> {
        let hash_key = hash_key.into().trim().to_string();
        if hash_key.parse::<f64>().map_or(true, |n| !n.is_finite()) {
            return Err(RelayError::InvalidRequest(format!(
                "hash key must be a number, got {:?}",
                hash_key
            )));
        }
        Ok(Self {
            hash_key,
            range_key: range_key.into(),
        })
    }

    fn attributes(&self) -> HashMap<String, AttributeValue> {
        HashMap::from([
            ("hash_key".to_string(), AttributeValue::N(self.hash_key.clone())),
            ("range_key".to_string(), AttributeValue::S(self.range_key.clone())),
        ])
    }
}

/// DynamoDB wrapper bound to one table
pub struct ItemStore {
    client: DynamoClient,
    table_name: String,
}

impl ItemStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Writes `data` under `key`, replacing any existing item
    pub async fn write(&self, key: &ItemKey, data: &str) -> Result<()> {
        info!(
            hash_key = %key.hash_key,
            range_key = %key.range_key,
            data_len = data.len(),
            "Writing item"
        );

        let mut item = key.attributes();
        item.insert("data".to_string(), AttributeValue::S(data.to_string()));

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| RelayError::DynamoDb(format!("PutItem failed: {}", e)))?;

        debug!(hash_key = %key.hash_key, range_key = %key.range_key, "Item written");
        Ok(())
    }

    /// Reads the `data` attribute of the item under `key`
    pub async fn read(&self, key: &ItemKey) -> Result<Option<String>> {
        info!(hash_key = %key.hash_key, range_key = %key.range_key, "Reading item");

        let response = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(key.attributes()))
            .send()
            .await
            .map_err(|e| RelayError::DynamoDb(format!("GetItem failed: {}", e)))?;

        match response.item {
            Some(item) => {
                let data = get_string(&item, "data")?;
                debug!(hash_key = %key.hash_key, range_key = %key.range_key, "Item found");
                Ok(Some(data))
            }
            None => {
                debug!(hash_key = %key.hash_key, range_key = %key.range_key, "Item not found");
                Ok(None)
            }
        }
    }
}

fn get_string(item: &HashMap<String, AttributeValue>, key: &str) -> Result<String> {
    match item.get(key) {
        Some(AttributeValue::S(s)) => Ok(s.clone()),
        _ => Err(RelayError::DynamoDb(format!(
            "Missing or invalid string attribute: {}",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::testing::{StubEndpoint, StubResponse};
    use serde_json::json;

    #[test]
    fn test_item_key_requires_number() {
        let key = ItemKey::new(" 42 ", "snapshot").unwrap();
        assert_eq!(key.hash_key, "42");
        assert_eq!(key.range_key, "snapshot");

        assert!(matches!(
            ItemKey::new("abc", "snapshot"),
            Err(RelayError::InvalidRequest(_))
        ));
        assert!(ItemKey::new("NaN", "snapshot").is_err());
    }

    #[test]
    fn test_item_key_attributes() {
        let attributes = ItemKey::new("7", "v0").unwrap().attributes();
        assert_eq!(attributes.get("hash_key"), Some(&AttributeValue::N("7".to_string())));
        assert_eq!(attributes.get("range_key"), Some(&AttributeValue::S("v0".to_string())));
    }

    #[test]
    fn test_get_string() {
        let mut item = HashMap::new();
        item.insert("data".to_string(), AttributeValue::S("payload".to_string()));
        item.insert("count".to_string(), AttributeValue::N("1".to_string()));

        assert_eq!(get_string(&item, "data").unwrap(), "payload");
        assert!(get_string(&item, "count").is_err());
        assert!(get_string(&item, "missing").is_err());
    }

    #[tokio::test]
    async fn test_write_puts_typed_item() {
        let stub = StubEndpoint::start(vec![StubResponse::json(json!({}))]).await;
        let store = ItemStore::new(stub.dynamodb_client(), "enclave-table");

        store
            .write(&ItemKey::new("7", "v0").unwrap(), "payload")
            .await
            .unwrap();

        let requests = stub.requests();
        assert_eq!(requests[0].header("x-amz-target"), Some("DynamoDB_20120810.PutItem"));
        let request = requests[0].json();
        assert_eq!(request["TableName"], "enclave-table");
        assert_eq!(request["Item"]["hash_key"], json!({ "N": "7" }));
        assert_eq!(request["Item"]["range_key"], json!({ "S": "v0" }));
        assert_eq!(request["Item"]["data"], json!({ "S": "payload" }));
    }

    #[tokio::test]
    async fn test_read_existing_item() {
        let stub = StubEndpoint::start(vec![StubResponse::json(json!({
            "Item": {
                "hash_key": { "N": "7" },
                "range_key": { "S": "v0" },
                "data": { "S": "payload" }
            }
        }))])
        .await;
        let store = ItemStore::new(stub.dynamodb_client(), "enclave-table");

        let data = store.read(&ItemKey::new("7", "v0").unwrap()).await.unwrap();
        assert_eq!(data.as_deref(), Some("payload"));

        let requests = stub.requests();
        assert_eq!(requests[0].header("x-amz-target"), Some("DynamoDB_20120810.GetItem"));
        let request = requests[0].json();
        assert_eq!(request["TableName"], "enclave-table");
        assert_eq!(request["Key"], json!({ "hash_key": { "N": "7" }, "range_key": { "S": "v0" } }));
    }

    #[tokio::test]
    async fn test_read_missing_item() {
        let stub = StubEndpoint::start(vec![StubResponse::json(json!({}))]).await;
        let store = ItemStore::new(stub.dynamodb_client(), "enclave-table");

        let data = store.read(&ItemKey::new("7", "v1").unwrap()).await.unwrap();
        assert_eq!(data, None);
    }
}
