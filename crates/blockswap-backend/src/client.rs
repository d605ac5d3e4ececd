//! Signed HTTP client for the metadata store and the blob store.

use std::sync::Arc;

use blockswap_auth::{CredentialProvider, SigningRequest, sign_request};
use blockswap_core::Metrics;
use blockswap_core::metrics::names;
use blockswap_dynamodb_model::attribute_value::{get_number, get_string};
use blockswap_dynamodb_model::operations::CONTENT_TYPE;
use blockswap_dynamodb_model::{
    DynamoDBErrorBody, DynamoDBOperation, GetItemInput, GetItemOutput, Item, QueryInput,
    QueryOutput,
};
use bytes::Bytes;
use chrono::Utc;
use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::cache::BlockCaches;
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::retry::{RetryPolicy, retry};
use crate::types::{BlobLocator, BlockInfo};

const DYNAMODB: &str = "dynamodb";
const S3: &str = "s3";

/// Client for block metadata lookups and blob range reads.
///
/// Holds one connection pool per store plus the optional caches; clone the
/// surrounding `Arc` to share it.
#[derive(Debug)]
pub struct BackendClient {
    config: BackendConfig,
    dynamo_http: reqwest::Client,
    s3_http: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    caches: BlockCaches,
    metrics: Arc<dyn Metrics>,
}

impl BackendClient {
    /// Build a client with fresh connection pools.
    pub fn new(
        config: BackendConfig,
        credentials: Arc<dyn CredentialProvider>,
        metrics: Arc<dyn Metrics>,
    ) -> Result<Self, BackendError> {
        let dynamo_http = build_http_client(&config)?;
        let s3_http = build_http_client(&config)?;
        let caches = BlockCaches::new(&config, Arc::clone(&metrics));
        Ok(Self {
            config,
            dynamo_http,
            s3_http,
            credentials,
            caches,
            metrics,
        })
    }

    /// The configuration in effect.
    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Point lookup of a string-keyed item.
    pub async fn get_item(&self, table: &str, key_name: &str, value: &str) -> Result<Option<Item>, BackendError> {
        let input = GetItemInput::by_string_key(table, key_name, value);
        let output: GetItemOutput = retry("dynamodb.GetItem", self.dynamo_policy(), || {
            self.dynamo_call(DynamoDBOperation::GetItem, &input)
        })
        .await?;
        Ok(output.item.filter(|item| !item.is_empty()))
    }

    /// Equality query on a string attribute, first match only.
    pub async fn query_by_key(&self, table: &str, key_name: &str, value: &str) -> Result<Vec<Item>, BackendError> {
        let input = QueryInput::by_string_key(table, key_name, value, Some(1));
        let output: QueryOutput = retry("dynamodb.Query", self.dynamo_policy(), || {
            self.dynamo_call(DynamoDBOperation::Query, &input)
        })
        .await?;
        Ok(output.items)
    }

    /// Resolve a storage key to its blob range.
    ///
    /// The versioned link table is queried first; on a miss the legacy block
    /// table is read before answering not-found.
    pub async fn get_metadata_by_key(&self, key: &str) -> Result<Option<BlockInfo>, BackendError> {
        if let Some(info) = self.caches.get_info(key) {
            return Ok(Some(info));
        }

        let linked = self
            .query_by_key(&self.config.link_table_v1, &self.config.link_table_v1_key, key)
            .await?
            .first()
            .and_then(info_from_link_item);
        let info = match linked {
            Some(info) => Some(info),
            None => {
                debug!(key, "link table miss, reading legacy block table");
                self.get_item(&self.config.blocks_table, &self.config.blocks_table_key, key)
                    .await?
                    .as_ref()
                    .and_then(info_from_legacy_item)
            }
        };

        if let Some(info) = &info {
            self.caches.put_info(key, info);
        }
        Ok(info)
    }

    /// Read `length` bytes at `offset` from the blob at `locator`.
    ///
    /// A zero length answers empty without a request. A length above the
    /// configured maximum, a range ending past `u64::MAX`, an unparsable
    /// locator and HTTP 404 answer `None`.
    pub async fn fetch_bytes(&self, locator: &str, offset: u64, length: u64) -> Result<Option<Bytes>, BackendError> {
        if length == 0 {
            return Ok(Some(Bytes::new()));
        }
        if length > self.config.max_block_data_size {
            error!(
                locator,
                length,
                max = self.config.max_block_data_size,
                "length greater than max allowed"
            );
            return Ok(None);
        }
        let Some(end) = offset.checked_add(length - 1) else {
            error!(locator, offset, length, "byte range overflows");
            return Ok(None);
        };
        let Some(blob) = BlobLocator::parse(locator) else {
            error!(locator, "invalid blob locator");
            return Ok(None);
        };

        let cache_key = (locator.to_owned(), offset, length);
        if let Some(data) = self.caches.get_data(&cache_key) {
            return Ok(Some(data));
        }

        let url = blob.url(self.config.s3_endpoint.as_deref());
        let range = format!("bytes={offset}-{end}");
        let data = retry("s3.GetObject", self.s3_policy(), || {
            self.s3_range_read(&blob, &url, &range, length)
        })
        .await?;

        if let Some(data) = &data {
            self.caches.put_data(cache_key, data);
        }
        Ok(data)
    }

    async fn dynamo_call<I: Serialize, O: DeserializeOwned>(
        &self,
        operation: DynamoDBOperation,
        input: &I,
    ) -> Result<O, BackendError> {
        self.metrics.increase(names::DYNAMO_REQUESTS, 1);
        let result = self.dynamo_call_once(operation, input).await;
        if result.is_err() {
            self.metrics.increase(names::DYNAMO_ERRORS, 1);
        }
        result
    }

    async fn dynamo_call_once<I: Serialize, O: DeserializeOwned>(
        &self,
        operation: DynamoDBOperation,
        input: &I,
    ) -> Result<O, BackendError> {
        let body = serde_json::to_vec(input).map_err(|e| BackendError::Decode {
            service: DYNAMODB,
            reason: e.to_string(),
        })?;
        let url = self.config.dynamo_url();
        let target = operation.target();
        let headers = self.sign(
            &self.config.region,
            DYNAMODB,
            "POST",
            &url,
            &[("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())],
            Some(&body),
        )?;

        let response = self
            .dynamo_http
            .post(&url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|source| BackendError::Transport { service: DYNAMODB, source })?;
        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { service: DYNAMODB, source })?;

        if !status.is_success() {
            return Err(BackendError::Status {
                service: DYNAMODB,
                status: status.as_u16(),
                message: DynamoDBErrorBody::parse(&payload).to_string(),
            });
        }
        serde_json::from_slice(&payload).map_err(|e| BackendError::Decode {
            service: DYNAMODB,
            reason: e.to_string(),
        })
    }

    async fn s3_range_read(
        &self,
        blob: &BlobLocator,
        url: &str,
        range: &str,
        length: u64,
    ) -> Result<Option<Bytes>, BackendError> {
        self.metrics.increase(names::S3_REQUESTS, 1);
        let result = self.s3_range_read_once(blob, url, range, length).await;
        if result.is_err() {
            self.metrics.increase(names::S3_ERRORS, 1);
        }
        result
    }

    async fn s3_range_read_once(
        &self,
        blob: &BlobLocator,
        url: &str,
        range: &str,
        length: u64,
    ) -> Result<Option<Bytes>, BackendError> {
        let headers = self.sign(&blob.region, S3, "GET", url, &[("range", range)], None)?;
        let response = self
            .s3_http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|source| BackendError::Transport { service: S3, source })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            warn!(%blob, "blob not found");
            return Ok(None);
        }
        let payload = response
            .bytes()
            .await
            .map_err(|source| BackendError::Transport { service: S3, source })?;
        if !status.is_success() {
            return Err(BackendError::Status {
                service: S3,
                status: status.as_u16(),
                message: String::from_utf8_lossy(&payload).into_owned(),
            });
        }
        if payload.len() as u64 != length {
            return Err(BackendError::Decode {
                service: S3,
                reason: format!("expected {length} bytes, got {}", payload.len()),
            });
        }
        Ok(Some(payload))
    }

    fn sign(
        &self,
        region: &str,
        service: &str,
        method: &str,
        url: &str,
        headers: &[(&str, &str)],
        payload: Option<&[u8]>,
    ) -> Result<http::HeaderMap, BackendError> {
        let credentials = self.credentials.current();
        let request = SigningRequest {
            region,
            service,
            method,
            url,
            headers,
            payload,
        };
        Ok(sign_request(&request, &credentials, Utc::now())?.to_header_map()?)
    }

    fn dynamo_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.dynamo_max_retries, self.config.dynamo_retry_delay)
    }

    fn s3_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.s3_max_retries, self.config.s3_retry_delay)
    }
}

/// Build a pooled HTTP client. Endpoint overrides point at local emulators,
/// so proxies are bypassed for them.
pub fn build_http_client(config: &BackendConfig) -> Result<reqwest::Client, BackendError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(config.http_pool_max_idle)
        .timeout(config.http_request_timeout);
    if config.uses_endpoint_override() {
        builder = builder.no_proxy();
    }
    builder.build().map_err(|e| BackendError::Client(e.to_string()))
}

fn info_from_link_item(item: &Item) -> Option<BlockInfo> {
    Some(BlockInfo {
        offset: get_number(item, "offset")?,
        length: get_number(item, "length")?,
        locator: get_string(item, "carpath")?.to_owned(),
    })
}

fn info_from_legacy_item(item: &Item) -> Option<BlockInfo> {
    let car = item.get("cars")?.as_l()?.first()?.as_m()?;
    Some(BlockInfo {
        offset: get_number(car, "offset")?,
        length: get_number(car, "length")?,
        locator: get_string(car, "car")?.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use blockswap_auth::{Credentials, StaticCredentialProvider};
    use blockswap_core::RecordingMetrics;

    use super::*;
    use crate::test_support::{MockServer, RecordedRequest};

    fn client_for(server: &MockServer, metrics: Arc<RecordingMetrics>, cache: bool) -> BackendClient {
        let config = BackendConfig::builder()
            .region("us-east-1".to_owned())
            .dynamo_endpoint(Some(server.url()))
            .s3_endpoint(Some(server.url()))
            .dynamo_retry_delay(Duration::from_millis(1))
            .s3_retry_delay(Duration::from_millis(1))
            .max_block_data_size(1024)
            .cache_block_info(cache)
            .cache_block_data(cache)
            .build();
        let credentials = StaticCredentialProvider::new(Credentials::new("AKID", "secret", None));
        BackendClient::new(config, Arc::new(credentials), metrics).unwrap()
    }

    fn table_of(request: &RecordedRequest) -> String {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        body["TableName"].as_str().unwrap_or_default().to_owned()
    }

    fn metadata_responder(
        link_hit: bool,
        legacy_hit: bool,
    ) -> impl Fn(&RecordedRequest) -> (u16, Vec<u8>) + Send + Sync + 'static {
        move |request: &RecordedRequest| match request.header("x-amz-target") {
            Some("DynamoDB_20120810.Query") if link_hit => (
                200,
                br#"{"Count":1,"Items":[{"blockmultihash":{"S":"zQmKey"},"carpath":{"S":"us-east-1/link/a.car"},"offset":{"N":"10"},"length":{"N":"20"}}]}"#.to_vec(),
            ),
            Some("DynamoDB_20120810.Query") => (200, br#"{"Count":0,"Items":[]}"#.to_vec()),
            Some("DynamoDB_20120810.GetItem") if legacy_hit => (
                200,
                br#"{"Item":{"multihash":{"S":"zQmKey"},"cars":{"L":[{"M":{"car":{"S":"us-east-1/legacy/b.car"},"offset":{"N":"30"},"length":{"N":"40"}}}]}}}"#.to_vec(),
            ),
            _ => (200, b"{}".to_vec()),
        }
    }

    #[tokio::test]
    async fn test_should_read_signed_range_from_blob_store() {
        let server = MockServer::start(|_| (206, b"0123456789".to_vec())).await;
        let client = client_for(&server, Arc::new(RecordingMetrics::default()), false);

        let data = client.fetch_bytes("us-east-1/cars/dir/a.car", 100, 10).await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"0123456789")));

        let request = &server.requests()[0];
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/cars/dir/a.car");
        assert_eq!(request.header("range"), Some("bytes=100-109"));
        assert_eq!(request.header("x-amz-content-sha256"), Some("UNSIGNED-PAYLOAD"));
        assert!(
            request
                .header("authorization")
                .unwrap()
                .contains("/us-east-1/s3/aws4_request")
        );
    }

    #[tokio::test]
    async fn test_should_short_circuit_empty_and_oversized_ranges() {
        let server = MockServer::start(|_| (206, Vec::new())).await;
        let client = client_for(&server, Arc::new(RecordingMetrics::default()), false);

        assert_eq!(client.fetch_bytes("r/b/k", 0, 0).await.unwrap(), Some(Bytes::new()));
        assert_eq!(client.fetch_bytes("r/b/k", 0, 4096).await.unwrap(), None);
        assert_eq!(client.fetch_bytes("not-a-locator", 0, 10).await.unwrap(), None);
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn test_should_answer_none_for_range_past_end_of_address_space() {
        let server = MockServer::start(|_| (206, b"x".to_vec())).await;
        let client = client_for(&server, Arc::new(RecordingMetrics::default()), false);

        assert_eq!(client.fetch_bytes("r/b/k", u64::MAX, 10).await.unwrap(), None);
        assert_eq!(client.fetch_bytes("r/b/k", u64::MAX - 1, 3).await.unwrap(), None);
        assert!(server.requests().is_empty());

        assert_eq!(
            client.fetch_bytes("r/b/k", u64::MAX, 1).await.unwrap(),
            Some(Bytes::from_static(b"x"))
        );
        assert_eq!(
            server.requests()[0].header("range"),
            Some("bytes=18446744073709551615-18446744073709551615")
        );
    }

    #[tokio::test]
    async fn test_should_not_retry_missing_blob() {
        let server = MockServer::start(|_| (404, b"NoSuchKey".to_vec())).await;
        let metrics = Arc::new(RecordingMetrics::default());
        let client = client_for(&server, metrics.clone(), false);

        assert_eq!(client.fetch_bytes("r/b/k", 0, 10).await.unwrap(), None);
        assert_eq!(server.requests().len(), 1);
        assert_eq!(metrics.value(names::S3_ERRORS), 0);
    }

    #[tokio::test]
    async fn test_should_retry_failed_blob_reads() {
        let attempts = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let server = MockServer::start(move |_| {
            if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) < 2 {
                (503, b"SlowDown".to_vec())
            } else {
                (206, b"abcd".to_vec())
            }
        })
        .await;
        let metrics = Arc::new(RecordingMetrics::default());
        let client = client_for(&server, metrics.clone(), false);

        let data = client.fetch_bytes("r/b/k", 0, 4).await.unwrap();
        assert_eq!(data, Some(Bytes::from_static(b"abcd")));
        assert_eq!(metrics.value(names::S3_REQUESTS), 3);
        assert_eq!(metrics.value(names::S3_ERRORS), 2);
    }

    #[tokio::test]
    async fn test_should_raise_after_exhausting_metadata_retries() {
        let server = MockServer::start(|_| {
            (
                500,
                br#"{"__type":"com.amazonaws.dynamodb.v20120810#InternalServerError","message":"boom"}"#.to_vec(),
            )
        })
        .await;
        let metrics = Arc::new(RecordingMetrics::default());
        let client = client_for(&server, metrics.clone(), false);

        let err = client.get_metadata_by_key("zQmKey").await.unwrap_err();
        assert!(matches!(err, BackendError::Status { service: "dynamodb", status: 500, .. }));
        assert_eq!(server.requests().len(), 3);
        assert_eq!(metrics.value(names::DYNAMO_ERRORS), 3);
    }

    #[tokio::test]
    async fn test_should_resolve_metadata_from_link_table() {
        let server = MockServer::start(metadata_responder(true, true)).await;
        let client = client_for(&server, Arc::new(RecordingMetrics::default()), false);

        let info = client.get_metadata_by_key("zQmKey").await.unwrap().unwrap();
        assert_eq!(
            info,
            BlockInfo {
                offset: 10,
                length: 20,
                locator: "us-east-1/link/a.car".to_owned()
            }
        );
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(table_of(&requests[0]), "v1-blocks-cars-position");
    }

    #[tokio::test]
    async fn test_should_fall_back_to_legacy_table() {
        let server = MockServer::start(metadata_responder(false, true)).await;
        let client = client_for(&server, Arc::new(RecordingMetrics::default()), false);

        let info = client.get_metadata_by_key("zQmKey").await.unwrap().unwrap();
        assert_eq!(info.locator, "us-east-1/legacy/b.car");
        assert_eq!(info.offset, 30);

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(table_of(&requests[1]), "blocks");
        let body: serde_json::Value = serde_json::from_slice(&requests[1].body).unwrap();
        assert_eq!(body["Key"]["multihash"]["S"], "zQmKey");
    }

    #[tokio::test]
    async fn test_should_answer_none_when_both_tables_miss() {
        let server = MockServer::start(metadata_responder(false, false)).await;
        let client = client_for(&server, Arc::new(RecordingMetrics::default()), false);

        assert!(client.get_metadata_by_key("zQmKey").await.unwrap().is_none());
        assert_eq!(server.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_should_serve_repeated_lookups_from_cache() {
        let server = MockServer::start(metadata_responder(true, false)).await;
        let metrics = Arc::new(RecordingMetrics::default());
        let client = client_for(&server, metrics.clone(), true);

        client.get_metadata_by_key("zQmKey").await.unwrap();
        client.get_metadata_by_key("zQmKey").await.unwrap();

        assert_eq!(server.requests().len(), 1);
        assert_eq!(metrics.value(names::CACHE_HITS), 1);
        assert_eq!(metrics.value(names::CACHE_MISSES), 1);
    }
}
