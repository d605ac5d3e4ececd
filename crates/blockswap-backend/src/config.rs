//! Backend client configuration.

use std::time::Duration;

use blockswap_core::{env_bool, env_parse, env_string};
use typed_builder::TypedBuilder;

/// Configuration for the metadata store, blob store, caches and credentials.
///
/// # Examples
///
/// ```
/// use blockswap_backend::BackendConfig;
///
/// let config = BackendConfig::builder()
///     .dynamo_endpoint(Some("http://localhost:8000".to_owned()))
///     .build();
/// assert_eq!(config.dynamo_url(), "http://localhost:8000/");
/// assert_eq!(config.blocks_table, "blocks");
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct BackendConfig {
    /// Region of the metadata store and the default signing region.
    #[builder(default = String::from("us-west-2"))]
    pub region: String,
    /// Metadata store endpoint override.
    #[builder(default)]
    pub dynamo_endpoint: Option<String>,
    /// Blob store endpoint override; switches to path-style addressing.
    #[builder(default)]
    pub s3_endpoint: Option<String>,
    /// Legacy block table.
    #[builder(default = String::from("blocks"))]
    pub blocks_table: String,
    /// Partition key of the legacy block table.
    #[builder(default = String::from("multihash"))]
    pub blocks_table_key: String,
    /// Versioned block-to-car link table.
    #[builder(default = String::from("v1-blocks-cars-position"))]
    pub link_table_v1: String,
    /// Partition key of the link table.
    #[builder(default = String::from("blockmultihash"))]
    pub link_table_v1_key: String,
    /// Attempts per metadata call.
    #[builder(default = 3)]
    pub dynamo_max_retries: u32,
    /// Delay between metadata attempts.
    #[builder(default = Duration::from_millis(100))]
    pub dynamo_retry_delay: Duration,
    /// Attempts per blob read.
    #[builder(default = 3)]
    pub s3_max_retries: u32,
    /// Delay between blob attempts.
    #[builder(default = Duration::from_millis(100))]
    pub s3_retry_delay: Duration,
    /// Largest blob range read; longer ranges are treated as missing.
    #[builder(default = 2 * 1024 * 1024)]
    pub max_block_data_size: u64,
    /// Cache block metadata.
    #[builder(default)]
    pub cache_block_info: bool,
    /// Metadata cache capacity in entries.
    #[builder(default = 1000)]
    pub cache_block_info_size: u64,
    /// Cache block bytes.
    #[builder(default)]
    pub cache_block_data: bool,
    /// Data cache capacity in payload bytes.
    #[builder(default = 64 * 1024 * 1024)]
    pub cache_block_data_size: u64,
    /// Idle connections kept per host.
    #[builder(default = 64)]
    pub http_pool_max_idle: usize,
    /// Per-request timeout.
    #[builder(default = Duration::from_secs(30))]
    pub http_request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BackendConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `AWS_REGION` | `us-west-2` |
    /// | `DYNAMO_ENDPOINT` | unset |
    /// | `S3_ENDPOINT` | unset |
    /// | `DYNAMO_BLOCKS_TABLE` | `blocks` |
    /// | `DYNAMO_BLOCKS_TABLE_KEY` | `multihash` |
    /// | `DYNAMO_LINK_TABLE_V1` | `v1-blocks-cars-position` |
    /// | `DYNAMO_LINK_TABLE_V1_KEY` | `blockmultihash` |
    /// | `DYNAMO_MAX_RETRIES` / `S3_MAX_RETRIES` | `3` |
    /// | `DYNAMO_RETRY_DELAY_MS` / `S3_RETRY_DELAY_MS` | `100` |
    /// | `MAX_BLOCK_DATA_SIZE` | `2097152` |
    /// | `CACHE_BLOCK_INFO` / `CACHE_BLOCK_DATA` | `false` |
    /// | `CACHE_BLOCK_INFO_SIZE` | `1000` |
    /// | `CACHE_BLOCK_DATA_SIZE` | `67108864` |
    /// | `HTTP_POOL_MAX_IDLE` | `64` |
    /// | `HTTP_REQUEST_TIMEOUT_MS` | `30000` |
    #[must_use]
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            region: env_string("AWS_REGION", &d.region),
            dynamo_endpoint: non_empty_env("DYNAMO_ENDPOINT"),
            s3_endpoint: non_empty_env("S3_ENDPOINT"),
            blocks_table: env_string("DYNAMO_BLOCKS_TABLE", &d.blocks_table),
            blocks_table_key: env_string("DYNAMO_BLOCKS_TABLE_KEY", &d.blocks_table_key),
            link_table_v1: env_string("DYNAMO_LINK_TABLE_V1", &d.link_table_v1),
            link_table_v1_key: env_string("DYNAMO_LINK_TABLE_V1_KEY", &d.link_table_v1_key),
            dynamo_max_retries: env_parse("DYNAMO_MAX_RETRIES", d.dynamo_max_retries),
            dynamo_retry_delay: env_millis("DYNAMO_RETRY_DELAY_MS", d.dynamo_retry_delay),
            s3_max_retries: env_parse("S3_MAX_RETRIES", d.s3_max_retries),
            s3_retry_delay: env_millis("S3_RETRY_DELAY_MS", d.s3_retry_delay),
            max_block_data_size: env_parse("MAX_BLOCK_DATA_SIZE", d.max_block_data_size),
            cache_block_info: env_bool("CACHE_BLOCK_INFO", d.cache_block_info),
            cache_block_info_size: env_parse("CACHE_BLOCK_INFO_SIZE", d.cache_block_info_size),
            cache_block_data: env_bool("CACHE_BLOCK_DATA", d.cache_block_data),
            cache_block_data_size: env_parse("CACHE_BLOCK_DATA_SIZE", d.cache_block_data_size),
            http_pool_max_idle: env_parse("HTTP_POOL_MAX_IDLE", d.http_pool_max_idle),
            http_request_timeout: env_millis("HTTP_REQUEST_TIMEOUT_MS", d.http_request_timeout),
        }
    }

    /// Metadata store URL.
    #[must_use]
    pub fn dynamo_url(&self) -> String {
        match &self.dynamo_endpoint {
            Some(endpoint) => format!("{}/", endpoint.trim_end_matches('/')),
            None => format!("https://dynamodb.{}.amazonaws.com/", self.region),
        }
    }

    /// Whether any endpoint points at a local emulator.
    #[must_use]
    pub fn uses_endpoint_override(&self) -> bool {
        self.dynamo_endpoint.is_some() || self.s3_endpoint.is_some()
    }
}

/// Credential source for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`.
    Static,
    /// Periodic `AssumeRoleWithWebIdentity` exchange.
    WebIdentity(WebIdentityConfig),
}

/// Settings for the web identity token exchange.
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
pub struct WebIdentityConfig {
    /// Role to assume.
    pub role_arn: String,
    /// File holding the identity token; re-read on every exchange.
    pub token_file: String,
    /// Session name reported to STS.
    #[builder(default = String::from("blockswap"))]
    pub session_name: String,
    /// STS endpoint.
    #[builder(default = String::from("https://sts.amazonaws.com"))]
    pub sts_endpoint: String,
    /// Interval between exchanges.
    #[builder(default = Duration::from_secs(3000))]
    pub refresh_interval: Duration,
}

impl CredentialSource {
    /// Web identity when `AWS_ROLE_ARN` and `AWS_WEB_IDENTITY_TOKEN_FILE` are
    /// both set, static keys otherwise.
    #[must_use]
    pub fn from_env() -> Self {
        match (non_empty_env("AWS_ROLE_ARN"), non_empty_env("AWS_WEB_IDENTITY_TOKEN_FILE")) {
            (Some(role_arn), Some(token_file)) => Self::WebIdentity(WebIdentityConfig {
                role_arn,
                token_file,
                session_name: env_string("AWS_ROLE_SESSION_NAME", "blockswap"),
                sts_endpoint: env_string("STS_ENDPOINT", "https://sts.amazonaws.com"),
                refresh_interval: Duration::from_secs(env_parse(
                    "CREDENTIALS_REFRESH_INTERVAL_SECS",
                    3000,
                )),
            }),
            _ => Self::Static,
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_millis(key: &str, default: Duration) -> Duration {
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(env_parse(key, default_ms))
}
