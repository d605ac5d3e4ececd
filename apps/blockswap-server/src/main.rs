//! Blockswap Server - a BitSwap block responder.
//!
//! Peers open a stream, negotiate one of the BitSwap protocol ids, and send
//! a wantlist. Blocks are located through DynamoDB and read from CAR files
//! in S3.
//!
//! # Usage
//!
//! ```text
//! LISTEN_ADDRESS=0.0.0.0:3000 AWS_REGION=us-west-2 blockswap-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LISTEN_ADDRESS` | `0.0.0.0:3000` | Bind address |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//! | `MAX_MESSAGE_SIZE` | `4194304` | Largest encoded message in either direction |
//! | `BLOCKS_BATCH_SIZE` | `32` | Wantlist entries per batch |
//! | `PROCESSING_CONCURRENCY` | `32` | Batches fetching at once |
//! | `MAX_BLOCK_DATA_SIZE` | `2097152` | Largest block read from S3 |
//! | `AWS_ROLE_ARN` | *(unset)* | Enables web identity credentials together with the token file |
//! | `AWS_WEB_IDENTITY_TOKEN_FILE` | *(unset)* | Identity token for the role exchange |
//!
//! The remaining backend variables are documented on
//! [`blockswap_backend::BackendConfig::from_env`].

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use blockswap_auth::{CredentialProvider, Credentials, StaticCredentialProvider};
use blockswap_backend::{
    BackendClient, BackendConfig, CredentialError, CredentialSource, build_http_client,
    start_rotation,
};
use blockswap_core::{PeerConfig, PrometheusMetrics};
use blockswap_engine::server::serve;
use blockswap_engine::{ProcessorConfig, WantlistProcessor};
use blockswap_protocol::{ProtocolVersion, max_block_element_len};
use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

type RotationHandle = JoinHandle<Result<(), CredentialError>>;

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// A block must fit into one message together with its field framing and
/// CID prefix.
fn validate_sizes(processor: &ProcessorConfig, backend: &BackendConfig) -> Result<()> {
    let max_message_size = processor.max_message_size;
    let needed = usize::try_from(backend.max_block_data_size)
        .ok()
        .map(max_block_element_len);
    if needed.is_none_or(|needed| needed > max_message_size) {
        anyhow::bail!(
            "MAX_BLOCK_DATA_SIZE ({}) plus block framing must fit within MAX_MESSAGE_SIZE ({max_message_size})",
            backend.max_block_data_size,
        );
    }
    Ok(())
}

/// Pick the credential provider. Web identity also yields the rotation task.
async fn build_credentials(
    config: &BackendConfig,
) -> Result<(Arc<dyn CredentialProvider>, Option<RotationHandle>)> {
    match CredentialSource::from_env() {
        CredentialSource::Static => {
            let credentials = Credentials::from_env().ok_or_else(|| {
                CredentialError::Missing(
                    "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY".to_owned(),
                )
            })?;
            info!(
                access_key_id = %credentials.access_key_id,
                "using static credentials from environment"
            );
            Ok((Arc::new(StaticCredentialProvider::new(credentials)), None))
        }
        CredentialSource::WebIdentity(web_identity) => {
            info!(
                role_arn = %web_identity.role_arn,
                refresh_secs = web_identity.refresh_interval.as_secs(),
                "using web identity credentials"
            );
            let http = build_http_client(config).context("failed to build STS client")?;
            let (provider, handle) = start_rotation(http, web_identity)
                .await
                .context("initial credential exchange failed")?;
            Ok((Arc::new(provider), Some(handle)))
        }
    }
}

/// Turn the end of the rotation task into the process error.
fn rotation_failure(outcome: Result<Result<(), CredentialError>, JoinError>) -> anyhow::Error {
    match outcome {
        Ok(Ok(())) => anyhow::anyhow!("credential rotation stopped"),
        Ok(Err(e)) => anyhow::Error::new(e).context("credential rotation failed"),
        Err(e) => anyhow::Error::new(e).context("credential rotation task aborted"),
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("received shutdown signal, draining connections");
}

#[tokio::main]
async fn main() -> Result<()> {
    let peer_config = PeerConfig::from_env();
    init_tracing(&peer_config.log_level)?;

    let processor_config = ProcessorConfig::from_env();
    let backend_config = BackendConfig::from_env();
    validate_sizes(&processor_config, &backend_config)?;

    let metrics = Arc::new(PrometheusMetrics::new().context("failed to register metrics")?);
    let (credentials, rotation) = build_credentials(&backend_config).await?;

    info!(
        region = %backend_config.region,
        blocks_table = %backend_config.blocks_table,
        link_table = %backend_config.link_table_v1,
        cache_block_info = backend_config.cache_block_info,
        cache_block_data = backend_config.cache_block_data,
        "initializing backend",
    );
    let backend = BackendClient::new(backend_config, credentials, metrics.clone())
        .context("failed to build backend client")?;
    let processor = Arc::new(WantlistProcessor::new(
        processor_config,
        Arc::new(backend),
        metrics.clone(),
    ));

    let addr: SocketAddr = peer_config
        .listen_address
        .parse()
        .with_context(|| format!("invalid bind address: {}", peer_config.listen_address))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    let protocols: Vec<&str> = ProtocolVersion::ALL
        .iter()
        .map(ProtocolVersion::protocol_id)
        .collect();
    info!(%addr, ?protocols, version = VERSION, "starting Blockswap Server");

    let result = match rotation {
        Some(handle) => tokio::select! {
            () = serve(listener, processor, shutdown_signal()) => Ok(()),
            outcome = handle => Err(rotation_failure(outcome)),
        },
        None => {
            serve(listener, processor, shutdown_signal()).await;
            Ok(())
        }
    };

    debug!(metrics = %metrics.gather_text(), "final metrics");
    result
}
