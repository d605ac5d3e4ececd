//! Temporary credentials from a web identity token, rotated on a timer.
//!
//! The rotation task is the only writer. It publishes each new credential
//! set through a `watch` channel, so every signer reads a whole snapshot and
//! never blocks on the exchange. A failed exchange ends the task with an
//! error the server treats as fatal.

use std::sync::Arc;

use blockswap_auth::{CredentialProvider, Credentials};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::WebIdentityConfig;
use crate::error::CredentialError;

/// Credential provider fed by the rotation task.
#[derive(Debug, Clone)]
pub struct RotatingCredentialProvider {
    rx: watch::Receiver<Arc<Credentials>>,
}

impl CredentialProvider for RotatingCredentialProvider {
    fn current(&self) -> Arc<Credentials> {
        Arc::clone(&self.rx.borrow())
    }
}

/// Exchange the initial credentials and spawn the rotation task.
///
/// The returned handle resolves only when rotation fails.
pub async fn start_rotation(
    http: reqwest::Client,
    config: WebIdentityConfig,
) -> Result<(RotatingCredentialProvider, JoinHandle<Result<(), CredentialError>>), CredentialError> {
    let initial = exchange_web_identity(&http, &config).await?;
    info!(role_arn = %config.role_arn, "obtained temporary credentials");

    let (tx, rx) = watch::channel(Arc::new(initial));
    let handle = tokio::spawn(rotate(http, config, tx));
    Ok((RotatingCredentialProvider { rx }, handle))
}

async fn rotate(
    http: reqwest::Client,
    config: WebIdentityConfig,
    tx: watch::Sender<Arc<Credentials>>,
) -> Result<(), CredentialError> {
    loop {
        tokio::time::sleep(config.refresh_interval).await;
        match exchange_web_identity(&http, &config).await {
            Ok(credentials) => {
                tx.send_replace(Arc::new(credentials));
                info!(role_arn = %config.role_arn, "rotated temporary credentials");
            }
            Err(e) => {
                error!(fatal = true, error = %e, role_arn = %config.role_arn, "credential rotation failed");
                return Err(e);
            }
        }
    }
}

/// Call `AssumeRoleWithWebIdentity` with the token from `config.token_file`.
pub async fn exchange_web_identity(
    http: &reqwest::Client,
    config: &WebIdentityConfig,
) -> Result<Credentials, CredentialError> {
    let token = tokio::fs::read_to_string(&config.token_file)
        .await
        .map_err(|source| CredentialError::TokenFile {
            path: config.token_file.clone(),
            source,
        })?;

    let body = form_urlencoded::Serializer::new(String::new())
        .extend_pairs([
            ("Action", "AssumeRoleWithWebIdentity"),
            ("Version", "2011-06-15"),
            ("RoleArn", config.role_arn.as_str()),
            ("RoleSessionName", config.session_name.as_str()),
            ("WebIdentityToken", token.trim()),
        ])
        .finish();

    let response = http
        .post(&config.sts_endpoint)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(ACCEPT, "application/json")
        .body(body)
        .send()
        .await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(CredentialError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    let envelope: AssumeRoleEnvelope =
        serde_json::from_str(&text).map_err(|e| CredentialError::Decode(e.to_string()))?;
    let creds = envelope
        .assume_role_with_web_identity_response
        .assume_role_with_web_identity_result
        .credentials;
    Ok(Credentials::new(
        creds.access_key_id,
        creds.secret_access_key,
        Some(creds.session_token),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleEnvelope {
    assume_role_with_web_identity_response: AssumeRoleResponse,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResponse {
    assume_role_with_web_identity_result: AssumeRoleResult,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleResult {
    credentials: StsCredentials,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
}
