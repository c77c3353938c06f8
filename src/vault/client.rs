use crate::config::VaultConfig;
use crate::vault::types::{
    ErrorResponse, HealthResponse, RekeyInitRequest, RekeyStatusResponse, RekeyUpdateRequest,
    RekeyUpdateResponse, SealStatusResponse, UnsealRequest,
};
use crate::vault::{
    NewShares, RekeyInit, RekeyProgress, RekeyStatus, SealHealth, SealResource, VaultError,
    VaultResult,
};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

const TOKEN_HEADER: &str = "X-Vault-Token";
const REKEY_IN_PROGRESS: &str = "rekey already in progress";

/// HTTP client for the Vault `sys/` API.
pub struct VaultClient {
    http: Client,
    base_url: String,
    token: Zeroizing<String>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl VaultClient {
    /// Create a client for the Vault at `config.url`, authenticating with `token`.
    pub fn new(config: &VaultConfig, token: String) -> VaultResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: Zeroizing::new(token),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/sys/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Turn a non-success response into a [`VaultError::Status`].
    async fn status_error(response: Response) -> VaultError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .filter(|e| !e.errors.is_empty())
            .map(|e| e.errors.join("; "))
            .unwrap_or(body);
        VaultError::Status {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl SealResource for VaultClient {
    async fn health(&self) -> VaultResult<SealHealth> {
        let url = self.endpoint("health");
        debug!("Checking Vault health at {}", url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            error!("Health check failed: {}", e);
            VaultError::Http(e)
        })?;

        // Sealed and uninitialized nodes answer 503/501 with a normal body.
        let status = response.status();
        let body = response.text().await?;
        let health: HealthResponse = serde_json::from_str(&body).map_err(|e| {
            error!(status = status.as_u16(), "Failed to parse health response: {}", e);
            VaultError::Decode(format!("health ({}): {}", status, e))
        })?;

        debug!(
            initialized = health.initialized,
            sealed = health.sealed,
            version = %health.version,
            "Vault health"
        );

        Ok(SealHealth {
            initialized: health.initialized,
            sealed: health.sealed,
        })
    }

    async fn unseal(&self, shares: &[String]) -> VaultResult<()> {
        let url = self.endpoint("unseal");

        for (index, share) in shares.iter().enumerate() {
            let response = self
                .http
                .put(&url)
                .json(&UnsealRequest { key: share })
                .send()
                .await?;

            if response.status() != StatusCode::OK {
                let err = Self::status_error(response).await;
                error!(share = index + 1, "Unseal share rejected: {}", err);
                return Err(err);
            }

            match response.json::<SealStatusResponse>().await {
                Ok(status) => debug!(
                    share = index + 1,
                    sealed = status.sealed,
                    progress = status.progress,
                    threshold = status.t,
                    "Unseal share accepted"
                ),
                Err(e) => warn!(share = index + 1, "Unseal response not understood: {}", e),
            }
        }

        info!(shares = shares.len(), "Submitted all unseal shares");
        Ok(())
    }

    async fn rekey_status(&self) -> VaultResult<RekeyStatus> {
        let response = self
            .http
            .get(self.endpoint("rekey/init"))
            .header(TOKEN_HEADER, self.token.as_str())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let status: RekeyStatusResponse = response
            .json()
            .await
            .map_err(|e| VaultError::Decode(format!("rekey status: {}", e)))?;

        Ok(RekeyStatus {
            started: status.started,
            nonce: status.nonce,
            progress: status.progress,
            required: status.required,
        })
    }

    async fn rekey_init(&self, total: usize, required: usize) -> VaultResult<RekeyInit> {
        let request = RekeyInitRequest {
            secret_shares: total,
            secret_threshold: required,
        };

        let response = self
            .http
            .post(self.endpoint("rekey/init"))
            .header(TOKEN_HEADER, self.token.as_str())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let started: RekeyStatusResponse = response
                .json()
                .await
                .map_err(|e| VaultError::Decode(format!("rekey init: {}", e)))?;
            info!(nonce = %started.nonce, "Rekey started");
            return Ok(RekeyInit::Started {
                nonce: started.nonce,
            });
        }

        let body = response.text().await.unwrap_or_default();
        let errors: ErrorResponse = serde_json::from_str(&body).unwrap_or_default();

        if status == StatusCode::BAD_REQUEST && errors.contains(REKEY_IN_PROGRESS) {
            info!("Rekey already in progress on Vault");
            return Ok(RekeyInit::AlreadyInProgress);
        }

        if status.is_client_error() {
            let reason = if errors.errors.is_empty() {
                format!("status {}", status)
            } else {
                errors.errors.join("; ")
            };
            warn!(status = status.as_u16(), "Rekey init rejected: {}", reason);
            return Ok(RekeyInit::Rejected(reason));
        }

        error!(status = status.as_u16(), "Rekey init failed: {}", body);
        Err(VaultError::Status {
            status: status.as_u16(),
            message: body,
        })
    }

    async fn rekey_update(&self, share: &str, nonce: &str) -> VaultResult<RekeyProgress> {
        let response = self
            .http
            .post(self.endpoint("rekey/update"))
            .header(TOKEN_HEADER, self.token.as_str())
            .json(&RekeyUpdateRequest { key: share, nonce })
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            let err = Self::status_error(response).await;
            error!("Rekey share rejected: {}", err);
            return Err(err);
        }

        // Read as text so the raw body (which may hold new keys) is wiped after parsing.
        let body = Zeroizing::new(response.text().await?);
        let mut update: RekeyUpdateResponse = serde_json::from_str(&body)
            .map_err(|e| VaultError::Decode(format!("rekey update: {}", e)))?;

        if update.complete {
            info!(new_shares = update.keys.len(), "Rekey complete");
            return Ok(RekeyProgress::Complete(NewShares {
                keys: std::mem::take(&mut update.keys),
                keys_base64: std::mem::take(&mut update.keys_base64),
            }));
        }

        debug!(
            progress = update.progress,
            required = update.required,
            "Rekey share accepted"
        );
        Ok(RekeyProgress::Pending {
            progress: update.progress,
            required: update.required,
        })
    }

    async fn rekey_cancel(&self) -> VaultResult<()> {
        let response = self
            .http
            .delete(self.endpoint("rekey/init"))
            .header(TOKEN_HEADER, self.token.as_str())
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT | StatusCode::OK => {
                info!("Rekey cancelled");
                Ok(())
            }
            _ => {
                let err = Self::status_error(response).await;
                error!("Failed to cancel rekey: {}", err);
                Err(err)
            }
        }
    }
}
