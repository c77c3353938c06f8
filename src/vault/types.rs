//! Wire models for the Vault `sys/` endpoints the coordinator talks to.

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Response from `GET /v1/sys/health`.
///
/// Vault answers with a non-2xx status for sealed (503) and uninitialized
/// (501) nodes but still returns this body, so it is decoded regardless of
/// the status code.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    pub initialized: bool,
    pub sealed: bool,
    #[serde(default)]
    pub standby: bool,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub cluster_name: Option<String>,
}

/// Request body for `PUT /v1/sys/unseal`.
#[derive(Serialize)]
pub struct UnsealRequest<'a> {
    pub key: &'a str,
}

/// Response from `PUT /v1/sys/unseal`.
#[derive(Debug, Clone, Deserialize)]
pub struct SealStatusResponse {
    pub sealed: bool,
    #[serde(default)]
    pub t: u32,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub progress: u32,
}

/// Request body for `POST /v1/sys/rekey/init`.
#[derive(Debug, Serialize)]
pub struct RekeyInitRequest {
    pub secret_shares: usize,
    pub secret_threshold: usize,
}

/// Response from `GET`/`POST /v1/sys/rekey/init`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RekeyStatusResponse {
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub started: bool,
    #[serde(default)]
    pub t: u32,
    #[serde(default)]
    pub n: u32,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub required: u32,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub verification_required: bool,
}

/// Request body for `POST /v1/sys/rekey/update`.
#[derive(Serialize)]
pub struct RekeyUpdateRequest<'a> {
    pub key: &'a str,
    pub nonce: &'a str,
}

/// Response from `POST /v1/sys/rekey/update`.
///
/// `keys` is only populated once `complete` is true.
#[derive(Deserialize)]
pub struct RekeyUpdateResponse {
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub required: u32,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub keys_base64: Vec<String>,
}

impl Drop for RekeyUpdateResponse {
    fn drop(&mut self) {
        self.keys.zeroize();
        self.keys_base64.zeroize();
    }
}

/// Error body Vault returns on 4xx/5xx.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ErrorResponse {
    pub fn contains(&self, needle: &str) -> bool {
        self.errors.iter().any(|e| e.contains(needle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_decodes_sealed_body() {
        let body = r#"{"initialized":true,"sealed":true,"standby":true,
            "performance_standby":false,"server_time_utc":1700000000,
            "version":"1.15.2"}"#;
        let health: HealthResponse = serde_json::from_str(body).unwrap();
        assert!(health.initialized);
        assert!(health.sealed);
        assert_eq!(health.version, "1.15.2");
    }

    #[test]
    fn test_rekey_init_request_field_names() {
        let json = serde_json::to_value(RekeyInitRequest {
            secret_shares: 5,
            secret_threshold: 3,
        })
        .unwrap();
        assert_eq!(json["secret_shares"], 5);
        assert_eq!(json["secret_threshold"], 3);
    }

    #[test]
    fn test_error_response_matching() {
        let body = r#"{"errors":["rekey already in progress"]}"#;
        let err: ErrorResponse = serde_json::from_str(body).unwrap();
        assert!(err.contains("already in progress"));
        assert!(!err.contains("permission denied"));
    }
}
