//! Etherscan-compatible explorer client (Arbiscan) for source verification.

use alloy::primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// Errors returned by the explorer API.
#[derive(Debug, Error)]
pub enum ExplorerError {
    #[error("explorer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("explorer rejected request: {0}")]
    Rejected(String),
    #[error("verification still pending")]
    Pending,
    #[error("unexpected explorer response: {0}")]
    Malformed(String),
}

/// Standard-JSON verification request for one contract.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationRequest {
    /// Deployed address
    pub address: Address,
    /// Fully qualified name, `contracts/core/ChromaticVault.sol:ChromaticVault`
    pub contract_name: String,
    /// Compiler long version, `v0.8.19+commit.7dd6d404`
    pub compiler_version: String,
    /// Solidity standard-JSON input, serialized
    pub source: String,
    /// ABI-encoded constructor arguments without `0x`
    pub constructor_args: String,
}

/// Outcome of a verification submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    AlreadyVerified,
    Failed(String),
}

impl VerificationStatus {
    /// Parse the `checkverifystatus` envelope.
    pub fn from_envelope(envelope: &ApiEnvelope) -> Self {
        let text = envelope.result_text();
        let lower = text.to_lowercase();

        if lower.contains("already verified") {
            Self::AlreadyVerified
        } else if lower.contains("pending") {
            Self::Pending
        } else if envelope.is_ok() || lower.starts_with("pass") {
            Self::Verified
        } else {
            Self::Failed(text)
        }
    }

    /// Verified or already verified.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Verified | Self::AlreadyVerified)
    }
}

/// `{status, message, result}` envelope shared by every endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub status: String,
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl ApiEnvelope {
    pub fn is_ok(&self) -> bool {
        self.status == "1"
    }

    /// `result` as text; explorers put error strings there.
    pub fn result_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => self.message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SourceCodeEntry {
    #[serde(rename = "SourceCode", default)]
    source_code: String,
}

/// Verification backend.
#[async_trait]
pub trait ContractVerifier: Send + Sync {
    /// Submit sources; returns the explorer's GUID.
    async fn submit_verification(&self, request: &VerificationRequest)
        -> Result<String, ExplorerError>;

    /// Poll a submission.
    async fn check_status(&self, guid: &str) -> Result<VerificationStatus, ExplorerError>;

    /// Whether the address already has verified source.
    async fn is_verified(&self, address: Address) -> Result<bool, ExplorerError>;
}

/// Explorer HTTP client.
#[derive(Debug, Clone)]
pub struct ExplorerClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl ExplorerClient {
    /// Create a client for an explorer API endpoint.
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<ApiEnvelope, ExplorerError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ContractVerifier for ExplorerClient {
    #[instrument(skip(self, request), fields(address = %request.address, contract = %request.contract_name))]
    async fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<String, ExplorerError> {
        let address = request.address.to_string();
        let form = [
            ("apikey", self.api_key.as_str()),
            ("module", "contract"),
            ("action", "verifysourcecode"),
            ("contractaddress", address.as_str()),
            ("sourceCode", request.source.as_str()),
            ("codeformat", "solidity-standard-json-input"),
            ("contractname", request.contract_name.as_str()),
            ("compilerversion", request.compiler_version.as_str()),
            // Etherscan's parameter name is misspelled
            ("constructorArguements", request.constructor_args.as_str()),
        ];

        let envelope: ApiEnvelope = self
            .client
            .post(&self.api_url)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !envelope.is_ok() {
            return Err(ExplorerError::Rejected(envelope.result_text()));
        }

        let guid = envelope.result_text();
        info!(guid = %guid, "Verification submitted");
        Ok(guid)
    }

    async fn check_status(&self, guid: &str) -> Result<VerificationStatus, ExplorerError> {
        let envelope = self
            .get(&[
                ("module", "contract"),
                ("action", "checkverifystatus"),
                ("guid", guid),
            ])
            .await?;
        let status = VerificationStatus::from_envelope(&envelope);
        debug!(guid = %guid, status = ?status, "Verification status");
        Ok(status)
    }

    async fn is_verified(&self, address: Address) -> Result<bool, ExplorerError> {
        let address = address.to_string();
        let envelope = self
            .get(&[
                ("module", "contract"),
                ("action", "getsourcecode"),
                ("address", address.as_str()),
            ])
            .await?;

        if !envelope.is_ok() {
            return Ok(false);
        }
        let entries: Vec<SourceCodeEntry> = serde_json::from_value(envelope.result)
            .map_err(|e| ExplorerError::Malformed(e.to_string()))?;
        Ok(entries.iter().any(|e| !e.source_code.is_empty()))
    }
}
