//! Checking a license key against the license server.

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Plan;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub license_key: String,
    pub user_id: String,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationResponse {
    pub valid: bool,
    /// Expiry in milliseconds since the epoch.
    #[serde(default)]
    pub expires: Option<i64>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ValidationResponse {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires.and_then(DateTime::from_timestamp_millis)
    }
}

/// Whoever gets the final say on a license key.
#[async_trait]
pub trait LicenseValidator: Send + Sync {
    async fn validate(&self, request: &ValidationRequest) -> Result<ValidationResponse>;
}

/// Posts the key to the license server's `/api/validate` endpoint.
pub struct HttpLicenseValidator {
    client: reqwest::Client,
    url: String,
}

impl HttpLicenseValidator {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/api/validate", base_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl LicenseValidator for HttpLicenseValidator {
    async fn validate(&self, request: &ValidationRequest) -> Result<ValidationResponse> {
        let resp = self.client.post(&self.url).json(request).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("license server error ({}): {}", status, text);
        }

        Ok(resp.json().await?)
    }
}
