//! LiteLLM-compatible budget gateway protocol.
//!
//! Three calls are used: `GET /health` must answer 200, `GET /models` lists
//! the model ids the gateway serves, and `POST /key/generate` turns a budget
//! and model list into a key. All are authenticated with
//! `Authorization: Bearer <master key>`. No call is retried.

use osscrs_common::constants::GATEWAY_TIMEOUT;
use osscrs_common::error::{OssCrsError, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

/// Body of `POST /key/generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyRequest {
    /// Models the key may call.
    pub models: Vec<String>,
    /// Spend limit in dollars.
    pub max_budget: f64,
    /// How long the budget lasts, e.g. `30d`.
    pub budget_duration: String,
    /// Human-readable key name shown in the gateway.
    pub key_alias: String,
    /// Owner recorded against the key's spend.
    pub user_id: String,
    /// Requests per minute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpm_limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    key: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: Option<String>,
}

/// The operations the provisioner needs from a gateway.
pub trait BudgetGateway: Send + Sync {
    /// Checks that the gateway is up.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::Gateway`] unless the gateway answers 200.
    fn health(&self) -> Result<()>;

    /// Lists the model ids the gateway serves.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::Gateway`] if the request fails or the answer
    /// is not a model list.
    fn models(&self) -> Result<Vec<String>>;

    /// Requests a new key and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::Gateway`] if the request fails or the answer
    /// carries no key.
    fn generate_key(&self, request: &KeyRequest) -> Result<String>;
}

/// Blocking HTTP client for a gateway.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    master_key: String,
}

impl HttpGateway {
    /// Creates a client for the gateway at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`OssCrsError::Gateway`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, master_key: impl Into<String>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_owned();
        let client = Client::builder()
            .timeout(GATEWAY_TIMEOUT)
            .build()
            .map_err(|e| OssCrsError::Gateway {
                url: base_url.clone(),
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url,
            master_key: master_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

fn gateway_err(url: &str, message: impl Into<String>) -> OssCrsError {
    OssCrsError::Gateway {
        url: url.to_owned(),
        message: message.into(),
    }
}

impl BudgetGateway for HttpGateway {
    fn health(&self) -> Result<()> {
        let url = self.url("/health");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.master_key)
            .send()
            .map_err(|e| gateway_err(&url, format!("unreachable: {e}")))?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(gateway_err(&url, format!("health check returned {status}")));
        }
        tracing::debug!(url = %url, "budget gateway healthy");
        Ok(())
    }

    fn models(&self) -> Result<Vec<String>> {
        let url = self.url("/models");
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.master_key)
            .send()
            .map_err(|e| gateway_err(&url, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(gateway_err(&url, format!("{status}: {body}")));
        }
        let ModelList { data } = response
            .json()
            .map_err(|e| gateway_err(&url, format!("malformed response: {e}")))?;
        let models: Vec<String> = data.into_iter().filter_map(|m| m.id).collect();
        tracing::debug!(url = %url, count = models.len(), "listed gateway models");
        Ok(models)
    }

    fn generate_key(&self, request: &KeyRequest) -> Result<String> {
        let url = self.url("/key/generate");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.master_key)
            .json(request)
            .send()
            .map_err(|e| gateway_err(&url, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(gateway_err(&url, format!("{status}: {body}")));
        }
        let KeyResponse { key } = response
            .json()
            .map_err(|e| gateway_err(&url, format!("malformed response: {e}")))?;
        if key.is_empty() {
            return Err(gateway_err(&url, "response carried an empty key"));
        }
        Ok(key)
    }
}
