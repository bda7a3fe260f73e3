//! HTTP client for the state provider's `/api/states` endpoint

use std::time::Duration;

use reqwest::{header, Client, Url};
use tracing::debug;

use crate::types::{DashboardError, Result, Snapshot};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const STATES_PATH: &str = "/api/states";

/// Fetches the full entity state list
#[derive(Debug, Clone)]
pub struct StatesClient {
    base_url: String,
    token: String,
    client: Client,
}

impl StatesClient {
    /// Create a client for `base_url`.
    ///
    /// Exactly one trailing slash is stripped from the base URL.
    pub fn new(base_url: &str, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base_url = base_url.strip_suffix('/').unwrap_or(base_url).to_string();
        Url::parse(&base_url).map_err(|e| DashboardError::InvalidBaseUrl(format!("{base_url}: {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("smart-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url,
            token: token.into(),
            client,
        })
    }

    /// Normalized base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn states_url(&self) -> String {
        format!("{}{}", self.base_url, STATES_PATH)
    }

    /// GET the current entity states
    pub async fn fetch_states(&self) -> Result<Snapshot> {
        let url = self.states_url();
        debug!(url = %url, "Fetching entity states");

        let response = self
            .client
            .get(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DashboardError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.bytes().await?;
        let snapshot: Snapshot = serde_json::from_slice(&body)?;
        Ok(snapshot)
    }
}
