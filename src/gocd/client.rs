use log::debug;
use reqwest::header::ACCEPT;
use reqwest::Client;
use url::Url;

use super::names::extract_pipeline_names;
use super::resolver::HISTORY_DEPTH;
use super::types::{PipelineHistory, PipelineRun};
use crate::auth::BasicAuth;
use crate::error::{MonitorError, Result};

/// Read-only client for the GoCD API.
pub struct GoCdClient {
    client: Client,
    base_url: Url,
    auth: Option<BasicAuth>,
    history_depth: usize,
}

impl GoCdClient {
    /// Creates a client for the GoCD server at `base_url`.
    ///
    /// Certificate validation is disabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(base_url: &str, auth: Option<BasicAuth>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("gocd-monitor/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| MonitorError::Config(format!("Failed to create HTTP client: {e}")))?;

        let base_url = Url::parse(base_url)
            .map_err(|e| MonitorError::Config(format!("Invalid GoCD URL: {e}")))?;

        if base_url.cannot_be_a_base() {
            return Err(MonitorError::Config(format!(
                "GoCD URL cannot be used as a base: {base_url}"
            )));
        }

        Ok(Self {
            client,
            base_url,
            auth,
            history_depth: HISTORY_DEPTH,
        })
    }

    /// Limits how many runs are kept per history request (at most 5).
    #[must_use]
    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.history_depth = depth.clamp(1, HISTORY_DEPTH);
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(auth) = &self.auth {
            request.basic_auth(auth.username(), Some(auth.password()))
        } else {
            request
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| MonitorError::Config(format!("Invalid GoCD URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, accept: &str) -> Result<reqwest::Response> {
        debug!("GET {url}");

        let response = self
            .auth_request(self.client.get(url).header(ACCEPT, accept))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(MonitorError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// Lists the names of all pipelines known to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the listing holds no pipelines.
    pub async fn fetch_pipeline_names(&self) -> Result<Vec<String>> {
        let url = self.endpoint(&["go", "api", "pipelines.xml"])?;
        let listing = self.get(url, "application/xml").await?.text().await?;

        let names = extract_pipeline_names(&listing)?;
        if names.is_empty() {
            return Err(MonitorError::NoPipelines);
        }

        Ok(names)
    }

    /// Fetches the most recent runs of `name`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-2xx status or an unparsable body.
    pub async fn fetch_history(&self, name: &str) -> Result<Vec<PipelineRun>> {
        let url = self.endpoint(&["go", "api", "pipelines", name, "history"])?;
        let body = self.get(url, "application/json").await?.text().await?;

        let mut history: PipelineHistory = serde_json::from_str(&body)?;
        history.pipelines.truncate(self.history_depth);

        Ok(history.pipelines)
    }
}
