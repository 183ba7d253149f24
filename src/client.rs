//! Authenticated access to the deployment API
//!
//! [`ApiClient`] owns its own `reqwest::Client`, configured from
//! [`ApiConfig`]: bearer auth on every request, request and connect
//! timeouts, and the optional team scope. Each method performs exactly one
//! HTTP request; retrying is left to [`crate::retry`].

use base64::{Engine as _, engine::general_purpose};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::config::ApiConfig;
use crate::deployment::Deployment;
use crate::error::{Error, Result};
use crate::tree::{RemoteNode, parse_tree};

/// JSON envelope some file responses use instead of raw bytes
#[derive(Debug, Deserialize)]
struct FileEnvelope {
    data: String,
}

/// `{"deployment": {...}}`
#[derive(Debug, Deserialize)]
struct DeploymentBody {
    deployment: Option<Deployment>,
}

/// `{"deployments": [...]}`
#[derive(Debug, Deserialize)]
struct DeploymentList {
    deployments: Option<Vec<Deployment>>,
}

/// Error body the API sends alongside failures
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

/// HTTP client for the deployment API
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    team_id: Option<String>,
}

impl ApiClient {
    /// Build a client from explicit API settings
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| Error::config("api.token", "token contains invalid header characters"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            team_id: config.team_id.clone(),
        })
    }

    fn get(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.http.get(url);
        match &self.team_id {
            Some(team) => request.query(&[("teamId", team)]),
            None => request,
        }
    }

    /// Fetch one deployment's metadata
    pub async fn fetch_deployment(&self, deployment_id: &str) -> Result<Deployment> {
        let url = format!(
            "{}/v6/deployments/{}",
            self.base_url,
            urlencoding::encode(deployment_id)
        );
        let response = check_status(self.get(url).send().await?).await?;
        let body = response.bytes().await?;
        serde_json::from_slice::<DeploymentBody>(&body)?
            .deployment
            .ok_or_else(|| Error::Decode(format!("no deployment data returned for {deployment_id}")))
    }

    /// List the most recent deployments, newest first as the API orders them
    pub async fn list_deployments(&self, limit: usize) -> Result<Vec<Deployment>> {
        let url = format!("{}/v6/deployments", self.base_url);
        let response = check_status(self.get(url).query(&[("limit", limit)]).send().await?).await?;
        let body = response.bytes().await?;
        serde_json::from_slice::<DeploymentList>(&body)?
            .deployments
            .ok_or_else(|| Error::Decode("no deployments returned".to_string()))
    }

    /// Fetch the file tree of a deployment
    pub async fn fetch_tree(&self, deployment_id: &str) -> Result<Vec<RemoteNode>> {
        let url = format!(
            "{}/v6/deployments/{}/files",
            self.base_url,
            urlencoding::encode(deployment_id)
        );
        let response = check_status(self.get(url).send().await?).await?;
        let body = response.bytes().await?;
        parse_tree(&body)
    }

    /// Fetch one file's content by its remote handle
    ///
    /// JSON responses carrying a `data` field are base64-decoded; any other
    /// body is returned as-is.
    pub async fn fetch_file(&self, remote_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v6/deployments/files/{}",
            self.base_url,
            urlencoding::encode(remote_id)
        );
        let response = check_status(self.get(url).send().await?).await?;
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let body = response.bytes().await?;
        decode_body(is_json, &body)
    }
}

/// Turn non-success statuses into typed errors
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .map(|body| body.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| "API rejected the access token".to_string());
        return Err(Error::Authentication { message });
    }
    Err(Error::from_status(status))
}

fn decode_body(is_json: bool, body: &[u8]) -> Result<Vec<u8>> {
    if is_json {
        if let Ok(envelope) = serde_json::from_slice::<FileEnvelope>(body) {
            return general_purpose::STANDARD
                .decode(envelope.data.as_bytes())
                .map_err(|e| Error::Decode(format!("invalid base64 file content: {e}")));
        }
    }
    Ok(body.to_vec())
}
