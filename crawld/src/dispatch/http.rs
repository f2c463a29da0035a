//! HTTP cluster runner
//!
//! Talks to the compute cluster's job API: POST to submit, GET to poll,
//! DELETE to cancel. Retry policy lives in the [`Dispatcher`], not here;
//! this client maps one request to one response.
//!
//! [`Dispatcher`]: super::Dispatcher

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::ClusterConfig;

use super::error::DispatchError;
use super::runner::{JobHandle, JobRunner, JobSpec, RunnerStatus};

/// Cluster API client
pub struct HttpRunner {
    base_url: String,
    auth_token: Option<String>,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    job_id: String,
}

impl HttpRunner {
    /// Create a new client from configuration
    pub fn from_config(config: &ClusterConfig) -> Result<Self, DispatchError> {
        debug!(base_url = %config.base_url, "from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(DispatchError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token(),
            http,
        })
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Map an error status to a dispatch error. Auth failures and malformed
    /// specs are permanent; throttling and server errors count as capacity
    /// problems the caller may retry.
    async fn map_error(&self, response: reqwest::Response) -> DispatchError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => DispatchError::PermissionDenied(message),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => DispatchError::InvalidSpec(message),
            _ => DispatchError::CapacityUnavailable(format!("{}: {}", status.as_u16(), message)),
        }
    }
}

#[async_trait]
impl JobRunner for HttpRunner {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, DispatchError> {
        debug!(target_url = %spec.target_url, "submit: called");
        let url = format!("{}/v1/jobs", self.base_url);
        let response = self.request(self.http.post(&url)).json(spec).send().await?;

        if !response.status().is_success() {
            return Err(self.map_error(response).await);
        }

        let body: SubmitResponse = response.json().await?;
        debug!(job_id = %body.job_id, "submit: accepted");
        Ok(JobHandle { job_id: body.job_id })
    }

    async fn poll(&self, job_id: &str) -> Result<RunnerStatus, DispatchError> {
        debug!(%job_id, "poll: called");
        let url = format!("{}/v1/jobs/{}", self.base_url, job_id);
        let response = self.request(self.http.get(&url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DispatchError::JobNotFound(job_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(self.map_error(response).await);
        }

        let status: RunnerStatus = response.json().await.map_err(DispatchError::Network)?;
        Ok(status)
    }

    async fn cancel(&self, job_id: &str) -> Result<(), DispatchError> {
        debug!(%job_id, "cancel: called");
        let url = format!("{}/v1/jobs/{}", self.base_url, job_id);
        let response = self.request(self.http.delete(&url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(DispatchError::JobNotFound(job_id.to_string()));
        }
        if !response.status().is_success() {
            return Err(self.map_error(response).await);
        }
        Ok(())
    }
}
