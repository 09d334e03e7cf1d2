//! HTTP client for the steward-api service.

use anyhow::{anyhow, Context, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use steward_core::DeploymentSpec;
use steward_engine::{Action, Deployment, Rollout};

pub struct ApiClient {
    http: Client,
    base_url: String,
    user: String,
}

/// Mirror of the API's status payload, the parts the CLI renders.
#[derive(Debug, Deserialize)]
pub struct DeploymentStatus {
    pub deployment: Deployment,
    pub rollout: Option<Rollout>,
    pub running: usize,
    pub healthy: usize,
    pub ready: bool,
}

impl ApiClient {
    pub fn new(base_url: &str, user: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
        }
    }

    fn identified(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("x-steward-user", &self.user)
    }

    async fn parse<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Server returned {}: {}", status, body));
        }

        response
            .json()
            .await
            .context("Failed to decode server response")
    }

    pub async fn apply(&self, spec: &DeploymentSpec) -> Result<Deployment> {
        let url = format!("{}/api/v1/deployments", self.base_url);
        let response = self
            .identified(self.http.put(&url))
            .json(spec)
            .send()
            .await
            .context("Failed to reach steward-api")?;
        self.parse(response).await
    }

    pub async fn list(&self) -> Result<Vec<Deployment>> {
        let url = format!("{}/api/v1/deployments", self.base_url);
        let response = self.identified(self.http.get(&url)).send().await?;
        self.parse(response).await
    }

    pub async fn get(&self, app: &str) -> Result<Deployment> {
        let url = format!("{}/api/v1/deployments/{}", self.base_url, app);
        let response = self.identified(self.http.get(&url)).send().await?;
        self.parse(response).await
    }

    pub async fn status(&self, app: &str) -> Result<DeploymentStatus> {
        let url = format!("{}/api/v1/deployments/{}/status", self.base_url, app);
        let response = self.identified(self.http.get(&url)).send().await?;
        self.parse(response).await
    }

    pub async fn delete(&self, app: &str) -> Result<()> {
        let url = format!("{}/api/v1/deployments/{}", self.base_url, app);
        let response = self.identified(self.http.delete(&url)).send().await?;
        self.parse::<serde_json::Value>(response).await?;
        Ok(())
    }

    pub async fn set_paused(&self, app: &str, paused: bool) -> Result<Deployment> {
        let verb = if paused { "pause" } else { "resume" };
        let url = format!("{}/api/v1/deployments/{}/{}", self.base_url, app, verb);
        let response = self.identified(self.http.post(&url)).send().await?;
        self.parse(response).await
    }

    pub async fn rollback(&self, app: &str) -> Result<Deployment> {
        let url = format!("{}/api/v1/deployments/{}/rollback", self.base_url, app);
        let response = self.identified(self.http.post(&url)).send().await?;
        self.parse(response).await
    }

    pub async fn rollouts(&self, app: Option<&str>) -> Result<Vec<Rollout>> {
        let url = format!("{}/api/v1/rollouts", self.base_url);
        let mut req = self.identified(self.http.get(&url));
        if let Some(app) = app {
            req = req.query(&[("app", app)]);
        }
        let response = req.send().await?;
        self.parse(response).await
    }

    pub async fn actions(&self, app: Option<&str>) -> Result<Vec<Action>> {
        let url = format!("{}/api/v1/actions", self.base_url);
        let mut req = self.identified(self.http.get(&url));
        if let Some(app) = app {
            req = req.query(&[("app", app)]);
        }
        let response = req.send().await?;
        self.parse(response).await
    }
}
