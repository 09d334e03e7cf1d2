//! HTTP cluster backend.
//!
//! Talks JSON to a cluster agent exposing a small instance API:
//! `GET /v1/instances`, `POST /v1/instances`, `DELETE /v1/instances/{id}`.

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::error::{ClusterError, Result};
use crate::{ClusterApi, Instance};

pub struct HttpCluster {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Serialize)]
struct StartInstanceRequest<'a> {
    app: &'a str,
    image: &'a str,
}

impl HttpCluster {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.header("Authorization", format!("Bearer {token}")),
            None => req,
        }
    }

    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(ClusterError::NotFound(message));
        }
        Err(ClusterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl ClusterApi for HttpCluster {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn list_instances(&self) -> Result<Vec<Instance>> {
        let url = format!("{}/v1/instances", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = self.check(response).await?;

        let instances: Vec<Instance> = response.json().await?;
        debug!(count = instances.len(), "Listed cluster instances");
        Ok(instances)
    }

    async fn start_instance(&self, app: &str, image: &str) -> Result<Instance> {
        let url = format!("{}/v1/instances", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .json(&StartInstanceRequest { app, image })
            .send()
            .await?;
        let response = self.check(response).await?;

        let instance: Instance = response.json().await?;
        debug!(app, image, id = %instance.id, "Started instance");
        Ok(instance)
    }

    async fn stop_instance(&self, id: &str) -> Result<()> {
        let url = format!("{}/v1/instances/{}", self.base_url, id);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        self.check(response).await?;

        debug!(id, "Stopped instance");
        Ok(())
    }
}
