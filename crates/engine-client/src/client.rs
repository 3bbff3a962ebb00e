//! HTTP client for the node-graph engine
//!
//! Graphs are queued on `/prompt`, completion is detected by polling
//! `/history/{id}`, and artifacts are downloaded from `/view`.

use std::time::Duration;

use async_trait::async_trait;
use graph_compiler::Graph;
use pipeline_orchestrator::{
    ArtifactRef, EventSink, ExecutionClient, JobOutputs, PipelineEvent,
};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::config::ClientConfig;
use crate::constants::endpoints;
use crate::error::{ClientError, Result};
use crate::history::parse_history;

/// Engine client speaking the engine's HTTP API
pub struct HttpExecutionClient {
    config: ClientConfig,
    http_client: reqwest::Client,
    /// Identifies this client to the engine's queue
    client_id: String,
}

impl HttpExecutionClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
            client_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.normalized_base_url(), path)
    }

    /// Whether the engine answers its stats endpoint
    pub async fn health_check(&self) -> bool {
        let url = self.url(endpoints::SYSTEM_STATS);
        match self.http_client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                log::debug!("Engine health check failed: {}", e);
                false
            }
        }
    }

    /// Poll the health endpoint until the engine answers or `timeout` passes
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            if self.health_check().await {
                log::info!(
                    "Engine ready after {:.1}s",
                    started.elapsed().as_secs_f32()
                );
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout(format!(
                    "engine at {} not ready within {}s",
                    self.config.normalized_base_url(),
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep((deadline - now).min(Duration::from_secs(1))).await;
        }
    }

    async fn queue_graph(&self, graph: &Graph) -> Result<String> {
        let body = json!({
            "prompt": graph.to_wire()?,
            "client_id": self.client_id,
        });
        let response = self
            .http_client
            .post(self.url(endpoints::PROMPT))
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let job_id = parse_prompt_id(&response.json::<Value>().await?)?;
        log::info!("Queued job {} ({} nodes)", job_id, graph.len());
        Ok(job_id)
    }

    async fn wait_for_job(&self, job_id: &str, events: &dyn EventSink) -> Result<JobOutputs> {
        let url = self.url(&format!("{}/{}", endpoints::HISTORY, job_id));
        let deadline = Instant::now() + self.config.timeout();
        let _ = events.send(PipelineEvent::progress(
            job_id,
            0.0,
            Some("Waiting for engine".to_string()),
        ));

        loop {
            let response = self.http_client.get(&url).send().await?;
            if response.status().is_success() {
                let body: Value = response.json().await?;
                if let Some(outputs) = parse_history(job_id, &body)? {
                    log::info!("Job {} completed", job_id);
                    let _ = events.send(PipelineEvent::progress(
                        job_id,
                        1.0,
                        Some("Completed".to_string()),
                    ));
                    return Ok(outputs);
                }
            } else {
                log::debug!("History poll for {} returned {}", job_id, response.status());
            }

            if Instant::now() >= deadline {
                return Err(ClientError::Timeout(format!(
                    "job {} did not complete within {}s",
                    job_id, self.config.timeout_secs
                )));
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn download(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        let url = view_url(self.config.normalized_base_url(), artifact)?;
        let response = ensure_success(self.http_client.get(url).send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String> {
        let part = Part::bytes(bytes)
            .file_name(suggested_name.to_string())
            .mime_str(mime_for(suggested_name))?;
        let form = Form::new()
            .part("image", part)
            .text("overwrite", "true");

        let response = self
            .http_client
            .post(self.url(endpoints::UPLOAD_IMAGE))
            .multipart(form)
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let reference = input_reference(&response.json::<Value>().await?)?;
        log::info!("Uploaded input image as {}", reference);
        Ok(reference)
    }
}

#[async_trait]
impl ExecutionClient for HttpExecutionClient {
    async fn submit(&self, graph: &Graph) -> pipeline_orchestrator::Result<String> {
        Ok(self.queue_graph(graph).await?)
    }

    async fn await_completion(
        &self,
        job_id: &str,
        events: &dyn EventSink,
    ) -> pipeline_orchestrator::Result<JobOutputs> {
        Ok(self.wait_for_job(job_id, events).await?)
    }

    async fn fetch_artifact_bytes(
        &self,
        artifact: &ArtifactRef,
    ) -> pipeline_orchestrator::Result<Vec<u8>> {
        Ok(self.download(artifact).await?)
    }

    async fn upload_input_image(
        &self,
        bytes: Vec<u8>,
        suggested_name: &str,
    ) -> pipeline_orchestrator::Result<String> {
        Ok(self.upload(bytes, suggested_name).await?)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Job id from a `/prompt` response
pub fn parse_prompt_id(body: &Value) -> Result<String> {
    body.get("prompt_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ClientError::InvalidResponse(format!("no prompt_id in {body}")))
}

/// Name a graph must use to load an uploaded image
pub fn input_reference(body: &Value) -> Result<String> {
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::InvalidResponse(format!("no name in {body}")))?;
    match body.get("subfolder").and_then(Value::as_str) {
        Some(subfolder) if !subfolder.is_empty() => Ok(format!("{subfolder}/{name}")),
        _ => Ok(name.to_string()),
    }
}

/// Download URL for an artifact
pub fn view_url(base_url: &str, artifact: &ArtifactRef) -> Result<Url> {
    Url::parse_with_params(
        &format!("{}{}", base_url.trim_end_matches('/'), endpoints::VIEW),
        [
            ("filename", artifact.filename.as_str()),
            ("subfolder", artifact.subfolder.as_str()),
            ("type", artifact.kind.as_str()),
        ],
    )
    .map_err(|e| ClientError::InvalidResponse(format!("invalid view URL: {e}")))
}

fn mime_for(name: &str) -> &'static str {
    let extension = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/png",
    }
}
