//! Engine Client - HTTP transport for the node-graph engine
//!
//! Implements [`pipeline_orchestrator::ExecutionClient`] against the engine's
//! HTTP API:
//!
//! - `POST /prompt` queues a compiled graph
//! - `GET /history/{id}` is polled until the job is recorded
//! - `GET /view` downloads artifacts
//! - `POST /upload/image` stores intermediate images for later stages
//! - `GET /system_stats` answers health probes
//!
//! ```no_run
//! use engine_client::{ClientConfig, HttpExecutionClient};
//! use pipeline_orchestrator::{OrchestratorConfig, PipelineOrchestrator};
//!
//! let client = HttpExecutionClient::new(ClientConfig::default());
//! let orchestrator = PipelineOrchestrator::new(client, OrchestratorConfig::default());
//! # let _ = orchestrator;
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod history;

pub use client::{input_reference, parse_prompt_id, view_url, HttpExecutionClient};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use history::parse_history;
