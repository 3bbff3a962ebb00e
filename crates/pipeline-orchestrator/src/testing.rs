//! In-memory execution client for tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use graph_compiler::constants::ops;
use graph_compiler::Graph;

use crate::client::{ArtifactRef, ExecutionClient, JobOutputs};
use crate::error::{PipelineError, Result};
use crate::events::{EventSink, PipelineEvent};

/// Answers every job with one image from its first saver node
#[derive(Default)]
pub(crate) struct MockClient {
    pub submissions: AtomicUsize,
    /// 1-based submission number that the engine rejects
    pub fail_on_submission: Option<usize>,
    /// Report no outputs at all
    pub empty_outputs: bool,
    pub graphs: Mutex<Vec<Graph>>,
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(submission: usize) -> Self {
        Self {
            fail_on_submission: Some(submission),
            ..Self::default()
        }
    }

    pub fn submitted(&self) -> Vec<Graph> {
        self.graphs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionClient for MockClient {
    async fn submit(&self, graph: &Graph) -> Result<String> {
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_submission == Some(n) {
            return Err(PipelineError::engine(format!("engine rejected job {}", n)));
        }
        self.graphs.lock().unwrap().push(graph.clone());
        Ok(format!("job-{}", n))
    }

    async fn await_completion(&self, job_id: &str, events: &dyn EventSink) -> Result<JobOutputs> {
        let _ = events.send(PipelineEvent::progress(job_id, 1.0, None));
        if self.empty_outputs {
            return Ok(JobOutputs::new());
        }
        let index: usize = job_id
            .trim_start_matches("job-")
            .parse()
            .map_err(|_| PipelineError::engine("bad job id"))?;
        let graphs = self.graphs.lock().unwrap();
        let graph = graphs
            .get(index - 1)
            .ok_or_else(|| PipelineError::engine("unknown job"))?;
        let saver = graph
            .nodes_with_operation(ops::SAVE_IMAGE)
            .first()
            .map(|n| n.id.clone())
            .ok_or_else(|| PipelineError::engine("no saver"))?;
        Ok(JobOutputs::new().with_artifact(saver, ArtifactRef::image(format!("{}.png", job_id))))
    }

    async fn fetch_artifact_bytes(&self, artifact: &ArtifactRef) -> Result<Vec<u8>> {
        Ok(format!("pixels of {}", artifact.filename).into_bytes())
    }

    async fn upload_input_image(&self, bytes: Vec<u8>, suggested_name: &str) -> Result<String> {
        let name = format!("pipeline/{}", suggested_name);
        self.uploads.lock().unwrap().push((name.clone(), bytes));
        Ok(name)
    }
}
