//! Pipeline executor
//!
//! Runs a base generation, then an optional refine pass and an optional
//! upscale pass, feeding each stage's artifact into the next. Stages run
//! strictly one after another; the first failure stops the run and is
//! returned together with the step log gathered so far. Artifacts already
//! written stay on disk.

use std::path::{Path, PathBuf};

use graph_compiler::{
    CompileError, CompiledGraph, GraphCompiler, Img2ImgParams, Resize, UpscaleParams,
};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::client::{ArtifactRef, ExecutionClient};
use crate::config::OrchestratorConfig;
use crate::constants::stages;
use crate::error::{PipelineError, PipelineFailure, Result};
use crate::events::{EventSink, PipelineEvent};
use crate::request::{hires_dimension, HiresFix, PipelineRequest, UpscaleOptions};

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    /// Stage `i` (0-based) is compiling, running or downloading
    StageRunning(usize),
    /// Stage `i` produced its artifact
    StageSucceeded(usize),
    Completed,
    Failed,
}

/// One entry of the step log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub stage: String,
    pub success: bool,
    pub artifact_path: Option<PathBuf>,
    pub error: Option<String>,
}

impl StepRecord {
    fn succeeded(stage: &str, path: PathBuf) -> Self {
        Self {
            stage: stage.to_string(),
            success: true,
            artifact_path: Some(path),
            error: None,
        }
    }

    fn failed(stage: &str, error: &PipelineError) -> Self {
        Self {
            stage: stage.to_string(),
            success: false,
            artifact_path: None,
            error: Some(error.to_string()),
        }
    }
}

/// The record of one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub execution_id: String,
    pub state: PipelineState,
    /// Step log, in execution order
    pub steps: Vec<StepRecord>,
    /// Seed used by the base stage
    pub seed: Option<u64>,
    /// Most recent artifact written; the result when the run completes
    pub final_artifact: Option<PathBuf>,
}

impl PipelineRun {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            state: PipelineState::Pending,
            steps: Vec::new(),
            seed: None,
            final_artifact: None,
        }
    }

    /// Stage names of the step log, in order
    pub fn stage_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.stage.as_str()).collect()
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!(
            "Pipeline {}: {:?} -> {:?}",
            self.execution_id,
            self.state,
            next
        );
        self.state = next;
    }
}

/// A compiled graph plus the node whose output the stage hands on
#[derive(Debug, Clone)]
pub struct PipelineStage {
    pub name: String,
    pub compiled: CompiledGraph,
}

impl PipelineStage {
    pub fn new(name: impl Into<String>, compiled: CompiledGraph) -> Self {
        Self {
            name: name.into(),
            compiled,
        }
    }

    /// Node whose output is this stage's artifact
    pub fn output_node(&self) -> &str {
        &self.compiled.output_node
    }
}

/// Artifact of a finished stage, both on disk and engine-side
#[derive(Debug, Clone)]
struct StageArtifact {
    path: PathBuf,
    artifact: ArtifactRef,
}

/// Sequences compiled graphs against an execution client
///
/// Holds no per-run state; independent runs may share one orchestrator.
pub struct PipelineOrchestrator<C: ExecutionClient> {
    client: C,
    compiler: GraphCompiler,
    config: OrchestratorConfig,
}

impl<C: ExecutionClient> PipelineOrchestrator<C> {
    /// Create an orchestrator using `config.compiler` for graph compilation
    pub fn new(client: C, config: OrchestratorConfig) -> Self {
        Self {
            client,
            compiler: GraphCompiler::new(config.compiler.clone()),
            config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn compiler(&self) -> &GraphCompiler {
        &self.compiler
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run every stage `request` enables
    ///
    /// On success the run is `Completed` and `final_artifact` points at the
    /// last stage's file. On failure the run is `Failed` and carries the
    /// step log up to and including the failing stage.
    pub async fn execute_pipeline(
        &self,
        request: &PipelineRequest,
        events: &dyn EventSink,
    ) -> std::result::Result<PipelineRun, PipelineFailure> {
        let mut run = PipelineRun::new(format!("pipe-{}", uuid::Uuid::new_v4()));
        log::info!(
            "Pipeline {} started with {} stage(s)",
            run.execution_id,
            request.stage_count()
        );
        let _ = events.send(PipelineEvent::PipelineStarted {
            execution_id: run.execution_id.clone(),
            stage_count: request.stage_count(),
        });

        match self.run_stages(request, &mut run, events).await {
            Ok(()) => {
                run.transition(PipelineState::Completed);
                let artifact_path = run
                    .final_artifact
                    .as_deref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default();
                log::info!("Pipeline {} completed: {}", run.execution_id, artifact_path);
                let _ = events.send(PipelineEvent::PipelineCompleted {
                    execution_id: run.execution_id.clone(),
                    artifact_path,
                    seed: run.seed,
                });
                Ok(run)
            }
            Err(error) => {
                run.transition(PipelineState::Failed);
                let _ = events.send(PipelineEvent::PipelineFailed {
                    execution_id: run.execution_id.clone(),
                    error: error.to_string(),
                });
                Err(PipelineFailure { run, error })
            }
        }
    }

    async fn run_stages(
        &self,
        request: &PipelineRequest,
        run: &mut PipelineRun,
        events: &dyn EventSink,
    ) -> Result<()> {
        let index = self.begin_stage(run, stages::BASE, events);
        let outcome = self.base_stage(request, run, events).await;
        let mut current = self.conclude_stage(run, index, stages::BASE, outcome, events)?;

        if let Some(hires) = &request.hires_fix {
            let index = self.begin_stage(run, stages::REFINE, events);
            let outcome = self.refine_stage(request, hires, &current, run, events).await;
            current = self.conclude_stage(run, index, stages::REFINE, outcome, events)?;
        }

        if let Some(upscale) = &request.upscale {
            let index = self.begin_stage(run, stages::UPSCALE, events);
            let outcome = self.upscale_stage(request, upscale, &current, run, events).await;
            self.conclude_stage(run, index, stages::UPSCALE, outcome, events)?;
        }

        Ok(())
    }

    async fn base_stage(
        &self,
        request: &PipelineRequest,
        run: &mut PipelineRun,
        events: &dyn EventSink,
    ) -> Result<StageArtifact> {
        let compiled = request.base.compile(&self.compiler)?;
        run.seed = compiled.seed;
        let stage = PipelineStage::new(stages::BASE, compiled);
        self.submit_stage(&stage, &run.execution_id, events).await
    }

    async fn refine_stage(
        &self,
        request: &PipelineRequest,
        hires: &HiresFix,
        current: &StageArtifact,
        run: &PipelineRun,
        events: &dyn EventSink,
    ) -> Result<StageArtifact> {
        let scale = hires.scale.unwrap_or(self.config.hires.scale);
        if !(scale > 0.0 && scale.is_finite()) {
            return Err(CompileError::invalid("hires_fix.scale", "must be a positive number").into());
        }
        let resize = match request.base.known_size() {
            Some((width, height)) => Resize::To {
                width: hires_dimension(width, scale)?,
                height: hires_dimension(height, scale)?,
            },
            None => Resize::By { scale },
        };

        let mut base = request.base.prompt().clone();
        base.sampler.steps = Some(hires.steps.unwrap_or(self.config.hires.steps));
        base.sampler.seed = run.seed.or(base.sampler.seed);

        let image = self.reupload(current).await?;
        let compiled = self.compiler.compile_img2img(&Img2ImgParams {
            base,
            image,
            denoise: Some(hires.denoise.unwrap_or(self.config.hires.denoise)),
            resize: Some(resize),
        })?;
        let stage = PipelineStage::new(stages::REFINE, compiled);
        self.submit_stage(&stage, &run.execution_id, events).await
    }

    async fn upscale_stage(
        &self,
        request: &PipelineRequest,
        upscale: &UpscaleOptions,
        current: &StageArtifact,
        run: &PipelineRun,
        events: &dyn EventSink,
    ) -> Result<StageArtifact> {
        let image = self.reupload(current).await?;
        let compiled = self.compiler.compile_upscale(&UpscaleParams {
            image,
            upscale_model: upscale.upscale_model.clone(),
            width: upscale.width,
            height: upscale.height,
            method: upscale.method.clone(),
            filename_prefix: request.base.prompt().filename_prefix.clone(),
        })?;
        let stage = PipelineStage::new(stages::UPSCALE, compiled);
        self.submit_stage(&stage, &run.execution_id, events).await
    }

    /// Hand the previous stage's file back to the engine as an input image
    async fn reupload(&self, current: &StageArtifact) -> Result<String> {
        let bytes = fs::read(&current.path).await?;
        let name = self
            .client
            .upload_input_image(bytes, &current.artifact.filename)
            .await?;
        log::debug!("Re-uploaded {:?} as '{}'", current.path, name);
        Ok(name)
    }

    /// Submit, wait, download and store one stage's artifact
    async fn submit_stage(
        &self,
        stage: &PipelineStage,
        execution_id: &str,
        events: &dyn EventSink,
    ) -> Result<StageArtifact> {
        let job_id = self.client.submit(&stage.compiled.graph).await?;
        log::info!("Stage '{}' queued as job {}", stage.name, job_id);
        let _ = events.send(PipelineEvent::JobQueued {
            execution_id: execution_id.to_string(),
            stage: stage.name.clone(),
            job_id: job_id.clone(),
        });

        let outputs = self.client.await_completion(&job_id, events).await?;
        let artifact = match outputs.for_node(stage.output_node()) {
            [] => {
                return Err(PipelineError::engine(format!(
                    "Job {} produced no output for node '{}'",
                    job_id,
                    stage.output_node()
                )))
            }
            [first, rest @ ..] => {
                if !rest.is_empty() {
                    log::warn!(
                        "Job {} produced {} artifacts; keeping '{}'",
                        job_id,
                        rest.len() + 1,
                        first.filename
                    );
                }
                first.clone()
            }
        };

        let bytes = self.client.fetch_artifact_bytes(&artifact).await?;
        let path = self.artifact_path(execution_id, &stage.name, &artifact.filename)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        Ok(StageArtifact { path, artifact })
    }

    fn artifact_path(&self, execution_id: &str, stage: &str, filename: &str) -> Result<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| PipelineError::engine(format!("Unusable artifact name '{}'", filename)))?;
        Ok(self
            .config
            .output_dir
            .join(execution_id)
            .join(format!("{}_{}", stage, name.to_string_lossy())))
    }

    fn begin_stage(&self, run: &mut PipelineRun, name: &str, events: &dyn EventSink) -> usize {
        let index = run.steps.len();
        run.transition(PipelineState::StageRunning(index));
        let _ = events.send(PipelineEvent::StageStarted {
            execution_id: run.execution_id.clone(),
            stage: name.to_string(),
            index,
        });
        index
    }

    fn conclude_stage(
        &self,
        run: &mut PipelineRun,
        index: usize,
        name: &str,
        outcome: Result<StageArtifact>,
        events: &dyn EventSink,
    ) -> Result<StageArtifact> {
        match outcome {
            Ok(stage_artifact) => {
                let path = stage_artifact.path.clone();
                log::info!("Stage '{}' wrote {:?}", name, path);
                run.steps.push(StepRecord::succeeded(name, path.clone()));
                run.final_artifact = Some(path.clone());
                run.transition(PipelineState::StageSucceeded(index));
                let _ = events.send(PipelineEvent::StageCompleted {
                    execution_id: run.execution_id.clone(),
                    stage: name.to_string(),
                    artifact_path: path.display().to_string(),
                });
                Ok(stage_artifact)
            }
            Err(error) => {
                log::error!("Stage '{}' of {} failed: {}", name, run.execution_id, error);
                run.steps.push(StepRecord::failed(name, &error));
                let _ = events.send(PipelineEvent::StageFailed {
                    execution_id: run.execution_id.clone(),
                    stage: name.to_string(),
                    error: error.to_string(),
                });
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChannelEventSink, NullEventSink, VecEventSink};
    use crate::request::BaseGeneration;
    use crate::testing::MockClient;
    use graph_compiler::constants::ids;
    use graph_compiler::constants::ops;
    use graph_compiler::{PromptParams, Txt2ImgParams};

    fn orchestrator(client: MockClient, dir: &Path) -> PipelineOrchestrator<MockClient> {
        PipelineOrchestrator::new(client, OrchestratorConfig::default().with_output_dir(dir))
    }

    fn txt2img(seed: Option<u64>) -> BaseGeneration {
        let mut base = PromptParams::new("a lighthouse").with_model("m.safetensors");
        base.sampler.seed = seed;
        BaseGeneration::Txt2Img(Txt2ImgParams {
            base,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_three_stage_run() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());
        let request = PipelineRequest::new(txt2img(Some(1234)))
            .with_hires_fix(HiresFix::default())
            .with_upscale(UpscaleOptions::default());

        let run = orchestrator
            .execute_pipeline(&request, &NullEventSink)
            .await
            .unwrap();

        assert_eq!(run.stage_names(), vec!["base", "refine", "upscale"]);
        assert!(run.steps.iter().all(|s| s.success));
        assert_eq!(run.state, PipelineState::Completed);
        assert_eq!(run.seed, Some(1234));

        let expected = dir.path().join(&run.execution_id).join("upscale_job-3.png");
        assert_eq!(run.final_artifact.as_deref(), Some(expected.as_path()));
        for step in &run.steps {
            assert!(step.artifact_path.as_ref().unwrap().exists());
        }
        let written = std::fs::read(&expected).unwrap();
        assert_eq!(written, b"pixels of job-3.png");
    }

    #[tokio::test]
    async fn test_single_stage_run() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());

        let run = orchestrator
            .execute_pipeline(&PipelineRequest::new(txt2img(None)), &NullEventSink)
            .await
            .unwrap();

        assert_eq!(run.stage_names(), vec!["base"]);
        assert!(run.seed.is_some());
        assert!(orchestrator.client().uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refine_graph_settings() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());
        let request = PipelineRequest::new(txt2img(Some(77))).with_hires_fix(HiresFix::default());

        orchestrator
            .execute_pipeline(&request, &NullEventSink)
            .await
            .unwrap();

        let graphs = orchestrator.client().submitted();
        assert_eq!(graphs.len(), 2);
        let refine = &graphs[1];
        let resize = refine.node(ids::RESIZE).unwrap();
        assert_eq!(resize.literal("width").unwrap(), 768);
        assert_eq!(resize.literal("height").unwrap(), 1152);

        let sampler = refine.node(ids::SAMPLER).unwrap();
        assert_eq!(sampler.literal("denoise").unwrap(), 0.4);
        assert_eq!(sampler.literal("steps").unwrap(), 20);
        assert_eq!(sampler.literal("seed").unwrap(), 77);

        let uploads = orchestrator.client().uploads.lock().unwrap();
        assert_eq!(uploads[0].0, "pipeline/job-1.png");
        assert_eq!(
            refine.node(ids::SOURCE_IMAGE).unwrap().literal("image").unwrap(),
            "pipeline/job-1.png"
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_log() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::failing_on(2), dir.path());
        let request = PipelineRequest::new(txt2img(Some(5)))
            .with_hires_fix(HiresFix::default())
            .with_upscale(UpscaleOptions::default());

        let failure = orchestrator
            .execute_pipeline(&request, &NullEventSink)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PipelineError::Engine(_)));
        let run = &failure.run;
        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.stage_names(), vec!["base", "refine"]);
        assert!(run.steps[0].success);
        assert!(!run.steps[1].success);
        assert!(run.steps[1].error.as_ref().unwrap().contains("rejected"));
        assert_eq!(run.seed, Some(5));

        // the base artifact survives the failure
        let base = failure.last_good_artifact().unwrap();
        assert!(base.exists());
        assert_eq!(run.steps[0].artifact_path.as_deref(), Some(base));
    }

    #[tokio::test]
    async fn test_configuration_error_submits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());
        let request = PipelineRequest::new(BaseGeneration::Txt2Img(Txt2ImgParams::new("no model")));

        let failure = orchestrator
            .execute_pipeline(&request, &NullEventSink)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            PipelineError::Configuration(CompileError::MissingModel(_))
        ));
        assert_eq!(failure.run.stage_names(), vec!["base"]);
        assert!(failure.run.final_artifact.is_none());
        assert!(orchestrator.client().submitted().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_base_size_refines_by_scale() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());
        let base = BaseGeneration::Img2Img(Img2ImgParams {
            base: PromptParams::new("a lighthouse").with_model("m.safetensors"),
            image: "photo.png".to_string(),
            ..Default::default()
        });
        let request = PipelineRequest::new(base)
            .with_hires_fix(HiresFix::default())
            .with_upscale(UpscaleOptions::default());

        let run = orchestrator
            .execute_pipeline(&request, &NullEventSink)
            .await
            .unwrap();
        assert_eq!(run.stage_names(), vec!["base", "refine", "upscale"]);

        let graphs = orchestrator.client().submitted();
        let resize = graphs[1].node(ids::RESIZE).unwrap();
        assert_eq!(resize.operation, ops::IMAGE_SCALE_BY);
        assert_eq!(resize.literal("scale_by").unwrap(), 1.5);
    }

    #[tokio::test]
    async fn test_unwritable_output_dir_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();
        let orchestrator = orchestrator(MockClient::new(), &blocker);
        let request = PipelineRequest::new(txt2img(Some(9))).with_hires_fix(HiresFix::default());

        let failure = orchestrator
            .execute_pipeline(&request, &NullEventSink)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, PipelineError::Io(_)));
        assert_eq!(failure.run.state, PipelineState::Failed);
        assert_eq!(failure.run.stage_names(), vec!["base"]);
        assert!(!failure.run.steps[0].success);
        assert_eq!(failure.run.seed, Some(9));
        assert!(failure.last_good_artifact().is_none());
    }

    #[tokio::test]
    async fn test_oversized_refine_fails_before_submitting() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());
        let request = PipelineRequest::new(txt2img(Some(4))).with_hires_fix(HiresFix {
            scale: Some(1000.0),
            ..Default::default()
        });

        let failure = orchestrator
            .execute_pipeline(&request, &NullEventSink)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, PipelineError::Configuration(_)));
        assert_eq!(failure.run.stage_names(), vec!["base", "refine"]);
        assert_eq!(orchestrator.client().submitted().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_output_node_is_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockClient {
            empty_outputs: true,
            ..MockClient::new()
        };
        let orchestrator = orchestrator(client, dir.path());

        let failure = orchestrator
            .execute_pipeline(&PipelineRequest::new(txt2img(None)), &NullEventSink)
            .await
            .unwrap_err();
        assert!(matches!(&failure.error, PipelineError::Engine(msg) if msg.contains("no output")));
    }

    #[tokio::test]
    async fn test_closed_event_channel_does_not_abort_run() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);

        let run = orchestrator
            .execute_pipeline(
                &PipelineRequest::new(txt2img(Some(3))).with_hires_fix(HiresFix::default()),
                &ChannelEventSink::new(tx),
            )
            .await
            .unwrap();
        assert_eq!(run.state, PipelineState::Completed);
        assert_eq!(run.stage_names(), vec!["base", "refine"]);
    }

    #[tokio::test]
    async fn test_event_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(MockClient::new(), dir.path());
        let sink = VecEventSink::new();

        orchestrator
            .execute_pipeline(&PipelineRequest::new(txt2img(Some(1))), &sink)
            .await
            .unwrap();

        let kinds: Vec<&str> = sink
            .events()
            .iter()
            .map(|e| match e {
                PipelineEvent::PipelineStarted { .. } => "pipeline_started",
                PipelineEvent::StageStarted { .. } => "stage_started",
                PipelineEvent::JobQueued { .. } => "job_queued",
                PipelineEvent::StageProgress { .. } => "progress",
                PipelineEvent::StageCompleted { .. } => "stage_completed",
                PipelineEvent::StageFailed { .. } => "stage_failed",
                PipelineEvent::PipelineCompleted { .. } => "pipeline_completed",
                PipelineEvent::PipelineFailed { .. } => "pipeline_failed",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "pipeline_started",
                "stage_started",
                "job_queued",
                "progress",
                "stage_completed",
                "pipeline_completed"
            ]
        );
    }
}
