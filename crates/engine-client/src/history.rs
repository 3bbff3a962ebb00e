//! Parsing of the engine's job history records

use pipeline_orchestrator::{ArtifactRef, JobOutputs, MediaKind};
use serde_json::Value;

use crate::constants::STATUS_SUCCESS;
use crate::error::{ClientError, Result};

/// Output keys the engine uses per node, with the media they carry
///
/// Video-combining nodes report under `gifs` even for mp4 output.
const OUTPUT_KEYS: [(&str, MediaKind); 4] = [
    ("images", MediaKind::Image),
    ("gifs", MediaKind::Video),
    ("videos", MediaKind::Video),
    ("audio", MediaKind::Audio),
];

/// Interpret a `/history/{id}` response body
///
/// Returns `Ok(None)` while the job has not yet been recorded, the collected
/// outputs once it finished successfully, and `JobFailed` otherwise.
pub fn parse_history(job_id: &str, body: &Value) -> Result<Option<JobOutputs>> {
    let Some(entry) = body.get(job_id) else {
        return Ok(None);
    };

    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(Value::as_str)
        .unwrap_or("unknown");

    if status_str != STATUS_SUCCESS {
        let mut message = format!("Workflow failed with status: {status_str}");
        if let Some(messages) = status
            .and_then(|s| s.get("messages"))
            .and_then(Value::as_array)
            .filter(|m| !m.is_empty())
        {
            message.push_str(&format!(", messages: {}", Value::Array(messages.clone())));
        }
        return Err(ClientError::JobFailed(message));
    }

    collect_outputs(entry).map(Some)
}

fn collect_outputs(entry: &Value) -> Result<JobOutputs> {
    let mut outputs = JobOutputs::new();
    let Some(nodes) = entry.get("outputs").and_then(Value::as_object) else {
        return Ok(outputs);
    };

    for (node_id, node_output) in nodes {
        for (key, media) in OUTPUT_KEYS {
            let Some(files) = node_output.get(key).and_then(Value::as_array) else {
                continue;
            };
            for file in files {
                outputs = outputs.with_artifact(node_id.as_str(), parse_artifact(file, media)?);
            }
        }
    }
    Ok(outputs)
}

fn parse_artifact(file: &Value, media: MediaKind) -> Result<ArtifactRef> {
    let filename = file
        .get("filename")
        .and_then(Value::as_str)
        .ok_or_else(|| ClientError::InvalidResponse("output entry without filename".into()))?;
    let field = |name: &str, default: &str| {
        file.get(name)
            .and_then(Value::as_str)
            .unwrap_or(default)
            .to_string()
    };

    Ok(ArtifactRef {
        filename: filename.to_string(),
        subfolder: field("subfolder", ""),
        kind: field("type", "output"),
        media,
    })
}
