//! Canonical chunk types and payload decoding
//!
//! The backend has shipped two event vocabularies: the legacy stream
//! endpoint emits `status`/`text` kinds with millisecond timing fields,
//! the newer progress endpoint emits `progress`/`content` kinds with
//! second-based timings. Everything vocabulary-specific is normalized
//! here, in one place; the rest of the workspace only ever sees
//! [`Chunk`].

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::frame::StreamFrame;
use crate::types::{ContextItem, Timing};

/// The canonical, version-independent form of one decoded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    /// Backend pipeline stage update
    Status {
        /// Stage name (e.g. `searching`, `generating`)
        stage: String,
        /// Human-readable stage description, when the backend sent one
        message: Option<String>,
        /// Percent complete, 0-100
        progress: u8,
    },
    /// Retrieved-context set for the turn; replaces any earlier set
    Context { items: Vec<ContextItem> },
    /// Incremental assistant text
    ContentDelta { text: String },
    /// Turn completed
    Done {
        timing: Timing,
        suggested_terms: Vec<String>,
    },
    /// Turn failed on the backend
    Error { reason: String },
}

impl Chunk {
    /// Check if this chunk ends the turn (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Chunk::Done { .. } | Chunk::Error { .. })
    }
}

/// Percent complete for a named pipeline stage.
///
/// Unknown stages map to 0 rather than erroring; the backend is free to
/// add stages without breaking older clients.
pub fn stage_progress(stage: &str) -> u8 {
    match stage {
        "optimizing" => 10,
        "searching" => 30,
        "reranking" => 60,
        "generating" => 80,
        _ => 0,
    }
}

/// Decode one frame's payload into a canonical [`Chunk`].
///
/// Failures here are per-frame and recoverable: the caller skips the
/// frame and keeps reading.
pub fn decode_frame(frame: &StreamFrame) -> Result<Chunk, DecodeError> {
    let raw: RawChunk = serde_json::from_str(&frame.data)?;

    match raw.kind.as_str() {
        "status" | "progress" => {
            let stage = raw.status.unwrap_or_default();
            let progress = raw
                .progress
                .map(|p| p.clamp(0.0, 100.0) as u8)
                .unwrap_or_else(|| stage_progress(&stage));
            Ok(Chunk::Status {
                stage,
                message: raw.metadata.message,
                progress,
            })
        }
        "text" | "content" => Ok(Chunk::ContentDelta {
            text: raw.content.unwrap_or_default(),
        }),
        "context" => Ok(Chunk::Context {
            items: raw.context.unwrap_or_default(),
        }),
        "done" => Ok(Chunk::Done {
            timing: raw.metadata.timing(),
            suggested_terms: raw.suggested_terms.unwrap_or_default(),
        }),
        "error" => Ok(Chunk::Error {
            reason: raw
                .error
                .or(raw.metadata.error)
                .unwrap_or_else(|| "unknown backend error".to_string()),
        }),
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

/// Superset of both wire vocabularies, straight off the JSON
#[derive(Debug, Deserialize)]
struct RawChunk {
    #[serde(rename = "type")]
    kind: String,
    status: Option<String>,
    progress: Option<f64>,
    content: Option<String>,
    context: Option<Vec<ContextItem>>,
    suggested_terms: Option<Vec<String>>,
    error: Option<String>,
    #[serde(default)]
    metadata: RawMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct RawMetadata {
    message: Option<String>,
    error: Option<String>,
    // Legacy vocabulary: already milliseconds
    search_time_ms: Option<f64>,
    generation_time_ms: Option<f64>,
    total_time_ms: Option<f64>,
    // Newer vocabulary: seconds
    search_duration: Option<f64>,
    total_duration: Option<f64>,
}

impl RawMetadata {
    fn timing(&self) -> Timing {
        Timing {
            search_ms: as_ms(self.search_time_ms).or(secs_to_ms(self.search_duration)),
            generation_ms: as_ms(self.generation_time_ms),
            total_ms: as_ms(self.total_time_ms).or(secs_to_ms(self.total_duration)),
        }
    }
}

fn as_ms(value: Option<f64>) -> Option<u64> {
    value.map(|v| v.max(0.0).round() as u64)
}

fn secs_to_ms(value: Option<f64>) -> Option<u64> {
    value.map(|v| (v.max(0.0) * 1000.0).round() as u64)
}
