//! kaiwa-wire: streaming chat wire protocol
//!
//! This crate owns everything between the raw HTTP response body and
//! canonical chunks: blank-line SSE framing that survives arbitrary
//! read boundaries, normalization of the two historical event
//! vocabularies, and the streaming client that ties them together.

pub mod chunk;
pub mod client;
pub mod error;
pub mod frame;
pub mod types;

pub use chunk::{Chunk, decode_frame, stage_progress};
pub use client::{ChatClient, ChunkStream};
pub use error::{DecodeError, Error, Result};
pub use frame::{FrameReader, StreamFrame};
pub use types::{Api, ChatRequest, ContextItem, Timing};
