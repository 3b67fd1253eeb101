//! Streaming HTTP client for the chat backend
//!
//! One POST per turn; the long-lived response body is consumed through
//! [`FrameReader`] and [`decode_frame`] into a stream of canonical
//! chunks. The caller's `CancellationToken` is consulted before every
//! body read, so an abort stops pulling promptly and drops the
//! connection without waiting for the backend.

use std::pin::Pin;

use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;

use crate::chunk::{Chunk, decode_frame};
use crate::error::{Error, Result};
use crate::frame::FrameReader;
use crate::types::{Api, ChatRequest};

/// A stream of decoded chunks; an `Err` item is fatal and terminates it
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk>> + Send>>;

/// Client for one chat backend
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api: Api,
}

impl ChatClient {
    /// Create a client for the given backend base URL and endpoint generation
    pub fn new(base_url: impl Into<String>, api: Api) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api)
    }

    /// Create a client reusing an existing `reqwest::Client`
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>, api: Api) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client,
            base_url,
            api,
        }
    }

    /// Which endpoint generation this client targets
    pub fn api(&self) -> Api {
        self.api
    }

    /// Open one streaming turn.
    ///
    /// `token` is an externally-acquired bearer credential; `None` sends
    /// the request unauthenticated. Returns an error only for failures
    /// before any frame can arrive (connect failure, non-2xx status);
    /// everything after that is reported through the stream items.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        token: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let url = format!("{}{}", self.base_url, self.api.path());

        let mut builder = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(request);
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = error_detail(response).await;
            if status.as_u16() == 401 {
                tracing::warn!("authentication rejected: {detail}");
            }
            return Err(Error::api(status.as_u16(), detail));
        }

        let mut body = response.bytes_stream();

        Ok(Box::pin(stream! {
            let mut reader = FrameReader::new();

            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = body.next() => next,
                };
                let Some(read) = next else {
                    // Normal end of body
                    break;
                };

                let bytes = match read {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(Error::Http(e));
                        return;
                    }
                };

                for frame in reader.push(&bytes) {
                    match decode_frame(&frame) {
                        Ok(chunk) => {
                            let terminal = chunk.is_terminal();
                            yield Ok(chunk);
                            if terminal {
                                return;
                            }
                        }
                        Err(e) => {
                            tracing::debug!("skipping undecodable frame: {e}");
                        }
                    }
                }
            }

            // A turn that never completed explicitly is a transport
            // failure; a cancelled turn is the caller's doing.
            if !cancel.is_cancelled() {
                yield Err(Error::Sse(
                    "stream closed before a done or error chunk".to_string(),
                ));
            }
        }))
    }
}

/// Pull the `detail` field out of an error body, falling back to the
/// status line when the body is not the expected JSON shape.
async fn error_detail(response: reqwest::Response) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        detail: serde_json::Value,
    }

    let status = response.status();
    let fallback = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    match response.text().await {
        Ok(body) => match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => match parsed.detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
            Err(_) if !body.is_empty() => body,
            Err(_) => fallback,
        },
        Err(_) => fallback,
    }
}
