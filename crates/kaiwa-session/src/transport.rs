//! Transport abstraction between the session controller and the wire

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use kaiwa_wire::{ChatClient, ChatRequest, ChunkStream};

use crate::error::Result;

/// Opens one chunk stream per turn.
///
/// The session controller owns exactly one open stream at a time; the
/// cancellation token it passes in must stop reads promptly when
/// signalled.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the stream for one turn
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream>;
}

/// Production transport: HTTP POST against the chat backend
pub struct HttpTransport {
    client: ChatClient,
    auth_token: Option<String>,
}

impl HttpTransport {
    /// Create a transport without credentials
    pub fn new(client: ChatClient) -> Self {
        Self {
            client,
            auth_token: None,
        }
    }

    /// Attach an externally-acquired bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        Ok(self
            .client
            .stream(request, self.auth_token.as_deref(), cancel)
            .await?)
    }
}
