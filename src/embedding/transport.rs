use std::time::Duration;

use async_trait::async_trait;

use crate::embedding::types::{EmbeddingRequest, ProviderReply};
use crate::errors::JobAlertResult;

/// One round trip to the embedding provider.
///
/// Implementations return the raw status and body for every HTTP answer and
/// an error only for network-level failures (connect, timeout, body read).
#[async_trait]
pub trait EmbeddingTransport: Send + Sync {
    async fn send(&self, api_key: &str, request: &EmbeddingRequest) -> JobAlertResult<ProviderReply>;
}

pub struct HttpEmbeddingTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpEmbeddingTransport {
    pub fn new(endpoint: String, timeout: Duration) -> JobAlertResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl EmbeddingTransport for HttpEmbeddingTransport {
    async fn send(&self, api_key: &str, request: &EmbeddingRequest) -> JobAlertResult<ProviderReply> {
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %request.model,
            input_len = request.input.iter().map(String::len).sum::<usize>(),
            "sending embedding request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ProviderReply { status, body })
    }
}
