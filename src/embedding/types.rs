use std::sync::Arc;

use serde::Serialize;

use crate::errors::{JobAlertError, JobAlertResult};

/// Every vector returned by the provider must have exactly this many elements.
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// Task profile requested from the provider.
pub const MATCHING_TASK: &str = "text-matching";

/// A fixed-length embedding. Storage is shared and read-only, so clones are cheap
/// and always observe the same values.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Arc<[f32]>);

impl EmbeddingVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &EmbeddingVector) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for EmbeddingVector {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        self.as_slice().serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub task: &'static str,
    pub dimensions: usize,
    pub input: Vec<String>,
}

impl EmbeddingRequest {
    pub fn matching(model: &str, text: &str) -> Self {
        Self {
            model: model.to_string(),
            task: MATCHING_TASK,
            dimensions: EMBEDDING_DIMENSIONS,
            input: vec![text.to_string()],
        }
    }
}

/// Raw provider answer; classification is left to the fetcher.
#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub status: u16,
    pub body: String,
}

impl ProviderReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Extract `data[0].embedding` from a success body and validate its length.
pub fn parse_embedding(body: &str, expected: usize) -> JobAlertResult<EmbeddingVector> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| JobAlertError::Provider(format!("response is not valid JSON: {e}")))?;

    let field = json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|d| d.get("embedding"))
        .ok_or_else(|| JobAlertError::Provider("response has no data[0].embedding".into()))?;

    let items = field
        .as_array()
        .ok_or_else(|| JobAlertError::Provider("data[0].embedding is not a list".into()))?;

    if items.len() != expected {
        return Err(JobAlertError::Provider(format!(
            "embedding dimension mismatch: expected {expected}, got {}",
            items.len()
        )));
    }

    let values = items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().map(|f| f as f32).ok_or_else(|| {
                JobAlertError::Provider(format!("embedding element {i} is not a number"))
            })
        })
        .collect::<JobAlertResult<Vec<f32>>>()?;

    Ok(EmbeddingVector(values.into()))
}

#[cfg(test)]
pub(crate) fn vector_of(values: Vec<f32>) -> EmbeddingVector {
    EmbeddingVector(values.into())
}
