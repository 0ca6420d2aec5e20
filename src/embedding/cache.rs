use tokio::sync::RwLock;

use crate::embedding::types::EmbeddingVector;

/// Single-slot embedding cache. The slot remembers which key filled it; a read
/// under another key misses, and the next `set` overwrites the slot.
///
/// Two cold callers racing on the same key may both compute and both `set`;
/// the last write wins and the values are expected to be equal.
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    slot: RwLock<Option<(String, EmbeddingVector)>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<EmbeddingVector> {
        match &*self.slot.read().await {
            Some((cached_key, vector)) if cached_key == key => Some(vector.clone()),
            _ => None,
        }
    }

    pub async fn set(&self, key: &str, vector: EmbeddingVector) {
        *self.slot.write().await = Some((key.to_string(), vector));
    }

    pub async fn clear(&self) {
        *self.slot.write().await = None;
    }

    pub async fn is_empty(&self) -> bool {
        self.slot.read().await.is_none()
    }
}
