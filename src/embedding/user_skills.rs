use std::sync::Arc;

use crate::embedding::cache::EmbeddingCache;
use crate::embedding::fetcher::EmbeddingFetcher;
use crate::embedding::types::EmbeddingVector;
use crate::errors::{JobAlertError, JobAlertResult};
use crate::preferences::PreferenceStore;

/// Derives a user's skills embedding from stored preferences and memoizes it
/// in an injected [`EmbeddingCache`].
pub struct UserSkillsEmbedder {
    fetcher: Arc<EmbeddingFetcher>,
    store: Arc<dyn PreferenceStore>,
    cache: Arc<EmbeddingCache>,
}

impl UserSkillsEmbedder {
    pub fn new(
        fetcher: Arc<EmbeddingFetcher>,
        store: Arc<dyn PreferenceStore>,
        cache: Arc<EmbeddingCache>,
    ) -> Self {
        Self { fetcher, store, cache }
    }

    pub async fn get_user_skills_embedding(&self, user_id: &str) -> JobAlertResult<EmbeddingVector> {
        if let Some(vector) = self.cache.get(user_id).await {
            tracing::debug!(user_id, "skills embedding served from cache");
            return Ok(vector);
        }

        let prefs = self.store.load(user_id).await?.ok_or_else(|| {
            JobAlertError::Config(format!("no preferences found for user '{user_id}'"))
        })?;

        let skills = prefs.listed_skills();
        if skills.is_empty() {
            return Err(JobAlertError::Config(format!(
                "user '{user_id}' has no skills configured"
            )));
        }

        let text = skills.join(", ");
        tracing::info!(user_id, skills = skills.len(), "computing skills embedding");

        let vector = self.fetcher.fetch_embedding(&text).await?;
        self.cache.set(user_id, vector.clone()).await;
        Ok(vector)
    }

    /// Drop the cached vector so the next call recomputes it.
    pub async fn reset(&self) {
        self.cache.clear().await;
        tracing::debug!("skills embedding cache cleared");
    }
}
