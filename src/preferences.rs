use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::{JobAlertError, JobAlertResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub skills: Vec<String>,
}

impl UserPreferences {
    pub fn new(user_id: impl Into<String>, skills: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            skills,
        }
    }

    /// Skills as stored, minus entries that are empty or whitespace only.
    pub fn listed_skills(&self) -> Vec<&str> {
        self.skills
            .iter()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .collect()
    }
}

/// Read access to stored user preference records.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn load(&self, user_id: &str) -> JobAlertResult<Option<UserPreferences>>;
}

#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    records: RwLock<HashMap<String, UserPreferences>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, prefs: UserPreferences) {
        self.records
            .write()
            .await
            .insert(prefs.user_id.clone(), prefs);
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn load(&self, user_id: &str) -> JobAlertResult<Option<UserPreferences>> {
        Ok(self.records.read().await.get(user_id).cloned())
    }
}

#[derive(Debug, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    users: Vec<UserPreferences>,
}

/// Preference records kept in a TOML file of `[[users]]` tables.
/// The file is re-read on every load so edits are picked up.
pub struct TomlPreferenceStore {
    path: PathBuf,
}

impl TomlPreferenceStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl PreferenceStore for TomlPreferenceStore {
    async fn load(&self, user_id: &str) -> JobAlertResult<Option<UserPreferences>> {
        if !self.path.exists() {
            return Err(JobAlertError::Config(format!(
                "preferences file {} not found",
                self.path.display()
            )));
        }

        let content = tokio::fs::read_to_string(&self.path).await?;
        let file: PreferencesFile = toml::from_str(&content).map_err(|e| {
            JobAlertError::Store(format!("failed to parse {}: {e}", self.path.display()))
        })?;

        tracing::debug!(
            path = %self.path.display(),
            users = file.users.len(),
            "preferences file read"
        );
        Ok(file.users.into_iter().find(|u| u.user_id == user_id))
    }
}
