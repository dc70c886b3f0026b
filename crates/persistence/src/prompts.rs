//! Prompt/voice configuration lookup

use std::collections::HashMap;

use async_trait::async_trait;
use callbridge_core::PromptConfig;
use chrono::Utc;
use parking_lot::RwLock;

use crate::{PersistenceError, ScyllaClient};

/// Prompt configuration store trait
#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Resolve a prompt reference to its configuration. Returns `None` for
    /// unknown identifiers so callers can fall back to defaults.
    async fn resolve(&self, prompt_id: &str) -> Result<Option<PromptConfig>, PersistenceError>;

    /// Create or replace a prompt configuration
    async fn upsert(&self, prompt_id: &str, config: &PromptConfig) -> Result<(), PersistenceError>;
}

/// ScyllaDB implementation of the prompt store
#[derive(Clone)]
pub struct ScyllaPromptStore {
    client: ScyllaClient,
}

impl ScyllaPromptStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PromptStore for ScyllaPromptStore {
    async fn resolve(&self, prompt_id: &str) -> Result<Option<PromptConfig>, PersistenceError> {
        let query = format!(
            "SELECT system_prompt, greeting, voice_id FROM {}.prompts WHERE prompt_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (prompt_id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                let (system_prompt, greeting, voice_id): (String, String, String) = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                return Ok(Some(PromptConfig { system_prompt, greeting, voice_id }));
            }
        }

        Ok(None)
    }

    async fn upsert(&self, prompt_id: &str, config: &PromptConfig) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.prompts (prompt_id, system_prompt, greeting, voice_id, updated_at)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    prompt_id,
                    &config.system_prompt,
                    &config.greeting,
                    &config.voice_id,
                    Utc::now().timestamp_millis(),
                ),
            )
            .await?;

        tracing::info!(prompt_id = %prompt_id, voice_id = %config.voice_id, "Prompt config upserted");
        Ok(())
    }
}

/// In-memory prompt store, used when persistence is disabled and in tests
#[derive(Default)]
pub struct InMemoryPromptStore {
    prompts: RwLock<HashMap<String, PromptConfig>>,
}

impl InMemoryPromptStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PromptStore for InMemoryPromptStore {
    async fn resolve(&self, prompt_id: &str) -> Result<Option<PromptConfig>, PersistenceError> {
        Ok(self.prompts.read().get(prompt_id).cloned())
    }

    async fn upsert(&self, prompt_id: &str, config: &PromptConfig) -> Result<(), PersistenceError> {
        self.prompts.write().insert(prompt_id.to_string(), config.clone());
        Ok(())
    }
}
