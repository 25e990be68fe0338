use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

use burrowbot_common::traits::repository_traits::BotConfigRepository;

use crate::Error;

/// In-process implementation of [`BotConfigRepository`]. Durable storage
/// is an external concern; this keeps settings for the lifetime of the
/// process and forwards `publish` to a broadcast channel the supervisor
/// loop subscribes to.
pub struct MemoryBotConfigRepository {
    values: DashMap<String, String>,
    topics: broadcast::Sender<String>,
}

impl MemoryBotConfigRepository {
    pub fn new() -> Self {
        let (topics, _) = broadcast::channel(16);
        Self {
            values: DashMap::new(),
            topics,
        }
    }

    /// Receiver for topics emitted through `publish`.
    pub fn subscribe_topics(&self) -> broadcast::Receiver<String> {
        self.topics.subscribe()
    }
}

impl Default for MemoryBotConfigRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BotConfigRepository for MemoryBotConfigRepository {
    async fn get_value(&self, config_key: &str) -> Result<Option<String>, Error> {
        Ok(self.values.get(config_key).map(|v| v.value().clone()))
    }

    async fn set_value(&self, config_key: &str, config_value: &str) -> Result<(), Error> {
        self.values
            .insert(config_key.to_string(), config_value.to_string());
        Ok(())
    }

    async fn delete_value(&self, config_key: &str) -> Result<(), Error> {
        self.values.remove(config_key);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<(String, String)>, Error> {
        let mut out: Vec<(String, String)> = self
            .values
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        out.sort();
        Ok(out)
    }

    async fn publish(&self, topic: &str) -> Result<(), Error> {
        // Nobody listening is fine; the signal is fire-and-forget.
        let _ = self.topics.send(topic.to_string());
        Ok(())
    }
}
