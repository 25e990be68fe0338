use async_trait::async_trait;

use crate::error::Error;

/// Key-value settings store backing the bot's configuration (prefixes,
/// owner id, description, restart bookkeeping). `publish` emits a
/// fire-and-forget signal on a named topic; the process supervisor
/// subscribes to the `restart` and `shutdown` topics.
#[async_trait]
pub trait BotConfigRepository: Send + Sync {
    async fn get_value(&self, config_key: &str) -> Result<Option<String>, Error>;
    async fn set_value(&self, config_key: &str, config_value: &str) -> Result<(), Error>;
    async fn delete_value(&self, config_key: &str) -> Result<(), Error>;
    async fn list_all(&self) -> Result<Vec<(String, String)>, Error>;
    async fn publish(&self, topic: &str) -> Result<(), Error>;
}
