//! Bot configuration over the injected key-value settings store:
//! prefixes, owner id, descriptive metadata, and the restart/shutdown
//! bookkeeping the process supervisor relies on.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use burrowbot_common::models::chat::{ChannelId, UserId};
use burrowbot_common::traits::repository_traits::BotConfigRepository;

use crate::Error;

const KEY_PREFIXES: &str = "prefixes";
const KEY_OWNER: &str = "owner";
const KEY_TOKEN: &str = "token";
const KEY_DESCRIPTION: &str = "description";
const KEY_REPOSITORY: &str = "repository";
const KEY_OFFICIAL_INVITE: &str = "official_invite";
const KEY_RESTARTED_FROM: &str = "restarted_from";
const KEY_SUPPOSED_TO_RUN: &str = "is_supposed_to_be_running";

const TOPIC_RESTART: &str = "restart";
const TOPIC_SHUTDOWN: &str = "shutdown";

pub struct SettingsService {
    config: Arc<dyn BotConfigRepository>,
    // Prefix updates are read-modify-write; serialize them so the stored
    // list is always replaced as a whole.
    prefix_update: Mutex<()>,
}

impl SettingsService {
    pub fn new(config: Arc<dyn BotConfigRepository>) -> Self {
        Self {
            config,
            prefix_update: Mutex::new(()),
        }
    }

    // ----------------------------------------------------------------
    // Prefixes
    // ----------------------------------------------------------------

    /// The configured prefixes, in the order they were added.
    pub async fn prefixes(&self) -> Result<Vec<String>, Error> {
        match self.config.get_value(KEY_PREFIXES).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn store_prefixes(&self, prefixes: &[String]) -> Result<(), Error> {
        let raw = serde_json::to_string(prefixes)?;
        self.config.set_value(KEY_PREFIXES, &raw).await
    }

    pub async fn add_prefix(&self, prefix: &str) -> Result<(), Error> {
        let _guard = self.prefix_update.lock().await;
        let mut prefixes = self.prefixes().await?;
        if prefixes.iter().any(|p| p == prefix) {
            return Err(Error::PrefixAlreadyExists(prefix.to_string()));
        }
        prefixes.push(prefix.to_string());
        self.store_prefixes(&prefixes).await
    }

    pub async fn remove_prefix(&self, prefix: &str) -> Result<(), Error> {
        let _guard = self.prefix_update.lock().await;
        let mut prefixes = self.prefixes().await?;
        let before = prefixes.len();
        prefixes.retain(|p| p != prefix);
        if prefixes.len() == before {
            return Err(Error::PrefixNotFound(prefix.to_string()));
        }
        self.store_prefixes(&prefixes).await
    }

    // ----------------------------------------------------------------
    // Owner and metadata
    // ----------------------------------------------------------------

    pub async fn owner_id(&self) -> Result<Option<UserId>, Error> {
        match self.config.get_value(KEY_OWNER).await? {
            Some(raw) => {
                let id = raw
                    .parse::<u64>()
                    .map_err(|e| Error::Parse(format!("bad owner id '{raw}': {e}")))?;
                Ok(Some(UserId(id)))
            }
            None => Ok(None),
        }
    }

    pub async fn set_owner_id(&self, owner: UserId) -> Result<(), Error> {
        self.config.set_value(KEY_OWNER, &owner.to_string()).await
    }

    pub async fn token(&self) -> Result<Option<String>, Error> {
        self.config.get_value(KEY_TOKEN).await
    }

    pub async fn set_token(&self, token: &str) -> Result<(), Error> {
        self.config.set_value(KEY_TOKEN, token).await
    }

    pub async fn description(&self) -> Result<Option<String>, Error> {
        self.config.get_value(KEY_DESCRIPTION).await
    }

    pub async fn set_description(&self, description: &str) -> Result<(), Error> {
        self.config.set_value(KEY_DESCRIPTION, description).await
    }

    pub async fn repository(&self) -> Result<Option<String>, Error> {
        self.config.get_value(KEY_REPOSITORY).await
    }

    pub async fn set_repository(&self, repository: &str) -> Result<(), Error> {
        self.config.set_value(KEY_REPOSITORY, repository).await
    }

    pub async fn official_invite(&self) -> Result<Option<String>, Error> {
        self.config.get_value(KEY_OFFICIAL_INVITE).await
    }

    pub async fn set_official_invite(&self, invite: &str) -> Result<(), Error> {
        self.config.set_value(KEY_OFFICIAL_INVITE, invite).await
    }

    // ----------------------------------------------------------------
    // Restart / shutdown bookkeeping
    // ----------------------------------------------------------------

    /// The channel the bot was restarted from, if a restart is pending
    /// announcement.
    pub async fn restarted_from(&self) -> Result<Option<ChannelId>, Error> {
        match self.config.get_value(KEY_RESTARTED_FROM).await? {
            Some(raw) => {
                let id = raw
                    .parse::<u64>()
                    .map_err(|e| Error::Parse(format!("bad channel id '{raw}': {e}")))?;
                Ok(Some(ChannelId(id)))
            }
            None => Ok(None),
        }
    }

    pub async fn reset_restarted_from(&self) -> Result<(), Error> {
        self.config.delete_value(KEY_RESTARTED_FROM).await
    }

    /// Keeps the supervisor respawning the process until disabled.
    pub async fn enable_restarting(&self) -> Result<(), Error> {
        self.config.set_value(KEY_SUPPOSED_TO_RUN, "true").await
    }

    pub async fn disable_restarting(&self) -> Result<(), Error> {
        self.config.set_value(KEY_SUPPOSED_TO_RUN, "false").await
    }

    pub async fn restarting_enabled(&self) -> Result<bool, Error> {
        Ok(self
            .config
            .get_value(KEY_SUPPOSED_TO_RUN)
            .await?
            .as_deref()
            == Some("true"))
    }

    /// Signals the supervisor to restart the process, remembering where
    /// the restart came from so the bot can announce itself there.
    pub async fn restart(&self, restarted_from: Option<ChannelId>) -> Result<(), Error> {
        if let Some(channel) = restarted_from {
            self.config
                .set_value(KEY_RESTARTED_FROM, &channel.to_string())
                .await?;
        }
        info!("restart requested");
        self.config.publish(TOPIC_RESTART).await
    }

    /// Signals the supervisor to shut the process down for good.
    pub async fn shutdown(&self) -> Result<(), Error> {
        info!("shutdown requested");
        self.config.publish(TOPIC_SHUTDOWN).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryBotConfigRepository;

    fn service() -> (SettingsService, Arc<MemoryBotConfigRepository>) {
        let repo = Arc::new(MemoryBotConfigRepository::new());
        (SettingsService::new(repo.clone()), repo)
    }

    #[tokio::test]
    async fn test_prefixes_keep_insertion_order() {
        let (settings, _) = service();
        settings.add_prefix("!").await.unwrap();
        settings.add_prefix("?").await.unwrap();
        assert_eq!(settings.prefixes().await.unwrap(), vec!["!", "?"]);
    }

    #[tokio::test]
    async fn test_duplicate_prefix_is_rejected_unchanged() {
        let (settings, _) = service();
        settings.add_prefix("!").await.unwrap();

        match settings.add_prefix("!").await {
            Err(Error::PrefixAlreadyExists(p)) => assert_eq!(p, "!"),
            other => panic!("expected PrefixAlreadyExists, got {:?}", other),
        }
        assert_eq!(settings.prefixes().await.unwrap(), vec!["!"]);
    }

    #[tokio::test]
    async fn test_remove_unknown_prefix() {
        let (settings, _) = service();
        match settings.remove_prefix("?").await {
            Err(Error::PrefixNotFound(p)) => assert_eq!(p, "?"),
            other => panic!("expected PrefixNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_restart_records_channel_and_publishes() {
        let (settings, repo) = service();
        let mut topics = repo.subscribe_topics();

        settings.restart(Some(ChannelId(77))).await.unwrap();
        assert_eq!(topics.recv().await.unwrap(), "restart");
        assert_eq!(
            settings.restarted_from().await.unwrap(),
            Some(ChannelId(77))
        );

        settings.reset_restarted_from().await.unwrap();
        assert_eq!(settings.restarted_from().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_restarting_flag_roundtrip() {
        let (settings, _) = service();
        assert!(!settings.restarting_enabled().await.unwrap());
        settings.enable_restarting().await.unwrap();
        assert!(settings.restarting_enabled().await.unwrap());
        settings.disable_restarting().await.unwrap();
        assert!(!settings.restarting_enabled().await.unwrap());
    }
}
