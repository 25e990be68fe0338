// File: burrowbot-common/src/traits/platform_traits.rs

use async_trait::async_trait;
use url::Url;

use crate::error::Error;
use crate::models::chat::{ChatTarget, GuildId, GuildInfo, UserId};

/// Presence status of the bot account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Online,
    Idle,
    DoNotDisturb,
    Invisible,
}

/// What the bot account is shown to be doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Playing(String),
    Streaming { title: String, url: String },
    Clear,
}

/// Minimal outbound messaging surface: everything interactive prompts and
/// command replies need.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(&self, target: ChatTarget, text: &str) -> Result<(), Error>;
    async fn send_direct(&self, user: UserId, text: &str) -> Result<(), Error>;
}

/// Full gateway surface consumed by the management commands: guild
/// membership and bot-profile edits on top of plain messaging.
#[async_trait]
pub trait ChatGateway: ChatTransport {
    async fn list_guilds(&self) -> Result<Vec<GuildInfo>, Error>;
    async fn leave_guild(&self, guild: GuildId) -> Result<(), Error>;
    async fn set_username(&self, name: &str) -> Result<(), Error>;
    async fn set_nickname(&self, guild: GuildId, nick: Option<&str>) -> Result<(), Error>;
    async fn set_status(&self, status: Presence) -> Result<(), Error>;
    async fn set_activity(&self, activity: Activity) -> Result<(), Error>;
    async fn set_avatar(&self, url: &Url) -> Result<(), Error>;
}

/// OS package installer. `install_package` returns the installer's exit
/// status; zero means success.
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn is_installed(&self, package: &str) -> Result<bool, Error>;
    async fn install_package(&self, package: &str) -> Result<i32, Error>;
}

/// Loads extension modules into (and out of) the running process. Install
/// only creates the registry record; loading is this separate step.
#[async_trait]
pub trait ExtensionLoader: Send + Sync {
    async fn load(&self, extension: &str) -> Result<(), Error>;
    async fn unload(&self, extension: &str) -> Result<(), Error>;
}
