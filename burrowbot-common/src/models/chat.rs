use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform-assigned snowflake identifying a user account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// Platform-assigned snowflake identifying a conversation channel.
/// Direct-message conversations get a channel id of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

/// Platform-assigned snowflake identifying a guild (server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuildId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where an outbound message is addressed. Everything that can receive a
/// message collapses to one of these two identities at the boundary, so
/// the rest of the system never has to coerce platform objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    Channel(ChannelId),
    User(UserId),
}

impl From<ChannelId> for ChatTarget {
    fn from(channel: ChannelId) -> Self {
        ChatTarget::Channel(channel)
    }
}

impl From<UserId> for ChatTarget {
    fn from(user: UserId) -> Self {
        ChatTarget::User(user)
    }
}

/// The author of an inbound message, as far as dispatch cares:
/// who sent it and whether the account is a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageAuthor {
    pub user_id: UserId,
    pub is_bot: bool,
}

/// An inbound chat message as delivered by the gateway.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub message_id: Uuid,
    pub channel: ChannelId,
    pub guild: Option<GuildId>,
    pub author: MessageAuthor,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(
        channel: ChannelId,
        guild: Option<GuildId>,
        author: MessageAuthor,
        content: impl Into<String>,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            channel,
            guild,
            author,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// A guild the bot is currently a member of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub guild_id: GuildId,
    pub name: String,
}
