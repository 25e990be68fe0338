// File: burrowbot-common/src/models/mod.rs
pub mod chat;
pub mod extension;

pub use chat::{ChannelId, ChatMessage, ChatTarget, GuildId, GuildInfo, MessageAuthor, UserId};
pub use extension::{
    BatchKind, BatchReport, DependencyClosure, ExtensionDescriptor, InstalledExtension,
};
