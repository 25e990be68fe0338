//! Loopback gateway for local operation: outbound messages print to the
//! terminal, and stdin lines come back in as messages from the owner.
//! The real network gateway stays an external collaborator behind the
//! same traits.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use url::Url;

use burrowbot_common::models::chat::{
    ChannelId, ChatMessage, ChatTarget, GuildId, GuildInfo, MessageAuthor, UserId,
};
use burrowbot_common::traits::platform_traits::{
    Activity, ChatGateway, ChatTransport, Presence,
};
use burrowbot_core::eventbus::{BotEvent, EventBus};
use burrowbot_core::Error;

/// The single conversation the console represents.
pub const CONSOLE_CHANNEL: ChannelId = ChannelId(1);

pub struct ConsoleGateway;

impl ConsoleGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }

    /// Reads stdin lines and publishes them as chat messages from the
    /// owner until EOF or shutdown.
    pub fn spawn_stdin_reader(&self, bus: Arc<EventBus>, owner: UserId) {
        let mut shutdown_rx = bus.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => match line {
                        Ok(Some(line)) => {
                            if line.trim().is_empty() {
                                continue;
                            }
                            let msg = ChatMessage::new(
                                CONSOLE_CHANNEL,
                                None,
                                MessageAuthor { user_id: owner, is_bot: false },
                                line,
                            );
                            bus.publish(BotEvent::ChatMessage(msg)).await;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("stdin read error: {:?}", e);
                            break;
                        }
                    },
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl ChatTransport for ConsoleGateway {
    async fn send_message(&self, target: ChatTarget, text: &str) -> Result<(), Error> {
        match target {
            ChatTarget::Channel(channel) => println!("[#{}] {}", channel, text),
            ChatTarget::User(user) => println!("[@{}] {}", user, text),
        }
        Ok(())
    }

    async fn send_direct(&self, user: UserId, text: &str) -> Result<(), Error> {
        println!("[@{} (DM)] {}", user, text);
        Ok(())
    }
}

#[async_trait]
impl ChatGateway for ConsoleGateway {
    async fn list_guilds(&self) -> Result<Vec<GuildInfo>, Error> {
        Ok(vec![])
    }

    async fn leave_guild(&self, guild: GuildId) -> Result<(), Error> {
        info!("leave_guild({}) ignored on the console gateway", guild);
        Ok(())
    }

    async fn set_username(&self, name: &str) -> Result<(), Error> {
        info!("username set to '{}'", name);
        Ok(())
    }

    async fn set_nickname(&self, guild: GuildId, nick: Option<&str>) -> Result<(), Error> {
        info!("nickname on {} set to {:?}", guild, nick);
        Ok(())
    }

    async fn set_status(&self, status: Presence) -> Result<(), Error> {
        info!("status set to {:?}", status);
        Ok(())
    }

    async fn set_activity(&self, activity: Activity) -> Result<(), Error> {
        info!("activity set to {:?}", activity);
        Ok(())
    }

    async fn set_avatar(&self, url: &Url) -> Result<(), Error> {
        info!("avatar set to {}", url);
        Ok(())
    }
}
