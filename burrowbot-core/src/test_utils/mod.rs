//! Shared test fixtures: a scripted gateway that records outbound
//! messages and feeds queued replies back through the interaction
//! controller, plus scripted package-manager and loader stand-ins.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use burrowbot_common::models::chat::{
    ChannelId, ChatMessage, ChatTarget, GuildId, GuildInfo, MessageAuthor, UserId,
};
use burrowbot_common::traits::platform_traits::{
    Activity, ChatGateway, ChatTransport, ExtensionLoader, PackageManager, Presence,
};

use burrowbot_common::models::extension::ExtensionDescriptor;
use tokio::sync::watch;

use crate::extensions::{ExtensionRegistry, StaticExtensionIndex};
use crate::repositories::MemoryBotConfigRepository;
use crate::services::builtin_commands::register_builtin_commands;
use crate::services::command_service::CommandService;
use crate::services::extension_service::ExtensionService;
use crate::services::interaction_service::InteractionController;
use crate::services::settings_service::SettingsService;
use crate::Error;

pub fn chat_message(channel: ChannelId, author: UserId, content: &str) -> ChatMessage {
    ChatMessage::new(
        channel,
        None,
        MessageAuthor {
            user_id: author,
            is_bot: false,
        },
        content,
    )
}

pub fn bot_message(channel: ChannelId, author: UserId, content: &str) -> ChatMessage {
    ChatMessage::new(
        channel,
        None,
        MessageAuthor {
            user_id: author,
            is_bot: true,
        },
        content,
    )
}

/// Gateway double. Records every outbound message; when a send happens
/// while an interactive wait is pending for the scripted (channel,
/// author) pair, the next queued reply is delivered as that author's
/// answer. This mirrors a user replying to each prompt in turn.
pub struct ScriptedGateway {
    channel: ChannelId,
    author: UserId,
    sent: Mutex<Vec<(ChatTarget, String)>>,
    replies: Mutex<VecDeque<String>>,
    controller: Mutex<Option<Arc<InteractionController>>>,
    guilds: Mutex<Vec<GuildInfo>>,
    left_guilds: Mutex<Vec<GuildId>>,
    profile_events: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new(channel: ChannelId, author: UserId) -> Arc<Self> {
        Arc::new(Self {
            channel,
            author,
            sent: Mutex::new(vec![]),
            replies: Mutex::new(VecDeque::new()),
            controller: Mutex::new(None),
            guilds: Mutex::new(vec![]),
            left_guilds: Mutex::new(vec![]),
            profile_events: Mutex::new(vec![]),
        })
    }

    pub fn attach_controller(&self, controller: Arc<InteractionController>) {
        *self.controller.lock().unwrap() = Some(controller);
    }

    pub fn queue_reply(&self, content: &str) {
        self.replies.lock().unwrap().push_back(content.to_string());
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn sent_messages(&self) -> Vec<(ChatTarget, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn set_guilds(&self, guilds: Vec<GuildInfo>) {
        *self.guilds.lock().unwrap() = guilds;
    }

    pub fn left_guilds(&self) -> Vec<GuildId> {
        self.left_guilds.lock().unwrap().clone()
    }

    pub fn profile_events(&self) -> Vec<String> {
        self.profile_events.lock().unwrap().clone()
    }

    /// Feed at most one queued reply into the pending wait, if any.
    fn pump(&self) {
        let controller = self.controller.lock().unwrap().clone();
        let Some(controller) = controller else {
            return;
        };
        if !controller.has_pending(self.channel, self.author) {
            return;
        }
        let Some(content) = self.replies.lock().unwrap().pop_front() else {
            return;
        };
        let msg = chat_message(self.channel, self.author, &content);
        controller.deliver(&msg);
    }
}

#[async_trait]
impl ChatTransport for ScriptedGateway {
    async fn send_message(&self, target: ChatTarget, text: &str) -> Result<(), Error> {
        self.sent.lock().unwrap().push((target, text.to_string()));
        self.pump();
        Ok(())
    }

    async fn send_direct(&self, user: UserId, text: &str) -> Result<(), Error> {
        self.sent
            .lock()
            .unwrap()
            .push((ChatTarget::User(user), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ChatGateway for ScriptedGateway {
    async fn list_guilds(&self) -> Result<Vec<GuildInfo>, Error> {
        Ok(self.guilds.lock().unwrap().clone())
    }

    async fn leave_guild(&self, guild: GuildId) -> Result<(), Error> {
        self.guilds
            .lock()
            .unwrap()
            .retain(|g| g.guild_id != guild);
        self.left_guilds.lock().unwrap().push(guild);
        Ok(())
    }

    async fn set_username(&self, name: &str) -> Result<(), Error> {
        self.profile_events
            .lock()
            .unwrap()
            .push(format!("username={name}"));
        Ok(())
    }

    async fn set_nickname(&self, guild: GuildId, nick: Option<&str>) -> Result<(), Error> {
        self.profile_events
            .lock()
            .unwrap()
            .push(format!("nickname@{guild}={}", nick.unwrap_or("<cleared>")));
        Ok(())
    }

    async fn set_status(&self, status: Presence) -> Result<(), Error> {
        self.profile_events
            .lock()
            .unwrap()
            .push(format!("status={status:?}"));
        Ok(())
    }

    async fn set_activity(&self, activity: Activity) -> Result<(), Error> {
        self.profile_events
            .lock()
            .unwrap()
            .push(format!("activity={activity:?}"));
        Ok(())
    }

    async fn set_avatar(&self, url: &Url) -> Result<(), Error> {
        self.profile_events
            .lock()
            .unwrap()
            .push(format!("avatar={url}"));
        Ok(())
    }
}

/// Package manager double with scripted outcomes. Installs succeed and
/// are remembered unless the package was marked as failing.
pub struct ScriptedPackageManager {
    installed: Mutex<HashSet<String>>,
    failing: Mutex<HashSet<String>>,
}

impl ScriptedPackageManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            installed: Mutex::new(HashSet::new()),
            failing: Mutex::new(HashSet::new()),
        })
    }

    pub fn mark_installed(&self, package: &str) {
        self.installed.lock().unwrap().insert(package.to_string());
    }

    /// Installs of this package will return a nonzero exit status.
    pub fn fail_installs_of(&self, package: &str) {
        self.failing.lock().unwrap().insert(package.to_string());
    }

    pub fn installed_packages(&self) -> Vec<String> {
        let mut out: Vec<String> = self.installed.lock().unwrap().iter().cloned().collect();
        out.sort();
        out
    }
}

#[async_trait]
impl PackageManager for ScriptedPackageManager {
    async fn is_installed(&self, package: &str) -> Result<bool, Error> {
        Ok(self.installed.lock().unwrap().contains(package))
    }

    async fn install_package(&self, package: &str) -> Result<i32, Error> {
        if self.failing.lock().unwrap().contains(package) {
            return Ok(1);
        }
        self.installed.lock().unwrap().insert(package.to_string());
        Ok(0)
    }
}

/// Loader double that records load/unload calls and always succeeds.
pub struct RecordingLoader {
    loaded: Mutex<Vec<String>>,
    unloaded: Mutex<Vec<String>>,
}

impl RecordingLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            loaded: Mutex::new(vec![]),
            unloaded: Mutex::new(vec![]),
        })
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn unloaded(&self) -> Vec<String> {
        self.unloaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtensionLoader for RecordingLoader {
    async fn load(&self, extension: &str) -> Result<(), Error> {
        self.loaded.lock().unwrap().push(extension.to_string());
        Ok(())
    }

    async fn unload(&self, extension: &str) -> Result<(), Error> {
        self.unloaded.lock().unwrap().push(extension.to_string());
        Ok(())
    }
}

/// A fully wired core with scripted collaborators, one "!" prefix, and
/// the builtin commands registered. The owner id is already configured.
pub struct TestStack {
    pub gateway: Arc<ScriptedGateway>,
    pub config: Arc<MemoryBotConfigRepository>,
    pub settings: Arc<SettingsService>,
    pub registry: Arc<ExtensionRegistry>,
    pub packages: Arc<ScriptedPackageManager>,
    pub loader: Arc<RecordingLoader>,
    pub interactions: Arc<InteractionController>,
    pub extensions: Arc<ExtensionService>,
    pub commands: Arc<CommandService>,
    pub shutdown_tx: watch::Sender<bool>,
}

pub async fn test_stack(
    channel: ChannelId,
    owner: UserId,
    descriptors: Vec<ExtensionDescriptor>,
) -> TestStack {
    let gateway = ScriptedGateway::new(channel, owner);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let transport: Arc<dyn ChatTransport> = gateway.clone();
    let interactions = Arc::new(InteractionController::new(transport.clone(), shutdown_rx));
    gateway.attach_controller(interactions.clone());

    let config = Arc::new(MemoryBotConfigRepository::new());
    let settings = Arc::new(SettingsService::new(config.clone()));
    settings.add_prefix("!").await.unwrap();
    settings.set_owner_id(owner).await.unwrap();

    let packages = ScriptedPackageManager::new();
    let loader = RecordingLoader::new();
    let index = Arc::new(StaticExtensionIndex::new(descriptors));
    let registry = Arc::new(ExtensionRegistry::new(index, packages.clone()));

    let extensions = Arc::new(ExtensionService::new(
        registry.clone(),
        packages.clone(),
        loader.clone(),
        interactions.clone(),
        transport,
        settings.clone(),
    ));
    let commands = Arc::new(CommandService::new(
        gateway.clone(),
        settings.clone(),
        extensions.clone(),
        interactions.clone(),
        registry.clone(),
    ));
    register_builtin_commands(&commands);

    TestStack {
        gateway,
        config,
        settings,
        registry,
        packages,
        loader,
        interactions,
        extensions,
        commands,
        shutdown_tx,
    }
}
