//! Command dispatch: prefix matching, authorization, subcommand
//! resolution, and handler invocation.
//!
//! Each inbound message walks Received -> Parsed -> AuthorizationChecked
//! -> Routed -> Executing -> Completed/Failed. Authorization fails
//! closed and silently: bot authors never trigger commands, and
//! owner-only commands invoked by anyone else produce no response at all
//! so nothing leaks about which commands exist.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::{debug, error};

use burrowbot_common::models::chat::{ChatMessage, ChatTarget};
use burrowbot_common::traits::platform_traits::{ChatGateway, ChatTransport};

use crate::extensions::ExtensionRegistry;
use crate::services::extension_service::ExtensionService;
use crate::services::interaction_service::InteractionController;
use crate::services::settings_service::SettingsService;
use crate::Error;

/// Everything a command handler can reach, cloned per invocation.
#[derive(Clone)]
pub struct CommandContext {
    pub message: ChatMessage,
    pub args: String,
    pub gateway: Arc<dyn ChatGateway>,
    pub settings: Arc<SettingsService>,
    pub extensions: Arc<ExtensionService>,
    pub interactions: Arc<InteractionController>,
    pub registry: Arc<ExtensionRegistry>,
}

impl CommandContext {
    /// Sends a reply into the conversation the command came from.
    pub async fn reply(&self, text: &str) -> Result<(), Error> {
        self.gateway
            .send_message(ChatTarget::Channel(self.message.channel), text)
            .await
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: CommandContext) -> Result<(), Error>;
}

struct FnHandler(
    Box<dyn Fn(CommandContext) -> BoxFuture<'static, Result<(), Error>> + Send + Sync>,
);

#[async_trait]
impl CommandHandler for FnHandler {
    async fn handle(&self, ctx: CommandContext) -> Result<(), Error> {
        (self.0)(ctx).await
    }
}

/// Wraps an async fn as a registerable handler.
pub fn handler<F, Fut>(f: F) -> Arc<dyn CommandHandler>
where
    F: Fn(CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send + 'static,
{
    Arc::new(FnHandler(Box::new(move |ctx| Box::pin(f(ctx)))))
}

/// Registration-time description of a command: its path in the group
/// tree and its gating. Commands are owner-only unless opened up.
pub struct CommandSpec {
    path: Vec<String>,
    owner_only: bool,
    enabled: bool,
}

impl CommandSpec {
    pub fn new(path: &[&str]) -> Self {
        Self {
            path: path.iter().map(|p| p.to_lowercase()).collect(),
            owner_only: true,
            enabled: true,
        }
    }

    /// Anyone may invoke this command.
    pub fn open(mut self) -> Self {
        self.owner_only = false;
        self
    }

    /// Registered but treated as nonexistent until enabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

struct CommandNode {
    owner_only: bool,
    enabled: bool,
    handler: Option<Arc<dyn CommandHandler>>,
    children: HashMap<String, CommandNode>,
}

impl CommandNode {
    fn group() -> Self {
        Self {
            owner_only: true,
            enabled: true,
            handler: None,
            children: HashMap::new(),
        }
    }
}

/// Tree of named commands and command groups. Path tokens resolve
/// left-to-right; the deepest resolvable node is invoked and keeps the
/// remaining text as its raw argument string.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, CommandNode>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: CommandSpec, handler: Arc<dyn CommandHandler>) {
        debug_assert!(!spec.path.is_empty());
        let mut children = &mut self.commands;
        let (leaf, groups) = spec.path.split_last().expect("command path is never empty");
        for group in groups {
            children = &mut children
                .entry(group.clone())
                .or_insert_with(CommandNode::group)
                .children;
        }
        let node = children.entry(leaf.clone()).or_insert_with(CommandNode::group);
        node.owner_only = spec.owner_only;
        node.enabled = spec.enabled;
        node.handler = Some(handler);
    }

    fn resolve<'a>(&'a self, body: &str) -> Option<(&'a CommandNode, String)> {
        let (first, mut rest) = split_token(body)?;
        let mut node = self.commands.get(&first.to_lowercase())?;
        while let Some((token, after)) = split_token(rest) {
            match node.children.get(&token.to_lowercase()) {
                Some(child) => {
                    node = child;
                    rest = after;
                }
                None => break,
            }
        }
        Some((node, rest.trim().to_string()))
    }
}

fn split_token(s: &str) -> Option<(String, &str)> {
    let s = s.trim_start();
    if s.is_empty() {
        return None;
    }
    match s.find(char::is_whitespace) {
        Some(i) => Some((s[..i].to_string(), &s[i..])),
        None => Some((s.to_string(), "")),
    }
}

/// Where a message ended up in the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No prefix matched; the message is not a command.
    NotACommand,
    /// Consumed as the reply to an outstanding interactive prompt.
    ClaimedByPrompt,
    /// Prefixed, but no such command (or the command is disabled).
    UnknownCommand,
    /// Silently rejected: bot author or owner-only without ownership.
    Unauthorized,
    Completed,
    /// The handler failed; logged and reported generically.
    Failed,
}

pub struct CommandService {
    commands: RwLock<CommandRegistry>,
    gateway: Arc<dyn ChatGateway>,
    settings: Arc<SettingsService>,
    extensions: Arc<ExtensionService>,
    interactions: Arc<InteractionController>,
    registry: Arc<ExtensionRegistry>,
}

impl CommandService {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        settings: Arc<SettingsService>,
        extensions: Arc<ExtensionService>,
        interactions: Arc<InteractionController>,
        registry: Arc<ExtensionRegistry>,
    ) -> Self {
        Self {
            commands: RwLock::new(CommandRegistry::new()),
            gateway,
            settings,
            extensions,
            interactions,
            registry,
        }
    }

    /// Registers a command; loaded extensions use this to contribute
    /// their own command surface.
    pub fn register(&self, spec: CommandSpec, handler: Arc<dyn CommandHandler>) {
        self.commands.write().unwrap().register(spec, handler);
    }

    /// Processes one inbound message through the dispatch pipeline.
    pub async fn handle_chat_line(&self, msg: ChatMessage) -> Result<DispatchOutcome, Error> {
        // 1) Replies to outstanding interactive prompts are not commands.
        if self.interactions.deliver(&msg) {
            return Ok(DispatchOutcome::ClaimedByPrompt);
        }

        // 2) Prefix match against the configured ordered set.
        let prefixes = self.settings.prefixes().await?;
        let Some(body) = strip_prefix(&msg.content, &prefixes) else {
            return Ok(DispatchOutcome::NotACommand);
        };

        // 3) Bots are not allowed to interact with other bots.
        if msg.author.is_bot {
            debug!("ignoring command from bot account {}", msg.author.user_id);
            return Ok(DispatchOutcome::Unauthorized);
        }

        // 4) Resolve the command path; copy out what outlives the lock.
        let resolved = {
            let commands = self.commands.read().unwrap();
            commands.resolve(body).map(|(node, args)| {
                (node.owner_only, node.enabled, node.handler.clone(), args)
            })
        };
        let Some((owner_only, enabled, Some(handler), args)) = resolved else {
            debug!("no command matches '{}'", body);
            return Ok(DispatchOutcome::UnknownCommand);
        };
        if !enabled {
            return Ok(DispatchOutcome::UnknownCommand);
        }

        // 5) Owner gate, silent in both directions.
        if owner_only {
            let owner = self.settings.owner_id().await?;
            if owner != Some(msg.author.user_id) {
                debug!(
                    "user {} is not the owner; dropping owner-only command",
                    msg.author.user_id
                );
                return Ok(DispatchOutcome::Unauthorized);
            }
        }

        // 6) Execute.
        let channel = msg.channel;
        let command = body.split_whitespace().next().unwrap_or("").to_string();
        let ctx = CommandContext {
            message: msg,
            args,
            gateway: self.gateway.clone(),
            settings: self.settings.clone(),
            extensions: self.extensions.clone(),
            interactions: self.interactions.clone(),
            registry: self.registry.clone(),
        };
        match handler.handle(ctx).await {
            Ok(()) => Ok(DispatchOutcome::Completed),
            Err(e) => {
                error!("command '{}' failed: {:?}", command, e);
                let _ = self
                    .gateway
                    .send_message(
                        ChatTarget::Channel(channel),
                        "Something went wrong. Check the logs for details.",
                    )
                    .await;
                Ok(DispatchOutcome::Failed)
            }
        }
    }
}

/// Returns the command body with the first matching prefix removed, or
/// None if the message does not start with any configured prefix.
fn strip_prefix<'a>(content: &'a str, prefixes: &[String]) -> Option<&'a str> {
    for prefix in prefixes {
        if let Some(body) = content.strip_prefix(prefix.as_str()) {
            if !body.trim().is_empty() {
                return Some(body);
            }
        }
    }
    None
}
