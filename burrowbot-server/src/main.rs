use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use burrowbot_common::models::chat::{ChatTarget, UserId};
use burrowbot_common::traits::platform_traits::{ChatTransport, ExtensionLoader};
use burrowbot_core::eventbus::{BotEvent, EventBus};
use burrowbot_core::extensions::{ExtensionRegistry, FileExtensionIndex};
use burrowbot_core::repositories::MemoryBotConfigRepository;
use burrowbot_core::services::builtin_commands::register_builtin_commands;
use burrowbot_core::services::{
    CommandService, ExtensionService, InteractionController, SettingsService,
};
use burrowbot_core::Error;

mod console;
mod packages;

use console::ConsoleGateway;
use packages::ShellPackageManager;

#[derive(Parser, Debug, Clone)]
#[command(name = "burrowbot")]
#[command(author, version, about = "BurrowBot - chat bot with installable extensions")]
struct Args {
    /// User id treated as the bot owner on first start
    #[arg(long, default_value_t = 1)]
    owner: u64,

    /// Command prefix configured on first start
    #[arg(long, default_value = "!")]
    prefix: String,

    /// Path to the extension index JSON file
    #[arg(long, default_value = "extensions.json")]
    index_path: PathBuf,

    /// Program used to install OS packages
    #[arg(long, default_value = "pip")]
    package_installer: String,
}

fn init_tracing() {
    let filter = EnvFilter::from_default_env()
        .add_directive("burrowbot=info".parse().unwrap_or_default());
    let sub = fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(sub)
        .expect("Failed to set global subscriber");
}

/// Extension modules are compiled in; "loading" is a bookkeeping step
/// here, and a real host would swap in a dynamic loader behind the same
/// trait.
struct LogOnlyLoader;

#[async_trait]
impl ExtensionLoader for LogOnlyLoader {
    async fn load(&self, extension: &str) -> Result<(), Error> {
        info!("loaded extension '{}'", extension);
        Ok(())
    }

    async fn unload(&self, extension: &str) -> Result<(), Error> {
        info!("unloaded extension '{}'", extension);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    info!(
        "BurrowBot starting. owner={}, prefix='{}', index={}",
        args.owner,
        args.prefix,
        args.index_path.display()
    );

    if let Err(e) = run_server(args).await {
        error!("Server error: {:?}", e);
    }
    info!("Main finished. Goodbye!");
    Ok(())
}

async fn run_server(args: Args) -> anyhow::Result<()> {
    // 1) Settings store and event bus.
    let config = Arc::new(MemoryBotConfigRepository::new());
    let mut topics = config.subscribe_topics();
    let event_bus = Arc::new(EventBus::new());
    let settings = Arc::new(SettingsService::new(config.clone()));

    // 2) First-start defaults.
    if settings.prefixes().await?.is_empty() {
        settings.add_prefix(&args.prefix).await?;
        info!("configured prefix '{}'", args.prefix);
    }
    if settings.owner_id().await?.is_none() {
        settings.set_owner_id(UserId(args.owner)).await?;
        info!("owner recognized: {}", args.owner);
    }

    // 3) Extension machinery.
    let index = Arc::new(FileExtensionIndex::new(&args.index_path));
    let packages = Arc::new(ShellPackageManager::new(&args.package_installer));
    let registry = Arc::new(ExtensionRegistry::new(index, packages.clone()));
    let loader = Arc::new(LogOnlyLoader);

    // 4) Gateway and services; every component gets its collaborators
    //    injected at construction.
    let gateway = ConsoleGateway::new();
    let transport: Arc<dyn ChatTransport> = gateway.clone();
    let interactions = Arc::new(InteractionController::new(
        transport.clone(),
        event_bus.shutdown_rx.clone(),
    ));
    let extensions = Arc::new(ExtensionService::new(
        registry.clone(),
        packages,
        loader,
        interactions.clone(),
        transport,
        settings.clone(),
    ));
    let command_service = Arc::new(CommandService::new(
        gateway.clone(),
        settings.clone(),
        extensions,
        interactions,
        registry.clone(),
    ));
    register_builtin_commands(&command_service);
    info!("{} extensions installed", registry.list_installed().len());

    // 5) Dispatch task: each in-flight command runs on its own task, so
    //    a command suspended on a confirmation prompt blocks nobody.
    let mut events = event_bus.subscribe(None).await;
    let dispatcher = command_service.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let BotEvent::ChatMessage(msg) = event {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    if let Err(e) = dispatcher.handle_chat_line(msg).await {
                        error!("dispatch error: {:?}", e);
                    }
                });
            }
        }
    });

    // 6) Feed console lines in as owner messages.
    gateway.spawn_stdin_reader(event_bus.clone(), UserId(args.owner));

    // 7) Announce a completed restart, then arm the supervisor flag.
    if let Some(channel) = settings.restarted_from().await? {
        gateway
            .send_message(ChatTarget::Channel(channel), "I'm back!")
            .await?;
        settings.reset_restarted_from().await?;
    }
    settings.enable_restarting().await?;

    // 8) Ctrl-C stops respawning and trips the bus.
    let eb_clone = event_bus.clone();
    let settings_clone = settings.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {:?}", e);
        }
        info!("Ctrl-C detected; shutting down event bus...");
        if let Err(e) = settings_clone.disable_restarting().await {
            error!("could not clear the restarting flag: {:?}", e);
        }
        eb_clone.shutdown();
    });

    // 9) Supervisor loop: ticks, restart/shutdown topics, shutdown flag.
    let mut shutdown_rx = event_bus.shutdown_rx.clone();
    loop {
        tokio::select! {
            _ = time::sleep(Duration::from_secs(10)) => {
                event_bus.publish(BotEvent::Tick).await;
            }
            topic = topics.recv() => {
                match topic.as_deref() {
                    Ok("restart") => {
                        info!("Restart signaled; exiting so the supervisor can respawn.");
                        event_bus.shutdown();
                        break;
                    }
                    Ok("shutdown") => {
                        info!("Shutdown signaled.");
                        settings.disable_restarting().await?;
                        event_bus.shutdown();
                        break;
                    }
                    Ok(other) => debug!("ignoring topic '{}'", other),
                    Err(_) => {}
                }
            }
            Ok(_) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    info!("Shutdown signaled; exiting server loop.");
                    break;
                }
            }
        }
    }

    Ok(())
}
