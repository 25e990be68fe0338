//! Batch install / update / uninstall sequencing.
//!
//! A batch iterates the user-supplied names in order; each item runs the
//! single-item protocol (resolve, check the dependency closure, prompt
//! for unmet packages/extensions, recurse into confirmed dependency
//! installs, record the outcome). A failure or declined confirmation for
//! one item never aborts the rest of the batch; expected conditions
//! become report entries, anything unexpected delivers the partial
//! report and then propagates. After the batch, one aggregated report is
//! sent, followed by a single restart confirmation if anything
//! succeeded.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tracing::warn;
use url::Url;

use burrowbot_common::models::chat::{ChannelId, ChatTarget, UserId};
use burrowbot_common::models::extension::{BatchKind, BatchReport, DependencyClosure};
use burrowbot_common::traits::platform_traits::{ChatTransport, ExtensionLoader, PackageManager};

use crate::extensions::index::normalize_name;
use crate::extensions::ExtensionRegistry;
use crate::services::interaction_service::{InteractionController, DEFAULT_CONFIRM_TIMEOUT};
use crate::services::settings_service::SettingsService;
use crate::Error;

/// How long to wait for the extension-name reply when a source
/// repository URL was given instead of a name.
const NAME_PROMPT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct ExtensionService {
    registry: Arc<ExtensionRegistry>,
    packages: Arc<dyn PackageManager>,
    loader: Arc<dyn ExtensionLoader>,
    interactions: Arc<InteractionController>,
    transport: Arc<dyn ChatTransport>,
    settings: Arc<SettingsService>,
}

impl ExtensionService {
    pub fn new(
        registry: Arc<ExtensionRegistry>,
        packages: Arc<dyn PackageManager>,
        loader: Arc<dyn ExtensionLoader>,
        interactions: Arc<InteractionController>,
        transport: Arc<dyn ChatTransport>,
        settings: Arc<SettingsService>,
    ) -> Self {
        Self {
            registry,
            packages,
            loader,
            interactions,
            transport,
            settings,
        }
    }

    pub async fn install_batch(
        &self,
        channel: ChannelId,
        author: UserId,
        names: &[String],
    ) -> Result<BatchReport, Error> {
        let mut report = BatchReport::new(BatchKind::Install);
        let mut visited = HashSet::new();
        for raw in names {
            if let Err(e) = self
                .install_one(channel, author, raw.clone(), None, &mut report, &mut visited)
                .await
            {
                let _ = self.send(channel, &report.render()).await;
                return Err(e);
            }
        }
        self.finish_batch(channel, author, report).await
    }

    pub async fn update_batch(
        &self,
        channel: ChannelId,
        author: UserId,
        names: &[String],
    ) -> Result<BatchReport, Error> {
        let mut report = BatchReport::new(BatchKind::Update);
        let mut visited = HashSet::new();
        for raw in names {
            if let Err(e) = self
                .update_one(channel, author, raw.clone(), &mut report, &mut visited)
                .await
            {
                let _ = self.send(channel, &report.render()).await;
                return Err(e);
            }
        }
        self.finish_batch(channel, author, report).await
    }

    pub async fn uninstall_batch(
        &self,
        channel: ChannelId,
        author: UserId,
        names: &[String],
    ) -> Result<BatchReport, Error> {
        let mut report = BatchReport::new(BatchKind::Uninstall);
        let mut visited = HashSet::new();
        for raw in names {
            if let Err(e) = self
                .uninstall_one(channel, author, raw.clone(), &mut report, &mut visited)
                .await
            {
                let _ = self.send(channel, &report.render()).await;
                return Err(e);
            }
        }
        self.finish_batch(channel, author, report).await
    }

    async fn finish_batch(
        &self,
        channel: ChannelId,
        author: UserId,
        report: BatchReport,
    ) -> Result<BatchReport, Error> {
        self.send(channel, &report.render()).await?;
        if report.any_succeeded() {
            self.offer_restart(channel, author).await?;
        }
        Ok(report)
    }

    /// Single-item install. Returns whether the extension ended up
    /// installed. `visited` holds the names on the current dependency
    /// path so a cycle fails the member instead of recursing forever.
    fn install_one<'a>(
        &'a self,
        channel: ChannelId,
        author: UserId,
        raw_name: String,
        source: Option<Url>,
        report: &'a mut BatchReport,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            // A URL instead of a name means "install from this
            // repository"; ask which extension it provides.
            let (raw_name, source) = if raw_name.starts_with("https://") {
                let url = match Url::parse(&raw_name) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!("bad source repository '{}': {}", raw_name, e);
                        self.send(
                            channel,
                            &format!("'{}' is not a valid repository URL.", raw_name),
                        )
                        .await?;
                        report.failed.push(raw_name);
                        return Ok(false);
                    }
                };
                let answer = self
                    .interactions
                    .ask_name(
                        channel,
                        author,
                        "Please tell me the name of the extension that repository provides.",
                        NAME_PROMPT_TIMEOUT,
                    )
                    .await?;
                match answer {
                    Some(name) => (name, Some(url)),
                    None => {
                        self.send(channel, "Alright, skipping that extension.").await?;
                        report.failed.push(raw_name);
                        return Ok(false);
                    }
                }
            } else {
                (raw_name, source)
            };

            let name = match normalize_name(&raw_name) {
                Ok(name) => name,
                Err(e) => {
                    warn!("rejecting extension name '{}': {}", raw_name, e);
                    self.send(
                        channel,
                        &format!("'{}' is not a valid extension name.", raw_name),
                    )
                    .await?;
                    report.failed.push(raw_name);
                    return Ok(false);
                }
            };

            if !visited.insert(name.clone()) {
                self.send(
                    channel,
                    &format!(
                        "'**{}**' is part of a dependency cycle and cannot be installed.",
                        name
                    ),
                )
                .await?;
                report.failed.push(name);
                return Ok(false);
            }

            let mark = report.succeeded.len();
            let mut source = source;
            let result = loop {
                self.send(channel, &format!("Installing '**{}**'...", name))
                    .await?;
                let closure = match self.registry.install(&name, source.take()).await {
                    Ok(closure) => closure,
                    Err(Error::ExtensionAlreadyInstalled(_)) => {
                        self.send(
                            channel,
                            &format!("The extension '**{}**' is already installed.", name),
                        )
                        .await?;
                        report.failed.push(name.clone());
                        break Ok(false);
                    }
                    Err(Error::ExtensionNotInIndex(_)) => {
                        self.send(
                            channel,
                            &format!("There is no extension called '**{}**'.", name),
                        )
                        .await?;
                        report.failed.push(name.clone());
                        break Ok(false);
                    }
                    Err(e) => break Err(e),
                };

                if closure.is_satisfied() {
                    self.load_installed(&name).await;
                    self.send(
                        channel,
                        &format!("The extension '**{}**' was installed successfully.", name),
                    )
                    .await?;
                    report.succeeded.insert(mark, name.clone());
                    break Ok(true);
                }

                self.announce_unsatisfied(channel, &name, &closure, "install")
                    .await?;

                if !closure.packages.is_empty()
                    && !self
                        .resolve_packages(channel, author, &name, &closure.packages, report)
                        .await?
                {
                    break Ok(false);
                }

                if !closure.extensions.is_empty() {
                    let prompt = format!(
                        "Do you want to install the extensions '**{}**' depends on now? (yes/no)",
                        name
                    );
                    if !self
                        .resolve_extensions(
                            channel,
                            author,
                            &name,
                            &prompt,
                            &closure.extensions,
                            report,
                            visited,
                        )
                        .await?
                    {
                        break Ok(false);
                    }
                }
                // The closure is satisfied now; try the install again.
            };
            visited.remove(&name);
            result
        })
    }

    /// Single-item update. The registry reports only the delta of newly
    /// declared, still-unmet dependencies.
    fn update_one<'a>(
        &'a self,
        channel: ChannelId,
        author: UserId,
        raw_name: String,
        report: &'a mut BatchReport,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            let name = match normalize_name(&raw_name) {
                Ok(name) => name,
                Err(e) => {
                    warn!("rejecting extension name '{}': {}", raw_name, e);
                    self.send(
                        channel,
                        &format!("'{}' is not a valid extension name.", raw_name),
                    )
                    .await?;
                    report.failed.push(raw_name);
                    return Ok(false);
                }
            };

            if !visited.insert(name.clone()) {
                report.failed.push(name);
                return Ok(false);
            }

            let mark = report.succeeded.len();
            let result = loop {
                self.send(channel, &format!("Updating '**{}**'...", name))
                    .await?;
                let closure = match self.registry.update(&name).await {
                    Ok(closure) => closure,
                    Err(Error::ExtensionNotFound(_)) => {
                        self.send(
                            channel,
                            &format!("The extension '**{}**' could not be found.", name),
                        )
                        .await?;
                        report.failed.push(name.clone());
                        break Ok(false);
                    }
                    Err(Error::ExtensionNotInIndex(_)) => {
                        self.send(
                            channel,
                            &format!("There is no extension called '**{}**'.", name),
                        )
                        .await?;
                        report.failed.push(name.clone());
                        break Ok(false);
                    }
                    Err(e) => break Err(e),
                };

                if closure.is_satisfied() {
                    self.send(
                        channel,
                        &format!("The extension '**{}**' was updated successfully.", name),
                    )
                    .await?;
                    report.succeeded.insert(mark, name.clone());
                    break Ok(true);
                }

                self.announce_unsatisfied(channel, &name, &closure, "update")
                    .await?;

                if !closure.packages.is_empty()
                    && !self
                        .resolve_packages(channel, author, &name, &closure.packages, report)
                        .await?
                {
                    break Ok(false);
                }

                if !closure.extensions.is_empty() {
                    let prompt = format!(
                        "Do you want to install the new dependencies of '**{}**' now? (yes/no)",
                        name
                    );
                    if !self
                        .resolve_extensions(
                            channel,
                            author,
                            &name,
                            &prompt,
                            &closure.extensions,
                            report,
                            visited,
                        )
                        .await?
                    {
                        break Ok(false);
                    }
                }
            };
            visited.remove(&name);
            result
        })
    }

    /// Single-item uninstall. Every installed extension that still
    /// depends on the target must be uninstalled (with confirmation)
    /// before the target's record is removed.
    fn uninstall_one<'a>(
        &'a self,
        channel: ChannelId,
        author: UserId,
        raw_name: String,
        report: &'a mut BatchReport,
        visited: &'a mut HashSet<String>,
    ) -> BoxFuture<'a, Result<bool, Error>> {
        Box::pin(async move {
            let name = match normalize_name(&raw_name) {
                Ok(name) => name,
                Err(e) => {
                    warn!("rejecting extension name '{}': {}", raw_name, e);
                    self.send(
                        channel,
                        &format!("'{}' is not a valid extension name.", raw_name),
                    )
                    .await?;
                    report.failed.push(raw_name);
                    return Ok(false);
                }
            };

            if !visited.insert(name.clone()) {
                report.failed.push(name);
                return Ok(false);
            }

            let mark = report.succeeded.len();
            let result = loop {
                self.send(channel, &format!("Uninstalling '**{}**'...", name))
                    .await?;
                let to_cascade = match self.registry.uninstall(&name).await {
                    Ok(cascade) => cascade,
                    Err(Error::ExtensionNotFound(_)) => {
                        self.send(
                            channel,
                            &format!("The extension '**{}**' could not be found.", name),
                        )
                        .await?;
                        report.failed.push(name.clone());
                        break Ok(false);
                    }
                    Err(e) => break Err(e),
                };

                if to_cascade.is_empty() {
                    if let Err(e) = self.loader.unload(&name).await {
                        warn!("failed to unload extension '{}': {}", name, e);
                    }
                    self.send(
                        channel,
                        &format!("The '**{}**' extension was uninstalled successfully.", name),
                    )
                    .await?;
                    report.succeeded.insert(mark, name.clone());
                    break Ok(true);
                }

                self.send(
                    channel,
                    &format!(
                        "These extensions depend on '**{}**' and would be uninstalled along with it:\n{}",
                        name,
                        bold_lines(&to_cascade)
                    ),
                )
                .await?;
                let answer = self
                    .interactions
                    .ask_yes_no(
                        channel,
                        author,
                        "Do you want to proceed with the uninstallation? (yes/no)",
                        DEFAULT_CONFIRM_TIMEOUT,
                    )
                    .await?;
                if answer != Some(true) {
                    self.send(channel, "Alright, I will not uninstall any extensions just now.")
                        .await?;
                    report.failed.push(name.clone());
                    break Ok(false);
                }

                let mut remaining = Vec::new();
                for dependent in &to_cascade {
                    let removed = self
                        .uninstall_one(channel, author, dependent.clone(), report, visited)
                        .await?;
                    if !removed {
                        remaining.push(dependent.clone());
                    }
                }
                if !remaining.is_empty() {
                    self.send(
                        channel,
                        &format!("Failed to uninstall {}.", quoted_list(&remaining)),
                    )
                    .await?;
                    report.failed.push(name.clone());
                    break Ok(false);
                }
                // The cascade set is clear; uninstalling again removes
                // the record itself.
            };
            visited.remove(&name);
            result
        })
    }

    /// Prompts for and installs unmet packages. Returns whether every
    /// package ended up installed; on decline or failure the member is
    /// recorded as failed.
    async fn resolve_packages(
        &self,
        channel: ChannelId,
        author: UserId,
        name: &str,
        packages: &[String],
        report: &mut BatchReport,
    ) -> Result<bool, Error> {
        let answer = self
            .interactions
            .ask_yes_no(
                channel,
                author,
                "Do you want to install the required packages now? (yes/no)",
                DEFAULT_CONFIRM_TIMEOUT,
            )
            .await?;
        if answer != Some(true) {
            self.send(
                channel,
                &format!(
                    "Alright, I will not install the packages the '**{}**' extension requires just now.",
                    name
                ),
            )
            .await?;
            report.failed.push(name.to_string());
            return Ok(false);
        }

        let mut failed_packages = Vec::new();
        for package in packages {
            let status = self.packages.install_package(package).await?;
            if status == 0 {
                self.send(
                    channel,
                    &format!("Installed package '**{}**' successfully.", package),
                )
                .await?;
                report.installed_packages.push(package.clone());
            } else {
                warn!(
                    "package '{}' failed to install with exit status {}",
                    package, status
                );
                failed_packages.push(package.clone());
            }
        }
        if !failed_packages.is_empty() {
            self.send(
                channel,
                &format!("Failed to install packages: {}.", quoted_list(&failed_packages)),
            )
            .await?;
            report.failed_packages.extend(failed_packages);
            report.failed.push(name.to_string());
            return Ok(false);
        }
        Ok(true)
    }

    /// Prompts for and installs unmet extension dependencies. Returns
    /// whether every dependency ended up installed; on decline or
    /// failure the member is recorded as failed.
    async fn resolve_extensions(
        &self,
        channel: ChannelId,
        author: UserId,
        name: &str,
        prompt: &str,
        dependencies: &[String],
        report: &mut BatchReport,
        visited: &mut HashSet<String>,
    ) -> Result<bool, Error> {
        let answer = self
            .interactions
            .ask_yes_no(channel, author, prompt, DEFAULT_CONFIRM_TIMEOUT)
            .await?;
        if answer != Some(true) {
            self.send(channel, "Alright, I will not install any dependencies just now.")
                .await?;
            report.failed.push(name.to_string());
            return Ok(false);
        }

        let mut unresolved = Vec::new();
        for dependency in dependencies {
            let installed = self
                .install_one(channel, author, dependency.clone(), None, report, visited)
                .await?;
            if !installed {
                unresolved.push(dependency.clone());
            }
        }
        if !unresolved.is_empty() {
            self.send(
                channel,
                &format!(
                    "Failed to install one or more of the '**{}**' extension's dependencies.",
                    name
                ),
            )
            .await?;
            report.failed.push(name.to_string());
            return Ok(false);
        }
        Ok(true)
    }

    async fn announce_unsatisfied(
        &self,
        channel: ChannelId,
        name: &str,
        closure: &DependencyClosure,
        verb: &str,
    ) -> Result<(), Error> {
        let mut message = format!("Could not {} '**{}**'.", verb, name);
        if !closure.packages.is_empty() {
            message.push_str("\nIt requires the following packages:\n");
            message.push_str(&bold_lines(&closure.packages));
        }
        if !closure.extensions.is_empty() {
            message.push_str("\nIt depends on the following extensions:\n");
            message.push_str(&bold_lines(&closure.extensions));
        }
        self.send(channel, &message).await
    }

    async fn load_installed(&self, name: &str) {
        match self.loader.load(name).await {
            Ok(()) => {
                if let Err(e) = self.registry.set_loaded(name, true) {
                    warn!("could not mark '{}' as loaded: {}", name, e);
                }
            }
            Err(e) => warn!("installed '{}' but failed to load it: {}", name, e),
        }
    }

    async fn offer_restart(&self, channel: ChannelId, author: UserId) -> Result<(), Error> {
        let answer = self
            .interactions
            .ask_yes_no(
                channel,
                author,
                "Restart for the changes to take effect.\nWould you like to restart now? (yes/no)",
                DEFAULT_CONFIRM_TIMEOUT,
            )
            .await?;
        if answer == Some(true) {
            self.send(channel, "Okay, I'll be right back!").await?;
            self.settings.restart(Some(channel)).await?;
        }
        Ok(())
    }

    async fn send(&self, channel: ChannelId, text: &str) -> Result<(), Error> {
        self.transport
            .send_message(ChatTarget::Channel(channel), text)
            .await
    }
}

fn bold_lines(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("**{name}**"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn quoted_list(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("'**{name}**'"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extensions::StaticExtensionIndex;
    use crate::repositories::MemoryBotConfigRepository;
    use crate::test_utils::{RecordingLoader, ScriptedGateway, ScriptedPackageManager};
    use burrowbot_common::models::extension::ExtensionDescriptor;
    use std::collections::BTreeSet;
    use tokio::sync::watch;

    const CHANNEL: ChannelId = ChannelId(100);
    const OWNER: UserId = UserId(1);

    fn descriptor(name: &str, packages: &[&str], extensions: &[&str]) -> ExtensionDescriptor {
        ExtensionDescriptor {
            name: name.to_string(),
            source_repository: None,
            package_deps: packages.iter().map(|p| p.to_string()).collect::<BTreeSet<_>>(),
            extension_deps: extensions
                .iter()
                .map(|e| e.to_string())
                .collect::<BTreeSet<_>>(),
        }
    }

    struct Fixture {
        service: ExtensionService,
        gateway: Arc<ScriptedGateway>,
        registry: Arc<ExtensionRegistry>,
        packages: Arc<ScriptedPackageManager>,
        loader: Arc<RecordingLoader>,
        _shutdown_tx: watch::Sender<bool>,
    }

    fn fixture(descriptors: Vec<ExtensionDescriptor>) -> Fixture {
        let gateway = ScriptedGateway::new(CHANNEL, OWNER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let transport: Arc<dyn ChatTransport> = gateway.clone();
        let interactions = Arc::new(InteractionController::new(transport.clone(), shutdown_rx));
        gateway.attach_controller(interactions.clone());

        let packages = ScriptedPackageManager::new();
        let loader = RecordingLoader::new();
        let index = Arc::new(StaticExtensionIndex::new(descriptors));
        let registry = Arc::new(ExtensionRegistry::new(index, packages.clone()));
        let settings = Arc::new(SettingsService::new(Arc::new(
            MemoryBotConfigRepository::new(),
        )));

        let service = ExtensionService::new(
            registry.clone(),
            packages.clone(),
            loader.clone(),
            interactions,
            transport,
            settings,
        );
        Fixture {
            service,
            gateway,
            registry,
            packages,
            loader,
            _shutdown_tx: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn test_install_with_confirmed_package_dependency() {
        let fx = fixture(vec![descriptor("weather", &["requests-lib"], &[])]);
        // First prompt: install packages? Second: restart offer.
        fx.gateway.queue_reply("yes");
        fx.gateway.queue_reply("no");

        let report = fx
            .service
            .install_batch(CHANNEL, OWNER, &["weather".to_string()])
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec!["weather"]);
        assert_eq!(report.installed_packages, vec!["requests-lib"]);
        assert!(report.failed.is_empty());
        assert!(report.failed_packages.is_empty());
        assert!(fx.registry.is_installed("weather"));
        assert_eq!(fx.loader.loaded(), vec!["weather"]);
        assert_eq!(fx.packages.installed_packages(), vec!["requests-lib"]);
    }

    #[tokio::test]
    async fn test_install_with_declined_package_dependency() {
        let fx = fixture(vec![descriptor("weather", &["requests-lib"], &[])]);
        fx.gateway.queue_reply("no");

        let report = fx
            .service
            .install_batch(CHANNEL, OWNER, &["weather".to_string()])
            .await
            .unwrap();

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed, vec!["weather"]);
        assert!(report.installed_packages.is_empty());
        assert!(report.failed_packages.is_empty());
        assert!(!fx.registry.is_installed("weather"));
        // Declining is not a restart-worthy outcome, so the only prompt
        // was the package confirmation.
        assert!(fx
            .gateway
            .sent_texts()
            .iter()
            .all(|text| !text.contains("restart now")));
    }

    #[tokio::test]
    async fn test_batch_continues_past_failed_member() {
        let fx = fixture(vec![descriptor("good", &[], &[])]);
        // Restart offer after the batch; "missing" needs no prompt.
        fx.gateway.queue_reply("no");

        let report = fx
            .service
            .install_batch(
                CHANNEL,
                OWNER,
                &["missing".to_string(), "good".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["missing"]);
        assert_eq!(report.succeeded, vec!["good"]);
        assert!(fx.registry.is_installed("good"));
    }

    #[tokio::test]
    async fn test_install_recurses_into_confirmed_extension_dependencies() {
        let fx = fixture(vec![
            descriptor("alpha", &[], &["beta"]),
            descriptor("beta", &[], &[]),
        ]);
        // Dependency confirmation, then restart offer.
        fx.gateway.queue_reply("yes");
        fx.gateway.queue_reply("no");

        let report = fx
            .service
            .install_batch(CHANNEL, OWNER, &["alpha".to_string()])
            .await
            .unwrap();

        // Dependencies appear immediately after the extension that
        // required them.
        assert_eq!(report.succeeded, vec!["alpha", "beta"]);
        assert!(fx.registry.is_installed("alpha"));
        assert!(fx.registry.is_installed("beta"));
    }

    #[tokio::test]
    async fn test_dependency_cycle_fails_instead_of_recursing() {
        let fx = fixture(vec![
            descriptor("ouro", &[], &["boros"]),
            descriptor("boros", &[], &["ouro"]),
        ]);
        // Confirm dependency install of boros, then again for ouro
        // inside boros.
        fx.gateway.queue_reply("yes");
        fx.gateway.queue_reply("yes");

        let report = fx
            .service
            .install_batch(CHANNEL, OWNER, &["ouro".to_string()])
            .await
            .unwrap();

        assert!(report.succeeded.is_empty());
        assert!(report.failed.contains(&"ouro".to_string()));
    }

    #[tokio::test]
    async fn test_uninstall_cascade_confirmed() {
        let fx = fixture(vec![
            descriptor("a", &[], &[]),
            descriptor("b", &[], &["a"]),
        ]);
        fx.registry.install("a", None).await.unwrap();
        fx.registry.install("b", None).await.unwrap();

        // Cascade confirmation, then restart offer.
        fx.gateway.queue_reply("yes");
        fx.gateway.queue_reply("no");

        let report = fx
            .service
            .uninstall_batch(CHANNEL, OWNER, &["a".to_string()])
            .await
            .unwrap();

        assert_eq!(report.succeeded, vec!["a", "b"]);
        assert!(report.failed.is_empty());
        assert!(!fx.registry.is_installed("a"));
        assert!(!fx.registry.is_installed("b"));
        assert_eq!(fx.loader.unloaded(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_uninstall_cascade_declined_removes_nothing() {
        let fx = fixture(vec![
            descriptor("a", &[], &[]),
            descriptor("b", &[], &["a"]),
        ]);
        fx.registry.install("a", None).await.unwrap();
        fx.registry.install("b", None).await.unwrap();

        fx.gateway.queue_reply("no");

        let report = fx
            .service
            .uninstall_batch(CHANNEL, OWNER, &["a".to_string()])
            .await
            .unwrap();

        assert!(report.succeeded.is_empty());
        assert_eq!(report.failed, vec!["a"]);
        assert!(fx.registry.is_installed("a"));
        assert!(fx.registry.is_installed("b"));
    }

    #[tokio::test]
    async fn test_restart_offer_after_successful_batch() {
        let fx = fixture(vec![descriptor("weather", &[], &[])]);
        fx.gateway.queue_reply("yes");

        fx.service
            .install_batch(CHANNEL, OWNER, &["weather".to_string()])
            .await
            .unwrap();

        let texts = fx.gateway.sent_texts();
        assert!(texts.iter().any(|t| t.contains("Would you like to restart now?")));
        assert!(texts.iter().any(|t| t.contains("I'll be right back!")));
    }

    #[tokio::test]
    async fn test_failed_package_install_records_both_failures() {
        let fx = fixture(vec![descriptor("weather", &["requests-lib"], &[])]);
        fx.packages.fail_installs_of("requests-lib");
        fx.gateway.queue_reply("yes");

        let report = fx
            .service
            .install_batch(CHANNEL, OWNER, &["weather".to_string()])
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["weather"]);
        assert_eq!(report.failed_packages, vec!["requests-lib"]);
        assert!(report.succeeded.is_empty());
        assert!(!fx.registry.is_installed("weather"));
    }
}
