//! The management command surface: extension lifecycle, bot metadata,
//! prefixes, and process control, registered into the command tree at
//! startup. Owner-gated unless registered as open.

use chrono::Utc;
use tracing::error;
use url::Url;

use burrowbot_common::traits::platform_traits::{Activity, ChatGateway, ChatTransport, Presence};

use crate::services::command_service::{handler, CommandContext, CommandService, CommandSpec};
use crate::services::interaction_service::DEFAULT_CHOICE_TIMEOUT;
use crate::Error;

pub fn register_builtin_commands(service: &CommandService) {
    service.register(CommandSpec::new(&["install"]), handler(install));
    service.register(CommandSpec::new(&["update"]), handler(update));
    service.register(CommandSpec::new(&["uninstall"]), handler(uninstall));

    service.register(CommandSpec::new(&["set", "name"]), handler(set_name));
    service.register(CommandSpec::new(&["set", "nickname"]), handler(set_nickname));
    service.register(CommandSpec::new(&["set", "game"]), handler(set_game));
    service.register(CommandSpec::new(&["set", "status"]), handler(set_status));
    service.register(CommandSpec::new(&["set", "stream"]), handler(set_stream));
    service.register(CommandSpec::new(&["set", "avatar"]), handler(set_avatar));
    service.register(CommandSpec::new(&["set", "token"]), handler(set_token));
    service.register(
        CommandSpec::new(&["set", "description"]),
        handler(set_description),
    );
    service.register(
        CommandSpec::new(&["set", "repository"]),
        handler(set_repository),
    );
    service.register(
        CommandSpec::new(&["set", "officialinvite"]),
        handler(set_official_invite),
    );

    service.register(CommandSpec::new(&["add_prefix"]), handler(add_prefix));
    service.register(CommandSpec::new(&["remove_prefix"]), handler(remove_prefix));
    service.register(CommandSpec::new(&["prefixes"]).open(), handler(prefixes));

    service.register(CommandSpec::new(&["ping"]).open(), handler(ping));
    service.register(CommandSpec::new(&["shutdown"]), handler(shutdown));
    service.register(CommandSpec::new(&["restart"]), handler(restart));
    service.register(CommandSpec::new(&["leave"]), handler(leave));
    service.register(CommandSpec::new(&["servers"]), handler(servers));
    service.register(
        CommandSpec::new(&["contact"]).open().disabled(),
        handler(contact),
    );
    service.register(CommandSpec::new(&["about"]).open(), handler(about));
    service.register(CommandSpec::new(&["version"]).open(), handler(version));
}

fn parse_names(args: &str) -> Vec<String> {
    args.split_whitespace().map(|s| s.to_lowercase()).collect()
}

async fn install(ctx: CommandContext) -> Result<(), Error> {
    let names = parse_names(&ctx.args);
    if names.is_empty() {
        return ctx.reply("Tell me which extensions to install.").await;
    }
    ctx.extensions
        .install_batch(ctx.message.channel, ctx.message.author.user_id, &names)
        .await?;
    Ok(())
}

async fn update(ctx: CommandContext) -> Result<(), Error> {
    let names = parse_names(&ctx.args);
    if names.is_empty() {
        return ctx.reply("Tell me which extensions to update.").await;
    }
    ctx.extensions
        .update_batch(ctx.message.channel, ctx.message.author.user_id, &names)
        .await?;
    Ok(())
}

async fn uninstall(ctx: CommandContext) -> Result<(), Error> {
    let names = parse_names(&ctx.args);
    if names.is_empty() {
        return ctx.reply("Tell me which extensions to uninstall.").await;
    }
    ctx.extensions
        .uninstall_batch(ctx.message.channel, ctx.message.author.user_id, &names)
        .await?;
    Ok(())
}

async fn set_name(ctx: CommandContext) -> Result<(), Error> {
    let name = ctx.args.trim();
    if name.is_empty() {
        return ctx.reply("Usage: set name <name>").await;
    }
    ctx.gateway.set_username(name).await?;
    ctx.reply("Done.").await
}

async fn set_nickname(ctx: CommandContext) -> Result<(), Error> {
    let Some(guild) = ctx.message.guild else {
        return ctx.reply("This command can only be used on a server.").await;
    };
    let nickname = ctx.args.trim();
    let nickname = if nickname.is_empty() { None } else { Some(nickname) };
    ctx.gateway.set_nickname(guild, nickname).await?;
    ctx.reply("Done.").await
}

async fn set_game(ctx: CommandContext) -> Result<(), Error> {
    let game = ctx.args.trim();
    if game.is_empty() {
        ctx.gateway.set_activity(Activity::Clear).await?;
        ctx.reply("Not playing a game now.").await
    } else {
        ctx.gateway
            .set_activity(Activity::Playing(game.to_string()))
            .await?;
        ctx.reply(&format!("Game set to \"{}\".", game)).await
    }
}

async fn set_status(ctx: CommandContext) -> Result<(), Error> {
    let status = ctx.args.trim().to_lowercase();
    if status.is_empty() {
        ctx.gateway.set_status(Presence::Online).await?;
        return ctx.reply("Status reset.").await;
    }
    let presence = match status.as_str() {
        "online" => Presence::Online,
        "idle" => Presence::Idle,
        "dnd" => Presence::DoNotDisturb,
        "invisible" => Presence::Invisible,
        _ => {
            return ctx
                .reply("Statuses are: online, idle, dnd, invisible.")
                .await;
        }
    };
    ctx.gateway.set_status(presence).await?;
    ctx.reply(&format!("Status set to {}.", status)).await
}

async fn set_stream(ctx: CommandContext) -> Result<(), Error> {
    let args = ctx.args.trim();
    if args.is_empty() {
        ctx.gateway.set_activity(Activity::Clear).await?;
        return ctx.reply("Done.").await;
    }
    let (streamer, title) = match args.split_once(char::is_whitespace) {
        Some((streamer, title)) if !title.trim().is_empty() => (streamer, title.trim()),
        _ => {
            return ctx.reply("Usage: set stream <streamer> <stream_title>").await;
        }
    };
    let url = if streamer.contains("twitch.tv/") {
        streamer.to_string()
    } else {
        format!("https://www.twitch.tv/{}", streamer)
    };
    ctx.gateway
        .set_activity(Activity::Streaming {
            title: title.to_string(),
            url,
        })
        .await?;
    ctx.reply("Done.").await
}

async fn set_avatar(ctx: CommandContext) -> Result<(), Error> {
    let raw = ctx.args.trim();
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => {
            return ctx.reply("That does not look like a valid URL.").await;
        }
    };
    match ctx.gateway.set_avatar(&url).await {
        Ok(()) => ctx.reply("Done.").await,
        Err(e) => {
            error!("failed to set avatar: {:?}", e);
            ctx.reply("Error, check your console or logs for more information.")
                .await
        }
    }
}

async fn set_token(ctx: CommandContext) -> Result<(), Error> {
    let token = ctx.args.trim();
    // Anything shorter cannot be a real token.
    if token.len() >= 50 {
        ctx.settings.set_token(token).await?;
        ctx.reply("Token set. Restart to use the new token.").await
    } else {
        ctx.reply("Invalid token.").await
    }
}

async fn set_description(ctx: CommandContext) -> Result<(), Error> {
    ctx.settings.set_description(ctx.args.trim()).await?;
    ctx.reply("My description has been set.").await
}

async fn set_repository(ctx: CommandContext) -> Result<(), Error> {
    let repository = ctx.args.trim();
    ctx.settings.set_repository(repository).await?;
    ctx.reply(&format!("My repository is now located at:\n<{}>", repository))
        .await
}

async fn set_official_invite(ctx: CommandContext) -> Result<(), Error> {
    let invite = ctx.args.trim();
    ctx.settings.set_official_invite(invite).await?;
    ctx.reply(&format!("My official server invite is now:\n<{}>", invite))
        .await
}

async fn add_prefix(ctx: CommandContext) -> Result<(), Error> {
    let mut prefix = ctx.args.trim();
    if prefix.starts_with('"') && prefix.ends_with('"') && prefix.len() >= 2 {
        prefix = &prefix[1..prefix.len() - 1];
    }
    if prefix.is_empty() {
        return ctx.reply("Usage: add_prefix <prefix>").await;
    }
    match ctx.settings.add_prefix(prefix).await {
        Ok(()) => {
            ctx.reply(&format!("The prefix '**{}**' was added successfully.", prefix))
                .await
        }
        Err(Error::PrefixAlreadyExists(_)) => {
            ctx.reply(&format!(
                "The prefix '**{}**' could not be added as it is already a prefix.",
                prefix
            ))
            .await
        }
        Err(e) => Err(e),
    }
}

async fn remove_prefix(ctx: CommandContext) -> Result<(), Error> {
    let prefix = ctx.args.trim();
    if prefix.is_empty() {
        return ctx.reply("Usage: remove_prefix <prefix>").await;
    }
    match ctx.settings.remove_prefix(prefix).await {
        Ok(()) => {
            ctx.reply(&format!(
                "The prefix '**{}**' was removed successfully.",
                prefix
            ))
            .await
        }
        Err(Error::PrefixNotFound(_)) => {
            ctx.reply(&format!("'**{}**' is not a prefix of this bot.", prefix))
                .await
        }
        Err(e) => Err(e),
    }
}

async fn prefixes(ctx: CommandContext) -> Result<(), Error> {
    let prefixes = ctx.settings.prefixes().await?;
    match prefixes.len() {
        0 => ctx.reply("I have no prefix set.").await,
        1 => {
            ctx.reply(&format!("My prefix is '**{}**'.", prefixes[0]))
                .await
        }
        _ => {
            let list = prefixes
                .iter()
                .map(|p| format!("'**{}**'", p))
                .collect::<Vec<_>>()
                .join(", ");
            ctx.reply(&format!("My prefixes are: {}", list)).await
        }
    }
}

async fn ping(ctx: CommandContext) -> Result<(), Error> {
    let elapsed = Utc::now()
        .signed_duration_since(ctx.message.timestamp)
        .num_milliseconds();
    ctx.reply(&format!("Pong.\nTime: {}ms", elapsed.max(0))).await
}

async fn shutdown(ctx: CommandContext) -> Result<(), Error> {
    ctx.reply("Goodbye!").await?;
    ctx.settings.shutdown().await
}

async fn restart(ctx: CommandContext) -> Result<(), Error> {
    ctx.reply("I'll be right back!").await?;
    ctx.settings.restart(Some(ctx.message.channel)).await
}

async fn leave(ctx: CommandContext) -> Result<(), Error> {
    let Some(guild) = ctx.message.guild else {
        return ctx.reply("This command can only be used on a server.").await;
    };
    let answer = ctx
        .interactions
        .ask_yes_no(
            ctx.message.channel,
            ctx.message.author.user_id,
            "Are you sure you want me to leave this server? (yes/no)",
            DEFAULT_CHOICE_TIMEOUT,
        )
        .await?;
    if answer == Some(true) {
        ctx.reply("Alright. Bye :wave:").await?;
        ctx.gateway.leave_guild(guild).await
    } else {
        ctx.reply("Ok I'll stay here then.").await
    }
}

async fn servers(ctx: CommandContext) -> Result<(), Error> {
    loop {
        let guilds = ctx.gateway.list_guilds().await?;
        if guilds.is_empty() {
            return ctx.reply("I am not a member of any server.").await;
        }
        let names: Vec<String> = guilds.iter().map(|g| g.name.clone()).collect();
        let choice = ctx
            .interactions
            .ask_choice(
                ctx.message.channel,
                ctx.message.author.user_id,
                "Which server do you want me to leave? Reply with its number.",
                &names,
                DEFAULT_CHOICE_TIMEOUT,
            )
            .await?;
        let Some(index) = choice else {
            break;
        };
        let guild = &guilds[index];
        let answer = ctx
            .interactions
            .ask_yes_no(
                ctx.message.channel,
                ctx.message.author.user_id,
                &format!("Are you sure you want me to leave **{}**? (yes/no)", guild.name),
                DEFAULT_CHOICE_TIMEOUT,
            )
            .await?;
        if answer == Some(true) {
            ctx.gateway.leave_guild(guild.guild_id).await?;
            ctx.reply("Done.").await?;
        } else {
            ctx.reply("I'll stay then.").await?;
        }
    }
    ctx.reply("Reinvoke the servers command if you need to leave any servers in the future.")
        .await
}

async fn contact(ctx: CommandContext) -> Result<(), Error> {
    let text = ctx.args.trim();
    if text.is_empty() {
        return ctx.reply("Usage: contact <message>").await;
    }
    let Some(owner) = ctx.settings.owner_id().await? else {
        return ctx.reply("I have no owner set.").await;
    };
    let source = match ctx.message.guild {
        Some(guild) => format!(", server {}", guild),
        None => ", direct message".to_string(),
    };
    let message = format!(
        "From **{}**{}:\n\n{}",
        ctx.message.author.user_id, source, text
    );
    match ctx.gateway.send_direct(owner, &message).await {
        Ok(()) => ctx.reply("Your message has been sent.").await,
        Err(e) => {
            error!("failed to relay contact message: {:?}", e);
            ctx.reply("I could not deliver your message. It may be too long.")
                .await
        }
    }
}

async fn about(ctx: CommandContext) -> Result<(), Error> {
    let description = ctx
        .settings
        .description()
        .await?
        .unwrap_or_else(|| "No description set.".to_string());
    let repository = ctx
        .settings
        .repository()
        .await?
        .unwrap_or_else(|| "not set".to_string());
    let invite = ctx
        .settings
        .official_invite()
        .await?
        .unwrap_or_else(|| "not set".to_string());
    ctx.reply(&format!(
        "{}\n**Repository:**\n<{}>\n**Official server:**\n<{}>",
        description, repository, invite
    ))
    .await
}

async fn version(ctx: CommandContext) -> Result<(), Error> {
    ctx.reply(&format!("Current version: {}", env!("CARGO_PKG_VERSION")))
        .await
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{chat_message, test_stack};
    use burrowbot_common::models::chat::{ChannelId, GuildId, GuildInfo, UserId};

    const CHANNEL: ChannelId = ChannelId(300);
    const OWNER: UserId = UserId(5);

    #[tokio::test]
    async fn test_set_status_updates_presence() {
        let stack = test_stack(CHANNEL, OWNER, vec![]).await;

        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!set status idle"))
            .await
            .unwrap();

        assert!(stack
            .gateway
            .profile_events()
            .contains(&"status=Idle".to_string()));
        assert_eq!(
            stack.gateway.sent_texts().last().map(String::as_str),
            Some("Status set to idle.")
        );
    }

    #[tokio::test]
    async fn test_set_status_rejects_unknown_status() {
        let stack = test_stack(CHANNEL, OWNER, vec![]).await;

        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!set status sleepy"))
            .await
            .unwrap();

        assert!(stack.gateway.profile_events().is_empty());
        assert_eq!(
            stack.gateway.sent_texts().last().map(String::as_str),
            Some("Statuses are: online, idle, dnd, invisible.")
        );
    }

    #[tokio::test]
    async fn test_add_prefix_twice_reports_duplicate() {
        let stack = test_stack(CHANNEL, OWNER, vec![]).await;

        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!add_prefix ?"))
            .await
            .unwrap();
        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!add_prefix ?"))
            .await
            .unwrap();

        let texts = stack.gateway.sent_texts();
        assert_eq!(
            texts[0],
            "The prefix '**?**' was added successfully."
        );
        assert_eq!(
            texts[1],
            "The prefix '**?**' could not be added as it is already a prefix."
        );
        assert_eq!(stack.settings.prefixes().await.unwrap(), vec!["!", "?"]);
    }

    #[tokio::test]
    async fn test_servers_leaves_selected_guild_after_confirmation() {
        let stack = test_stack(CHANNEL, OWNER, vec![]).await;
        stack.gateway.set_guilds(vec![GuildInfo {
            guild_id: GuildId(42),
            name: "testing grounds".to_string(),
        }]);
        stack.gateway.queue_reply("1"); // pick the only guild
        stack.gateway.queue_reply("yes"); // confirm leaving it

        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!servers"))
            .await
            .unwrap();

        assert_eq!(stack.gateway.left_guilds(), vec![GuildId(42)]);
        let texts = stack.gateway.sent_texts();
        assert!(texts.iter().any(|t| t.contains("**1**: testing grounds")));
        assert!(texts.iter().any(|t| t == "Done."));
        assert_eq!(
            texts.last().map(String::as_str),
            Some("I am not a member of any server.")
        );
    }

    #[tokio::test]
    async fn test_about_reads_settings() {
        let stack = test_stack(CHANNEL, OWNER, vec![]).await;
        stack.settings.set_description("A helpful bot.").await.unwrap();
        stack
            .settings
            .set_repository("https://example.org/burrowbot")
            .await
            .unwrap();

        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!about"))
            .await
            .unwrap();

        let texts = stack.gateway.sent_texts();
        let about = texts.last().unwrap();
        assert!(about.starts_with("A helpful bot."));
        assert!(about.contains("<https://example.org/burrowbot>"));
    }

    #[tokio::test]
    async fn test_version_reports_crate_version() {
        let stack = test_stack(CHANNEL, OWNER, vec![]).await;

        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!version"))
            .await
            .unwrap();

        let texts = stack.gateway.sent_texts();
        assert_eq!(
            texts.last().map(String::as_str),
            Some(concat!("Current version: ", env!("CARGO_PKG_VERSION")))
        );
    }

    #[tokio::test]
    async fn test_leave_outside_a_guild_is_refused() {
        let stack = test_stack(CHANNEL, OWNER, vec![]).await;

        stack
            .commands
            .handle_chat_line(chat_message(CHANNEL, OWNER, "!leave"))
            .await
            .unwrap();

        assert!(stack.gateway.left_guilds().is_empty());
        assert_eq!(
            stack.gateway.sent_texts().last().map(String::as_str),
            Some("This command can only be used on a server.")
        );
    }
}
