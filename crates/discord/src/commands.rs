use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tickety_core::domain::category::parse_category_with_emoji;
use tickety_core::domain::guild_config::GuildConfig;
use tickety_core::domain::ids::{parse_mention, ChannelId, GuildId, RoleId, UserId};
use tickety_core::domain::validation::{
    parse_hex_color, parse_image_url, parse_panel_type, ValidationError,
};
use tickety_core::errors::ApplicationError;
use tickety_db::repositories::{GuildConfigRepository, RepositoryError};

use crate::embeds::{info_message, success_message, usage_message, OutgoingMessage};
use crate::events::EventContext;
use crate::platform::{
    emoji_registry, ChannelInfo, ChannelKind, ChatPlatform, OverwriteTarget, Permission,
    PlatformError,
};
use crate::setup::{SetupError, SetupRequest, SetupService};
use crate::tickets::{AccessChange, CloseRequest, TicketError, TicketService};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TicketCommand {
    Setup { channel: String },
    PanelType { value: String },
    SetColor { value: String },
    SetImage { url: String },
    SetWelcomeImage { url: String },
    PingRole { role: String },
    AccessRole { role: String },
    Log { channel: String },
    Limit { value: String },
    Close { reason: Option<String> },
    CloseAll,
    Add { target: String },
    Remove { target: String },
    AddCategory { line: String },
    RemoveCategory { value: String },
    /// Known command word with a missing or unknown argument.
    Usage,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandInvocation {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub username: String,
    pub prefix: String,
    pub command: TicketCommand,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{0}")]
    Permission(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Setup(#[from] SetupError),
    #[error(transparent)]
    Ticket(#[from] TicketError),
    #[error("platform request failed: {0}")]
    Platform(#[from] PlatformError),
    #[error("failed to update guild configuration: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<CommandError> for ApplicationError {
    fn from(value: CommandError) -> Self {
        match value {
            CommandError::Permission(message) => Self::Permission(message),
            CommandError::Invalid(error) => Self::from(error),
            CommandError::Setup(error) => Self::from(error),
            CommandError::Ticket(error) => Self::from(error),
            CommandError::Platform(error) => Self::Integration(error.to_string()),
            CommandError::Repository(error) => Self::Persistence(error.to_string()),
        }
    }
}

/// Parses the text after the prefix. `None` means the message is not one of
/// our commands at all.
pub fn parse_command(body: &str) -> Option<TicketCommand> {
    let trimmed = body.trim();
    let (word, rest) = split_word(trimmed);
    match word.to_ascii_lowercase().as_str() {
        "ticket" => {
            let (sub, args) = split_word(rest);
            Some(classify_ticket_command(&sub.to_ascii_lowercase(), args))
        }
        "addcategory" if !rest.is_empty() => {
            Some(TicketCommand::AddCategory { line: rest.to_owned() })
        }
        "removecategory" => Some(match first_arg(rest) {
            Some(value) => TicketCommand::RemoveCategory { value },
            None => TicketCommand::Usage,
        }),
        "addcategory" => Some(TicketCommand::Usage),
        _ => None,
    }
}

fn classify_ticket_command(sub: &str, args: &str) -> TicketCommand {
    let arg = first_arg(args);
    match (sub, arg) {
        ("setup", Some(channel)) => TicketCommand::Setup { channel },
        ("paneltype", Some(value)) => TicketCommand::PanelType { value },
        ("setcolor", Some(value)) => TicketCommand::SetColor { value },
        ("setimage", Some(url)) => TicketCommand::SetImage { url },
        ("setwelcomeimage", Some(url)) => TicketCommand::SetWelcomeImage { url },
        ("pingrole", Some(role)) => TicketCommand::PingRole { role },
        ("accessrole", Some(role)) => TicketCommand::AccessRole { role },
        ("log", Some(channel)) => TicketCommand::Log { channel },
        ("limit", Some(value)) => TicketCommand::Limit { value },
        ("close", _) => {
            TicketCommand::Close { reason: (!args.is_empty()).then(|| args.to_owned()) }
        }
        ("closeall", _) => TicketCommand::CloseAll,
        ("add", Some(target)) => TicketCommand::Add { target },
        ("remove", Some(target)) => TicketCommand::Remove { target },
        _ => TicketCommand::Usage,
    }
}

fn split_word(input: &str) -> (&str, &str) {
    let input = input.trim();
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    }
}

fn first_arg(args: &str) -> Option<String> {
    args.split_whitespace().next().map(str::to_owned)
}

/// Executes prefix commands. Every command needs Manage Server.
pub struct CommandRouter {
    platform: Arc<dyn ChatPlatform>,
    configs: Arc<dyn GuildConfigRepository>,
    setup: Arc<SetupService>,
    tickets: Arc<TicketService>,
    default_prefix: String,
}

impl CommandRouter {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        configs: Arc<dyn GuildConfigRepository>,
        setup: Arc<SetupService>,
        tickets: Arc<TicketService>,
        default_prefix: impl Into<String>,
    ) -> Self {
        Self { platform, configs, setup, tickets, default_prefix: default_prefix.into() }
    }

    pub async fn prefix_for(&self, guild_id: &GuildId) -> Result<String, RepositoryError> {
        Ok(match self.configs.find(guild_id).await? {
            Some(config) => config.prefix,
            None => self.default_prefix.clone(),
        })
    }

    /// `Ok(None)` when the command already answered in-channel.
    pub async fn route(
        &self,
        invocation: &CommandInvocation,
        ctx: &EventContext,
    ) -> Result<Option<OutgoingMessage>, CommandError> {
        let guild_id = &invocation.guild_id;
        if !self
            .platform
            .has_permission(guild_id, &invocation.user_id, None, Permission::ManageGuild)
            .await?
        {
            return Err(CommandError::Permission(
                "you need the Manage Server permission to use ticket commands".to_owned(),
            ));
        }

        info!(
            correlation_id = %ctx.correlation_id,
            guild_id = %guild_id,
            user_id = %invocation.user_id,
            command = ?invocation.command,
            "routing ticket command"
        );

        let reply = match &invocation.command {
            TicketCommand::Usage => usage_message(&invocation.prefix),
            TicketCommand::Setup { channel } => {
                let request = SetupRequest {
                    guild_id: guild_id.clone(),
                    user_id: invocation.user_id.clone(),
                    origin_channel: invocation.channel_id.clone(),
                    target: channel.clone(),
                };
                self.setup.start(request, ctx).await?
            }
            TicketCommand::PanelType { value } => {
                let panel_type = parse_panel_type(value)?;
                self.update_config(guild_id, |config| {
                    config.panel_type = panel_type;
                    Ok(())
                })
                .await?;
                success_message(&format!(
                    "Panel type set to `{panel_type}`. Run `{}ticket setup` to post a new panel.",
                    invocation.prefix
                ))
            }
            TicketCommand::SetColor { value } => {
                let color = parse_hex_color(value)?;
                self.update_config(guild_id, |config| {
                    config.embed_color = color.clone();
                    Ok(())
                })
                .await?;
                success_message(&format!("Embed color set to `{color}`."))
            }
            TicketCommand::SetImage { url } => {
                let image = parse_image_url(url)?;
                let removed = image.is_none();
                self.update_config(guild_id, |config| {
                    config.panel_image = image;
                    Ok(())
                })
                .await?;
                success_message(if removed { "Panel image removed." } else { "Panel image set." })
            }
            TicketCommand::SetWelcomeImage { url } => {
                let image = parse_image_url(url)?;
                let removed = image.is_none();
                self.update_config(guild_id, |config| {
                    config.welcome_image = image;
                    Ok(())
                })
                .await?;
                success_message(if removed {
                    "Welcome image removed."
                } else {
                    "Welcome image set."
                })
            }
            TicketCommand::PingRole { role } => {
                let role = self.resolve_role(guild_id, role).await?;
                let added = self
                    .update_config(guild_id, |config| Ok(config.add_ping_role(role.clone())))
                    .await?;
                role_reply(added, &role, "ping")
            }
            TicketCommand::AccessRole { role } => {
                let role = self.resolve_role(guild_id, role).await?;
                let added = self
                    .update_config(guild_id, |config| Ok(config.add_access_role(role.clone())))
                    .await?;
                role_reply(added, &role, "access")
            }
            TicketCommand::Log { channel } => {
                let channel_id = self.resolve_log_channel(guild_id, channel).await?;
                self.update_config(guild_id, |config| {
                    config.transcript_channel_id = Some(channel_id.clone());
                    Ok(())
                })
                .await?;
                success_message(&format!("Ticket transcripts will be posted in <#{channel_id}>."))
            }
            TicketCommand::Limit { value } => match value.parse::<u32>() {
                Ok(limit) => {
                    self.update_config(guild_id, |config| config.set_ticket_limit(limit)).await?;
                    success_message(&format!("Members can now have {limit} open tickets."))
                }
                Err(_) => usage_message(&invocation.prefix),
            },
            TicketCommand::Close { reason } => {
                let request = CloseRequest {
                    guild_id: guild_id.clone(),
                    channel_id: invocation.channel_id.clone(),
                    actor_id: invocation.user_id.clone(),
                    actor_name: invocation.username.clone(),
                    reason: reason.clone(),
                };
                self.tickets.close(request, ctx).await?;
                return Ok(None);
            }
            TicketCommand::CloseAll => {
                let summary = self
                    .tickets
                    .close_all(guild_id, &invocation.user_id, &invocation.username, ctx)
                    .await?;
                success_message(&format!(
                    "Done! Succeeded: `{}` Failed: `{}`",
                    summary.succeeded, summary.failed
                ))
            }
            TicketCommand::Add { target } => {
                self.change_access(invocation, target, AccessChange::Grant, ctx).await?
            }
            TicketCommand::Remove { target } => {
                self.change_access(invocation, target, AccessChange::Revoke, ctx).await?
            }
            TicketCommand::AddCategory { line } => {
                let registry = emoji_registry(self.platform.as_ref(), guild_id).await?;
                let category = parse_category_with_emoji(line, &registry)?;
                let value = category.value.clone();
                self.update_config(guild_id, |config| config.add_category(category)).await?;
                success_message(&format!("Category `{value}` added."))
            }
            TicketCommand::RemoveCategory { value } => {
                let removed = self
                    .update_config(guild_id, |config| config.remove_category(value))
                    .await?;
                success_message(&format!("Category `{}` removed.", removed.value))
            }
        };
        Ok(Some(reply))
    }

    async fn update_config<T, F>(&self, guild_id: &GuildId, edit: F) -> Result<T, CommandError>
    where
        F: FnOnce(&mut GuildConfig) -> Result<T, ValidationError>,
    {
        let mut config = match self.configs.find(guild_id).await? {
            Some(config) => config,
            None => {
                let mut config = GuildConfig::new(guild_id.clone());
                config.prefix = self.default_prefix.clone();
                config
            }
        };
        let output = edit(&mut config)?;
        self.configs.save(config).await?;
        Ok(output)
    }

    async fn resolve_role(&self, guild_id: &GuildId, raw: &str) -> Result<RoleId, CommandError> {
        let unknown = || CommandError::from(ValidationError::UnknownRole(raw.trim().to_owned()));
        let id = parse_mention(raw).ok_or_else(unknown)?;
        let roles = self.platform.guild_roles(guild_id).await?;
        roles
            .into_iter()
            .find(|role| role.id.as_str() == id && !role.is_everyone(guild_id))
            .map(|role| role.id)
            .ok_or_else(unknown)
    }

    async fn resolve_log_channel(
        &self,
        guild_id: &GuildId,
        raw: &str,
    ) -> Result<ChannelId, CommandError> {
        let unknown = || CommandError::from(ValidationError::UnknownChannel(raw.trim().to_owned()));
        let channel_id = parse_mention(raw).map(ChannelId::new).ok_or_else(unknown)?;
        let is_guild_text = |channel: &ChannelInfo| {
            channel.kind == ChannelKind::Text && &channel.guild_id == guild_id
        };
        if !self.platform.channel(&channel_id).await?.as_ref().is_some_and(is_guild_text) {
            return Err(unknown());
        }

        let bot = self.platform.bot_user_id();
        for permission in [Permission::SendMessages, Permission::EmbedLinks] {
            if !self.platform.has_permission(guild_id, &bot, Some(&channel_id), permission).await? {
                return Err(CommandError::Permission(format!(
                    "I need Send Messages and Embed Links in <#{channel_id}>"
                )));
            }
        }
        Ok(channel_id)
    }

    async fn change_access(
        &self,
        invocation: &CommandInvocation,
        target: &str,
        change: AccessChange,
        ctx: &EventContext,
    ) -> Result<OutgoingMessage, CommandError> {
        let target = self
            .tickets
            .change_access(
                &invocation.guild_id,
                &invocation.channel_id,
                target,
                change,
                &invocation.user_id,
                ctx,
            )
            .await?;
        let mention = match &target {
            OverwriteTarget::Role(role) => format!("<@&{role}>"),
            OverwriteTarget::Member(user) => format!("<@{user}>"),
        };
        Ok(success_message(&match change {
            AccessChange::Grant => format!("Added {mention} to this ticket."),
            AccessChange::Revoke => format!("Removed {mention} from this ticket."),
        }))
    }
}

fn role_reply(added: bool, role: &RoleId, kind: &str) -> OutgoingMessage {
    if added {
        success_message(&format!("<@&{role}> added as a {kind} role."))
    } else {
        info_message("Nothing changed", &format!("<@&{role}> is already a {kind} role."))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tickety_core::domain::category::Category;
    use tickety_core::domain::guild_config::{GuildConfig, PanelType};
    use tickety_core::domain::ids::{ChannelId, EmojiId, GuildId, RoleId, UserId};
    use tickety_db::repositories::GuildConfigRepository;

    use super::{parse_command, CommandError, CommandInvocation, TicketCommand};
    use crate::bot::{BotServices, BotSettings};
    use crate::events::EventContext;
    use crate::platform::Permission;
    use crate::setup::SetupError;
    use crate::testing::{
        fixture, Fixture, ADMIN, BOT, COMMANDS_CHANNEL, GUILD, LOG_CHANNEL, MEMBER, PANEL_CHANNEL,
        SUPPORT_ROLE,
    };

    fn services(fixture: &Fixture) -> BotServices {
        BotServices::new(
            fixture.platform.clone(),
            fixture.configs.clone(),
            fixture.tickets.clone(),
            Arc::new(fixture.clock.clone()),
            Arc::new(fixture.audit.clone()),
            BotSettings::default(),
        )
    }

    fn invocation(user: &str, body: &str) -> CommandInvocation {
        CommandInvocation {
            guild_id: GuildId::new(GUILD),
            channel_id: ChannelId::new(COMMANDS_CHANNEL),
            user_id: UserId::new(user),
            username: "ana".to_owned(),
            prefix: "$".to_owned(),
            command: parse_command(body).expect("known command"),
        }
    }

    async fn run(fixture: &Fixture, body: &str) -> Result<String, CommandError> {
        services(fixture)
            .commands
            .route(&invocation(ADMIN, body), &EventContext::default())
            .await
            .map(|reply| reply.map(|message| message.plain_text()).unwrap_or_default())
    }

    async fn stored(fixture: &Fixture) -> GuildConfig {
        fixture.configs.find(&GuildId::new(GUILD)).await.expect("find").expect("stored config")
    }

    #[test]
    fn parses_known_commands_and_falls_back_to_usage() {
        assert_eq!(
            parse_command("ticket setup <#300>"),
            Some(TicketCommand::Setup { channel: "<#300>".to_owned() })
        );
        assert_eq!(
            parse_command("TICKET Close spam and more"),
            Some(TicketCommand::Close { reason: Some("spam and more".to_owned()) })
        );
        assert_eq!(parse_command("ticket close"), Some(TicketCommand::Close { reason: None }));
        assert_eq!(
            parse_command("addcategory Bug bug Report a bug 🐛"),
            Some(TicketCommand::AddCategory { line: "Bug bug Report a bug 🐛".to_owned() })
        );
        assert_eq!(parse_command("ticket"), Some(TicketCommand::Usage));
        assert_eq!(parse_command("ticket dance"), Some(TicketCommand::Usage));
        assert_eq!(parse_command("ticket limit"), Some(TicketCommand::Usage));
        assert_eq!(parse_command("removecategory"), Some(TicketCommand::Usage));
        assert_eq!(parse_command("play music"), None);
    }

    #[tokio::test]
    async fn commands_require_manage_server() {
        let fixture = fixture();
        let result = services(&fixture)
            .commands
            .route(&invocation(MEMBER, "ticket setcolor #FF0000"), &EventContext::default())
            .await;

        assert!(matches!(result, Err(CommandError::Permission(_))));
        assert_eq!(fixture.configs.find(&GuildId::new(GUILD)).await.expect("find"), None);
    }

    #[tokio::test]
    async fn appearance_commands_validate_and_store() {
        let fixture = fixture();

        run(&fixture, "ticket setcolor #FF0000").await.expect("color");
        run(&fixture, "ticket paneltype reactions").await.expect("panel type");
        run(&fixture, "ticket setimage https://cdn.example.com/banner.png").await.expect("image");
        let config = stored(&fixture).await;
        assert_eq!(config.embed_color, "#FF0000");
        assert_eq!(config.panel_type, PanelType::Reactions);
        assert_eq!(config.panel_image.as_deref(), Some("https://cdn.example.com/banner.png"));

        run(&fixture, "ticket setimage none").await.expect("clear image");
        assert_eq!(stored(&fixture).await.panel_image, None);

        let invalid = run(&fixture, "ticket setcolor red").await;
        assert!(matches!(invalid, Err(CommandError::Invalid(_))));
    }

    #[tokio::test]
    async fn roles_are_added_once() {
        let fixture = fixture();

        let first = run(&fixture, "ticket pingrole <@&600>").await.expect("ping role");
        assert!(first.contains("added as a ping role"));
        let again = run(&fixture, "ticket pingrole 600").await.expect("ping role again");
        assert!(again.contains("already a ping role"));
        run(&fixture, "ticket accessrole <@&600>").await.expect("access role");

        let config = stored(&fixture).await;
        assert_eq!(config.ping_roles.len(), 1);
        assert!(config.access_roles.contains(&RoleId::new(SUPPORT_ROLE)));

        let unknown = run(&fixture, "ticket pingrole <@&12345>").await;
        assert!(matches!(unknown, Err(CommandError::Invalid(_))));
    }

    #[tokio::test]
    async fn log_channel_needs_bot_access() {
        let fixture = fixture();
        run(&fixture, &format!("ticket log <#{LOG_CHANNEL}>")).await.expect("log");
        assert_eq!(stored(&fixture).await.transcript_channel_id, Some(ChannelId::new(LOG_CHANNEL)));

        fixture.platform.deny_in_channel(
            &ChannelId::new(PANEL_CHANNEL),
            &UserId::new(BOT),
            Permission::EmbedLinks,
        );
        let denied = run(&fixture, &format!("ticket log {PANEL_CHANNEL}")).await;
        assert!(matches!(denied, Err(CommandError::Permission(_))));
    }

    #[tokio::test]
    async fn limit_must_be_numeric_and_at_least_five() {
        let fixture = fixture();

        let usage = run(&fixture, "ticket limit lots").await.expect("usage");
        assert!(usage.contains("Incorrect usage"));
        let low = run(&fixture, "ticket limit 2").await;
        assert!(matches!(low, Err(CommandError::Invalid(_))));
        run(&fixture, "ticket limit 10").await.expect("limit");
        assert_eq!(stored(&fixture).await.ticket_limit, 10);
    }

    #[tokio::test]
    async fn categories_are_checked_against_live_emojis() {
        let fixture = fixture();

        let unregistered = run(&fixture, "addcategory Vip vip Priority lane <:vip:404>").await;
        assert!(matches!(unregistered, Err(CommandError::Invalid(_))));

        fixture.platform.add_emoji(&GuildId::new(GUILD), EmojiId::new("404"));
        run(&fixture, "addcategory Vip vip Priority lane <:vip:404>").await.expect("add");
        let duplicate = run(&fixture, "addcategory Vip vip Again <:vip:404>").await;
        assert!(matches!(duplicate, Err(CommandError::Invalid(_))));
        assert_eq!(
            stored(&fixture).await.category("vip"),
            Some(&Category::new("Vip", "vip", "Priority lane", "<:vip:404>"))
        );

        run(&fixture, "removecategory vip").await.expect("remove");
        let missing = run(&fixture, "removecategory vip").await;
        assert!(matches!(missing, Err(CommandError::Invalid(_))));
    }

    #[tokio::test]
    async fn setup_command_starts_the_wizard() {
        let fixture = fixture();
        let reply =
            run(&fixture, &format!("ticket setup <#{PANEL_CHANNEL}>")).await.expect("setup");
        assert!(reply.contains("step 1/11"));

        let wrong = run(&fixture, "ticket setup <#999>").await;
        assert!(matches!(wrong, Err(CommandError::Setup(SetupError::Invalid(_)))));
    }

    #[tokio::test]
    async fn closeall_reports_counts() {
        let fixture = fixture();
        fixture.configs.save(GuildConfig::new(GuildId::new(GUILD))).await.expect("save");

        let reply = run(&fixture, "ticket closeall").await.expect("closeall");
        assert!(reply.contains("Done! Succeeded: `0` Failed: `0`"));
    }
}
