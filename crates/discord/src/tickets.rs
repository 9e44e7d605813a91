use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use tickety_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use tickety_core::domain::guild_config::{GuildConfig, PanelType};
use tickety_core::domain::ids::{parse_mention, ChannelId, GuildId, RoleId, UserId};
use tickety_core::domain::ticket::{ticket_channel_name, Ticket};
use tickety_core::domain::validation::ValidationError;
use tickety_core::errors::{ApplicationError, DomainError};
use tickety_core::wizard::Clock;
use tickety_db::repositories::{GuildConfigRepository, RepositoryError, TicketRepository};

use crate::embeds::{info_message, transcript_message, welcome_message};
use crate::events::{EventContext, ReactionEvent};
use crate::platform::{
    ChannelKind, ChatPlatform, NewChannel, OverwriteTarget, Permission, PermissionOverwrite,
    PlatformError,
};

pub const TRANSCRIPT_MESSAGE_LIMIT: usize = 100;
pub const DEFAULT_CLOSE_DELAY: Duration = Duration::from_secs(5);

const AUDIT_ACTOR: &str = "discord";
const MEMBER_ACCESS: [Permission; 2] = [Permission::ViewChannel, Permission::SendMessages];

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("this server has no ticket configuration yet; run `ticket setup` first")]
    NotConfigured,
    #[error("you already have {limit} open ticket(s); close one before opening another")]
    LimitReached { limit: u32 },
    #[error("this command only works inside an open ticket channel")]
    NotTicketChannel,
    #[error("{0}")]
    Permission(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("platform request failed: {0}")]
    Platform(#[from] PlatformError),
    #[error("ticket storage failed: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<TicketError> for ApplicationError {
    fn from(value: TicketError) -> Self {
        match value {
            TicketError::NotConfigured
            | TicketError::LimitReached { .. }
            | TicketError::NotTicketChannel => {
                Self::Domain(DomainError::InvariantViolation(value.to_string()))
            }
            TicketError::Permission(message) => Self::Permission(message),
            TicketError::Invalid(error) => Self::from(error),
            TicketError::Domain(error) => Self::Domain(error),
            TicketError::Platform(error) => Self::Integration(error.to_string()),
            TicketError::Repository(error) => Self::Persistence(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenRequest {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub username: String,
    /// Channel the panel lives in; its parent is the fallback ticket category.
    pub source_channel: ChannelId,
    pub ticket_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CloseRequest {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub actor_id: UserId,
    pub actor_name: String,
    pub reason: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CloseAllSummary {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessChange {
    Grant,
    Revoke,
}

/// Opens, closes and shares ticket channels.
pub struct TicketService {
    platform: Arc<dyn ChatPlatform>,
    configs: Arc<dyn GuildConfigRepository>,
    tickets: Arc<dyn TicketRepository>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    close_delay: Duration,
}

impl TicketService {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        configs: Arc<dyn GuildConfigRepository>,
        tickets: Arc<dyn TicketRepository>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { platform, configs, tickets, clock, audit, close_delay: DEFAULT_CLOSE_DELAY }
    }

    /// Zero deletes closed channels before `close` returns.
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    pub async fn open(
        &self,
        request: OpenRequest,
        ctx: &EventContext,
    ) -> Result<Ticket, TicketError> {
        let audit = self.audit_context(&request.guild_id, &request.user_id, ctx);
        let config =
            self.configs.find(&request.guild_id).await?.ok_or(TicketError::NotConfigured)?;
        let category = config
            .category(&request.ticket_type)
            .cloned()
            .ok_or_else(|| ValidationError::UnknownCategory(request.ticket_type.clone()))?;

        let open =
            self.tickets.count_open_for_creator(&request.guild_id, &request.user_id).await?;
        if open >= config.ticket_limit {
            info!(
                correlation_id = %ctx.correlation_id,
                guild_id = %request.guild_id,
                user_id = %request.user_id,
                open,
                limit = config.ticket_limit,
                "ticket limit reached"
            );
            self.audit.emit(
                audit
                    .event("ticket.limit_reached", AuditCategory::Ticket, AuditOutcome::Rejected)
                    .with_metadata("open", open.to_string()),
            );
            return Err(TicketError::LimitReached { limit: config.ticket_limit });
        }

        let parent_id = match &config.parent_category_id {
            Some(parent) => Some(parent.clone()),
            None => self
                .platform
                .channel(&request.source_channel)
                .await?
                .and_then(|channel| channel.parent_id),
        };
        let channel = NewChannel {
            name: ticket_channel_name(&request.username, &category.value),
            kind: ChannelKind::Text,
            parent_id,
            overwrites: self.ticket_overwrites(&config, &request.user_id),
        };
        let channel_id = self.platform.create_channel(&request.guild_id, channel).await?;

        let ticket = Ticket::open(
            request.guild_id.clone(),
            channel_id.clone(),
            request.user_id.clone(),
            category.value.clone(),
            config.transcript_channel_id.clone(),
            self.clock.now(),
        );
        if let Err(store_error) = self.tickets.save(ticket.clone()).await {
            if let Err(delete_error) = self.platform.delete_channel(&channel_id).await {
                warn!(
                    channel_id = %channel_id,
                    error = %delete_error,
                    "failed to remove ticket channel after storage failure"
                );
            }
            return Err(store_error.into());
        }

        let mention = format!("<@{}>", request.user_id);
        let welcome = welcome_message(&config, &category.value, &mention);
        if let Err(error) = self.platform.send_message(&channel_id, welcome).await {
            warn!(channel_id = %channel_id, error = %error, "failed to post ticket welcome");
        }

        info!(
            event_name = "ticket.opened",
            correlation_id = %ctx.correlation_id,
            guild_id = %ticket.guild_id,
            user_id = %ticket.creator_id,
            channel_id = %ticket.channel_id,
            ticket_type = %ticket.ticket_type,
            "ticket opened"
        );
        self.audit.emit(
            audit
                .event("ticket.opened", AuditCategory::Ticket, AuditOutcome::Success)
                .with_metadata("channel_id", ticket.channel_id.to_string())
                .with_metadata("ticket_type", ticket.ticket_type.clone()),
        );
        Ok(ticket)
    }

    /// `None` when the reaction is not on this guild's reactions panel or the
    /// emoji belongs to no category.
    pub async fn open_from_reaction(
        &self,
        event: &ReactionEvent,
        ctx: &EventContext,
    ) -> Result<Option<Ticket>, TicketError> {
        let Some(guild_id) = &event.guild_id else {
            return Ok(None);
        };
        let Some(config) = self.configs.find(guild_id).await? else {
            return Ok(None);
        };
        if config.panel_type != PanelType::Reactions || !config.is_panel_message(&event.message_id)
        {
            return Ok(None);
        }
        let Some(category) = config.category_by_emoji(&event.emoji) else {
            return Ok(None);
        };

        if let Err(error) = self
            .platform
            .remove_reaction(&event.channel_id, &event.message_id, &event.emoji, &event.user_id)
            .await
        {
            warn!(
                message_id = %event.message_id,
                error = %error,
                "failed to remove panel reaction"
            );
        }

        let request = OpenRequest {
            guild_id: guild_id.clone(),
            user_id: event.user_id.clone(),
            username: event.username.clone(),
            source_channel: event.channel_id.clone(),
            ticket_type: category.value.clone(),
        };
        self.open(request, ctx).await.map(Some)
    }

    pub async fn close(
        &self,
        request: CloseRequest,
        ctx: &EventContext,
    ) -> Result<Ticket, TicketError> {
        let mut ticket = self
            .tickets
            .find_by_channel(&request.channel_id)
            .await?
            .filter(|ticket| ticket.guild_id == request.guild_id && ticket.is_open())
            .ok_or(TicketError::NotTicketChannel)?;
        self.require_bot_manage_channels(&request.guild_id).await?;

        self.close_ticket(&mut ticket, &request.actor_name, request.reason.as_deref()).await?;
        self.record_close(&ticket, &request.actor_id, ctx);
        Ok(ticket)
    }

    /// Tickets whose channel no longer exists are marked closed and counted as failed.
    pub async fn close_all(
        &self,
        guild_id: &GuildId,
        actor_id: &UserId,
        actor_name: &str,
        ctx: &EventContext,
    ) -> Result<CloseAllSummary, TicketError> {
        self.require_bot_manage_channels(guild_id).await?;

        let mut summary = CloseAllSummary::default();
        for mut ticket in self.tickets.list_open(guild_id).await? {
            let channel_exists = match self.platform.channel(&ticket.channel_id).await {
                Ok(channel) => channel.is_some(),
                Err(error) => {
                    warn!(channel_id = %ticket.channel_id, error = %error, "channel lookup failed");
                    false
                }
            };

            if channel_exists {
                match self.close_ticket(&mut ticket, actor_name, None).await {
                    Ok(()) => {
                        self.record_close(&ticket, actor_id, ctx);
                        summary.succeeded += 1;
                    }
                    Err(error) => {
                        warn!(
                            channel_id = %ticket.channel_id,
                            error = %error,
                            "failed to close ticket"
                        );
                        summary.failed += 1;
                    }
                }
            } else {
                ticket.close(self.clock.now())?;
                self.tickets.save(ticket.clone()).await?;
                info!(channel_id = %ticket.channel_id, "closed ticket whose channel is gone");
                summary.failed += 1;
            }
        }

        info!(
            event_name = "ticket.closed_all",
            correlation_id = %ctx.correlation_id,
            guild_id = %guild_id,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "closed all open tickets"
        );
        Ok(summary)
    }

    /// Grants or revokes view and send for a user or role id inside a ticket channel.
    pub async fn change_access(
        &self,
        guild_id: &GuildId,
        channel_id: &ChannelId,
        raw_target: &str,
        change: AccessChange,
        actor_id: &UserId,
        ctx: &EventContext,
    ) -> Result<OverwriteTarget, TicketError> {
        self.tickets
            .find_by_channel(channel_id)
            .await?
            .filter(|ticket| &ticket.guild_id == guild_id && ticket.is_open())
            .ok_or(TicketError::NotTicketChannel)?;
        let id = parse_mention(raw_target)
            .ok_or_else(|| ValidationError::InvalidId(raw_target.trim().to_owned()))?;

        let roles = self.platform.guild_roles(guild_id).await?;
        let target = if roles.iter().any(|role| role.id.as_str() == id) {
            OverwriteTarget::Role(RoleId::new(id))
        } else {
            OverwriteTarget::Member(UserId::new(id))
        };
        let overwrite = match change {
            AccessChange::Grant => PermissionOverwrite::allow(target.clone(), &MEMBER_ACCESS),
            AccessChange::Revoke => PermissionOverwrite::deny(target.clone(), &MEMBER_ACCESS),
        };
        self.platform.set_overwrite(channel_id, overwrite).await?;

        let event_type = match change {
            AccessChange::Grant => "ticket.access_granted",
            AccessChange::Revoke => "ticket.access_revoked",
        };
        info!(
            event_name = event_type,
            correlation_id = %ctx.correlation_id,
            guild_id = %guild_id,
            channel_id = %channel_id,
            target = ?target,
            "ticket access changed"
        );
        self.audit.emit(
            self.audit_context(guild_id, actor_id, ctx)
                .event(event_type, AuditCategory::Ticket, AuditOutcome::Success)
                .with_metadata("channel_id", channel_id.to_string()),
        );
        Ok(target)
    }

    fn ticket_overwrites(
        &self,
        config: &GuildConfig,
        creator: &UserId,
    ) -> Vec<PermissionOverwrite> {
        let everyone = RoleId::new(config.guild_id.as_str());
        let mut overwrites = vec![
            PermissionOverwrite::deny(OverwriteTarget::Role(everyone), &[Permission::ViewChannel]),
            PermissionOverwrite::allow(OverwriteTarget::Member(creator.clone()), &MEMBER_ACCESS),
            PermissionOverwrite::allow(
                OverwriteTarget::Member(self.platform.bot_user_id()),
                &MEMBER_ACCESS,
            ),
        ];
        overwrites.extend(config.access_roles.iter().map(|role| {
            PermissionOverwrite::allow(OverwriteTarget::Role(role.clone()), &MEMBER_ACCESS)
        }));
        overwrites
    }

    async fn require_bot_manage_channels(&self, guild_id: &GuildId) -> Result<(), TicketError> {
        let bot = self.platform.bot_user_id();
        if self.platform.has_permission(guild_id, &bot, None, Permission::ManageChannels).await? {
            Ok(())
        } else {
            Err(TicketError::Permission(
                "I need the Manage Channels permission to close tickets".to_owned(),
            ))
        }
    }

    async fn close_ticket(
        &self,
        ticket: &mut Ticket,
        actor_name: &str,
        reason: Option<&str>,
    ) -> Result<(), TicketError> {
        ticket.close(self.clock.now())?;
        self.tickets.save(ticket.clone()).await?;

        let config = self.configs.find(&ticket.guild_id).await?;
        self.post_transcript(ticket, config.as_ref()).await;

        let mut notice = format!("Closed by {actor_name}");
        if let Some(reason) = reason.map(str::trim).filter(|reason| !reason.is_empty()) {
            notice.push_str(&format!(": {reason}"));
        }
        if let Some(config) = &config {
            notice.push('\n');
            notice.push_str(&config.close_message);
        }
        let announcement = info_message("Ticket closed", &notice);
        if let Err(error) = self.platform.send_message(&ticket.channel_id, announcement).await {
            warn!(
                channel_id = %ticket.channel_id,
                error = %error,
                "failed to announce ticket closure"
            );
        }

        self.schedule_delete(ticket.channel_id.clone()).await;
        Ok(())
    }

    async fn post_transcript(&self, ticket: &Ticket, config: Option<&GuildConfig>) {
        let Some(log_channel) = ticket
            .transcript_channel_id
            .as_ref()
            .or_else(|| config.and_then(|config| config.transcript_channel_id.as_ref()))
        else {
            return;
        };

        match self.platform.channel(log_channel).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(channel_id = %log_channel, "transcript channel no longer exists");
                return;
            }
            Err(error) => {
                warn!(
                    channel_id = %log_channel,
                    error = %error,
                    "transcript channel lookup failed"
                );
                return;
            }
        }

        let channel_name = match self.platform.channel(&ticket.channel_id).await {
            Ok(Some(channel)) => channel.name,
            _ => ticket.channel_id.to_string(),
        };
        let lines = match self
            .platform
            .recent_messages(&ticket.channel_id, TRANSCRIPT_MESSAGE_LIMIT)
            .await
        {
            Ok(history) => history
                .into_iter()
                .map(|message| format!("{}: {}", message.author_tag, message.content))
                .collect::<Vec<_>>(),
            Err(error) => {
                warn!(
                    channel_id = %ticket.channel_id,
                    error = %error,
                    "failed to read ticket history"
                );
                return;
            }
        };

        if let Err(error) =
            self.platform.send_message(log_channel, transcript_message(&channel_name, &lines)).await
        {
            warn!(channel_id = %log_channel, error = %error, "failed to post transcript");
        }
    }

    async fn schedule_delete(&self, channel_id: ChannelId) {
        if self.close_delay.is_zero() {
            delete_ticket_channel(self.platform.as_ref(), &channel_id).await;
            return;
        }

        let platform = self.platform.clone();
        let delay = self.close_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            delete_ticket_channel(platform.as_ref(), &channel_id).await;
        });
    }

    fn record_close(&self, ticket: &Ticket, actor_id: &UserId, ctx: &EventContext) {
        info!(
            event_name = "ticket.closed",
            correlation_id = %ctx.correlation_id,
            guild_id = %ticket.guild_id,
            user_id = %actor_id,
            channel_id = %ticket.channel_id,
            "ticket closed"
        );
        self.audit.emit(
            self.audit_context(&ticket.guild_id, actor_id, ctx)
                .event("ticket.closed", AuditCategory::Ticket, AuditOutcome::Success)
                .with_metadata("channel_id", ticket.channel_id.to_string())
                .with_metadata("creator_id", ticket.creator_id.to_string()),
        );
    }

    fn audit_context(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        ctx: &EventContext,
    ) -> AuditContext {
        AuditContext::new(
            Some(guild_id.clone()),
            Some(user_id.clone()),
            ctx.correlation_id.clone(),
            AUDIT_ACTOR,
        )
    }
}

async fn delete_ticket_channel(platform: &dyn ChatPlatform, channel_id: &ChannelId) {
    if let Err(error) = platform.delete_channel(channel_id).await {
        warn!(channel_id = %channel_id, error = %error, "failed to delete closed ticket channel");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tickety_core::domain::guild_config::{GuildConfig, PanelLocation, PanelType};
    use tickety_core::domain::ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
    use tickety_core::domain::ticket::{Ticket, TicketStatus};
    use tickety_core::wizard::Clock;
    use tickety_db::repositories::{GuildConfigRepository, TicketRepository};

    use super::{AccessChange, CloseRequest, OpenRequest, TicketError, TicketService};
    use crate::events::{EventContext, ReactionEvent};
    use crate::platform::{ChannelKind, FailPoint, OverwriteTarget, Permission, PlatformCall};
    use crate::testing::{
        fixture, Fixture, ADMIN, BOT, GUILD, LOG_CHANNEL, MEMBER, PANEL_CHANNEL, SUPPORT_ROLE,
        TICKETS_CATEGORY,
    };

    fn service(fixture: &Fixture) -> TicketService {
        TicketService::new(
            fixture.platform.clone(),
            fixture.configs.clone(),
            fixture.tickets.clone(),
            Arc::new(fixture.clock.clone()),
            Arc::new(fixture.audit.clone()),
        )
        .with_close_delay(Duration::ZERO)
    }

    async fn configure(fixture: &Fixture, edit: impl FnOnce(&mut GuildConfig)) {
        let mut config = GuildConfig::new(GuildId::new(GUILD));
        config.ping_roles.insert(RoleId::new(SUPPORT_ROLE));
        config.access_roles.insert(RoleId::new(SUPPORT_ROLE));
        config.transcript_channel_id = Some(ChannelId::new(LOG_CHANNEL));
        edit(&mut config);
        fixture.configs.save(config).await.expect("save config");
    }

    fn open_request(ticket_type: &str) -> OpenRequest {
        OpenRequest {
            guild_id: GuildId::new(GUILD),
            user_id: UserId::new(MEMBER),
            username: "Zed".to_owned(),
            source_channel: ChannelId::new(PANEL_CHANNEL),
            ticket_type: ticket_type.to_owned(),
        }
    }

    fn close_request(channel_id: &ChannelId) -> CloseRequest {
        CloseRequest {
            guild_id: GuildId::new(GUILD),
            channel_id: channel_id.clone(),
            actor_id: UserId::new(ADMIN),
            actor_name: "ana".to_owned(),
            reason: Some("resolved".to_owned()),
        }
    }

    #[tokio::test]
    async fn opening_creates_a_private_channel_and_welcome() {
        let fixture = fixture();
        configure(&fixture, |_| {}).await;
        let service = service(&fixture);

        let ticket =
            service.open(open_request("bug"), &EventContext::default()).await.expect("open");

        let channel = fixture.platform.channel_named("ticket-zed-bug").expect("ticket channel");
        assert_eq!(channel.id, ticket.channel_id);
        assert_eq!(channel.kind, ChannelKind::Text);
        assert_eq!(channel.parent_id, Some(ChannelId::new(TICKETS_CATEGORY)));

        let overwrites = fixture.platform.overwrites(&ticket.channel_id);
        let everyone = overwrites
            .iter()
            .find(|overwrite| overwrite.target == OverwriteTarget::Role(RoleId::new(GUILD)))
            .expect("everyone overwrite");
        assert_eq!(everyone.deny, vec![Permission::ViewChannel]);
        for target in [
            OverwriteTarget::Member(UserId::new(MEMBER)),
            OverwriteTarget::Member(UserId::new(BOT)),
            OverwriteTarget::Role(RoleId::new(SUPPORT_ROLE)),
        ] {
            assert!(overwrites.iter().any(|overwrite| overwrite.target == target
                && overwrite.allow == vec![Permission::ViewChannel, Permission::SendMessages]));
        }

        let welcome = fixture.platform.messages_in(&ticket.channel_id);
        assert_eq!(welcome.len(), 1);
        assert_eq!(welcome[0].message.content.as_deref(), Some("<@&600>"));
        assert!(welcome[0].message.plain_text().contains("Welcome, <@43>!"));
        assert_eq!(
            fixture.tickets.find_by_channel(&ticket.channel_id).await.expect("find"),
            Some(ticket)
        );
    }

    #[tokio::test]
    async fn configured_parent_category_wins() {
        let fixture = fixture();
        fixture.platform.add_channel(
            &GuildId::new(GUILD),
            &ChannelId::new("401"),
            "Open Tickets",
            ChannelKind::Category,
            None,
        );
        configure(&fixture, |config| config.parent_category_id = Some(ChannelId::new("401")))
            .await;

        let ticket =
            service(&fixture).open(open_request("general"), &EventContext::default()).await;
        let channel_id = ticket.expect("open").channel_id;
        let channel = fixture.platform.channel_named("ticket-zed-general").expect("channel");
        assert_eq!(channel.id, channel_id);
        assert_eq!(channel.parent_id, Some(ChannelId::new("401")));
    }

    #[tokio::test]
    async fn limit_and_configuration_are_checked_first() {
        let fixture = fixture();
        let service = service(&fixture);
        let ctx = EventContext::default();

        let unconfigured = service.open(open_request("bug"), &ctx).await;
        assert!(matches!(unconfigured, Err(TicketError::NotConfigured)));

        configure(&fixture, |config| config.ticket_limit = 1).await;
        let unknown = service.open(open_request("billing"), &ctx).await;
        assert!(matches!(unknown, Err(TicketError::Invalid(_))));

        service.open(open_request("bug"), &ctx).await.expect("first ticket");
        let limited = service.open(open_request("bug"), &ctx).await;
        assert!(matches!(limited, Err(TicketError::LimitReached { limit: 1 })));
        assert!(fixture.audit.event_types().contains(&"ticket.limit_reached".to_owned()));
    }

    #[tokio::test]
    async fn failed_channel_creation_records_nothing() {
        let fixture = fixture();
        configure(&fixture, |_| {}).await;
        fixture.platform.fail(FailPoint::CreateChannel);

        let result = service(&fixture).open(open_request("bug"), &EventContext::default()).await;
        assert!(matches!(result, Err(TicketError::Platform(_))));
        assert!(fixture.tickets.list_open(&GuildId::new(GUILD)).await.expect("list").is_empty());
    }

    fn reaction(message_id: &str, emoji: &str) -> ReactionEvent {
        ReactionEvent {
            guild_id: Some(GuildId::new(GUILD)),
            channel_id: ChannelId::new(PANEL_CHANNEL),
            message_id: MessageId::new(message_id),
            user_id: UserId::new(MEMBER),
            username: "zed".to_owned(),
            user_is_bot: false,
            emoji: emoji.to_owned(),
        }
    }

    #[tokio::test]
    async fn reactions_on_the_panel_open_tickets() {
        let fixture = fixture();
        configure(&fixture, |config| {
            config.panel_type = PanelType::Reactions;
            config.panel = Some(PanelLocation {
                channel_id: ChannelId::new(PANEL_CHANNEL),
                message_id: MessageId::new("777"),
            });
        })
        .await;
        let service = service(&fixture);
        let ctx = EventContext::default();

        assert_eq!(
            service.open_from_reaction(&reaction("778", "🐛"), &ctx).await.expect("other"),
            None
        );
        assert_eq!(
            service.open_from_reaction(&reaction("777", "🍕"), &ctx).await.expect("unknown"),
            None
        );

        let ticket = service
            .open_from_reaction(&reaction("777", "🐛"), &ctx)
            .await
            .expect("reaction")
            .expect("ticket");
        assert_eq!(ticket.ticket_type, "bug");
        assert!(fixture.platform.calls().contains(&PlatformCall::RemoveReaction {
            message_id: MessageId::new("777"),
            emoji: "🐛".to_owned(),
            user_id: UserId::new(MEMBER),
        }));
    }

    #[tokio::test]
    async fn reactions_are_ignored_for_other_panel_types() {
        let fixture = fixture();
        configure(&fixture, |config| {
            config.panel = Some(PanelLocation {
                channel_id: ChannelId::new(PANEL_CHANNEL),
                message_id: MessageId::new("777"),
            });
        })
        .await;

        let result = service(&fixture)
            .open_from_reaction(&reaction("777", "🐛"), &EventContext::default())
            .await
            .expect("reaction");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn closing_posts_transcript_and_removes_channel() {
        let fixture = fixture();
        configure(&fixture, |_| {}).await;
        let service = service(&fixture);
        let ctx = EventContext::default();
        let ticket = service.open(open_request("bug"), &ctx).await.expect("open");
        fixture.platform.push_history(&ticket.channel_id, "zed#0001", "it is broken");
        fixture.platform.push_history(&ticket.channel_id, "ana#0002", "fixed now");

        let closed = service.close(close_request(&ticket.channel_id), &ctx).await.expect("close");

        assert_eq!(closed.status, TicketStatus::Closed);
        assert!(!fixture.platform.channel_exists(&ticket.channel_id));
        let transcript = fixture.platform.messages_in(&ChannelId::new(LOG_CHANNEL));
        assert_eq!(transcript.len(), 1);
        let content = transcript[0].message.content.clone().expect("content");
        assert!(content.contains("Transcript for ticket ticket-zed-bug"));
        assert!(content.contains("zed#0001: it is broken\nana#0002: fixed now"));
        assert!(fixture
            .platform
            .messages_in(&ticket.channel_id)
            .iter()
            .any(|sent| sent.message.plain_text().contains("Closed by ana: resolved")));
        assert!(fixture.audit.event_types().contains(&"ticket.closed".to_owned()));

        let again = service.close(close_request(&ticket.channel_id), &ctx).await;
        assert!(matches!(again, Err(TicketError::NotTicketChannel)));
    }

    #[tokio::test]
    async fn close_only_works_in_ticket_channels() {
        let fixture = fixture();
        configure(&fixture, |_| {}).await;

        let result = service(&fixture)
            .close(close_request(&ChannelId::new(PANEL_CHANNEL)), &EventContext::default())
            .await;
        assert!(matches!(result, Err(TicketError::NotTicketChannel)));
    }

    #[tokio::test(start_paused = true)]
    async fn channel_deletion_waits_for_the_close_delay() {
        let fixture = fixture();
        configure(&fixture, |_| {}).await;
        let service = service(&fixture).with_close_delay(Duration::from_secs(5));
        let ctx = EventContext::default();
        let ticket = service.open(open_request("bug"), &ctx).await.expect("open");

        service.close(close_request(&ticket.channel_id), &ctx).await.expect("close");
        assert!(fixture.platform.channel_exists(&ticket.channel_id));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!fixture.platform.channel_exists(&ticket.channel_id));
    }

    #[tokio::test]
    async fn close_all_counts_missing_channels_as_failed() {
        let fixture = fixture();
        configure(&fixture, |_| {}).await;
        let service = service(&fixture);
        let ctx = EventContext::default();
        service.open(open_request("bug"), &ctx).await.expect("open");
        let orphan = Ticket::open(
            GuildId::new(GUILD),
            ChannelId::new("999"),
            UserId::new(ADMIN),
            "general",
            None,
            fixture.clock.now(),
        );
        fixture.tickets.save(orphan).await.expect("save orphan");

        let summary = service
            .close_all(&GuildId::new(GUILD), &UserId::new(ADMIN), "ana", &ctx)
            .await
            .expect("close all");

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(fixture.tickets.list_open(&GuildId::new(GUILD)).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn access_changes_target_roles_or_members() {
        let fixture = fixture();
        configure(&fixture, |_| {}).await;
        let service = service(&fixture);
        let ctx = EventContext::default();
        let ticket = service.open(open_request("bug"), &ctx).await.expect("open");
        let guild = GuildId::new(GUILD);
        let admin = UserId::new(ADMIN);

        let channel = &ticket.channel_id;
        let role = service
            .change_access(&guild, channel, "<@&600>", AccessChange::Revoke, &admin, &ctx)
            .await
            .expect("revoke role");
        assert_eq!(role, OverwriteTarget::Role(RoleId::new(SUPPORT_ROLE)));

        let member = service
            .change_access(&guild, channel, "77", AccessChange::Grant, &admin, &ctx)
            .await
            .expect("grant member");
        assert_eq!(member, OverwriteTarget::Member(UserId::new("77")));

        let overwrites = fixture.platform.overwrites(channel);
        assert!(overwrites.iter().any(|overwrite| overwrite.target == role
            && overwrite.deny == vec![Permission::ViewChannel, Permission::SendMessages]));

        let invalid = service
            .change_access(&guild, channel, "zed", AccessChange::Grant, &admin, &ctx)
            .await;
        assert!(matches!(invalid, Err(TicketError::Invalid(_))));
    }
}
