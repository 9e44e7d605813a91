//! Shared fakes for this crate's tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use tickety_core::audit::InMemoryAuditSink;
use tickety_core::domain::guild_config::GuildConfig;
use tickety_core::domain::ids::{ChannelId, GuildId, UserId};
use tickety_core::domain::role::GuildRole;
use tickety_core::wizard::ManualClock;
use tickety_db::repositories::{
    GuildConfigRepository, InMemoryGuildConfigRepository, InMemoryTicketRepository,
    RepositoryError,
};

use crate::platform::{ChannelKind, InMemoryPlatform, Permission};

pub const GUILD: &str = "100";
pub const BOT: &str = "1";
pub const ADMIN: &str = "42";
pub const MEMBER: &str = "43";
pub const COMMANDS_CHANNEL: &str = "200";
pub const PANEL_CHANNEL: &str = "300";
pub const TICKETS_CATEGORY: &str = "400";
pub const LOG_CHANNEL: &str = "500";
pub const SUPPORT_ROLE: &str = "600";
pub const BOT_ROLE: &str = "601";

/// Reads always miss and writes always fail.
pub struct FailingConfigRepository;

#[async_trait]
impl GuildConfigRepository for FailingConfigRepository {
    async fn find(&self, _guild_id: &GuildId) -> Result<Option<GuildConfig>, RepositoryError> {
        Ok(None)
    }

    async fn save(&self, _config: GuildConfig) -> Result<(), RepositoryError> {
        Err(RepositoryError::Decode("disk full".to_owned()))
    }
}

pub struct Fixture {
    pub platform: Arc<InMemoryPlatform>,
    pub configs: Arc<InMemoryGuildConfigRepository>,
    pub tickets: Arc<InMemoryTicketRepository>,
    pub clock: ManualClock,
    pub audit: InMemoryAuditSink,
}

/// One guild with an admin, a plain member, a commands channel, a panel
/// channel under a category, a log channel and two roles (one bot-managed).
pub fn fixture() -> Fixture {
    let guild = GuildId::new(GUILD);
    let platform = Arc::new(InMemoryPlatform::new(UserId::new(BOT)));
    platform.add_text_channel(&guild, &ChannelId::new(COMMANDS_CHANNEL), "commands");
    platform.add_channel(
        &guild,
        &ChannelId::new(TICKETS_CATEGORY),
        "Tickets",
        ChannelKind::Category,
        None,
    );
    platform.add_channel(
        &guild,
        &ChannelId::new(PANEL_CHANNEL),
        "support",
        ChannelKind::Text,
        Some(ChannelId::new(TICKETS_CATEGORY)),
    );
    platform.add_text_channel(&guild, &ChannelId::new(LOG_CHANNEL), "ticket-logs");
    platform.add_role(&guild, GuildRole::new(GUILD, "@everyone", false));
    platform.add_role(&guild, GuildRole::new(SUPPORT_ROLE, "Support", false));
    platform.add_role(&guild, GuildRole::new(BOT_ROLE, "Tickety", true));

    for permission in [
        Permission::ManageChannels,
        Permission::ViewChannel,
        Permission::SendMessages,
        Permission::EmbedLinks,
    ] {
        platform.grant(&guild, &UserId::new(BOT), permission);
    }
    platform.grant(&guild, &UserId::new(ADMIN), Permission::ManageGuild);

    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().unwrap_or_else(Utc::now);
    Fixture {
        platform,
        configs: Arc::new(InMemoryGuildConfigRepository::default()),
        tickets: Arc::new(InMemoryTicketRepository::default()),
        clock: ManualClock::new(start),
        audit: InMemoryAuditSink::default(),
    }
}
