use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use tickety_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use tickety_core::domain::guild_config::{GuildConfig, PanelLocation};
use tickety_core::domain::ids::ChannelId;
use tickety_core::wizard::{
    plan_panel, DraftConfig, PanelComponents, PanelPlanError, SessionKey, SkippedCategory,
};
use tickety_db::repositories::{GuildConfigRepository, RepositoryError};

use crate::embeds::panel_message;
use crate::platform::{emoji_registry, ChatPlatform, PlatformError};

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error(
        "none of the categories has an emoji this server can display; add categories with \
         valid emojis using `addcategory` and run setup again"
    )]
    NoValidCategories,
    #[error("the panel could not be sent: {0}")]
    Render(#[source] PlatformError),
    #[error("the configuration could not be saved: {0}")]
    Persistence(#[source] RepositoryError),
}

impl From<PanelPlanError> for FinalizeError {
    fn from(value: PanelPlanError) -> Self {
        match value {
            PanelPlanError::NoValidCategories => Self::NoValidCategories,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalizeOutcome {
    pub panel: PanelLocation,
    pub skipped: Vec<SkippedCategory>,
    /// Reaction emojis the platform refused to add.
    pub failed_reactions: Vec<String>,
}

/// Turns a completed draft into a live panel and a stored configuration.
///
/// The panel is rendered first and the configuration is written in one upsert
/// afterwards. When the write fails the rendered panel is deleted again, so a
/// failed setup never leaves a panel that points at an unsaved configuration.
pub struct FinalizationCommitter {
    platform: Arc<dyn ChatPlatform>,
    configs: Arc<dyn GuildConfigRepository>,
}

impl FinalizationCommitter {
    pub fn new(platform: Arc<dyn ChatPlatform>, configs: Arc<dyn GuildConfigRepository>) -> Self {
        Self { platform, configs }
    }

    pub async fn commit(
        &self,
        key: &SessionKey,
        target_channel: &ChannelId,
        draft: &DraftConfig,
        audit: &AuditContext,
        sink: &dyn AuditSink,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let result = self.render_and_store(key, target_channel, draft).await;
        match &result {
            Ok(outcome) => {
                info!(
                    event_name = "panel.committed",
                    correlation_id = %audit.correlation_id,
                    guild_id = %key.guild_id,
                    user_id = %key.user_id,
                    channel_id = %outcome.panel.channel_id,
                    message_id = %outcome.panel.message_id,
                    panel_type = draft.panel_type.as_str(),
                    skipped = outcome.skipped.len(),
                    "ticket panel committed"
                );
                sink.emit(
                    audit
                        .event("panel.committed", AuditCategory::Panel, AuditOutcome::Success)
                        .with_metadata("channel_id", outcome.panel.channel_id.to_string())
                        .with_metadata("message_id", outcome.panel.message_id.to_string())
                        .with_metadata("skipped", outcome.skipped.len().to_string()),
                );
            }
            Err(commit_error) => {
                warn!(
                    event_name = "panel.commit_failed",
                    correlation_id = %audit.correlation_id,
                    guild_id = %key.guild_id,
                    user_id = %key.user_id,
                    error = %commit_error,
                    "ticket panel commit failed"
                );
                let outcome = match commit_error {
                    FinalizeError::NoValidCategories => AuditOutcome::Rejected,
                    _ => AuditOutcome::Failed,
                };
                sink.emit(
                    audit
                        .event("panel.commit_failed", AuditCategory::Panel, outcome)
                        .with_metadata("error", commit_error.to_string()),
                );
            }
        }
        result
    }

    async fn render_and_store(
        &self,
        key: &SessionKey,
        target_channel: &ChannelId,
        draft: &DraftConfig,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let registry = emoji_registry(self.platform.as_ref(), &key.guild_id)
            .await
            .map_err(FinalizeError::Render)?;
        let plan = plan_panel(draft, &registry)?;
        for skipped in &plan.skipped {
            warn!(
                guild_id = %key.guild_id,
                category = %skipped.value,
                emoji = %skipped.emoji,
                reason = ?skipped.reason,
                "category left off the panel"
            );
        }

        let message_id = self
            .platform
            .send_message(target_channel, panel_message(&plan))
            .await
            .map_err(FinalizeError::Render)?;
        let panel = PanelLocation { channel_id: target_channel.clone(), message_id };

        let mut failed_reactions = Vec::new();
        if let PanelComponents::Reactions(emojis) = &plan.components {
            for emoji in emojis {
                if let Err(reaction_error) =
                    self.platform.add_reaction(&panel.channel_id, &panel.message_id, emoji).await
                {
                    warn!(
                        guild_id = %key.guild_id,
                        emoji = %emoji,
                        error = %reaction_error,
                        "failed to add panel reaction"
                    );
                    failed_reactions.push(emoji.clone());
                }
            }
        }

        if let Err(store_error) = self.store(key, draft, panel.clone()).await {
            self.withdraw_panel(&panel).await;
            return Err(FinalizeError::Persistence(store_error));
        }

        Ok(FinalizeOutcome { panel, skipped: plan.skipped, failed_reactions })
    }

    async fn store(
        &self,
        key: &SessionKey,
        draft: &DraftConfig,
        panel: PanelLocation,
    ) -> Result<(), RepositoryError> {
        let mut config = self
            .configs
            .find(&key.guild_id)
            .await?
            .unwrap_or_else(|| GuildConfig::new(key.guild_id.clone()));
        draft.apply_to(&mut config, panel);
        self.configs.save(config).await
    }

    async fn withdraw_panel(&self, panel: &PanelLocation) {
        match self.platform.delete_message(&panel.channel_id, &panel.message_id).await {
            Ok(()) => info!(
                channel_id = %panel.channel_id,
                message_id = %panel.message_id,
                "withdrew panel after failed configuration write"
            ),
            Err(delete_error) => error!(
                channel_id = %panel.channel_id,
                message_id = %panel.message_id,
                error = %delete_error,
                "failed to withdraw panel; it points at an unsaved configuration"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tickety_core::audit::{AuditContext, InMemoryAuditSink};
    use tickety_core::domain::category::Category;
    use tickety_core::domain::guild_config::{GuildConfig, PanelType};
    use tickety_core::domain::ids::{ChannelId, EmojiId, GuildId, UserId};
    use tickety_core::wizard::{DraftConfig, SessionKey};
    use tickety_db::repositories::{GuildConfigRepository, InMemoryGuildConfigRepository};

    use super::{FinalizationCommitter, FinalizeError};
    use crate::platform::{FailPoint, InMemoryPlatform};
    use crate::testing::FailingConfigRepository;

    const GUILD: &str = "100";
    const PANEL_CHANNEL: &str = "300";

    fn platform() -> Arc<InMemoryPlatform> {
        let platform = Arc::new(InMemoryPlatform::new(UserId::new("1")));
        platform.add_text_channel(&GuildId::new(GUILD), &ChannelId::new(PANEL_CHANNEL), "support");
        platform
    }

    fn draft(panel_type: PanelType, categories: Vec<Category>) -> DraftConfig {
        let mut draft = DraftConfig::from_config(&GuildConfig::new(GuildId::new(GUILD)));
        draft.panel_type = panel_type;
        draft.ticket_categories = categories;
        draft
    }

    fn key() -> SessionKey {
        SessionKey::new(GuildId::new(GUILD), UserId::new("42"))
    }

    fn audit() -> AuditContext {
        AuditContext::new(Some(GuildId::new(GUILD)), Some(UserId::new("42")), "evt-1", "test")
    }

    #[tokio::test]
    async fn reaction_panels_get_one_reaction_per_category() {
        let platform = platform();
        let configs = Arc::new(InMemoryGuildConfigRepository::default());
        let committer = FinalizationCommitter::new(platform.clone(), configs.clone());
        let sink = InMemoryAuditSink::default();
        let draft = draft(
            PanelType::Reactions,
            vec![
                Category::new("Bug", "bug", "Something broke", "🐛"),
                Category::new("Billing", "billing", "Money things", "💳"),
            ],
        );

        let outcome = committer
            .commit(&key(), &ChannelId::new(PANEL_CHANNEL), &draft, &audit(), &sink)
            .await
            .expect("commit");

        let sent = platform.message(&outcome.panel.message_id).expect("panel message");
        assert_eq!(sent.reactions, vec!["🐛", "💳"]);
        let stored = configs.find(&GuildId::new(GUILD)).await.expect("find").expect("stored");
        assert_eq!(stored.panel, Some(outcome.panel));
        assert_eq!(stored.ticket_categories, draft.ticket_categories);
        assert_eq!(sink.event_types(), vec!["panel.committed"]);
    }

    #[tokio::test]
    async fn menu_without_displayable_emojis_sends_nothing() {
        let platform = platform();
        let configs = Arc::new(InMemoryGuildConfigRepository::default());
        let committer = FinalizationCommitter::new(platform.clone(), configs.clone());
        let draft = draft(
            PanelType::Menu,
            vec![Category::new("Gone", "gone", "Emoji was deleted", "<:gone:555>")],
        );

        let result = committer
            .commit(
                &key(),
                &ChannelId::new(PANEL_CHANNEL),
                &draft,
                &audit(),
                &InMemoryAuditSink::default(),
            )
            .await;

        assert!(matches!(result, Err(FinalizeError::NoValidCategories)));
        assert!(platform.messages_in(&ChannelId::new(PANEL_CHANNEL)).is_empty());
        assert_eq!(configs.find(&GuildId::new(GUILD)).await.expect("find"), None);
    }

    #[tokio::test]
    async fn custom_emojis_registered_on_the_guild_are_rendered() {
        let platform = platform();
        platform.add_emoji(&GuildId::new(GUILD), EmojiId::new("555"));
        let committer = FinalizationCommitter::new(
            platform.clone(),
            Arc::new(InMemoryGuildConfigRepository::default()),
        );
        let draft = draft(
            PanelType::Menu,
            vec![Category::new("Custom", "custom", "Custom emoji", "<:gone:555>")],
        );

        let outcome = committer
            .commit(
                &key(),
                &ChannelId::new(PANEL_CHANNEL),
                &draft,
                &audit(),
                &InMemoryAuditSink::default(),
            )
            .await
            .expect("commit");
        assert!(outcome.skipped.is_empty());
    }

    #[tokio::test]
    async fn failed_write_withdraws_the_sent_panel() {
        let platform = platform();
        let committer =
            FinalizationCommitter::new(platform.clone(), Arc::new(FailingConfigRepository));
        let sink = InMemoryAuditSink::default();
        let draft = draft(PanelType::Buttons, vec![Category::new("Bug", "bug", "Broken", "🐛")]);

        let result = committer
            .commit(&key(), &ChannelId::new(PANEL_CHANNEL), &draft, &audit(), &sink)
            .await;

        assert!(matches!(result, Err(FinalizeError::Persistence(_))));
        assert!(platform.messages_in(&ChannelId::new(PANEL_CHANNEL)).is_empty());
        assert_eq!(sink.event_types(), vec!["panel.commit_failed"]);
    }

    #[tokio::test]
    async fn refused_reactions_are_reported_but_not_fatal() {
        let platform = platform();
        platform.fail(FailPoint::AddReaction);
        let committer = FinalizationCommitter::new(
            platform.clone(),
            Arc::new(InMemoryGuildConfigRepository::default()),
        );
        let draft = draft(PanelType::Reactions, vec![Category::new("Bug", "bug", "Broken", "🐛")]);

        let outcome = committer
            .commit(
                &key(),
                &ChannelId::new(PANEL_CHANNEL),
                &draft,
                &audit(),
                &InMemoryAuditSink::default(),
            )
            .await
            .expect("commit");
        assert_eq!(outcome.failed_reactions, vec!["🐛"]);
    }
}
