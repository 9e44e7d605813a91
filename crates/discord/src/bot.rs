use std::sync::Arc;
use std::time::Duration;

use tickety_core::audit::AuditSink;
use tickety_core::config::AppConfig;
use tickety_core::wizard::Clock;
use tickety_db::repositories::{GuildConfigRepository, TicketRepository};

use crate::commands::CommandRouter;
use crate::events::{
    ComponentInteractionHandler, EventDispatcher, MessageCreateHandler, ReactionAddHandler,
};
use crate::setup::SetupService;
use crate::tickets::{TicketService, DEFAULT_CLOSE_DELAY};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotSettings {
    pub default_prefix: String,
    pub wizard_timeout: chrono::Duration,
    pub close_delay: Duration,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            default_prefix: "$".to_owned(),
            wizard_timeout: chrono::Duration::minutes(5),
            close_delay: DEFAULT_CLOSE_DELAY,
        }
    }
}

impl BotSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let timeout_secs = i64::try_from(config.wizard.timeout_secs).unwrap_or(i64::MAX);
        Self {
            default_prefix: config.discord.default_prefix.clone(),
            wizard_timeout: chrono::Duration::try_seconds(timeout_secs)
                .unwrap_or_else(|| chrono::Duration::minutes(5)),
            close_delay: DEFAULT_CLOSE_DELAY,
        }
    }
}

/// The services behind every gateway handler, wired against one platform.
pub struct BotServices {
    pub setup: Arc<SetupService>,
    pub tickets: Arc<TicketService>,
    pub commands: Arc<CommandRouter>,
}

impl BotServices {
    pub fn new(
        platform: Arc<dyn crate::platform::ChatPlatform>,
        configs: Arc<dyn GuildConfigRepository>,
        tickets: Arc<dyn TicketRepository>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        settings: BotSettings,
    ) -> Self {
        let setup = Arc::new(SetupService::new(
            platform.clone(),
            configs.clone(),
            clock.clone(),
            audit.clone(),
            settings.wizard_timeout,
        ));
        let ticket_service = Arc::new(
            TicketService::new(platform.clone(), configs.clone(), tickets, clock, audit)
                .with_close_delay(settings.close_delay),
        );
        let commands = Arc::new(CommandRouter::new(
            platform,
            configs,
            setup.clone(),
            ticket_service.clone(),
            settings.default_prefix,
        ));
        Self { setup, tickets: ticket_service, commands }
    }

    pub fn dispatcher(&self) -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(MessageCreateHandler::new(self.commands.clone(), self.setup.clone()));
        dispatcher
            .register(ComponentInteractionHandler::new(self.setup.clone(), self.tickets.clone()));
        dispatcher.register(ReactionAddHandler::new(self.tickets.clone()));
        dispatcher
    }
}

#[cfg(test)]
mod tests {
    use tickety_core::config::AppConfig;

    use super::BotSettings;

    #[test]
    fn settings_follow_the_app_config() {
        let mut config = AppConfig::default();
        config.discord.default_prefix = "!".to_owned();
        config.wizard.timeout_secs = 90;

        let settings = BotSettings::from_config(&config);
        assert_eq!(settings.default_prefix, "!");
        assert_eq!(settings.wizard_timeout, chrono::Duration::seconds(90));
    }
}
