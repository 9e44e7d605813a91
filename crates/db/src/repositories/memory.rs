use std::collections::HashMap;

use tokio::sync::RwLock;

use tickety_core::domain::guild_config::GuildConfig;
use tickety_core::domain::ids::{ChannelId, GuildId, UserId};
use tickety_core::domain::ticket::Ticket;

use super::{GuildConfigRepository, RepositoryError, TicketRepository};

#[derive(Default)]
pub struct InMemoryGuildConfigRepository {
    configs: RwLock<HashMap<String, GuildConfig>>,
}

#[async_trait::async_trait]
impl GuildConfigRepository for InMemoryGuildConfigRepository {
    async fn find(&self, guild_id: &GuildId) -> Result<Option<GuildConfig>, RepositoryError> {
        let configs = self.configs.read().await;
        Ok(configs.get(&guild_id.0).cloned())
    }

    async fn save(&self, config: GuildConfig) -> Result<(), RepositoryError> {
        let mut configs = self.configs.write().await;
        configs.insert(config.guild_id.0.clone(), config);
        Ok(())
    }
}

/// Keyed by channel id; a channel hosts at most one ticket.
#[derive(Default)]
pub struct InMemoryTicketRepository {
    tickets: RwLock<HashMap<String, Ticket>>,
}

#[async_trait::async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.channel_id.0.clone(), ticket);
        Ok(())
    }

    async fn find_by_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(&channel_id.0).cloned())
    }

    async fn count_open_for_creator(
        &self,
        guild_id: &GuildId,
        creator_id: &UserId,
    ) -> Result<u32, RepositoryError> {
        let tickets = self.tickets.read().await;
        let count = tickets
            .values()
            .filter(|ticket| {
                &ticket.guild_id == guild_id && &ticket.creator_id == creator_id && ticket.is_open()
            })
            .count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn list_open(&self, guild_id: &GuildId) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = self.tickets.read().await;
        let mut open = tickets
            .values()
            .filter(|ticket| &ticket.guild_id == guild_id && ticket.is_open())
            .cloned()
            .collect::<Vec<_>>();
        open.sort_by_key(|ticket| ticket.created_at);
        Ok(open)
    }
}
