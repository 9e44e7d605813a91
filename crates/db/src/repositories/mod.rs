use async_trait::async_trait;
use thiserror::Error;

use tickety_core::domain::guild_config::GuildConfig;
use tickety_core::domain::ids::{ChannelId, GuildId, UserId};
use tickety_core::domain::ticket::Ticket;

pub mod guild_config;
pub mod memory;
pub mod ticket;

pub use guild_config::SqlGuildConfigRepository;
pub use memory::{InMemoryGuildConfigRepository, InMemoryTicketRepository};
pub use ticket::SqlTicketRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait GuildConfigRepository: Send + Sync {
    async fn find(&self, guild_id: &GuildId) -> Result<Option<GuildConfig>, RepositoryError>;
    /// Replaces the whole record in one statement.
    async fn save(&self, config: GuildConfig) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError>;
    async fn find_by_channel(&self, channel_id: &ChannelId)
        -> Result<Option<Ticket>, RepositoryError>;
    async fn count_open_for_creator(
        &self,
        guild_id: &GuildId,
        creator_id: &UserId,
    ) -> Result<u32, RepositoryError>;
    async fn list_open(&self, guild_id: &GuildId) -> Result<Vec<Ticket>, RepositoryError>;
}
