use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ids::{ChannelId, GuildId, UserId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub String);

impl TicketId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub creator_id: UserId,
    /// Category value the ticket was opened for.
    pub ticket_type: String,
    pub status: TicketStatus,
    pub transcript_channel_id: Option<ChannelId>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn open(
        guild_id: GuildId,
        channel_id: ChannelId,
        creator_id: UserId,
        ticket_type: impl Into<String>,
        transcript_channel_id: Option<ChannelId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TicketId::generate(),
            guild_id,
            channel_id,
            creator_id,
            ticket_type: ticket_type.into(),
            status: TicketStatus::Open,
            transcript_channel_id,
            created_at: now,
            closed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    pub fn close(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_open() {
            return Err(DomainError::InvariantViolation(format!(
                "ticket {} is already closed",
                self.id.0
            )));
        }
        self.status = TicketStatus::Closed;
        self.closed_at = Some(now);
        Ok(())
    }
}

/// Channel name for a new ticket: `ticket-<username>-<type>`, lowercased and
/// restricted to characters the platform accepts in channel names.
pub fn ticket_channel_name(username: &str, ticket_type: &str) -> String {
    let raw = format!("ticket-{username}-{ticket_type}");
    let mut name = String::with_capacity(raw.len());
    for ch in raw.chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            name.push(ch);
        } else if !name.ends_with('-') {
            name.push('-');
        }
    }
    name.chars().take(100).collect()
}
