use chrono::{DateTime, Utc};
use sqlx::Row;

use tickety_core::domain::ids::{ChannelId, GuildId, UserId};
use tickety_core::domain::ticket::{Ticket, TicketId, TicketStatus};

use super::{RepositoryError, TicketRepository};
use crate::DbPool;

const TICKET_COLUMNS: &str = "id, guild_id, channel_id, creator_id, ticket_type, status,
                              transcript_channel_id, created_at, closed_at";

pub struct SqlTicketRepository {
    pool: DbPool,
}

impl SqlTicketRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn parse_status(s: &str) -> Result<TicketStatus, RepositoryError> {
    match s {
        "open" => Ok(TicketStatus::Open),
        "closed" => Ok(TicketStatus::Closed),
        other => Err(RepositoryError::Decode(format!("unknown ticket status `{other}`"))),
    }
}

fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_ticket(row: &sqlx::sqlite::SqliteRow) -> Result<Ticket, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let guild_id: String =
        row.try_get("guild_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let channel_id: String =
        row.try_get("channel_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let creator_id: String =
        row.try_get("creator_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let ticket_type: String =
        row.try_get("ticket_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let status_str: String =
        row.try_get("status").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let transcript_channel_id: Option<String> =
        row.try_get("transcript_channel_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at_str: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let closed_at_str: Option<String> =
        row.try_get("closed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Ticket {
        id: TicketId(id),
        guild_id: GuildId(guild_id),
        channel_id: ChannelId(channel_id),
        creator_id: UserId(creator_id),
        ticket_type,
        status: parse_status(&status_str)?,
        transcript_channel_id: transcript_channel_id.map(ChannelId),
        created_at: parse_timestamp("created_at", &created_at_str)?,
        closed_at: closed_at_str.map(|raw| parse_timestamp("closed_at", &raw)).transpose()?,
    })
}

#[async_trait::async_trait]
impl TicketRepository for SqlTicketRepository {
    async fn save(&self, ticket: Ticket) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO ticket (id, guild_id, channel_id, creator_id, ticket_type, status,
                                 transcript_channel_id, created_at, closed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 transcript_channel_id = excluded.transcript_channel_id,
                 closed_at = excluded.closed_at",
        )
        .bind(&ticket.id.0)
        .bind(&ticket.guild_id.0)
        .bind(&ticket.channel_id.0)
        .bind(&ticket.creator_id.0)
        .bind(&ticket.ticket_type)
        .bind(ticket.status.as_str())
        .bind(ticket.transcript_channel_id.as_ref().map(|id| id.0.clone()))
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.closed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TICKET_COLUMNS} FROM ticket WHERE channel_id = ?"))
            .bind(&channel_id.0)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_ticket(r)?)),
            None => Ok(None),
        }
    }

    async fn count_open_for_creator(
        &self,
        guild_id: &GuildId,
        creator_id: &UserId,
    ) -> Result<u32, RepositoryError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM ticket
             WHERE guild_id = ? AND creator_id = ? AND status = 'open'",
        )
        .bind(&guild_id.0)
        .bind(&creator_id.0)
        .fetch_one(&self.pool)
        .await?
        .try_get("count")
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

        u32::try_from(count).map_err(|_| RepositoryError::Decode(format!("bad count {count}")))
    }

    async fn list_open(&self, guild_id: &GuildId) -> Result<Vec<Ticket>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(&format!(
            "SELECT {TICKET_COLUMNS} FROM ticket
             WHERE guild_id = ? AND status = 'open' ORDER BY created_at ASC"
        ))
        .bind(&guild_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_ticket).collect::<Result<Vec<_>, _>>()
    }
}
