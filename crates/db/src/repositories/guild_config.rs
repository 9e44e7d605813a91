use std::collections::BTreeSet;

use chrono::Utc;
use serde::de::DeserializeOwned;
use sqlx::Row;

use tickety_core::domain::category::Category;
use tickety_core::domain::guild_config::{GuildConfig, PanelLocation, PanelType};
use tickety_core::domain::ids::{ChannelId, GuildId, MessageId, RoleId};

use super::{GuildConfigRepository, RepositoryError};
use crate::DbPool;

pub struct SqlGuildConfigRepository {
    pool: DbPool,
}

impl SqlGuildConfigRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode_json<T: DeserializeOwned>(column: &str, raw: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(raw).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn encode_json<T: serde::Serialize>(column: &str, value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn get<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_config(row: &sqlx::sqlite::SqliteRow) -> Result<GuildConfig, RepositoryError> {
    let panel_type_str: String = get(row, "panel_type")?;
    let panel_type = panel_type_str
        .parse::<PanelType>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let categories_json: String = get(row, "ticket_categories_json")?;
    let ping_roles_json: String = get(row, "ping_roles_json")?;
    let access_roles_json: String = get(row, "access_roles_json")?;
    let ticket_categories: Vec<Category> =
        decode_json("ticket_categories_json", &categories_json)?;
    let ping_roles: BTreeSet<RoleId> = decode_json("ping_roles_json", &ping_roles_json)?;
    let access_roles: BTreeSet<RoleId> = decode_json("access_roles_json", &access_roles_json)?;

    let ticket_limit: i64 = get(row, "ticket_limit")?;
    let ticket_limit = u32::try_from(ticket_limit)
        .map_err(|_| {
            RepositoryError::Decode(format!("ticket_limit out of range: {ticket_limit}"))
        })?;

    let panel_channel_id: Option<String> = get(row, "panel_channel_id")?;
    let panel_message_id: Option<String> = get(row, "panel_message_id")?;
    let panel = match (panel_channel_id, panel_message_id) {
        (Some(channel_id), Some(message_id)) => Some(PanelLocation {
            channel_id: ChannelId(channel_id),
            message_id: MessageId(message_id),
        }),
        _ => None,
    };

    Ok(GuildConfig {
        guild_id: GuildId(get(row, "guild_id")?),
        prefix: get(row, "prefix")?,
        panel_type,
        panel_title: get(row, "panel_title")?,
        panel_description: get(row, "panel_description")?,
        embed_color: get(row, "embed_color")?,
        embed_footer: get(row, "embed_footer")?,
        panel_image: get(row, "panel_image")?,
        welcome_image: get(row, "welcome_image")?,
        welcome_title: get(row, "welcome_title")?,
        welcome_message: get(row, "welcome_message")?,
        close_message: get(row, "close_message")?,
        ticket_categories,
        ping_roles,
        access_roles,
        parent_category_id: get::<Option<String>>(row, "parent_category_id")?.map(ChannelId),
        ticket_limit,
        transcript_channel_id: get::<Option<String>>(row, "transcript_channel_id")?
            .map(ChannelId),
        notify_support: get(row, "notify_support")?,
        panel,
    })
}

#[async_trait::async_trait]
impl GuildConfigRepository for SqlGuildConfigRepository {
    async fn find(&self, guild_id: &GuildId) -> Result<Option<GuildConfig>, RepositoryError> {
        let row = sqlx::query(
            "SELECT guild_id, prefix, panel_type, panel_title, panel_description, embed_color,
                    embed_footer, panel_image, welcome_image, welcome_title, welcome_message,
                    close_message, ticket_categories_json, ping_roles_json, access_roles_json,
                    parent_category_id, ticket_limit, transcript_channel_id, notify_support,
                    panel_channel_id, panel_message_id
             FROM guild_config WHERE guild_id = ?",
        )
        .bind(&guild_id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(row_to_config(r)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, config: GuildConfig) -> Result<(), RepositoryError> {
        let categories_json = encode_json("ticket_categories_json", &config.ticket_categories)?;
        let ping_roles_json = encode_json("ping_roles_json", &config.ping_roles)?;
        let access_roles_json = encode_json("access_roles_json", &config.access_roles)?;
        let panel_channel_id = config.panel.as_ref().map(|panel| panel.channel_id.0.clone());
        let panel_message_id = config.panel.as_ref().map(|panel| panel.message_id.0.clone());

        sqlx::query(
            "INSERT INTO guild_config (guild_id, prefix, panel_type, panel_title, panel_description,
                                       embed_color, embed_footer, panel_image, welcome_image,
                                       welcome_title, welcome_message, close_message,
                                       ticket_categories_json, ping_roles_json, access_roles_json,
                                       parent_category_id, ticket_limit, transcript_channel_id,
                                       notify_support, panel_channel_id, panel_message_id,
                                       updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(guild_id) DO UPDATE SET
                 prefix = excluded.prefix,
                 panel_type = excluded.panel_type,
                 panel_title = excluded.panel_title,
                 panel_description = excluded.panel_description,
                 embed_color = excluded.embed_color,
                 embed_footer = excluded.embed_footer,
                 panel_image = excluded.panel_image,
                 welcome_image = excluded.welcome_image,
                 welcome_title = excluded.welcome_title,
                 welcome_message = excluded.welcome_message,
                 close_message = excluded.close_message,
                 ticket_categories_json = excluded.ticket_categories_json,
                 ping_roles_json = excluded.ping_roles_json,
                 access_roles_json = excluded.access_roles_json,
                 parent_category_id = excluded.parent_category_id,
                 ticket_limit = excluded.ticket_limit,
                 transcript_channel_id = excluded.transcript_channel_id,
                 notify_support = excluded.notify_support,
                 panel_channel_id = excluded.panel_channel_id,
                 panel_message_id = excluded.panel_message_id,
                 updated_at = excluded.updated_at",
        )
        .bind(&config.guild_id.0)
        .bind(&config.prefix)
        .bind(config.panel_type.as_str())
        .bind(&config.panel_title)
        .bind(&config.panel_description)
        .bind(&config.embed_color)
        .bind(&config.embed_footer)
        .bind(&config.panel_image)
        .bind(&config.welcome_image)
        .bind(&config.welcome_title)
        .bind(&config.welcome_message)
        .bind(&config.close_message)
        .bind(categories_json)
        .bind(ping_roles_json)
        .bind(access_roles_json)
        .bind(config.parent_category_id.as_ref().map(|id| id.0.clone()))
        .bind(i64::from(config.ticket_limit))
        .bind(config.transcript_channel_id.as_ref().map(|id| id.0.clone()))
        .bind(config.notify_support)
        .bind(panel_channel_id)
        .bind(panel_message_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
