//! Seam between the bot's services and the chat platform SDK.
//!
//! Services only talk to [`ChatPlatform`]. The gateway binary plugs in a real
//! client; tests and offline runs use [`InMemoryPlatform`], which keeps an
//! in-process model of channels, roles and messages and records every call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use tickety_core::domain::ids::{ChannelId, EmojiId, GuildId, MessageId, RoleId, UserId};
use tickety_core::domain::role::GuildRole;
use tickety_core::emoji::EmojiRegistry;

use crate::embeds::OutgoingMessage;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ManageGuild,
    ManageChannels,
    ViewChannel,
    SendMessages,
    EmbedLinks,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Text,
    Category,
    Voice,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: Vec<Permission>,
    pub deny: Vec<Permission>,
}

impl PermissionOverwrite {
    pub fn allow(target: OverwriteTarget, permissions: &[Permission]) -> Self {
        Self { target, allow: permissions.to_vec(), deny: Vec::new() }
    }

    pub fn deny(target: OverwriteTarget, permissions: &[Permission]) -> Self {
        Self { target, allow: Vec::new(), deny: permissions.to_vec() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewChannel {
    pub name: String,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    pub overwrites: Vec<PermissionOverwrite>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryMessage {
    pub author_tag: String,
    pub content: String,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("missing access: {0}")]
    Forbidden(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    fn bot_user_id(&self) -> UserId;

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    async fn send_direct_message(
        &self,
        user_id: &UserId,
        message: OutgoingMessage,
    ) -> Result<(), PlatformError>;

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), PlatformError>;

    async fn add_reaction(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError>;

    async fn remove_reaction(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
        user_id: &UserId,
    ) -> Result<(), PlatformError>;

    async fn guild_roles(&self, guild_id: &GuildId) -> Result<Vec<GuildRole>, PlatformError>;

    async fn guild_emojis(&self, guild_id: &GuildId) -> Result<Vec<EmojiId>, PlatformError>;

    /// Guild-level permission when `channel_id` is `None`, otherwise the
    /// effective permission in that channel.
    async fn has_permission(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        channel_id: Option<&ChannelId>,
        permission: Permission,
    ) -> Result<bool, PlatformError>;

    async fn channel(&self, channel_id: &ChannelId) -> Result<Option<ChannelInfo>, PlatformError>;

    async fn create_channel(
        &self,
        guild_id: &GuildId,
        channel: NewChannel,
    ) -> Result<ChannelId, PlatformError>;

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), PlatformError>;

    async fn set_overwrite(
        &self,
        channel_id: &ChannelId,
        overwrite: PermissionOverwrite,
    ) -> Result<(), PlatformError>;

    /// Newest last.
    async fn recent_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError>;
}

pub async fn emoji_registry(
    platform: &dyn ChatPlatform,
    guild_id: &GuildId,
) -> Result<EmojiRegistry, PlatformError> {
    Ok(EmojiRegistry::new(platform.guild_emojis(guild_id).await?))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub message: OutgoingMessage,
    pub reactions: Vec<String>,
    pub deleted: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum PlatformCall {
    SendMessage { channel_id: ChannelId, message_id: MessageId },
    SendDirectMessage { user_id: UserId },
    DeleteMessage { channel_id: ChannelId, message_id: MessageId },
    AddReaction { message_id: MessageId, emoji: String },
    RemoveReaction { message_id: MessageId, emoji: String, user_id: UserId },
    CreateChannel { channel_id: ChannelId, name: String },
    DeleteChannel { channel_id: ChannelId },
    SetOverwrite { channel_id: ChannelId, overwrite: PermissionOverwrite },
}

/// Operations the in-memory platform can be told to fail.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FailPoint {
    SendTo(ChannelId),
    AddReaction,
    CreateChannel,
    DeleteMessage,
}

#[derive(Default)]
struct PlatformState {
    next_snowflake: u64,
    channels: BTreeMap<ChannelId, ChannelInfo>,
    overwrites: HashMap<ChannelId, Vec<PermissionOverwrite>>,
    roles: HashMap<GuildId, Vec<GuildRole>>,
    emojis: HashMap<GuildId, Vec<EmojiId>>,
    grants: HashSet<(GuildId, UserId, Permission)>,
    channel_denials: HashSet<(ChannelId, UserId, Permission)>,
    messages: Vec<SentMessage>,
    history: HashMap<ChannelId, Vec<HistoryMessage>>,
    direct_messages: Vec<(UserId, OutgoingMessage)>,
    failures: HashSet<FailPoint>,
    calls: Vec<PlatformCall>,
}

impl PlatformState {
    fn snowflake(&mut self) -> String {
        self.next_snowflake += 1;
        format!("{}", 900_000_000_000_000_000_u64 + self.next_snowflake)
    }
}

pub struct InMemoryPlatform {
    bot_user_id: UserId,
    state: Mutex<PlatformState>,
}

impl InMemoryPlatform {
    pub fn new(bot_user_id: UserId) -> Self {
        Self { bot_user_id, state: Mutex::new(PlatformState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, PlatformState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add_channel(
        &self,
        guild_id: &GuildId,
        channel_id: &ChannelId,
        name: &str,
        kind: ChannelKind,
        parent_id: Option<ChannelId>,
    ) {
        self.state().channels.insert(
            channel_id.clone(),
            ChannelInfo {
                id: channel_id.clone(),
                guild_id: guild_id.clone(),
                name: name.to_owned(),
                kind,
                parent_id,
            },
        );
    }

    pub fn add_text_channel(&self, guild_id: &GuildId, channel_id: &ChannelId, name: &str) {
        self.add_channel(guild_id, channel_id, name, ChannelKind::Text, None);
    }

    pub fn add_role(&self, guild_id: &GuildId, role: GuildRole) {
        self.state().roles.entry(guild_id.clone()).or_default().push(role);
    }

    pub fn add_emoji(&self, guild_id: &GuildId, emoji_id: EmojiId) {
        self.state().emojis.entry(guild_id.clone()).or_default().push(emoji_id);
    }

    pub fn remove_emoji(&self, guild_id: &GuildId, emoji_id: &EmojiId) {
        if let Some(emojis) = self.state().emojis.get_mut(guild_id) {
            emojis.retain(|id| id != emoji_id);
        }
    }

    pub fn grant(&self, guild_id: &GuildId, user_id: &UserId, permission: Permission) {
        self.state().grants.insert((guild_id.clone(), user_id.clone(), permission));
    }

    pub fn deny_in_channel(
        &self,
        channel_id: &ChannelId,
        user_id: &UserId,
        permission: Permission,
    ) {
        self.state().channel_denials.insert((channel_id.clone(), user_id.clone(), permission));
    }

    pub fn push_history(&self, channel_id: &ChannelId, author_tag: &str, content: &str) {
        self.state().history.entry(channel_id.clone()).or_default().push(HistoryMessage {
            author_tag: author_tag.to_owned(),
            content: content.to_owned(),
        });
    }

    pub fn fail(&self, point: FailPoint) {
        self.state().failures.insert(point);
    }

    pub fn recover(&self, point: &FailPoint) {
        self.state().failures.remove(point);
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.state().calls.clone()
    }

    /// Messages still visible in `channel_id`, oldest first.
    pub fn messages_in(&self, channel_id: &ChannelId) -> Vec<SentMessage> {
        self.state()
            .messages
            .iter()
            .filter(|sent| &sent.channel_id == channel_id && !sent.deleted)
            .cloned()
            .collect()
    }

    pub fn message(&self, message_id: &MessageId) -> Option<SentMessage> {
        self.state().messages.iter().find(|sent| &sent.message_id == message_id).cloned()
    }

    pub fn direct_messages(&self, user_id: &UserId) -> Vec<OutgoingMessage> {
        self.state()
            .direct_messages
            .iter()
            .filter(|(recipient, _)| recipient == user_id)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn channel_named(&self, name: &str) -> Option<ChannelInfo> {
        self.state().channels.values().find(|channel| channel.name == name).cloned()
    }

    pub fn channel_exists(&self, channel_id: &ChannelId) -> bool {
        self.state().channels.contains_key(channel_id)
    }

    pub fn overwrites(&self, channel_id: &ChannelId) -> Vec<PermissionOverwrite> {
        self.state().overwrites.get(channel_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatPlatform for InMemoryPlatform {
    fn bot_user_id(&self) -> UserId {
        self.bot_user_id.clone()
    }

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let mut state = self.state();
        if state.failures.contains(&FailPoint::SendTo(channel_id.clone())) {
            return Err(PlatformError::Forbidden(format!("cannot send to channel {channel_id}")));
        }
        if !state.channels.contains_key(channel_id) {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        }

        let message_id = MessageId(state.snowflake());
        state.messages.push(SentMessage {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
            message,
            reactions: Vec::new(),
            deleted: false,
        });
        state.calls.push(PlatformCall::SendMessage {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
        });
        Ok(message_id)
    }

    async fn send_direct_message(
        &self,
        user_id: &UserId,
        message: OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        state.direct_messages.push((user_id.clone(), message));
        state.calls.push(PlatformCall::SendDirectMessage { user_id: user_id.clone() });
        Ok(())
    }

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.failures.contains(&FailPoint::DeleteMessage) {
            return Err(PlatformError::Unavailable("delete message".to_owned()));
        }
        let sent = state
            .messages
            .iter_mut()
            .find(|sent| &sent.message_id == message_id && &sent.channel_id == channel_id)
            .ok_or_else(|| PlatformError::NotFound(format!("message {message_id}")))?;
        sent.deleted = true;
        state.calls.push(PlatformCall::DeleteMessage {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
        });
        Ok(())
    }

    async fn add_reaction(
        &self,
        _channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.failures.contains(&FailPoint::AddReaction) {
            return Err(PlatformError::Rejected(format!("unknown emoji {emoji}")));
        }
        let sent = state
            .messages
            .iter_mut()
            .find(|sent| &sent.message_id == message_id)
            .ok_or_else(|| PlatformError::NotFound(format!("message {message_id}")))?;
        sent.reactions.push(emoji.to_owned());
        state.calls.push(PlatformCall::AddReaction {
            message_id: message_id.clone(),
            emoji: emoji.to_owned(),
        });
        Ok(())
    }

    async fn remove_reaction(
        &self,
        _channel_id: &ChannelId,
        message_id: &MessageId,
        emoji: &str,
        user_id: &UserId,
    ) -> Result<(), PlatformError> {
        self.state().calls.push(PlatformCall::RemoveReaction {
            message_id: message_id.clone(),
            emoji: emoji.to_owned(),
            user_id: user_id.clone(),
        });
        Ok(())
    }

    async fn guild_roles(&self, guild_id: &GuildId) -> Result<Vec<GuildRole>, PlatformError> {
        Ok(self.state().roles.get(guild_id).cloned().unwrap_or_default())
    }

    async fn guild_emojis(&self, guild_id: &GuildId) -> Result<Vec<EmojiId>, PlatformError> {
        Ok(self.state().emojis.get(guild_id).cloned().unwrap_or_default())
    }

    async fn has_permission(
        &self,
        guild_id: &GuildId,
        user_id: &UserId,
        channel_id: Option<&ChannelId>,
        permission: Permission,
    ) -> Result<bool, PlatformError> {
        let state = self.state();
        let granted = state.grants.contains(&(guild_id.clone(), user_id.clone(), permission));
        let denied = channel_id
            .map(|channel_id| {
                state.channel_denials.contains(&(channel_id.clone(), user_id.clone(), permission))
            })
            .unwrap_or(false);
        Ok(granted && !denied)
    }

    async fn channel(&self, channel_id: &ChannelId) -> Result<Option<ChannelInfo>, PlatformError> {
        Ok(self.state().channels.get(channel_id).cloned())
    }

    async fn create_channel(
        &self,
        guild_id: &GuildId,
        channel: NewChannel,
    ) -> Result<ChannelId, PlatformError> {
        let mut state = self.state();
        if state.failures.contains(&FailPoint::CreateChannel) {
            return Err(PlatformError::Forbidden("create channel".to_owned()));
        }

        let channel_id = ChannelId(state.snowflake());
        state.channels.insert(
            channel_id.clone(),
            ChannelInfo {
                id: channel_id.clone(),
                guild_id: guild_id.clone(),
                name: channel.name.clone(),
                kind: channel.kind,
                parent_id: channel.parent_id,
            },
        );
        state.overwrites.insert(channel_id.clone(), channel.overwrites);
        let call =
            PlatformCall::CreateChannel { channel_id: channel_id.clone(), name: channel.name };
        state.calls.push(call);
        Ok(channel_id)
    }

    async fn delete_channel(&self, channel_id: &ChannelId) -> Result<(), PlatformError> {
        let mut state = self.state();
        if state.channels.remove(channel_id).is_none() {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        }
        state.overwrites.remove(channel_id);
        state.calls.push(PlatformCall::DeleteChannel { channel_id: channel_id.clone() });
        Ok(())
    }

    async fn set_overwrite(
        &self,
        channel_id: &ChannelId,
        overwrite: PermissionOverwrite,
    ) -> Result<(), PlatformError> {
        let mut state = self.state();
        if !state.channels.contains_key(channel_id) {
            return Err(PlatformError::NotFound(format!("channel {channel_id}")));
        }
        let overwrites = state.overwrites.entry(channel_id.clone()).or_default();
        overwrites.retain(|existing| existing.target != overwrite.target);
        overwrites.push(overwrite.clone());
        state.calls.push(PlatformCall::SetOverwrite { channel_id: channel_id.clone(), overwrite });
        Ok(())
    }

    async fn recent_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        let state = self.state();
        let history = state.history.get(channel_id).cloned().unwrap_or_default();
        let skip = history.len().saturating_sub(limit);
        Ok(history.into_iter().skip(skip).collect())
    }
}
