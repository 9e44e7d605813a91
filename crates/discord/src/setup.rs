use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tickety_core::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use tickety_core::domain::guild_config::GuildConfig;
use tickety_core::domain::ids::{parse_mention, ChannelId, GuildId, UserId};
use tickety_core::domain::validation::ValidationError;
use tickety_core::errors::ApplicationError;
use tickety_core::wizard::{
    parse_setup_custom_id, Advance, AwaitingInput, Clock, DraftConfig, SessionKey, SessionLookup,
    SessionSnapshot, SessionStore, WizardEngine, WizardInput, WizardSession, WizardStep,
};
use tickety_db::repositories::{GuildConfigRepository, RepositoryError};

use crate::embeds::{
    error_message, prompt_message, skipped_categories_note, success_message, timeout_notice,
    OutgoingMessage,
};
use crate::events::{ComponentEvent, EventContext, MessageEvent};
use crate::finalize::{FinalizationCommitter, FinalizeError};
use crate::platform::{emoji_registry, ChannelKind, ChatPlatform, Permission, PlatformError};

const AUDIT_ACTOR: &str = "discord";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("{0}")]
    Permission(String),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("platform request failed: {0}")]
    Platform(#[from] PlatformError),
    #[error("failed to load guild configuration: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<SetupError> for ApplicationError {
    fn from(value: SetupError) -> Self {
        match value {
            SetupError::Permission(message) => Self::Permission(message),
            SetupError::Invalid(error) => Self::from(error),
            SetupError::Platform(error) => Self::Integration(error.to_string()),
            SetupError::Repository(error) => Self::Persistence(error.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SetupRequest {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub origin_channel: ChannelId,
    /// Raw channel argument: a `<#id>` mention or a bare id.
    pub target: String,
}

enum TurnGuard<'a> {
    /// Free text counts only in the origin channel while a text step is open.
    Text(&'a ChannelId),
    /// Menus carry the step they were rendered for.
    Choice(WizardStep),
}

enum Turn {
    Ignored,
    Reply(OutgoingMessage),
    Complete { session: WizardSession, draft: DraftConfig },
    Expired(WizardSession),
    Missing,
}

/// Runs setup dialogues. Owns the session store; every read and write of a
/// session happens under its lock, and the lock is never held across a
/// platform call.
pub struct SetupService {
    platform: Arc<dyn ChatPlatform>,
    configs: Arc<dyn GuildConfigRepository>,
    committer: FinalizationCommitter,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    engine: WizardEngine,
    sessions: Mutex<SessionStore>,
}

impl SetupService {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        configs: Arc<dyn GuildConfigRepository>,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditSink>,
        timeout: chrono::Duration,
    ) -> Self {
        Self {
            committer: FinalizationCommitter::new(platform.clone(), configs.clone()),
            platform,
            configs,
            clock,
            audit,
            engine: WizardEngine::new(),
            sessions: Mutex::new(SessionStore::new(timeout)),
        }
    }

    pub async fn start(
        &self,
        request: SetupRequest,
        ctx: &EventContext,
    ) -> Result<OutgoingMessage, SetupError> {
        let guild_id = &request.guild_id;
        let target = self.resolve_target(guild_id, &request.target).await?;
        let bot = self.platform.bot_user_id();
        if !self
            .platform
            .has_permission(guild_id, &bot, Some(&target), Permission::ManageChannels)
            .await?
        {
            return Err(SetupError::Permission(format!(
                "I need the Manage Channels permission in <#{target}> to set up tickets"
            )));
        }

        let config = match self.configs.find(guild_id).await? {
            Some(config) => config,
            None => GuildConfig::new(guild_id.clone()),
        };
        let roles = self.platform.guild_roles(guild_id).await?;
        let emojis = emoji_registry(self.platform.as_ref(), guild_id).await?;
        let snapshot = SessionSnapshot::from_guild(guild_id, &roles, emojis);
        if snapshot.omitted_roles > 0 {
            warn!(
                correlation_id = %ctx.correlation_id,
                guild_id = %guild_id,
                offered = snapshot.roles.len(),
                omitted = snapshot.omitted_roles,
                "role menus truncated for setup"
            );
        }

        let key = SessionKey::new(guild_id.clone(), request.user_id.clone());
        let (session, prompt) = self.engine.begin(
            key.clone(),
            target.clone(),
            request.origin_channel.clone(),
            DraftConfig::from_config(&config),
            snapshot,
            self.clock.now(),
        );
        if let Some(replaced) = self.sessions.lock().await.begin(session) {
            info!(
                correlation_id = %ctx.correlation_id,
                guild_id = %key.guild_id,
                user_id = %key.user_id,
                abandoned_step = ?replaced.step,
                "replaced running setup session"
            );
        }

        info!(
            event_name = "wizard.started",
            correlation_id = %ctx.correlation_id,
            guild_id = %key.guild_id,
            user_id = %key.user_id,
            target_channel = %target,
            "ticket setup started"
        );
        self.audit.emit(
            self.audit_context(&key, ctx)
                .event("wizard.started", AuditCategory::Wizard, AuditOutcome::Success)
                .with_metadata("target_channel", target.to_string()),
        );
        Ok(prompt_message(&prompt))
    }

    /// Returns `None` for messages that are not an answer to a running setup.
    pub async fn handle_text(
        &self,
        event: &MessageEvent,
        ctx: &EventContext,
    ) -> Result<Option<OutgoingMessage>, SetupError> {
        let Some(guild_id) = &event.guild_id else {
            return Ok(None);
        };
        let key = SessionKey::new(guild_id.clone(), event.author_id.clone());
        let turn = {
            let mut sessions = self.sessions.lock().await;
            self.take_turn(
                &mut sessions,
                &key,
                TurnGuard::Text(&event.channel_id),
                WizardInput::Text(event.content.clone()),
                ctx,
            )
        };

        Ok(match turn {
            Turn::Ignored | Turn::Missing => None,
            Turn::Reply(message) => Some(message),
            Turn::Expired(session) => {
                self.notify_expired(&session).await;
                None
            }
            Turn::Complete { session, draft } => Some(self.finalize(session, draft, ctx).await),
        })
    }

    pub async fn handle_choice(
        &self,
        event: &ComponentEvent,
        ctx: &EventContext,
    ) -> Result<OutgoingMessage, SetupError> {
        let Some((step, owner)) = parse_setup_custom_id(&event.custom_id) else {
            return Ok(error_message("This setup menu is no longer valid."));
        };
        if owner != event.user_id {
            return Ok(error_message("Only the person who started this setup can answer it."));
        }
        let Some(guild_id) = &event.guild_id else {
            return Ok(error_message("Setup only works inside a server."));
        };
        if !self
            .platform
            .has_permission(guild_id, &event.user_id, None, Permission::ManageGuild)
            .await?
        {
            return Err(SetupError::Permission(
                "you need the Manage Server permission to run ticket setup".to_owned(),
            ));
        }

        let key = SessionKey::new(guild_id.clone(), event.user_id.clone());
        let turn = {
            let mut sessions = self.sessions.lock().await;
            self.take_turn(
                &mut sessions,
                &key,
                TurnGuard::Choice(step),
                WizardInput::Choice(event.values.clone()),
                ctx,
            )
        };

        Ok(match turn {
            Turn::Reply(message) => message,
            Turn::Complete { session, draft } => self.finalize(session, draft, ctx).await,
            Turn::Expired(session) => {
                self.record_expiry(&session);
                timeout_notice()
            }
            Turn::Ignored | Turn::Missing => {
                error_message("Setup session expired. Run `ticket setup` again.")
            }
        })
    }

    /// Drops every timed-out session and tells each origin channel once.
    pub async fn sweep_expired(&self) -> usize {
        let expired = self.sessions.lock().await.take_expired(self.clock.now());
        for session in &expired {
            self.notify_expired(session).await;
        }
        expired.len()
    }

    pub fn spawn_sweeper(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = every.as_secs(), "setup session sweeper started");
            let mut tick = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        info!("setup session sweeper stopping");
                        break;
                    }
                    _ = tick.tick() => {
                        let swept = self.sweep_expired().await;
                        if swept > 0 {
                            debug!(swept, "expired setup sessions removed");
                        }
                    }
                }
            }
        })
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.lock().await.len()
    }

    async fn resolve_target(
        &self,
        guild_id: &GuildId,
        raw: &str,
    ) -> Result<ChannelId, SetupError> {
        let unknown = || SetupError::from(ValidationError::UnknownChannel(raw.trim().to_owned()));
        let channel_id = parse_mention(raw).map(ChannelId::new).ok_or_else(unknown)?;
        match self.platform.channel(&channel_id).await? {
            Some(channel) if channel.kind == ChannelKind::Text && &channel.guild_id == guild_id => {
                Ok(channel_id)
            }
            _ => Err(unknown()),
        }
    }

    fn take_turn(
        &self,
        sessions: &mut SessionStore,
        key: &SessionKey,
        guard: TurnGuard<'_>,
        input: WizardInput,
        ctx: &EventContext,
    ) -> Turn {
        let session = match sessions.lookup(key, self.clock.now()) {
            SessionLookup::Active(session) => session,
            SessionLookup::Expired(session) => return Turn::Expired(session),
            SessionLookup::Missing => return Turn::Missing,
        };

        match guard {
            TurnGuard::Text(channel_id) => {
                if &session.origin_channel != channel_id
                    || session.awaiting() == AwaitingInput::None
                {
                    return Turn::Ignored;
                }
            }
            TurnGuard::Choice(step) if step != session.step => {
                let mut prompt = self.engine.prompt(session);
                prompt.error = Some("That menu belongs to an earlier step.".to_owned());
                return Turn::Reply(prompt_message(&prompt));
            }
            TurnGuard::Choice(_) => {}
        }

        let audit = self.audit_context(key, ctx);
        match self.engine.advance_with_audit(
            session,
            input,
            self.clock.now(),
            self.audit.as_ref(),
            &audit,
        ) {
            Ok(Advance::Next(prompt)) => Turn::Reply(prompt_message(&prompt)),
            Ok(Advance::CategoryAdded { category, prompt, .. }) => {
                let mut message = prompt_message(&prompt);
                message.content = Some(format!("Added category `{}`.", category.value));
                Turn::Reply(message)
            }
            Ok(Advance::Complete(draft)) => match sessions.remove(key) {
                Some(session) => Turn::Complete { session, draft },
                None => Turn::Missing,
            },
            Err(rejection) => {
                debug!(
                    correlation_id = %ctx.correlation_id,
                    guild_id = %key.guild_id,
                    step = ?rejection.prompt.step,
                    error = %rejection.error,
                    "setup answer rejected"
                );
                Turn::Reply(prompt_message(&rejection.prompt))
            }
        }
    }

    async fn finalize(
        &self,
        session: WizardSession,
        draft: DraftConfig,
        ctx: &EventContext,
    ) -> OutgoingMessage {
        let audit = self.audit_context(&session.key, ctx);
        let result = self
            .committer
            .commit(&session.key, &session.target_channel, &draft, &audit, self.audit.as_ref())
            .await;

        match result {
            Ok(outcome) => {
                let mut text = format!("Panel created in <#{}>.", outcome.panel.channel_id);
                if let Some(note) = skipped_categories_note(&outcome.skipped) {
                    text.push('\n');
                    text.push_str(&note);
                }
                if !outcome.failed_reactions.is_empty() {
                    text.push_str(&format!(
                        "\nThese reactions could not be added: {}",
                        outcome.failed_reactions.join(" ")
                    ));
                }
                success_message(&text)
            }
            Err(error @ FinalizeError::NoValidCategories) => error_message(&error.to_string()),
            Err(_) => error_message(&format!(
                "Setup could not be completed and nothing was saved. Run `ticket setup` again. \
                 (ref `{}`)",
                ctx.correlation_id
            )),
        }
    }

    async fn notify_expired(&self, session: &WizardSession) {
        self.record_expiry(session);
        let sent = self.platform.send_message(&session.origin_channel, timeout_notice()).await;
        if let Err(error) = sent {
            warn!(
                guild_id = %session.key.guild_id,
                channel_id = %session.origin_channel,
                error = %error,
                "failed to send setup timeout notice"
            );
        }
    }

    fn record_expiry(&self, session: &WizardSession) {
        info!(
            event_name = "wizard.expired",
            guild_id = %session.key.guild_id,
            user_id = %session.key.user_id,
            step = ?session.step,
            "ticket setup timed out"
        );
        let audit = AuditContext::new(
            Some(session.key.guild_id.clone()),
            Some(session.key.user_id.clone()),
            "sweeper",
            AUDIT_ACTOR,
        );
        self.audit.emit(
            audit
                .event("wizard.expired", AuditCategory::Wizard, AuditOutcome::Rejected)
                .with_metadata("step", format!("{:?}", session.step)),
        );
    }

    fn audit_context(&self, key: &SessionKey, ctx: &EventContext) -> AuditContext {
        AuditContext::new(
            Some(key.guild_id.clone()),
            Some(key.user_id.clone()),
            ctx.correlation_id.clone(),
            AUDIT_ACTOR,
        )
    }
}
