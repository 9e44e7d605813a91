use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use tickety_core::domain::ids::{ChannelId, GuildId, MessageId, UserId};
use tickety_core::errors::ApplicationError;
use tickety_core::wizard::engine::SETUP_CUSTOM_ID_PREFIX;
use tickety_core::wizard::panel::TICKET_TYPE_MENU_ID;
use tickety_core::wizard::parse_create_ticket_custom_id;
use tickety_db::repositories::RepositoryError;

use crate::commands::{parse_command, CommandInvocation, CommandRouter};
use crate::embeds::{failure_message, ticket_created_message, OutgoingMessage};
use crate::setup::SetupService;
use crate::tickets::{OpenRequest, TicketService};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub event_id: String,
    pub event: DiscordEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiscordEvent {
    MessageCreate(MessageEvent),
    ComponentInteraction(ComponentEvent),
    ReactionAdd(ReactionEvent),
    Unsupported { event_type: String },
}

impl DiscordEvent {
    pub fn event_type(&self) -> DiscordEventType {
        match self {
            Self::MessageCreate(_) => DiscordEventType::MessageCreate,
            Self::ComponentInteraction(_) => DiscordEventType::ComponentInteraction,
            Self::ReactionAdd(_) => DiscordEventType::ReactionAdd,
            Self::Unsupported { .. } => DiscordEventType::Unsupported,
        }
    }

    pub fn guild_id(&self) -> Option<&GuildId> {
        match self {
            Self::MessageCreate(event) => event.guild_id.as_ref(),
            Self::ComponentInteraction(event) => event.guild_id.as_ref(),
            Self::ReactionAdd(event) => event.guild_id.as_ref(),
            Self::Unsupported { .. } => None,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        match self {
            Self::MessageCreate(event) => Some(&event.author_id),
            Self::ComponentInteraction(event) => Some(&event.user_id),
            Self::ReactionAdd(event) => Some(&event.user_id),
            Self::Unsupported { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DiscordEventType {
    MessageCreate,
    ComponentInteraction,
    ReactionAdd,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub author_id: UserId,
    pub author_name: String,
    pub author_is_bot: bool,
    pub content: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    Button,
    SelectMenu,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentEvent {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub username: String,
    pub kind: ComponentKind,
    pub custom_id: String,
    /// Selected option values; empty for buttons.
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub username: String,
    pub user_is_bot: bool,
    /// Unicode emoji, or the `<:name:id>` form for custom emojis.
    pub emoji: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyTarget {
    Channel(ChannelId),
    Direct(UserId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub target: ReplyTarget,
    pub message: OutgoingMessage,
}

impl Reply {
    pub fn channel(channel_id: ChannelId, message: OutgoingMessage) -> Self {
        Self { target: ReplyTarget::Channel(channel_id), message }
    }

    pub fn direct(user_id: UserId, message: OutgoingMessage) -> Self {
        Self { target: ReplyTarget::Direct(user_id), message }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(Reply),
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error("failed to load guild configuration: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> DiscordEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<DiscordEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

fn failure_reply<E>(error: E, ctx: &EventContext) -> OutgoingMessage
where
    ApplicationError: From<E>,
{
    let error = ApplicationError::from(error);
    if matches!(
        error,
        ApplicationError::Persistence(_)
            | ApplicationError::Integration(_)
            | ApplicationError::Configuration(_)
    ) {
        warn!(correlation_id = %ctx.correlation_id, error = %error, "request failed");
    }
    failure_message(error, &ctx.correlation_id)
}

/// Prefix commands first; anything else may be an answer to a running setup.
pub struct MessageCreateHandler {
    router: Arc<CommandRouter>,
    setup: Arc<SetupService>,
}

impl MessageCreateHandler {
    pub fn new(router: Arc<CommandRouter>, setup: Arc<SetupService>) -> Self {
        Self { router, setup }
    }
}

#[async_trait]
impl EventHandler for MessageCreateHandler {
    fn event_type(&self) -> DiscordEventType {
        DiscordEventType::MessageCreate
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let DiscordEvent::MessageCreate(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.author_is_bot {
            return Ok(HandlerResult::Ignored);
        }
        let Some(guild_id) = &event.guild_id else {
            return Ok(HandlerResult::Ignored);
        };

        let prefix = self.router.prefix_for(guild_id).await?;
        if let Some(command) = event.content.strip_prefix(prefix.as_str()).and_then(parse_command) {
            let invocation = CommandInvocation {
                guild_id: guild_id.clone(),
                channel_id: event.channel_id.clone(),
                user_id: event.author_id.clone(),
                username: event.author_name.clone(),
                prefix,
                command,
            };
            let message = match self.router.route(&invocation, ctx).await {
                Ok(Some(message)) => message,
                Ok(None) => return Ok(HandlerResult::Processed),
                Err(error) => failure_reply(error, ctx),
            };
            return Ok(HandlerResult::Responded(Reply::channel(event.channel_id.clone(), message)));
        }

        Ok(match self.setup.handle_text(event, ctx).await {
            Ok(Some(message)) => {
                HandlerResult::Responded(Reply::channel(event.channel_id.clone(), message))
            }
            Ok(None) => HandlerResult::Ignored,
            Err(error) => HandlerResult::Responded(Reply::channel(
                event.channel_id.clone(),
                failure_reply(error, ctx),
            )),
        })
    }
}

/// Setup menus and the ticket panel's buttons and menu.
pub struct ComponentInteractionHandler {
    setup: Arc<SetupService>,
    tickets: Arc<TicketService>,
}

impl ComponentInteractionHandler {
    pub fn new(setup: Arc<SetupService>, tickets: Arc<TicketService>) -> Self {
        Self { setup, tickets }
    }
}

#[async_trait]
impl EventHandler for ComponentInteractionHandler {
    fn event_type(&self) -> DiscordEventType {
        DiscordEventType::ComponentInteraction
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let DiscordEvent::ComponentInteraction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(guild_id) = &event.guild_id else {
            return Ok(HandlerResult::Ignored);
        };

        if event.custom_id.starts_with(SETUP_CUSTOM_ID_PREFIX) {
            let message = match self.setup.handle_choice(event, ctx).await {
                Ok(message) => message,
                Err(error) => failure_reply(error, ctx),
            };
            return Ok(HandlerResult::Responded(Reply::channel(event.channel_id.clone(), message)));
        }

        let ticket_type = match (event.kind, parse_create_ticket_custom_id(&event.custom_id)) {
            (ComponentKind::Button, Some(value)) => value.to_owned(),
            (ComponentKind::SelectMenu, None) if event.custom_id == TICKET_TYPE_MENU_ID => {
                match event.values.first() {
                    Some(value) => value.clone(),
                    None => return Ok(HandlerResult::Ignored),
                }
            }
            _ => return Ok(HandlerResult::Ignored),
        };

        let request = OpenRequest {
            guild_id: guild_id.clone(),
            user_id: event.user_id.clone(),
            username: event.username.clone(),
            source_channel: event.channel_id.clone(),
            ticket_type,
        };
        let message = match self.tickets.open(request, ctx).await {
            Ok(ticket) => ticket_created_message(&ticket.channel_id),
            Err(error) => failure_reply(error, ctx),
        };
        Ok(HandlerResult::Responded(Reply::direct(event.user_id.clone(), message)))
    }
}

/// Reactions on a stored reactions panel open tickets.
pub struct ReactionAddHandler {
    tickets: Arc<TicketService>,
}

impl ReactionAddHandler {
    pub fn new(tickets: Arc<TicketService>) -> Self {
        Self { tickets }
    }
}

#[async_trait]
impl EventHandler for ReactionAddHandler {
    fn event_type(&self) -> DiscordEventType {
        DiscordEventType::ReactionAdd
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let DiscordEvent::ReactionAdd(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.user_is_bot {
            return Ok(HandlerResult::Ignored);
        }

        Ok(match self.tickets.open_from_reaction(event, ctx).await {
            Ok(None) => HandlerResult::Ignored,
            Ok(Some(ticket)) => HandlerResult::Responded(Reply::direct(
                event.user_id.clone(),
                ticket_created_message(&ticket.channel_id),
            )),
            Err(error) => HandlerResult::Responded(Reply::direct(
                event.user_id.clone(),
                failure_reply(error, ctx),
            )),
        })
    }
}
