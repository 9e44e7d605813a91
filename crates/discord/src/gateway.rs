use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{
    DispatchError, EventContext, EventDispatcher, GatewayEnvelope, HandlerResult, Reply,
    ReplyTarget,
};
use crate::platform::{ChatPlatform, PlatformError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway failed to connect: {0}")]
    Connect(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("reply delivery failed: {0}")]
    Delivery(#[from] PlatformError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of gateway events. `Ok(None)` means the stream closed cleanly.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Pumps gateway events through the dispatcher and delivers replies.
pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    platform: Arc<dyn ChatPlatform>,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        platform: Arc<dyn ChatPlatform>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, platform, reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening gateway connection");
        self.transport.connect().await?;
        info!(attempt, "gateway connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "gateway stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let guild_id = envelope.event.guild_id().map(|id| id.as_str()).unwrap_or("unknown");
            let user_id = envelope.event.user_id().map(|id| id.as_str()).unwrap_or("unknown");

            info!(
                event_name = "ingress.discord.event_received",
                event_id = %envelope.event_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.event_id,
                guild_id,
                user_id,
                "received gateway event"
            );

            let context = EventContext { correlation_id: envelope.event_id.clone() };
            if let Err(error) = self.handle(&envelope, &context).await {
                warn!(
                    event_id = %envelope.event_id,
                    correlation_id = %envelope.event_id,
                    guild_id,
                    user_id,
                    error = %error,
                    "event handling failed; continuing gateway loop"
                );
            }
        }
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        context: &EventContext,
    ) -> Result<(), GatewayError> {
        match self.dispatcher.dispatch(envelope, context).await? {
            HandlerResult::Responded(reply) => self.deliver(reply, context).await,
            HandlerResult::Processed | HandlerResult::Ignored => Ok(()),
        }
    }

    async fn deliver(&self, reply: Reply, context: &EventContext) -> Result<(), GatewayError> {
        match reply.target {
            ReplyTarget::Channel(channel_id) => {
                self.platform.send_message(&channel_id, reply.message).await?;
                debug!(
                    event_name = "egress.discord.reply_sent",
                    correlation_id = %context.correlation_id,
                    channel_id = %channel_id,
                    "reply sent"
                );
            }
            ReplyTarget::Direct(user_id) => {
                self.platform.send_direct_message(&user_id, reply.message).await?;
                debug!(
                    event_name = "egress.discord.reply_sent",
                    correlation_id = %context.correlation_id,
                    user_id = %user_id,
                    "direct reply sent"
                );
            }
        }
        Ok(())
    }
}
