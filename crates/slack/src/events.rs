use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use deckhand_core::callback::CallbackDecodeError;
use deckhand_core::errors::{ApplicationError, DomainError, InterfaceError};
use thiserror::Error;
use tracing::{error, info_span, warn, Instrument, Span};

use crate::{
    api::{ChatClient, ChatError},
    blocks::MessageTemplate,
    commands::CommandRouter,
    interactions::InteractionDispatcher,
    views,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    Mention(MentionEvent),
    BlockAction(BlockActionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::Mention(_) => SlackEventType::Mention,
            Self::BlockAction(_) => SlackEventType::BlockAction,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    Mention,
    BlockAction,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MentionEvent {
    pub channel_id: String,
    pub message_ts: String,
    pub user_id: String,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockActionEvent {
    pub channel_id: String,
    /// ts of the message that carried the clicked element.
    pub message_ts: String,
    pub user_id: String,
    pub action_id: String,
    /// Button `value` or the selected option's `value`.
    pub value: Option<String>,
}

/// Per-event conversation context. `message_ts` is the correlation key in logs and
/// ends up in the release head branch name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub channel_id: String,
    pub message_ts: String,
}

impl EventContext {
    pub fn for_mention(event: &MentionEvent) -> Self {
        Self { channel_id: event.channel_id.clone(), message_ts: event.message_ts.clone() }
    }

    pub fn for_block_action(event: &BlockActionEvent) -> Self {
        Self { channel_id: event.channel_id.clone(), message_ts: event.message_ts.clone() }
    }

    pub fn for_event(event: &SlackEvent) -> Option<Self> {
        match event {
            SlackEvent::Mention(event) => Some(Self::for_mention(event)),
            SlackEvent::BlockAction(event) => Some(Self::for_block_action(event)),
            SlackEvent::Unsupported { .. } => None,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.message_ts
    }

    pub fn span(&self) -> Span {
        info_span!("slack_event", correlation_id = %self.message_ts, channel_id = %self.channel_id)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(MessageTemplate),
    Processed,
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error(transparent)]
    Application(#[from] ApplicationError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

impl From<DomainError> for EventHandlerError {
    fn from(value: DomainError) -> Self {
        Self::Application(value.into())
    }
}

impl From<CallbackDecodeError> for EventHandlerError {
    fn from(value: CallbackDecodeError) -> Self {
        Self::Application(DomainError::from(value).into())
    }
}

impl EventHandlerError {
    pub fn invalid_arguments(reason: impl Into<String>) -> Self {
        DomainError::InvalidArguments(reason.into()).into()
    }

    pub fn into_interface(self, correlation_id: &str) -> InterfaceError {
        let application = match self {
            Self::Application(error) => error,
            Self::Chat(error) => ApplicationError::Integration(error.to_string()),
        };
        application.into_interface(correlation_id)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to deliver reply: {0}")]
    Delivery(#[from] ChatError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Routes envelopes to handlers and delivers their replies. Mentions get a new
/// message; interactions update the message that carried the clicked element.
/// Handler failures become a user-visible message and never reach the transport.
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
    chat: Arc<dyn ChatClient>,
}

impl EventDispatcher {
    pub fn new(chat: Arc<dyn ChatClient>) -> Self {
        Self { handlers: HashMap::new(), chat }
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(&self, envelope: &SlackEnvelope) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };
        let Some(ctx) = EventContext::for_event(&envelope.event) else {
            return Ok(HandlerResult::Ignored);
        };

        let span = ctx.span();
        async {
            let result = match handler.handle(envelope, &ctx).await {
                Ok(result) => result,
                Err(error) => HandlerResult::Responded(failure_message(error, &ctx)),
            };

            if let HandlerResult::Responded(message) = &result {
                self.deliver(&envelope.event, &ctx, message).await?;
            }
            Ok::<_, DispatchError>(result)
        }
        .instrument(span)
        .await
    }

    async fn deliver(
        &self,
        event: &SlackEvent,
        ctx: &EventContext,
        message: &MessageTemplate,
    ) -> Result<(), ChatError> {
        match event {
            SlackEvent::Mention(_) => {
                self.chat.post_message(&ctx.channel_id, message).await.map(|_| ())
            }
            SlackEvent::BlockAction(_) => {
                self.chat.update_message(&ctx.channel_id, &ctx.message_ts, message).await
            }
            SlackEvent::Unsupported { .. } => Ok(()),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

fn failure_message(error: EventHandlerError, ctx: &EventContext) -> MessageTemplate {
    let interface = error.into_interface(ctx.correlation_id());
    match &interface {
        InterfaceError::BadRequest { message, .. } => {
            warn!(
                event_name = "slack.handler.rejected_input",
                correlation_id = %interface.correlation_id(),
                reason = %message,
                "handler rejected input"
            );
            views::invalid_arguments_message(message, ctx.correlation_id())
        }
        InterfaceError::ServiceUnavailable { message, .. }
        | InterfaceError::Internal { message, .. } => {
            error!(
                event_name = "slack.handler.failed",
                correlation_id = %interface.correlation_id(),
                error = %message,
                "handler failed"
            );
            views::internal_error_message(ctx.correlation_id())
        }
    }
}

pub struct MentionHandler {
    router: Arc<CommandRouter>,
}

impl MentionHandler {
    pub fn new(router: Arc<CommandRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl EventHandler for MentionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::Mention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::Mention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.router.dispatch(event, ctx).await
    }
}

pub struct BlockActionHandler {
    interactions: Arc<InteractionDispatcher>,
}

impl BlockActionHandler {
    pub fn new(interactions: Arc<InteractionDispatcher>) -> Self {
        Self { interactions }
    }
}

#[async_trait]
impl EventHandler for BlockActionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::BlockAction
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::BlockAction(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.interactions.dispatch(event, ctx).await
    }
}
