use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::commands::RegistrationError;
use crate::events::{BlockActionEvent, EventContext, EventHandlerError, HandlerResult};

#[async_trait]
pub trait InteractionHandler: Send + Sync {
    async fn handle(
        &self,
        action: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

/// Routes button clicks and menu selections by action id.
#[derive(Default)]
pub struct InteractionDispatcher {
    handlers: HashMap<String, Arc<dyn InteractionHandler>>,
}

impl InteractionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        action_id: &str,
        handler: Arc<dyn InteractionHandler>,
    ) -> Result<(), RegistrationError> {
        if self.handlers.contains_key(action_id) {
            return Err(RegistrationError::DuplicateAction(action_id.to_owned()));
        }
        self.handlers.insert(action_id.to_owned(), handler);
        Ok(())
    }

    pub async fn dispatch(
        &self,
        action: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(handler) = self.handlers.get(&action.action_id) else {
            debug!(
                event_name = "slack.interaction.unhandled",
                correlation_id = %ctx.correlation_id(),
                action_id = %action.action_id,
                "no handler registered for action"
            );
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(action, ctx).await
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_registered(&self, action_id: &str) -> bool {
        self.handlers.contains_key(action_id)
    }
}
