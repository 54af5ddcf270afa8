use std::sync::Arc;

use async_trait::async_trait;
use deckhand_core::errors::DomainError;
use deckhand_core::flows::{FlowContext, FlowEngine, FlowEvent, FlowState, ReleaseDialogueFlow};
use deckhand_core::version::VersionInfo;
use tracing::debug;

use crate::commands::{CommandHandler, CommandInvocation, CommandRouter, RegistrationError};
use crate::events::{BlockActionEvent, EventContext, EventHandlerError, HandlerResult};
use crate::interactions::{InteractionDispatcher, InteractionHandler};
use crate::views;

pub fn register(
    router: &mut CommandRouter,
    interactions: &mut InteractionDispatcher,
    version: VersionInfo,
) -> Result<(), RegistrationError> {
    router.register(&["help"], Arc::new(HelpCommand), None)?;
    router.register(&["version"], Arc::new(VersionCommand(version)), None)?;
    interactions.register(views::ACTION_CANCEL, Arc::new(CancelAction::default()))?;
    interactions.register(views::ACTION_NOTHING_TO_DO, Arc::new(NothingToDoAction))?;
    Ok(())
}

pub struct HelpCommand;

#[async_trait]
impl CommandHandler for HelpCommand {
    async fn handle(
        &self,
        invocation: &CommandInvocation<'_>,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        Ok(HandlerResult::Responded(views::help_message(&invocation.registry.list_commands())))
    }
}

pub struct VersionCommand(pub VersionInfo);

#[async_trait]
impl CommandHandler for VersionCommand {
    async fn handle(
        &self,
        _invocation: &CommandInvocation<'_>,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        Ok(HandlerResult::Responded(views::version_message(&self.0)))
    }
}

/// Cancel buttons carry the dialogue state they were rendered in. A missing or
/// unrecognised state still renders the cancelled message, so repeated clicks agree.
#[derive(Default)]
pub struct CancelAction {
    engine: FlowEngine<ReleaseDialogueFlow>,
}

#[async_trait]
impl InteractionHandler for CancelAction {
    async fn handle(
        &self,
        action: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let state = action.value.as_deref().and_then(|value| value.parse::<FlowState>().ok());
        match state {
            Some(state) => {
                self.engine
                    .apply_traced(
                        &state,
                        &FlowEvent::CancelRequested,
                        &FlowContext::default(),
                        ctx.correlation_id(),
                    )
                    .map_err(DomainError::from)?;
            }
            None => debug!(
                event_name = "release.dialogue.cancel_without_state",
                correlation_id = %ctx.correlation_id(),
                "cancel carried no recognised state"
            ),
        }
        Ok(HandlerResult::Responded(views::cancelled_message()))
    }
}

/// Cosmetic buttons on finished messages.
pub struct NothingToDoAction;

#[async_trait]
impl InteractionHandler for NothingToDoAction {
    async fn handle(
        &self,
        _action: &BlockActionEvent,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        Ok(HandlerResult::Processed)
    }
}
