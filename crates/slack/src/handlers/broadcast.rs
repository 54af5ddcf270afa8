//! `track list|enable|disable` and the scene-switch button against the broadcast
//! service.

use std::sync::Arc;

use async_trait::async_trait;
use deckhand_core::broadcast::{BroadcastClient, BroadcastError, SceneTrack};
use deckhand_core::callback::{redact_for_log, CallbackDecodeError};
use deckhand_core::errors::ApplicationError;
use tracing::{info, warn};

use crate::api::ChatClient;
use crate::commands::{CommandHandler, CommandInvocation, CommandRouter, RegistrationError};
use crate::events::{BlockActionEvent, EventContext, EventHandlerError, HandlerResult};
use crate::interactions::{InteractionDispatcher, InteractionHandler};
use crate::views;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackCommand {
    List,
    Enable,
    Disable,
}

impl TrackCommand {
    fn words(self) -> [&'static str; 2] {
        match self {
            Self::List => ["track", "list"],
            Self::Enable => ["track", "enable"],
            Self::Disable => ["track", "disable"],
        }
    }
}

pub fn register(
    router: &mut CommandRouter,
    interactions: &mut InteractionDispatcher,
    client: Arc<dyn BroadcastClient>,
    chat: Arc<dyn ChatClient>,
    help_url: Option<&str>,
) -> Result<(), RegistrationError> {
    for command in [TrackCommand::List, TrackCommand::Enable, TrackCommand::Disable] {
        let handler = Arc::new(TrackHandler { command, client: client.clone() });
        router.register(&command.words(), handler, help_url)?;
    }
    interactions.register(views::ACTION_SCENE_NEXT, Arc::new(SceneNextAction { client, chat }))?;
    Ok(())
}

pub struct TrackHandler {
    command: TrackCommand,
    client: Arc<dyn BroadcastClient>,
}

fn track_id(args: &[String]) -> Result<i32, EventHandlerError> {
    args.first()
        .and_then(|arg| arg.parse::<i32>().ok())
        .ok_or_else(|| EventHandlerError::invalid_arguments("args[0] (trackId) must be integer"))
}

fn broadcast_failure(error: BroadcastError) -> EventHandlerError {
    match error {
        BroadcastError::TrackNotFound(_) => EventHandlerError::invalid_arguments(error.to_string()),
        other => ApplicationError::Integration(other.to_string()).into(),
    }
}

#[async_trait]
impl CommandHandler for TrackHandler {
    async fn handle(
        &self,
        invocation: &CommandInvocation<'_>,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let enabled = match self.command {
            TrackCommand::List => {
                let tracks = self.client.list_tracks().await.map_err(broadcast_failure)?;
                return Ok(HandlerResult::Responded(views::tracks_message(&tracks)));
            }
            TrackCommand::Enable => true,
            TrackCommand::Disable => false,
        };

        let track_id = track_id(&invocation.args)?;
        let track = self.client.set_automation(track_id, enabled).await.map_err(broadcast_failure)?;
        info!(
            event_name = "broadcast.automation_changed",
            correlation_id = %ctx.correlation_id(),
            user_id = %invocation.user_id,
            track_id,
            enabled = track.enabled,
            "track automation updated"
        );
        Ok(HandlerResult::Responded(views::automation_message(&track)))
    }
}

/// Moves a track to its next scene, swaps the clicked button for a "Switched" marker
/// and notes in the thread who pushed it.
pub struct SceneNextAction {
    client: Arc<dyn BroadcastClient>,
    chat: Arc<dyn ChatClient>,
}

#[async_trait]
impl InteractionHandler for SceneNextAction {
    async fn handle(
        &self,
        action: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let raw = action.value.as_deref().unwrap_or_default();
        let track = SceneTrack::decode(raw).map_err(|error| rejected_token(raw, ctx, error))?;

        self.client.move_scene_to_next(track.id).await.map_err(broadcast_failure)?;
        info!(
            event_name = "broadcast.scene_moved",
            correlation_id = %ctx.correlation_id(),
            user_id = %action.user_id,
            track_id = track.id,
            "track moved to next scene"
        );

        self.chat
            .update_message(&ctx.channel_id, &ctx.message_ts, &views::scene_switched_message(&track))
            .await?;
        self.chat
            .post_thread_reply(
                &ctx.channel_id,
                &ctx.message_ts,
                &views::scene_switch_notice(&action.user_id),
            )
            .await?;
        Ok(HandlerResult::Processed)
    }
}

fn rejected_token(raw: &str, ctx: &EventContext, error: CallbackDecodeError) -> EventHandlerError {
    warn!(
        event_name = "broadcast.scene_token_rejected",
        correlation_id = %ctx.correlation_id(),
        token = %redact_for_log(raw),
        error = %error,
        "scene button value could not be decoded"
    );
    error.into()
}
