//! `release` command and the dialogue interactions it starts.
//!
//! Each interaction handler is bound to one action id, which fixes the dialogue
//! state it was rendered in and the callback token shape it carries.

use std::sync::Arc;

use async_trait::async_trait;
use deckhand_core::callback::{redact_for_log, CallbackDecodeError, CallbackToken};
use deckhand_core::errors::{ApplicationError, DomainError};
use deckhand_core::flows::{
    FlowAction, FlowContext, FlowEngine, FlowEvent, FlowState, FlowTransitionError,
    ReleaseDialogueFlow, TransitionOutcome,
};
use deckhand_core::release::{OrgRepo, ReleaseRequest, ReleaseTargets, ReleaseWorkflow};
use tracing::{info, warn};

use crate::api::ChatClient;
use crate::commands::{CommandHandler, CommandInvocation, CommandRouter, RegistrationError};
use crate::events::{BlockActionEvent, EventContext, EventHandlerError, HandlerResult};
use crate::interactions::{InteractionDispatcher, InteractionHandler};
use crate::views;

pub const COMMAND: &str = "release";

pub struct ReleaseDialogue {
    targets: Arc<ReleaseTargets>,
    workflow: ReleaseWorkflow,
    chat: Arc<dyn ChatClient>,
    engine: FlowEngine<ReleaseDialogueFlow>,
}

impl ReleaseDialogue {
    pub fn new(
        targets: Arc<ReleaseTargets>,
        workflow: ReleaseWorkflow,
        chat: Arc<dyn ChatClient>,
    ) -> Self {
        Self { targets, workflow, chat, engine: FlowEngine::default() }
    }

    /// Applies `event` in `state`, re-checking that the repository is still configured.
    fn transition(
        &self,
        state: FlowState,
        event: FlowEvent,
        org_repo: &OrgRepo,
        ctx: &EventContext,
    ) -> Result<TransitionOutcome, EventHandlerError> {
        let context = FlowContext { target_configured: self.targets.find(org_repo).is_some() };
        self.engine.apply_traced(&state, &event, &context, ctx.correlation_id()).map_err(
            |error| match error {
                FlowTransitionError::UnknownTarget { .. } => EventHandlerError::invalid_arguments(
                    format!("{org_repo} is not a configured release target"),
                ),
                other => DomainError::from(other).into(),
            },
        )
    }

    fn record_outcome(&self, state: FlowState, event: FlowEvent, ctx: &EventContext) {
        let reached =
            self.engine.record(&state, &event, &FlowContext::default(), ctx.correlation_id());
        info!(
            event_name = "slack.release.dialogue_finished",
            correlation_id = ctx.correlation_id(),
            state = %reached,
            "release dialogue finished"
        );
    }
}

pub fn register(
    router: &mut CommandRouter,
    interactions: &mut InteractionDispatcher,
    dialogue: Arc<ReleaseDialogue>,
    help_url: Option<&str>,
) -> Result<(), RegistrationError> {
    router.register(&[COMMAND], Arc::new(ReleaseCommand(dialogue.clone())), help_url)?;
    interactions.register(views::ACTION_SELECT_REPO, Arc::new(SelectRepoAction(dialogue.clone())))?;
    let select_level = Arc::new(SelectLevelAction(dialogue.clone()));
    interactions.register(views::ACTION_SELECT_LEVEL_MAJOR, select_level.clone())?;
    interactions.register(views::ACTION_SELECT_LEVEL_MINOR, select_level.clone())?;
    interactions.register(views::ACTION_SELECT_LEVEL_PATCH, select_level)?;
    interactions.register(views::ACTION_CONFIRM, Arc::new(ConfirmAction(dialogue)))?;
    Ok(())
}

fn token_value<'a>(
    action: &'a BlockActionEvent,
    ctx: &EventContext,
) -> Result<&'a str, EventHandlerError> {
    action.value.as_deref().ok_or_else(|| {
        warn!(
            event_name = "release.dialogue.missing_value",
            correlation_id = %ctx.correlation_id(),
            action_id = %action.action_id,
            "interaction carried no callback value"
        );
        CallbackDecodeError::MalformedToken { expected: 1, found: 0 }.into()
    })
}

fn decode_failed(raw: &str, ctx: &EventContext, error: CallbackDecodeError) -> EventHandlerError {
    warn!(
        event_name = "release.dialogue.token_rejected",
        correlation_id = %ctx.correlation_id(),
        token = %redact_for_log(raw),
        error = %error,
        "callback token could not be decoded"
    );
    error.into()
}

pub struct ReleaseCommand(Arc<ReleaseDialogue>);

#[async_trait]
impl CommandHandler for ReleaseCommand {
    async fn handle(
        &self,
        _invocation: &CommandInvocation<'_>,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let repositories = self.0.targets.repositories();
        Ok(HandlerResult::Responded(views::repo_selection_message(&repositories)))
    }
}

pub struct SelectRepoAction(Arc<ReleaseDialogue>);

#[async_trait]
impl InteractionHandler for SelectRepoAction {
    async fn handle(
        &self,
        action: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let raw = token_value(action, ctx)?;
        let org_repo =
            CallbackToken::decode_repo(raw).map_err(|error| decode_failed(raw, ctx, error))?;

        let outcome = self.0.transition(
            FlowState::AwaitingRepoSelection,
            FlowEvent::RepoSelected,
            &org_repo,
            ctx,
        )?;
        if !outcome.actions.contains(&FlowAction::RenderLevelSelection) {
            return Ok(HandlerResult::Processed);
        }
        Ok(HandlerResult::Responded(views::level_selection_message(&org_repo)))
    }
}

pub struct SelectLevelAction(Arc<ReleaseDialogue>);

#[async_trait]
impl InteractionHandler for SelectLevelAction {
    async fn handle(
        &self,
        action: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let raw = token_value(action, ctx)?;
        let selection =
            CallbackToken::decode_release(raw).map_err(|error| decode_failed(raw, ctx, error))?;

        let outcome = self.0.transition(
            FlowState::AwaitingLevelSelection,
            FlowEvent::LevelSelected,
            selection.org_repo(),
            ctx,
        )?;
        if !outcome.actions.contains(&FlowAction::RenderConfirmation) {
            return Ok(HandlerResult::Processed);
        }
        Ok(HandlerResult::Responded(views::confirmation_message(&selection)))
    }
}

pub struct ConfirmAction(Arc<ReleaseDialogue>);

#[async_trait]
impl InteractionHandler for ConfirmAction {
    async fn handle(
        &self,
        action: &BlockActionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let dialogue = &self.0;
        let raw = token_value(action, ctx)?;
        let selection =
            CallbackToken::decode_release(raw).map_err(|error| decode_failed(raw, ctx, error))?;

        let outcome = dialogue.transition(
            FlowState::AwaitingConfirmation,
            FlowEvent::Confirmed,
            selection.org_repo(),
            ctx,
        )?;
        let base_branch =
            dialogue.targets.base_branch_for(selection.org_repo()).ok_or_else(|| {
                EventHandlerError::invalid_arguments(format!(
                    "{} is not a configured release target",
                    selection.org_repo()
                ))
            })?;

        if outcome.actions.contains(&FlowAction::RenderProcessing) {
            if let Err(error) = dialogue
                .chat
                .update_message(&ctx.channel_id, &ctx.message_ts, &views::processing_message())
                .await
            {
                warn!(
                    event_name = "release.dialogue.display_update_failed",
                    correlation_id = %ctx.correlation_id(),
                    error = %error,
                    "failed to show processing state"
                );
            }
        }
        if !outcome.actions.contains(&FlowAction::ExecuteRelease) {
            return Ok(HandlerResult::Processed);
        }

        info!(
            event_name = "release.dialogue.confirmed",
            correlation_id = %ctx.correlation_id(),
            repository = %selection.org_repo(),
            level = %selection.level(),
            base_branch,
            "starting release workflow"
        );
        let request = ReleaseRequest {
            target: selection.clone(),
            base_branch: base_branch.to_owned(),
            correlation_id: ctx.message_ts.clone(),
        };

        match dialogue.workflow.run(&request).await {
            Ok(number) => {
                dialogue.record_outcome(outcome.to, FlowEvent::ReleaseSucceeded, ctx);
                Ok(HandlerResult::Responded(views::pull_request_message(&selection, number)))
            }
            Err(error) => {
                dialogue.record_outcome(outcome.to, FlowEvent::ReleaseFailed, ctx);
                Err(ApplicationError::from(error).into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use deckhand_core::release::{ReleaseTarget, ReleaseTargets, ReleaseWorkflow};

    use super::ReleaseDialogue;
    use crate::commands::CommandRouter;
    use crate::events::{
        BlockActionEvent, BlockActionHandler, DispatchError, EventDispatcher, HandlerResult,
        MentionEvent,
        MentionHandler, SlackEnvelope, SlackEvent,
    };
    use crate::interactions::InteractionDispatcher;
    use crate::testing::{RecordingChat, RecordingRelease};
    use crate::views;

    const MESSAGE_TS: &str = "1730000000.000200";

    struct Harness {
        dispatcher: EventDispatcher,
        chat: Arc<RecordingChat>,
        release: Arc<RecordingRelease>,
    }

    fn harness_with(chat: RecordingChat, release: RecordingRelease) -> Harness {
        let chat = Arc::new(chat);
        let release = Arc::new(release);
        let targets = Arc::new(ReleaseTargets::new(vec![ReleaseTarget {
            repository_url: "https://github.com/acme/widget".to_owned(),
            base_branch: "main".to_owned(),
        }]));
        let workflow =
            ReleaseWorkflow::new(release.clone(), release.clone(), Duration::from_secs(600));
        let dialogue = Arc::new(ReleaseDialogue::new(targets, workflow, chat.clone()));

        let mut router = CommandRouter::new();
        let mut interactions = InteractionDispatcher::new();
        super::register(&mut router, &mut interactions, dialogue, None).expect("register");

        let mut dispatcher = EventDispatcher::new(chat.clone());
        dispatcher.register(MentionHandler::new(Arc::new(router)));
        dispatcher.register(BlockActionHandler::new(Arc::new(interactions)));
        Harness { dispatcher, chat, release }
    }

    fn harness() -> Harness {
        harness_with(RecordingChat::default(), RecordingRelease::succeeding(42))
    }

    fn click(action_id: &str, value: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: format!("env-{action_id}"),
            event: SlackEvent::BlockAction(BlockActionEvent {
                channel_id: "C1".to_owned(),
                message_ts: MESSAGE_TS.to_owned(),
                user_id: "U1".to_owned(),
                action_id: action_id.to_owned(),
                value: Some(value.to_owned()),
            }),
        }
    }

    fn responded(result: HandlerResult) -> crate::blocks::MessageTemplate {
        match result {
            HandlerResult::Responded(message) => message,
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn release_command_offers_configured_repositories() {
        let harness = harness();
        let envelope = SlackEnvelope {
            envelope_id: "env-1".to_owned(),
            event: SlackEvent::Mention(MentionEvent {
                channel_id: "C1".to_owned(),
                message_ts: "1730000000.000100".to_owned(),
                user_id: "U1".to_owned(),
                text: "<@UBOT> release".to_owned(),
            }),
        };

        let message = responded(harness.dispatcher.dispatch(&envelope).await.expect("dispatch"));

        let options: Vec<_> = message.select_options().map(|option| option.value.clone()).collect();
        assert_eq!(options, vec!["acme__widget"]);
        assert_eq!(harness.chat.posted().await.len(), 1);
    }

    #[tokio::test]
    async fn selecting_a_repository_offers_the_three_levels() {
        let harness = harness();

        let message = responded(
            harness
                .dispatcher
                .dispatch(&click(views::ACTION_SELECT_REPO, "acme__widget"))
                .await
                .expect("dispatch"),
        );

        let values: Vec<_> =
            message.buttons().filter_map(|button| button.value.clone()).take(3).collect();
        assert_eq!(
            values,
            vec![
                "acme__widget__release/major",
                "acme__widget__release/minor",
                "acme__widget__release/patch",
            ]
        );
        assert_eq!(harness.chat.updated().await[0].1, MESSAGE_TS);
    }

    #[tokio::test]
    async fn selecting_a_level_asks_for_confirmation() {
        let harness = harness();

        let message = responded(
            harness
                .dispatcher
                .dispatch(&click(views::ACTION_SELECT_LEVEL_MINOR, "acme__widget__release/minor"))
                .await
                .expect("dispatch"),
        );

        assert_eq!(
            message.text_content(),
            "OK? > Target: *acme/widget*, Update Level: *release/minor*"
        );
    }

    #[tokio::test]
    async fn confirming_runs_the_workflow_and_links_the_pull_request() {
        let harness = harness();

        let message = responded(
            harness
                .dispatcher
                .dispatch(&click(views::ACTION_CONFIRM, "acme__widget__release/patch"))
                .await
                .expect("dispatch"),
        );

        assert!(message.text_content().contains(":github: <https://github.com/acme/widget/pull/42>"));
        let updates = harness.chat.updated().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].2, views::processing_message());
        assert_eq!(
            harness.release.calls().await,
            vec![
                "clone acme/widget@main",
                "switch release/bot_1730000000.000200",
                "commit [Bot] for release!!",
                "push",
                "create_pr release/bot_1730000000.000200->main",
                "label #42 release/patch",
                "remove /tmp/deckhand/widget",
            ]
        );
    }

    #[tokio::test]
    async fn failed_pull_request_creation_reports_internal_error_and_cleans_up() {
        let harness =
            harness_with(RecordingChat::default(), RecordingRelease::failing_at("create_pr"));

        let message = responded(
            harness
                .dispatcher
                .dispatch(&click(views::ACTION_CONFIRM, "acme__widget__release/patch"))
                .await
                .expect("dispatch"),
        );

        assert_eq!(message, views::internal_error_message(MESSAGE_TS));
        let calls = harness.release.calls().await;
        assert!(calls.contains(&"remove /tmp/deckhand/widget".to_owned()));
        assert!(calls.contains(&"delete_branch release/bot_1730000000.000200".to_owned()));
        assert!(!calls.iter().any(|call| call.starts_with("label")));
    }

    #[tokio::test]
    async fn processing_update_failure_does_not_stop_the_release() {
        let harness =
            harness_with(RecordingChat::failing_updates(), RecordingRelease::succeeding(9));

        let result = harness
            .dispatcher
            .dispatch(&click(views::ACTION_CONFIRM, "acme__widget__release/major"))
            .await;

        // The final in-place update fails as well and is surfaced to the runner.
        assert!(matches!(result, Err(DispatchError::Delivery(_))));
        assert!(harness.release.calls().await.contains(&"label #9 release/major".to_owned()));
        assert_eq!(harness.chat.updated().await.len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_repository_is_rejected_by_name() {
        let harness = harness();

        let message = responded(
            harness
                .dispatcher
                .dispatch(&click(views::ACTION_SELECT_REPO, "acme__gadget"))
                .await
                .expect("dispatch"),
        );

        assert_eq!(
            message,
            views::invalid_arguments_message(
                "acme/gadget is not a configured release target",
                MESSAGE_TS
            )
        );
    }

    #[tokio::test]
    async fn confirmation_for_a_removed_target_never_runs_the_workflow() {
        let harness = harness();

        harness
            .dispatcher
            .dispatch(&click(views::ACTION_CONFIRM, "acme__gadget__release/patch"))
            .await
            .expect("dispatch");

        assert!(harness.release.calls().await.is_empty());
    }

    #[tokio::test]
    async fn malformed_tokens_render_the_generic_error() {
        let harness = harness();

        for (action_id, value) in [
            (views::ACTION_SELECT_REPO, "acme"),
            (views::ACTION_SELECT_LEVEL_PATCH, "acme__widget"),
            (views::ACTION_CONFIRM, "acme__widget__release/patch__extra"),
            (views::ACTION_CONFIRM, ""),
        ] {
            let message = responded(
                harness.dispatcher.dispatch(&click(action_id, value)).await.expect("dispatch"),
            );
            assert_eq!(message, views::internal_error_message(MESSAGE_TS), "{action_id} {value}");
        }
        assert!(harness.release.calls().await.is_empty());
    }
}
