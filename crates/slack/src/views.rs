//! Message templates for every bot reply.

use std::collections::BTreeMap;

use deckhand_core::broadcast::{automation_summary, SceneTrack, Track};
use deckhand_core::callback::CallbackToken;
use deckhand_core::flows::FlowState;
use deckhand_core::release::{OrgRepo, OrgRepoLevel, ReleaseLevel};
use deckhand_core::version::VersionInfo;

use crate::blocks::{
    ButtonElement, ButtonStyle, Color, MessageBuilder, MessageTemplate, SelectOption,
    StaticSelectElement,
};

pub const ACTION_SELECT_REPO: &str = "release.select_repo.v1";
pub const ACTION_SELECT_LEVEL_MAJOR: &str = "release.select_level.major.v1";
pub const ACTION_SELECT_LEVEL_MINOR: &str = "release.select_level.minor.v1";
pub const ACTION_SELECT_LEVEL_PATCH: &str = "release.select_level.patch.v1";
pub const ACTION_CONFIRM: &str = "release.confirm.v1";
pub const ACTION_CANCEL: &str = "common.cancel.v1";
pub const ACTION_NOTHING_TO_DO: &str = "common.nothing_to_do.v1";
pub const ACTION_SCENE_NEXT: &str = "broadcast.scene_next.v1";

pub const PROCESSING_TEXT: &str = "processing...";
pub const CANCELLED_TEXT: &str = "cancelled";

/// Block Kit requires action ids to be unique within a block, so each level has its own.
pub fn level_action_id(level: ReleaseLevel) -> &'static str {
    match level {
        ReleaseLevel::Major => ACTION_SELECT_LEVEL_MAJOR,
        ReleaseLevel::Minor => ACTION_SELECT_LEVEL_MINOR,
        ReleaseLevel::Patch => ACTION_SELECT_LEVEL_PATCH,
    }
}

fn cancel_button(state: FlowState) -> ButtonElement {
    ButtonElement::new(ACTION_CANCEL, "Cancel").style(ButtonStyle::Danger).value(state.as_str())
}

pub fn repo_selection_message(repositories: &[OrgRepo]) -> MessageTemplate {
    let select = repositories.iter().fold(
        StaticSelectElement::new(ACTION_SELECT_REPO, "Select an item"),
        |select, org_repo| {
            select.option(SelectOption::new(
                org_repo.to_string(),
                CallbackToken::RepoSelection(org_repo.clone()).encode(),
            ))
        },
    );

    MessageBuilder::new("Select the repository to release")
        .color(Color::LightGray)
        .section("release.repo.prompt.v1", |section| {
            section.plain("Select the repository to release");
        })
        .actions("release.repo.actions.v1", |actions| {
            actions.static_select(select).button(cancel_button(FlowState::AwaitingRepoSelection));
        })
        .build()
}

pub fn level_selection_message(org_repo: &OrgRepo) -> MessageTemplate {
    MessageBuilder::new(format!("Select the update level for {org_repo}"))
        .color(Color::LightGray)
        .section("release.level.prompt.v1", |section| {
            section.plain("Select the update level");
        })
        .actions("release.level.actions.v1", |actions| {
            for level in ReleaseLevel::ALL {
                let token = CallbackToken::ReleaseSelection(org_repo.with_level(level));
                actions.button(
                    ButtonElement::new(level_action_id(level), level.as_str()).value(token.encode()),
                );
            }
            actions.button(cancel_button(FlowState::AwaitingLevelSelection));
        })
        .build()
}

pub fn confirmation_message(selection: &OrgRepoLevel) -> MessageTemplate {
    let summary = format!(
        "OK? > Target: *{}*, Update Level: *{}*",
        selection.org_repo(),
        selection.level()
    );
    let token = CallbackToken::ReleaseSelection(selection.clone()).encode();

    MessageBuilder::new(summary.clone())
        .color(Color::LightGray)
        .section("release.confirm.summary.v1", |section| {
            section.mrkdwn(summary);
        })
        .actions("release.confirm.actions.v1", |actions| {
            actions
                .button(
                    ButtonElement::new(ACTION_CONFIRM, "OK").style(ButtonStyle::Primary).value(token),
                )
                .button(cancel_button(FlowState::AwaitingConfirmation));
        })
        .build()
}

pub fn processing_message() -> MessageTemplate {
    MessageBuilder::new(PROCESSING_TEXT)
        .color(Color::LightGray)
        .section("release.processing.v1", |section| {
            section.plain(PROCESSING_TEXT);
        })
        .build()
}

pub fn pull_request_message(selection: &OrgRepoLevel, number: u64) -> MessageTemplate {
    let url = selection.org_repo().pull_request_url(number);

    MessageBuilder::new(format!("Release pull request created: {url}"))
        .color(Color::DeepSkyBlue)
        .section("release.result.fields.v1", |section| {
            section
                .field(format!("Target: *{}*", selection.org_repo()))
                .field(format!("Update Level: *{}*", selection.level()));
        })
        .divider("release.result.divider.v1")
        .section("release.result.link.v1", |section| {
            section.mrkdwn(format!(":github: <{url}>"));
        })
        .actions("release.result.actions.v1", |actions| {
            actions.button(ButtonElement::new(ACTION_NOTHING_TO_DO, ":white_check_mark: Created"));
        })
        .build()
}

pub fn cancelled_message() -> MessageTemplate {
    MessageBuilder::new(CANCELLED_TEXT)
        .color(Color::Khaki)
        .section("common.cancelled.v1", |section| {
            section.plain(CANCELLED_TEXT);
        })
        .build()
}

pub fn internal_error_message(message_ts: &str) -> MessageTemplate {
    MessageBuilder::new("InternalServerError")
        .color(Color::Crimson)
        .section("common.internal_error.v1", |section| {
            section.mrkdwn(format!(
                "*InternalServerError*\nPlease confirm to application log (messageTs: `{message_ts}`)"
            ));
        })
        .build()
}

pub fn invalid_arguments_message(reason: &str, message_ts: &str) -> MessageTemplate {
    MessageBuilder::new(format!("invalid input: {reason}"))
        .color(Color::Crimson)
        .section("common.invalid_arguments.v1", |section| {
            section.mrkdwn(format!("*InvalidArguments*\n{reason} (messageTs: `{message_ts}`)"));
        })
        .build()
}

pub fn help_message(commands: &BTreeMap<String, Option<String>>) -> MessageTemplate {
    let lines = commands
        .iter()
        .map(|(name, url)| match url {
            Some(url) => format!("• <{url}|{name}>"),
            None => format!("• {name}"),
        })
        .collect::<Vec<_>>()
        .join("\n");

    MessageBuilder::new("Available commands")
        .section("common.help.v1", |section| {
            section.mrkdwn(format!("The following commands are available.\n```{lines}```"));
        })
        .build()
}

pub fn version_message(info: &VersionInfo) -> MessageTemplate {
    MessageBuilder::new(format!("Version {}", info.version))
        .section("common.version.v1", |section| {
            section.mrkdwn(info.to_string());
        })
        .build()
}

pub fn tracks_message(tracks: &[Track]) -> MessageTemplate {
    let body = if tracks.is_empty() {
        "no tracks".to_owned()
    } else {
        let rows = tracks.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n");
        format!("{:>4}  {:<24}  enabled\n{rows}", "id", "name")
    };

    let builder = MessageBuilder::new(format!("{} tracks", tracks.len()))
        .section("broadcast.tracks.v1", |section| {
            section.mrkdwn(format!("```{body}```"));
        });
    // One block per track: action ids must be unique within a block.
    tracks
        .iter()
        .fold(builder, |builder, track| {
            builder.actions(format!("broadcast.tracks.scene.{}.v1", track.id), |actions| {
                actions.button(
                    ButtonElement::new(ACTION_SCENE_NEXT, format!("Next scene: {}", track.name))
                        .value(SceneTrack::from(track).encode()),
                );
            })
        })
        .build()
}

/// Replaces a clicked scene button once the switch went through.
pub fn scene_switched_message(track: &SceneTrack) -> MessageTemplate {
    MessageBuilder::new(format!("Track {} switched to the next scene", track.name))
        .section("broadcast.scene.track.v1", |section| {
            section.plain(format!("Track {}", track.name));
        })
        .actions("broadcast.scene.actions.v1", |actions| {
            actions.button(ButtonElement::new(ACTION_NOTHING_TO_DO, ":white_check_mark: Switched"));
        })
        .build()
}

pub fn scene_switch_notice(user_id: &str) -> MessageTemplate {
    let text = format!("Switching was pushed by <@{user_id}>");
    MessageBuilder::new(text.clone())
        .section("broadcast.scene.notice.v1", |section| {
            section.mrkdwn(text);
        })
        .build()
}

pub fn automation_message(track: &Track) -> MessageTemplate {
    let summary = automation_summary(track);
    MessageBuilder::new(summary.clone())
        .section("broadcast.automation.v1", |section| {
            section.mrkdwn(summary);
        })
        .build()
}
