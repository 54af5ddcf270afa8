use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use deckhand_core::broadcast::BroadcastClient;
use deckhand_core::config::{AppConfig, ConfigError, LoadOptions};
use deckhand_core::release::{GitCommandClient, GitHubApiClient, ReleaseWorkflow};
use deckhand_core::version::VersionInfo;
use deckhand_slack::api::{ChatClient, ChatError, SlackWebClient};
use deckhand_slack::commands::{CommandRouter, RegistrationError};
use deckhand_slack::events::{BlockActionHandler, EventDispatcher, MentionHandler};
use deckhand_slack::handlers::{self, ReleaseDialogue};
use deckhand_slack::interactions::InteractionDispatcher;
use deckhand_slack::socket::{ReconnectPolicy, SocketModeRunner};
use deckhand_slack::websocket::WebSocketTransport;
use thiserror::Error;
use tracing::info;

use crate::broadcast::HttpBroadcastClient;
use crate::git::GitCli;
use crate::github::GitHubRestClient;
use crate::health::HealthState;

const SLACK_TIMEOUT: Duration = Duration::from_secs(15);
const GITHUB_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Application {
    pub config: AppConfig,
    pub slack_runner: SocketModeRunner,
    /// Registered command prefixes and their help links.
    pub commands: BTreeMap<String, Option<String>>,
    pub health: HealthState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack client setup failed: {0}")]
    Slack(#[source] ChatError),
    #[error("{client} client setup failed: {source}")]
    HttpClient {
        client: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("handler registration failed: {0}")]
    Registration(#[from] RegistrationError),
}

/// External collaborators the handlers are wired against.
pub struct Clients {
    pub chat: Arc<dyn ChatClient>,
    pub git: Arc<dyn GitCommandClient>,
    pub github: Arc<dyn GitHubApiClient>,
    pub broadcast: Option<Arc<dyn BroadcastClient>>,
}

pub struct Wiring {
    pub dispatcher: EventDispatcher,
    pub commands: BTreeMap<String, Option<String>>,
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    config.validate()?;

    let web = SlackWebClient::new(
        &config.slack.api_base,
        config.slack.app_token.clone(),
        config.slack.bot_token.clone(),
        SLACK_TIMEOUT,
    )
    .map_err(BootstrapError::Slack)?;
    let github = GitHubRestClient::new(
        &config.github.api_base,
        config.github.access_token.clone(),
        GITHUB_TIMEOUT,
    )
    .map_err(|source| BootstrapError::HttpClient { client: "github", source })?;
    let broadcast = match config.broadcast.endpoint_url.as_deref() {
        Some(endpoint_url) => {
            let client = HttpBroadcastClient::new(
                endpoint_url,
                Duration::from_secs(config.broadcast.timeout_secs),
            )
            .map_err(|source| BootstrapError::HttpClient { client: "broadcast", source })?;
            Some(Arc::new(client) as Arc<dyn BroadcastClient>)
        }
        None => None,
    };
    let git = GitCli::new(GitCli::discover_program(), &config.github, config.release.work_root.clone());

    let clients = Clients {
        chat: Arc::new(web.clone()),
        git: Arc::new(git),
        github: Arc::new(github),
        broadcast,
    };
    let wiring = wire(&config, clients)?;
    info!(
        event_name = "system.bootstrap.handlers_registered",
        correlation_id = "bootstrap",
        commands = wiring.commands.len(),
        handlers = wiring.dispatcher.handler_count(),
        broadcast_enabled = config.broadcast_enabled(),
        "slack handlers registered"
    );

    let slack_runner = SocketModeRunner::new(
        Arc::new(WebSocketTransport::new(web)),
        Arc::new(wiring.dispatcher),
        ReconnectPolicy::default(),
    )
    .with_drain_timeout(Duration::from_secs(config.server.graceful_shutdown_secs));

    let health = HealthState { release_targets: config.release.targets.len() };
    Ok(Application { config, slack_runner, commands: wiring.commands, health })
}

/// Registers every command and interaction against `clients`.
pub fn wire(config: &AppConfig, clients: Clients) -> Result<Wiring, RegistrationError> {
    let mut router = CommandRouter::new();
    let mut interactions = InteractionDispatcher::new();

    handlers::common::register(&mut router, &mut interactions, VersionInfo::current())?;

    let workflow = ReleaseWorkflow::new(clients.git, clients.github, config.release_timeout());
    let dialogue = Arc::new(ReleaseDialogue::new(
        Arc::new(config.release_targets()),
        workflow,
        clients.chat.clone(),
    ));
    handlers::release::register(
        &mut router,
        &mut interactions,
        dialogue,
        config.help.release_url.as_deref(),
    )?;

    if let Some(broadcast) = clients.broadcast {
        handlers::broadcast::register(
            &mut router,
            &mut interactions,
            broadcast,
            clients.chat.clone(),
            config.help.broadcast_url.as_deref(),
        )?;
    }

    let commands = router.registry().list_commands();
    let mut dispatcher = EventDispatcher::new(clients.chat);
    dispatcher.register(MentionHandler::new(Arc::new(router)));
    dispatcher.register(BlockActionHandler::new(Arc::new(interactions)));

    Ok(Wiring { dispatcher, commands })
}
