use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::events::{EventContext, EventHandlerError, HandlerResult, MentionEvent};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("command prefix must contain at least one word")]
    EmptyCommand,
    #[error("command `{0}` is already registered")]
    DuplicateCommand(String),
    #[error("action `{0}` is already registered")]
    DuplicateAction(String),
}

/// Registered command prefixes and their help links, sorted by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandRegistry {
    commands: BTreeMap<String, Option<String>>,
}

impl CommandRegistry {
    pub fn list_commands(&self) -> BTreeMap<String, Option<String>> {
        self.commands.clone()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

pub struct CommandInvocation<'a> {
    /// Matched prefix, words joined by a space.
    pub command: &'a str,
    pub args: Vec<String>,
    pub user_id: &'a str,
    pub registry: &'a CommandRegistry,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(
        &self,
        invocation: &CommandInvocation<'_>,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

struct RegisteredCommand {
    name: String,
    words: Vec<String>,
    handler: Arc<dyn CommandHandler>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub command: &'a str,
    pub args: Vec<String>,
}

#[derive(Default)]
pub struct CommandRouter {
    commands: Vec<RegisteredCommand>,
    registry: CommandRegistry,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        prefix: &[&str],
        handler: Arc<dyn CommandHandler>,
        help_url: Option<&str>,
    ) -> Result<(), RegistrationError> {
        let words: Vec<String> =
            prefix.iter().flat_map(|part| part.split_whitespace()).map(str::to_owned).collect();
        if words.is_empty() {
            return Err(RegistrationError::EmptyCommand);
        }

        let name = words.join(" ");
        if self.registry.commands.contains_key(&name) {
            return Err(RegistrationError::DuplicateCommand(name));
        }

        self.registry.commands.insert(name.clone(), help_url.map(str::to_owned));
        self.commands.push(RegisteredCommand { name, words, handler });
        Ok(())
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Longest whole-word prefix wins; among equal lengths the earliest registration wins.
    pub fn route(&self, text: &str) -> Option<RouteMatch<'_>> {
        let words = command_words(text);
        let mut best: Option<&RegisteredCommand> = None;
        for candidate in &self.commands {
            let matches = candidate.words.len() <= words.len()
                && candidate.words.iter().zip(&words).all(|(expected, word)| expected == word);
            if matches && best.map_or(true, |current| candidate.words.len() > current.words.len())
            {
                best = Some(candidate);
            }
        }

        best.map(|command| RouteMatch {
            command: &command.name,
            args: words[command.words.len()..].iter().map(|word| (*word).to_owned()).collect(),
        })
    }

    pub async fn dispatch(
        &self,
        event: &MentionEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(route) = self.route(&event.text) else {
            debug!(
                event_name = "slack.command.unmatched",
                correlation_id = %ctx.correlation_id(),
                "mention did not match a registered command"
            );
            return Ok(HandlerResult::Ignored);
        };
        let Some(command) = self.commands.iter().find(|command| command.name == route.command)
        else {
            return Ok(HandlerResult::Ignored);
        };

        debug!(
            event_name = "slack.command.routed",
            correlation_id = %ctx.correlation_id(),
            command = %command.name,
            args = route.args.len(),
            "routing mention command"
        );
        let invocation = CommandInvocation {
            command: &command.name,
            args: route.args,
            user_id: &event.user_id,
            registry: &self.registry,
        };
        command.handler.handle(&invocation, ctx).await
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }
}

/// Words of a mention after the leading word, which is always the bot mention
/// however the client rendered it (`<@U…>`, `@bot`).
fn command_words(text: &str) -> Vec<&str> {
    text.split_whitespace().skip(1).collect()
}
