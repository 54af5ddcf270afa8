use deckhand_core::version::VersionInfo;

use super::CommandResult;

pub fn run() -> CommandResult {
    CommandResult::ok(VersionInfo::current().to_string())
}
