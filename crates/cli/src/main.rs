use std::process::ExitCode;

fn main() -> ExitCode {
    deckhand_cli::run()
}
