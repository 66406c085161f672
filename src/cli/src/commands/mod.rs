//! CLI command definitions and dispatch.

mod purge;

use clap::Parser;

pub use purge::PurgeArgs;

/// Remove local container images that no git branch still lists.
#[derive(Parser)]
#[command(name = "image-purge", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub purge: PurgeArgs,
}

/// Dispatch a parsed CLI to the purge command.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    purge::execute(cli.purge).await
}
