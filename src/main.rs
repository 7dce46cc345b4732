//! stagepipe CLI entrypoint

use anyhow::Result;
use clap::Parser;

use stagepipe::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Logging is initialised by the command once configuration is resolved
    let cli = Cli::parse();
    cli.execute().await
}
