use anyhow::Result;
use clap::Parser;

use treecast::cli::{Cli, Commands};
use treecast::server::{Server, Settings};
use treecast::{logging, output};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log.log_level, cli.log.log_format);

    match cli.command {
        Commands::Serve(args) => {
            let settings = Settings::resolve(&args)?;
            Server::bind(settings).await?.run().await?;
        }
        Commands::Listen { addr, json } => {
            output::listen(addr, json).await?;
        }
    }

    Ok(())
}
