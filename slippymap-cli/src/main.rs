//! slippymap CLI - tile addressing and cached imagery retrieval.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use commands::cache::CacheAction;
use commands::common::{start_logging, ViewArgs};
use commands::fetch::FetchArgs;
use commands::quadkey::QuadkeyArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "slippymap")]
#[command(version, about = "Slippy-map tile addressing and cached imagery retrieval", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Config file (default: ~/.slippymap/config.ini)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the quadkey of a tile
    Quadkey(QuadkeyArgs),
    /// List the tiles covering a view
    Tiles(ViewArgs),
    /// Download a view through the cache and write its fragments
    Fetch(FetchArgs),
    /// Inspect or maintain the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// List available imagery providers
    Providers,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Quadkey(args) => commands::quadkey::run(args),
        Commands::Providers => commands::providers::run(&cli.global),
        Commands::Tiles(args) => block_on(commands::tiles::run(&cli.global, args)),
        Commands::Fetch(args) => {
            let _guard = start_logging()?;
            block_on(commands::fetch::run(&cli.global, args))
        }
        Commands::Cache { action } => {
            let _guard = start_logging()?;
            block_on(commands::cache::run(&cli.global, action))
        }
    }
}

fn block_on<F>(future: F) -> Result<(), CliError>
where
    F: std::future::Future<Output = Result<(), CliError>>,
{
    tokio::runtime::Runtime::new()
        .map_err(CliError::Runtime)?
        .block_on(future)
}
