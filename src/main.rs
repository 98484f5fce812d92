//! AniStream - resolve anime episodes to playable streams
//!
//! # Usage
//!
//! ```bash
//! anistream search "frieren"
//! anistream resolve frieren-18542 3 --json
//! RUST_LOG=anistream=debug anistream resolve frieren-18542 3
//! ```

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use anistream::cli::{self, Cli, Command, ExitCode, Output};
use anistream::commands;
use anistream::config::Config;

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing();

    run_cli(cli).await.into()
}

/// Log to stderr so JSON on stdout stays parseable
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("anistream=info")))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

/// Run CLI command and return exit code
async fn run_cli(cli: Cli) -> ExitCode {
    let output = Output::new(&cli);
    let config = match &cli.config {
        Some(path) => Config::load_from(path).with_env_overrides(|key| std::env::var(key).ok()),
        None => Config::load(),
    };
    let pipeline = config.pipeline();

    match cli.command {
        Command::Resolve(cmd) => {
            if let Err(e) = cli::validate_title_id(&cmd.title_id) {
                return output.error(e, ExitCode::InvalidArgs);
            }
            commands::resolve_cmd(cmd, &pipeline, &output).await
        }

        Command::Episodes(cmd) => {
            if let Err(e) = cli::validate_title_id(&cmd.title_id) {
                return output.error(e, ExitCode::InvalidArgs);
            }
            commands::episodes_cmd(cmd, &pipeline, &output).await
        }

        Command::Index(cmd) => {
            if let Err(e) = cli::validate_title_id(&cmd.title_id) {
                return output.error(e, ExitCode::InvalidArgs);
            }
            commands::index_cmd(cmd, &pipeline, &output).await
        }

        Command::Sources(cmd) => commands::sources_cmd(cmd, &pipeline, &output).await,

        Command::Info(cmd) => {
            if let Err(e) = cli::validate_title_id(&cmd.title_id) {
                return output.error(e, ExitCode::InvalidArgs);
            }
            let images = config.image_client(cmd.optimize_poster);
            commands::info_cmd(cmd, &pipeline, images.as_ref(), &output).await
        }

        Command::Search(cmd) => commands::search_cmd(cmd, &pipeline, &output).await,

        Command::Home(cmd) => commands::home_cmd(cmd, &pipeline, &output).await,
    }
}
