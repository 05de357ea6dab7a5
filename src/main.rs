// ABOUTME: CLI entry point for rowmirror
// ABOUTME: Runs a sync from the shell, fires the trigger, or serves it over HTTP

use clap::{Parser, Subcommand};
use rowmirror::trigger::Trigger;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rowmirror")]
#[command(about = "Copy changed rows between two MySQL databases with the same schema", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to the JSON configuration file (connections, secret, watermark)
    #[arg(long, env = "ROWMIRROR_CONFIG", global = true, default_value = "config.json")]
    config: PathBuf,
    /// Working tree refreshed with `git pull` before triggered runs
    #[arg(long = "repo-dir", global = true, default_value = ".")]
    repo_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync now, without the shared-secret check or git pull
    Sync,
    /// Run the triggered sequence: check secret, pull, sync, save watermark
    Trigger {
        /// Shared secret, compared with the configuration's `auth`
        #[arg(long, env = "ROWMIRROR_AUTH")]
        auth: Option<String>,
    },
    /// Serve the trigger over HTTP (GET /?auth=<secret>)
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let trigger = Trigger::new(cli.config, cli.repo_dir);

    match cli.command {
        Commands::Sync => {
            let report = trigger.run_local().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Trigger { auth } => {
            let report = trigger.run(auth.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Serve { listen } => rowmirror::server::serve(listen, trigger).await,
    }
}
