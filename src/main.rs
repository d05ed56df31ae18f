use clap::{Parser, Subcommand};
use snaplink::admin::{self, AdminCommands};
use snaplink::config::Config;
use snaplink::error::AppResult;
use snaplink::server;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// snaplink - a horizontally scalable short-URL service
#[derive(Parser, Debug)]
#[command(name = "snaplink")]
#[command(version = "1.0.0")]
#[command(about = "A short-URL service with asynchronous analytics", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server
    Server {
        /// Host to bind to (overrides SERVER_HOST env var)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides SERVER_PORT env var)
        #[arg(long)]
        port: Option<u16>,

        /// Run migrations on startup
        #[arg(long, default_value_t = true)]
        migrate: bool,
    },

    /// Start the analytics consumer
    Consumer,

    /// Administrative commands
    Admin {
        #[command(subcommand)]
        admin_command: AdminCommands,
    },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // Initialize tracing; LOG_LEVEL feeds the filter when RUST_LOG is unset
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(std::env::var("LOG_LEVEL").unwrap_or_default()))
                .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    match cli.command {
        Commands::Server {
            host,
            port,
            migrate,
        } => {
            // Override config with CLI args if provided
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);
            let addr = format!("{}:{}", host, port);

            server::run_server(config, addr, migrate).await
        }
        Commands::Consumer => server::run_consumer(config).await,
        Commands::Admin { admin_command } => admin::run(config, admin_command).await,
    }
}
