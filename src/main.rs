use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use coffer::server::{self, AppState};
use coffer::state::postgres::Postgres;

#[derive(Parser)]
#[command(name = "coffer")]
#[command(about = "Networked secret vault with delegated decryption")]
#[command(version)]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "COFFER_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the vault API server
    Serve {
        /// Address to listen on
        #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8443")]
        listen: String,

        /// PostgreSQL connection string
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
}

fn init_tracing(log_level: &str) {
    let level: tracing::Level = log_level.parse().unwrap_or(tracing::Level::INFO);
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Serve {
            listen,
            database_url,
        } => {
            let store = match Postgres::connect(&database_url).await {
                Ok(store) => store,
                Err(err) => {
                    tracing::error!("failed to connect to database: {err}");
                    std::process::exit(1);
                }
            };

            if let Err(err) = store.migrate().await {
                tracing::error!("failed to run migrations: {err}");
                std::process::exit(1);
            }

            let state = AppState {
                store: std::sync::Arc::new(store),
            };

            if let Err(err) = server::serve(state, &listen).await {
                tracing::error!("server exited with error: {err}");
                std::process::exit(1);
            }
        }
    }
}
