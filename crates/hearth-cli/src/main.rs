use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use hearth_core::{
    build_controller, load_config, validate_credentials, HearthConfig, PersistenceMode,
};
use hearth_memory::FileKvStore;
use hearth_server::AppState;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod client;
mod render;
mod repl;
mod view;

use client::{ChatClient, HttpChatClient, LocalStore, SessionSource};
use repl::Repl;

const DEFAULT_LOG_FILTER: &str = "hearth=info,tower_http=info";

#[derive(Parser)]
#[command(name = "hearth", version, about = "Supportive chat with technique-annotated replies")]
struct Cli {
    #[arg(long, short = 'c', help = "Config file (defaults to ./hearth.yaml when present)")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP API server")]
    Serve {
        #[arg(long, help = "Listen address, overrides server.bind")]
        bind: Option<String>,
    },
    #[command(about = "Chat in the terminal against a running server")]
    Chat {
        #[arg(long, help = "Server URL, overrides client.server_url")]
        server: Option<String>,
        #[arg(long, help = "Continue a saved session")]
        session: Option<String>,
    },
    #[command(subcommand, about = "Browse saved sessions")]
    Sessions(SessionCommands),
    #[command(about = "Validate the configuration")]
    Validate,
}

#[derive(Subcommand)]
enum SessionCommands {
    #[command(about = "List saved sessions, newest first")]
    List,
    #[command(about = "Print a session transcript")]
    Show {
        #[arg(help = "Session ID")]
        id: String,
    },
    #[command(about = "Print one session, or all sessions, as JSON")]
    Export {
        #[arg(help = "Session ID")]
        id: Option<String>,
    },
    #[command(about = "Delete a saved session")]
    Delete {
        #[arg(help = "Session ID")]
        id: String,
    },
}

fn init_logging(log_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "hearth.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config(cli.config.as_deref())?;
    let _guard = init_logging(&config.logging.dir)?;

    match command {
        Commands::Validate => {
            validate_credentials(&config)?;
            println!(
                "Config valid. provider: {:?}, model: {}, persistence: {}.",
                config.provider.provider.provider_type,
                config.provider.model,
                config.persistence.mode.as_str()
            );
        }
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let controller = build_controller(&config)?;
            hearth_server::serve(AppState::new(controller), &bind).await?;
        }
        Commands::Chat { server, session } => {
            let server_url = server.unwrap_or_else(|| config.client.server_url.clone());
            let (client, sessions, local) = client_stack(&config, &server_url);
            let mut repl = Repl::new(client, sessions, local);
            if let Some(id) = session {
                repl.open(&id).await?;
            }
            repl.run().await?;
        }
        Commands::Sessions(command) => {
            let (_, sessions, _) = client_stack(&config, &config.client.server_url);
            run_sessions_command(command, &sessions).await?;
        }
    }

    Ok(())
}

/// HTTP client plus the place sessions are browsed from, which depends on
/// where transcripts are persisted.
fn client_stack(
    config: &HearthConfig,
    server_url: &str,
) -> (Arc<dyn ChatClient>, SessionSource, Option<Arc<LocalStore>>) {
    let client: Arc<dyn ChatClient> = Arc::new(HttpChatClient::new(server_url));
    match config.persistence.mode {
        PersistenceMode::Server => (client.clone(), SessionSource::Remote(client), None),
        PersistenceMode::Client => {
            let store = Arc::new(
                LocalStore::new(FileKvStore::new(&config.client.store_path))
                    .with_max_sessions(config.client.max_sessions),
            );
            (client, SessionSource::Local(store.clone()), Some(store))
        }
    }
}

async fn run_sessions_command(command: SessionCommands, sessions: &SessionSource) -> Result<()> {
    match command {
        SessionCommands::List => {
            let summaries = sessions.list().await?;
            println!("{}", render::render_sessions(&summaries, None));
        }
        SessionCommands::Show { id } => {
            let session = sessions
                .get(&id)
                .await?
                .ok_or_else(|| anyhow!("session not found: {id}"))?;
            for turn in &session.messages {
                println!("{}", render::render_turn(turn));
            }
        }
        SessionCommands::Export { id } => {
            let json = sessions
                .export(id.as_deref())
                .await?
                .ok_or_else(|| anyhow!("session not found: {}", id.unwrap_or_default()))?;
            println!("{json}");
        }
        SessionCommands::Delete { id } => {
            if !sessions.delete(&id).await? {
                return Err(anyhow!("session not found: {id}"));
            }
            println!("Deleted {id}.");
        }
    }
    Ok(())
}
