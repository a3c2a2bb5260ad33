use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use murmur::tools::{ToolRegistry, UnconfiguredBackend, WeatherTool, WebSearchTool};
use murmur::{ChatDb, Config, Engine, LlmClient, MessageStore, OsaScriptSink, ReactionFetcher};

/// Murmur - iMessage auto-reply bridge for conversational AI providers
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    /// Config file path (defaults to the platform config dir)
    #[arg(short, long, env = "MURMUR_CONFIG")]
    config: Option<PathBuf>,

    /// Message store path (defaults to ~/Library/Messages/chat.db)
    #[arg(long, env = "MURMUR_STORE")]
    store: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Validate configuration and store access, then exit
    Check,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,murmur=info",
        1 => "info,murmur=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(store) = cli.store {
        config.store_path = Some(store);
    }

    if let Some(Command::Check) = cli.command {
        return check(&config);
    }

    let engine = build_engine(config)?;
    engine.start()?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    engine.stop();
    Ok(())
}

/// Wire the engine from its production collaborators
fn build_engine(config: Config) -> anyhow::Result<Arc<Engine>> {
    let store_path = config
        .store_path
        .clone()
        .unwrap_or_else(ChatDb::default_path);
    let store = Arc::new(ChatDb::new(store_path));

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WeatherTool::new(Arc::new(UnconfiguredBackend(
        "weather",
    )))));
    registry.register(Box::new(WebSearchTool::new(Arc::new(UnconfiguredBackend(
        "web search",
    )))));

    let llm = LlmClient::new(config.provider.clone(), Arc::new(registry))?;
    let reactions = config
        .reaction
        .as_ref()
        .map(|r| ReactionFetcher::new(r.endpoint.clone(), r.api_key.clone()));

    Ok(Arc::new(Engine::new(
        config,
        store,
        Arc::new(OsaScriptSink::new()),
        Arc::new(llm),
        reactions,
    )))
}

/// Validate config and store access without starting the engine
fn check(config: &Config) -> anyhow::Result<()> {
    config.validate()?;

    let store_path = config
        .store_path
        .clone()
        .unwrap_or_else(ChatDb::default_path);
    let store = ChatDb::new(store_path.clone());
    store.open()?;
    let max_id = store.max_id();
    store.close();

    tracing::info!(
        provider = %config.provider.kind,
        model = %config.provider.model,
        store = %store_path.display(),
        max_id,
        "configuration ok"
    );
    Ok(())
}
