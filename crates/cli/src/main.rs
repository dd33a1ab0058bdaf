//! Lily CLI: the main entry point.
//!
//! Commands:
//! - `chat`       Interactive or single-message chat
//! - `sessions`   List, show and delete saved chats
//! - `memory`     Inspect and prune the memory index
//! - `usage`      Usage totals and histograms
//! - `models`     List the models offered by the cloud endpoint

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "lily",
    about = "Lily — chat with local memory and tool calling",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with a model
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Model ID (defaults to `default_model` from the config)
        #[arg(long)]
        model: Option<String>,

        /// Continue a saved chat
        #[arg(long)]
        session: Option<String>,

        /// Attach a document directory to the chat (kept with saved chats)
        #[arg(long)]
        rag_dir: Option<String>,
    },

    /// Manage saved chats
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },

    /// Manage the memory index
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Show usage statistics
    Usage {
        /// Histogram window: hourly, daily, weekly, monthly, yearly or all
        #[arg(short, long, default_value = "daily")]
        range: lily_telemetry::TimeRange,
    },

    /// List models available from the cloud endpoint
    Models,
}

#[derive(Subcommand)]
enum SessionsAction {
    /// List saved chats, most recent first
    List,
    /// Print one chat
    Show { id: String },
    /// Delete one chat
    Delete { id: String },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Show index statistics
    Stats,
    /// List stored memories
    List {
        /// Only show memories from this chat
        #[arg(long)]
        chat: Option<String>,
    },
    /// Delete one memory
    Delete { id: String },
    /// Delete every memory
    Clear,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            model,
            session,
            rag_dir,
        } => commands::chat::run(message, model, session, rag_dir).await?,
        Commands::Sessions { action } => match action {
            SessionsAction::List => commands::sessions::list().await?,
            SessionsAction::Show { id } => commands::sessions::show(&id).await?,
            SessionsAction::Delete { id } => commands::sessions::delete(&id).await?,
        },
        Commands::Memory { action } => match action {
            MemoryAction::Stats => commands::memory::stats().await?,
            MemoryAction::List { chat } => commands::memory::list(chat.as_deref()).await?,
            MemoryAction::Delete { id } => commands::memory::delete(&id).await?,
            MemoryAction::Clear => commands::memory::clear().await?,
        },
        Commands::Usage { range } => commands::usage::run(range).await?,
        Commands::Models => commands::models::run().await?,
    }

    Ok(())
}
