#![deny(
    clippy::all,
    clippy::nursery,
    clippy::pedantic,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::correctness,
    clippy::suspicious,
    clippy::unwrap_used,
    clippy::expect_used
)]
#![allow(
    clippy::similar_names,
    clippy::missing_safety_doc,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

use std::io::Write;
use std::time::Duration;

use clap::{Parser, Subcommand};
use hypernews_config::Config;
use hypernews_core::Role;
use hypernews_remote::{GraphqlTransport, RemoteSyncAdapter};
use hypernews_store::{ConversationStore, FileStore};
use hypernews_sync::SyncCoordinator;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

const GREETING: &str = "I'm your news assistant. Ask me about any news topics \
you're interested in, and I'll search for relevant articles.";

#[derive(Parser)]
#[command(name = "hypernews")]
#[command(about = "HyperNews conversation client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the news agent
    Chat {
        /// Single message to send
        #[arg(short = 'm', long)]
        message: Option<String>,

        /// Conversation to resume (defaults to the active one)
        #[arg(short = 'c', long)]
        conversation: Option<String>,
    },
    /// List local conversations
    List,
    /// Delete a conversation remotely and locally
    Delete {
        /// Conversation id
        id: String,
    },
    /// Initialize configuration
    Init,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            conversation,
        } => {
            let config = Config::load()?;
            let coordinator = build_coordinator(&config)?;

            let id = match conversation {
                Some(id) => {
                    coordinator.select_conversation(Some(&id))?;
                    resync(&coordinator, &id).await;
                    id
                }
                None => match coordinator.conversations().active_id {
                    Some(id) => {
                        resync(&coordinator, &id).await;
                        id
                    }
                    None => coordinator.new_conversation().await?,
                },
            };

            if let Some(msg) = message {
                coordinator.submit(&msg).await?;
                print_last_reply(&coordinator);
            } else {
                run_interactive(&coordinator, &id).await?;
            }
        }
        Commands::List => {
            let config = Config::load()?;
            let coordinator = build_coordinator(&config)?;

            coordinator.with_store(|store| {
                let index = store.list_conversations();
                if index.ids.is_empty() {
                    println!("No conversations yet. Run 'hypernews chat' to start one.");
                }
                for id in &index.ids {
                    let marker = if index.active_id.as_deref() == Some(id.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    let count = store.conversation(id).map_or(0, |c| c.items.len());
                    println!("{marker} {id}  ({count} items)");
                }
            });
        }
        Commands::Delete { id } => {
            let config = Config::load()?;
            let coordinator = build_coordinator(&config)?;

            coordinator.delete_conversation(&id).await?;
            println!("Deleted conversation {id}");
        }
        Commands::Init => {
            Config::create_config()?;
        }
        Commands::Version => {
            println!("hypernews {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

fn build_coordinator(config: &Config) -> anyhow::Result<SyncCoordinator<RemoteSyncAdapter>> {
    let mut transport = GraphqlTransport::new(config.endpoint.graphql_url.clone())
        .with_max_attempts(config.retry.max_attempts)
        .with_base_delay(Duration::from_millis(config.retry.base_delay_ms));
    if let Some(token) = &config.endpoint.api_token {
        transport = transport.with_api_token(token.clone());
    }

    let substrate = FileStore::open(config.data_dir()?)?;
    let mut store = ConversationStore::new(Box::new(substrate), &config.storage.namespace);
    if let Err(e) = store.initialize() {
        warn!("continuing without local persistence: {e}");
    }

    Ok(SyncCoordinator::new(RemoteSyncAdapter::new(transport), store))
}

/// Pulls the remote history for a resumed conversation; a failure here
/// is not fatal, the local log still renders.
async fn resync(coordinator: &SyncCoordinator<RemoteSyncAdapter>, id: &str) {
    match coordinator.sync_from_remote(id).await {
        Ok(count) => info!("history in sync for {id}: {count} items"),
        Err(e) => warn!("history sync failed for {id}: {e}"),
    }
}

async fn run_interactive(
    coordinator: &SyncCoordinator<RemoteSyncAdapter>,
    id: &str,
) -> anyhow::Result<()> {
    println!("=== HyperNews conversation: {id} ===");
    println!("Type 'exit', 'quit', or Ctrl+C to end the session.\n");

    let items = coordinator.active_items();
    if items.is_empty() {
        println!("{GREETING}\n");
    } else {
        for item in &items {
            let speaker = match item.role {
                Role::User => "you",
                Role::Assistant => "agent",
            };
            println!("[{speaker}] {}", item.text);
        }
        println!();
    }

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();

        if matches!(input, "exit" | "quit" | "q") {
            break;
        }

        if input.is_empty() {
            continue;
        }

        match coordinator.submit(input).await {
            Ok(_) => print_last_reply(coordinator),
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    Ok(())
}

fn print_last_reply(coordinator: &SyncCoordinator<RemoteSyncAdapter>) {
    let items = coordinator.active_items();
    if let Some(item) = items.last() {
        println!("\n{}\n", item.text);
    }

    if let Some(results) = coordinator.latest_results() {
        if results.is_empty() {
            println!("(no matching articles)\n");
        } else {
            println!("Articles:");
            for article in &results {
                println!("  - {} ({})", article.title, article.url);
            }
            println!();
        }
    }
}
