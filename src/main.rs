//! # Persona Chat CLI (`persona`)
//!
//! The `persona` binary wires the knowledge base, the session store, and
//! the chat provider into a character roleplay chatbot.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `persona init` | Create the knowledge and session database schemas |
//! | `persona load` | Index the configured source document |
//! | `persona search "<query>"` | Query the knowledge base directly |
//! | `persona history` | Print the persisted session transcript |
//! | `persona chat` | Start the interactive roleplay shell |
//!
//! ## Examples
//!
//! ```bash
//! # Index a novel and talk to one of its characters
//! persona load --config ./config/persona.toml
//! persona chat --config ./config/persona.toml
//!
//! # Inspect what the retriever would feed the model
//! persona search "What does John think of soma?" --mode hybrid
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use persona_chat::agent::{AgentConfig, CharacterAgent};
use persona_chat::config::{self, Config};
use persona_chat::db;
use persona_chat::embedding::create_embedder;
use persona_chat::generate::OpenAIGenerator;
use persona_chat::knowledge;
use persona_chat::migrate;
use persona_chat::retrieve::{Retriever, SearchMode};
use persona_chat::session::SessionStore;
use persona_chat::shell;

/// Persona Chat — a retrieval-grounded character roleplay chatbot.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file; built-in defaults are used when the file is absent.
#[derive(Parser)]
#[command(
    name = "persona",
    about = "Persona Chat — talk to a character from an indexed novel",
    version,
    long_about = "Persona Chat indexes a source document (PDF or plain text) into a \
SQLite knowledge base with keyword and vector retrieval, persists conversation \
history, and runs an interactive shell where an LLM answers in character, \
grounded in retrieved passages."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/persona.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the knowledge and session database schemas.
    ///
    /// Idempotent — running it multiple times is safe. `load` and `chat`
    /// also create the schemas on demand.
    Init,

    /// Index the configured source document into the knowledge base.
    ///
    /// Skipped when the collection already holds chunks; pass `--force`
    /// to clear the collection and re-index (the way to pick up document
    /// changes).
    Load {
        /// Clear the collection and re-index from scratch.
        #[arg(long)]
        force: bool,
    },

    /// Search the knowledge base and print ranked passages.
    Search {
        /// The search query string.
        query: String,

        /// Search mode: `keyword` (FTS5), `vector` (cosine), or `hybrid`.
        #[arg(long)]
        mode: Option<String>,

        /// Maximum number of passages to return.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print the persisted conversation history for the configured session.
    History {
        /// Show only the most recent N turns.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the interactive roleplay shell.
    ///
    /// Loads the knowledge base first if needed, then prompts for a
    /// character name and enters the `You:` / `Agent:` loop. End of input
    /// (Ctrl-D) exits cleanly.
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let knowledge_pool = db::connect(&cfg.db.path).await?;
            migrate::ensure_knowledge_schema(&knowledge_pool).await?;
            let session_pool = db::connect(&cfg.session.path).await?;
            migrate::ensure_session_schema(&session_pool).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Load { force } => {
            cmd_load(&cfg, force).await?;
        }
        Commands::Search { query, mode, limit } => {
            cmd_search(&cfg, &query, mode, limit).await?;
        }
        Commands::History { limit } => {
            cmd_history(&cfg, limit).await?;
        }
        Commands::Chat => {
            cmd_chat(&cfg).await?;
        }
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("persona=info"));

    fmt().with_env_filter(filter).with_target(false).init();
}

async fn cmd_load(cfg: &Config, force: bool) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::ensure_knowledge_schema(&pool).await?;

    let embedder = create_embedder(&cfg.embedding)?;
    let report = knowledge::load(&pool, embedder.as_ref(), cfg, force).await?;

    println!("load {}", cfg.knowledge.collection);
    if report.skipped {
        println!("  already loaded, skipped (use --force to re-index)");
    } else {
        println!("  document: {}", cfg.knowledge.document.display());
        println!("  chunks written: {}", report.chunks_written);
        if cfg.embedding.is_enabled() {
            println!("  embeddings written: {}", report.embeddings_written);
        }
    }
    println!("ok");

    pool.close().await;
    Ok(())
}

async fn cmd_search(
    cfg: &Config,
    query: &str,
    mode: Option<String>,
    limit: Option<usize>,
) -> Result<()> {
    let mode_str = mode.unwrap_or_else(|| cfg.retrieval.mode.clone());
    let mode = SearchMode::parse(&mode_str)
        .ok_or_else(|| anyhow::anyhow!("Unknown search mode: {}. Use keyword, vector, or hybrid.", mode_str))?;

    if mode != SearchMode::Keyword && !cfg.embedding.is_enabled() {
        anyhow::bail!(
            "Mode '{}' requires embeddings. Set [embedding] provider in config.",
            mode.as_str()
        );
    }

    let pool = db::connect(&cfg.db.path).await?;
    migrate::ensure_knowledge_schema(&pool).await?;

    let embedder = create_embedder(&cfg.embedding)?;
    let retriever = Retriever::new(
        pool.clone(),
        embedder,
        cfg.knowledge.collection.clone(),
        cfg.retrieval.clone(),
    );

    let top_k = limit.unwrap_or(cfg.retrieval.top_k);
    let passages = retriever.search(query, top_k, mode).await?;

    if passages.is_empty() {
        println!("No results.");
    } else {
        for (i, p) in passages.iter().enumerate() {
            println!("{}. [{:.2}] {} #{}", i + 1, p.score, p.source, p.chunk_index);
            let excerpt: String = p.text.chars().take(240).collect();
            println!("    excerpt: \"{}\"", excerpt.replace('\n', " "));
            println!();
        }
    }

    pool.close().await;
    Ok(())
}

async fn cmd_history(cfg: &Config, limit: Option<usize>) -> Result<()> {
    let store = SessionStore::open(&cfg.session.path, cfg.session.store.clone()).await?;
    let mut turns = store.load(&cfg.session.id).await?;

    if let Some(limit) = limit {
        if turns.len() > limit {
            turns = turns.split_off(turns.len() - limit);
        }
    }

    if turns.is_empty() {
        println!("No history for session '{}'.", cfg.session.id);
        return Ok(());
    }

    for turn in &turns {
        println!(
            "[{}] {}: {}",
            turn.created_at.format("%Y-%m-%d %H:%M:%S"),
            turn.role.as_str(),
            turn.content
        );
    }

    Ok(())
}

async fn cmd_chat(cfg: &Config) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::ensure_knowledge_schema(&pool).await?;

    // Index the document before the loop starts; a bad path or failed
    // extraction is fatal here, not mid-conversation.
    let embedder = create_embedder(&cfg.embedding)?;
    knowledge::load(&pool, embedder.as_ref(), cfg, false).await?;

    let retriever = Retriever::new(
        pool.clone(),
        embedder,
        cfg.knowledge.collection.clone(),
        cfg.retrieval.clone(),
    );
    let generator = Arc::new(OpenAIGenerator::new(&cfg.model)?);
    let sessions = SessionStore::open(&cfg.session.path, cfg.session.store.clone()).await?;

    let agent = CharacterAgent::new(
        retriever,
        generator,
        sessions,
        AgentConfig::from_config(cfg),
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    shell::run(&agent, stdin.lock(), stdout.lock()).await
}
