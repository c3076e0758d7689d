use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default persona used when the config file does not override it.
///
/// Mirrors the roleplay setup the tool ships for: a character from a novel,
/// answering strictly from the indexed text.
pub const DEFAULT_PERSONA: &str = "You are a character from Aldous Huxley's novel 'Brave New World'. \
Act and converse exactly as your assigned character would, always referencing \
the context and content of the novel. Before responding, intelligently retrieve \
and consult the novel to ensure accuracy in your speech and behavior.";

/// Default behavioral instructions. `{character}` is substituted with the
/// character name chosen at the start of a chat session.
pub const DEFAULT_INSTRUCTIONS: &str = "\
You are now the character {character} from the novel.

Before responding, craft highly specific search queries against the novel, \
such as direct quotes by {character} about the user's topic, scenes where \
{character} interacts with other characters, or events surrounding the \
user's question from {character}'s point of view. Prioritize dialogue and \
direct speech, inner thoughts, interactions with others, and key plot events.

Behavior rules:
- Stay fully immersed as {character}.
- Speak using the same vocabulary, expressions, and tone as in the book.
- Never break character or mention you are fictional.
- Do not provide knowledge beyond {character}'s experience.
- If no clear answer exists, respond naturally, expressing doubt, curiosity, \
or hesitation true to your personality.
- Never reference being an AI, a model, or a system.

Answer in character, using details from the retrieved passages, and when \
helpful subtly include quotes or paraphrased lines from the text.";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Knowledge database (chunks, FTS index, vectors).
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/knowledge.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeConfig {
    /// Source document to index (.pdf, .txt, or .md).
    #[serde(default = "default_document")]
    pub document: PathBuf,
    /// Collection name the document is indexed under.
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            document: default_document(),
            collection: default_collection(),
        }
    }
}

fn default_document() -> PathBuf {
    PathBuf::from("data/novel.pdf")
}
fn default_collection() -> String {
    "text_documents".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Search mode used by the agent: `keyword`, `vector`, or `hybrid`.
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Weight of the vector channel in hybrid fusion, in [0, 1].
    #[serde(default = "default_hybrid_alpha")]
    pub hybrid_alpha: f64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_keyword: i64,
    #[serde(default = "default_candidate_k")]
    pub candidate_k_vector: i64,
    /// Fused results below this score are dropped. 0 disables the cutoff.
    #[serde(default)]
    pub min_score: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            top_k: default_top_k(),
            hybrid_alpha: default_hybrid_alpha(),
            candidate_k_keyword: default_candidate_k(),
            candidate_k_vector: default_candidate_k(),
            min_score: 0.0,
        }
    }
}

fn default_mode() -> String {
    "hybrid".to_string()
}
fn default_top_k() -> usize {
    5
}
fn default_hybrid_alpha() -> f64 {
    0.6
}
fn default_candidate_k() -> i64 {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `openai` or `disabled`. Disabled degrades retrieval to keyword-only.
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embed_timeout_secs")]
    pub timeout_secs: u64,
    /// Override for OpenAI-compatible endpoints.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embed_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embed_timeout_secs() -> u64 {
    30
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Chat model identifier sent to the provider.
    #[serde(default = "default_model_id")]
    pub id: String,
    /// Upper bound on knowledge-search tool calls within one turn.
    #[serde(default = "default_max_tool_calls")]
    pub max_tool_calls: usize,
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id: default_model_id(),
            max_tool_calls: default_max_tool_calls(),
            max_retries: default_chat_retries(),
            timeout_secs: default_chat_timeout_secs(),
            base_url: default_base_url(),
        }
    }
}

fn default_model_id() -> String {
    "gpt-4o".to_string()
}
fn default_max_tool_calls() -> usize {
    4
}
fn default_chat_retries() -> u32 {
    3
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Session database (conversation turns).
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
    /// Store name the session rows are keyed under.
    #[serde(default = "default_store")]
    pub store: String,
    /// All runs of the process share this session's history.
    #[serde(default = "default_session_id")]
    pub id: String,
    /// Replay prior turns into each prompt.
    #[serde(default = "default_true")]
    pub include_history: bool,
    /// Most recent turns replayed when history is enabled.
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            store: default_store(),
            id: default_session_id(),
            include_history: true,
            max_history_turns: default_max_history_turns(),
        }
    }
}

fn default_session_path() -> PathBuf {
    PathBuf::from("data/chat.sqlite")
}
fn default_store() -> String {
    "novel".to_string()
}
fn default_session_id() -> String {
    "anchor".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_history_turns() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersonaConfig {
    #[serde(default = "default_persona")]
    pub description: String,
    #[serde(default = "default_instructions")]
    pub instructions: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            description: default_persona(),
            instructions: default_instructions(),
        }
    }
}

fn default_persona() -> String {
    DEFAULT_PERSONA.to_string()
}
fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.to_string()
}

/// Load configuration from `path`, falling back to built-in defaults when
/// the file does not exist.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        tracing::warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            knowledge: KnowledgeConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            model: ModelConfig::default(),
            session: SessionConfig::default(),
            persona: PersonaConfig::default(),
        }
    }
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    if !(0.0..=1.0).contains(&config.retrieval.hybrid_alpha) {
        anyhow::bail!("retrieval.hybrid_alpha must be in [0.0, 1.0]");
    }

    match config.retrieval.mode.as_str() {
        "keyword" | "vector" | "hybrid" => {}
        other => anyhow::bail!(
            "Unknown retrieval mode: '{}'. Must be keyword, vector, or hybrid.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0 when the provider is enabled");
    }

    if config.session.id.is_empty() {
        anyhow::bail!("session.id must not be empty");
    }

    Ok(())
}
