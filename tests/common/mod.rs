//! Shared test doubles and fixtures: deterministic embedders, scripted
//! generators, and sandboxed databases.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;

use persona_chat::config::Config;
use persona_chat::db;
use persona_chat::embedding::Embedder;
use persona_chat::generate::{ChatMessage, Completion, Generator, ToolCall, ToolSpec};
use persona_chat::migrate;
use persona_chat::provider::ProviderError;

pub const DIMS: usize = 64;

/// FNV-1a, so stub vectors are stable across processes.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Deterministic bag-of-words embedder: identical texts embed identically,
/// texts sharing tokens are similar.
pub struct BagOfWordsEmbedder;

#[async_trait]
impl Embedder for BagOfWordsEmbedder {
    fn model(&self) -> &str {
        "stub-bag-of-words"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut vec = vec![0.0f32; DIMS];
                for token in text
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    let token = token.to_ascii_lowercase();
                    let idx = (fnv1a(token.as_bytes()) % DIMS as u64) as usize;
                    vec[idx] += 1.0;
                }
                vec
            })
            .collect())
    }
}

/// Adversarial embedder: every distinct text gets its own one-hot vector
/// (first-seen order), so no two different texts are ever similar. Used to
/// prove the hybrid ⊇ keyword guarantee.
pub struct OrthogonalEmbedder {
    assigned: Mutex<HashMap<String, usize>>,
}

impl OrthogonalEmbedder {
    pub fn new() -> Self {
        Self {
            assigned: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Embedder for OrthogonalEmbedder {
    fn model(&self) -> &str {
        "stub-orthogonal"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut assigned = self.assigned.lock().unwrap();
        Ok(texts
            .iter()
            .map(|text| {
                let next = assigned.len() % DIMS;
                let idx = *assigned.entry(text.clone()).or_insert(next);
                let mut vec = vec![0.0f32; DIMS];
                vec[idx] = 1.0;
                vec
            })
            .collect())
    }
}

/// Generator that replays a script of completions and records every
/// request it receives.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Completion>>,
    pub requests: Mutex<Vec<(Vec<ChatMessage>, usize)>>,
    fallback: Option<String>,
}

impl ScriptedGenerator {
    /// Replay `completions` in order, then fail on further calls.
    pub fn new(completions: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(completions.into()),
            requests: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    /// Always answer with `text`, regardless of call count.
    pub fn always_text(text: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            fallback: Some(text.to_string()),
        }
    }

    pub fn text(text: &str) -> Completion {
        Completion {
            text: Some(text.to_string()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_call(id: &str, query: &str) -> Completion {
        Completion {
            text: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: "search_knowledge".to_string(),
                arguments: format!("{{\"query\":\"{}\"}}", query),
            }],
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// All recorded messages of request `i`.
    pub fn request_messages(&self, i: usize) -> Vec<ChatMessage> {
        self.requests.lock().unwrap()[i].0.clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model(&self) -> &str {
        "stub-scripted"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), tools.len()));

        if let Some(completion) = self.script.lock().unwrap().pop_front() {
            return Ok(completion);
        }
        if let Some(text) = &self.fallback {
            return Ok(Completion {
                text: Some(text.clone()),
                tool_calls: Vec::new(),
            });
        }
        Err(ProviderError::InvalidResponse(
            "scripted generator exhausted".to_string(),
        ))
    }
}

/// Generator that requests another knowledge search on every call, to
/// exercise the tool-loop bound.
pub struct InsatiableGenerator {
    pub requests: Mutex<usize>,
}

impl InsatiableGenerator {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        *self.requests.lock().unwrap()
    }
}

#[async_trait]
impl Generator for InsatiableGenerator {
    fn model(&self) -> &str {
        "stub-insatiable"
    }

    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _tools: &[ToolSpec],
    ) -> Result<Completion, ProviderError> {
        let mut count = self.requests.lock().unwrap();
        *count += 1;
        Ok(Completion {
            text: None,
            tool_calls: vec![ToolCall {
                id: format!("call_{}", *count),
                name: "search_knowledge".to_string(),
                arguments: "{\"query\":\"more\"}".to_string(),
            }],
        })
    }
}

/// Open a knowledge database with schema in `dir`.
pub async fn knowledge_pool(dir: &Path) -> SqlitePool {
    let pool = db::connect(&dir.join("knowledge.sqlite")).await.unwrap();
    migrate::ensure_knowledge_schema(&pool).await.unwrap();
    pool
}

/// Config pointing every path into `dir`, with a stub-friendly embedding
/// section (the enabled flag matters; the provider itself is injected).
pub fn test_config(dir: &Path, document: &Path) -> Config {
    let mut config = Config::default();
    config.db.path = dir.join("knowledge.sqlite");
    config.session.path = dir.join("chat.sqlite");
    config.knowledge.document = document.to_path_buf();
    config.knowledge.collection = "novel".to_string();
    config.embedding.dims = DIMS;
    // Small budget so every fixture paragraph becomes its own chunk.
    config.chunking.max_tokens = 20;
    config
}
