//! Character agent orchestrator.
//!
//! Drives one query through the pipeline: load history, retrieve passages,
//! assemble the prompt, generate (with a bounded knowledge-search tool
//! loop), persist the exchange, return the final text. Every failure is
//! typed with the stage it occurred in; a storage failure after successful
//! generation is downgraded to a warning so the answer is never lost.

use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::generate::{ChatMessage, Completion, Generator, ToolCall, ToolSpec};
use crate::models::{RetrievedPassage, Role, Turn};
use crate::prompt::{self, PromptInputs};
use crate::provider::ProviderError;
use crate::retrieve::{Retriever, SearchError, SearchMode};
use crate::session::{SessionStore, StoreError};

/// Name of the retrieval tool offered to the model.
pub const SEARCH_TOOL: &str = "search_knowledge";

/// Pipeline stage a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    History,
    Retrieval,
    Generation,
    ToolCall,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::History => "history",
            Stage::Retrieval => "retrieval",
            Stage::Generation => "generation",
            Stage::ToolCall => "tool call",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("provider failure during {stage}: {source}")]
    Provider {
        stage: Stage,
        #[source]
        source: ProviderError,
    },

    #[error("retrieval failure during {stage}: {source}")]
    Search {
        stage: Stage,
        #[source]
        source: SearchError,
    },

    #[error("storage failure during {stage}: {source}")]
    Storage {
        stage: Stage,
        #[source]
        source: StoreError,
    },
}

/// Immutable per-process agent configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub persona: String,
    pub instructions: String,
    pub session_id: String,
    pub include_history: bool,
    pub max_history_turns: usize,
    pub retrieval_mode: SearchMode,
    pub top_k: usize,
    pub max_tool_calls: usize,
}

impl AgentConfig {
    pub fn from_config(config: &Config) -> Self {
        let mut mode = SearchMode::parse(&config.retrieval.mode).unwrap_or(SearchMode::Hybrid);
        if !config.embedding.is_enabled() && mode != SearchMode::Keyword {
            tracing::warn!(
                requested = mode.as_str(),
                "embedding provider disabled, falling back to keyword retrieval"
            );
            mode = SearchMode::Keyword;
        }

        Self {
            persona: config.persona.description.clone(),
            instructions: config.persona.instructions.clone(),
            session_id: config.session.id.clone(),
            include_history: config.session.include_history,
            max_history_turns: config.session.max_history_turns,
            retrieval_mode: mode,
            top_k: config.retrieval.top_k,
            max_tool_calls: config.model.max_tool_calls,
        }
    }
}

/// The orchestrator's answer for one turn.
#[derive(Debug)]
pub struct TurnReply {
    pub text: String,
    /// Set when the exchange could not be persisted; the answer itself is
    /// still valid.
    pub storage_warning: Option<String>,
}

/// Coordinates retriever, generator, and session store for one character.
pub struct CharacterAgent {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    sessions: SessionStore,
    config: AgentConfig,
}

impl CharacterAgent {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn Generator>,
        sessions: SessionStore,
        config: AgentConfig,
    ) -> Self {
        Self {
            retriever,
            generator,
            sessions,
            config,
        }
    }

    /// Answer one user query in character.
    pub async fn respond(&self, character: &str, user_text: &str) -> Result<TurnReply, AgentError> {
        let history = self.load_history().await?;
        let passages = self.retrieve(user_text).await?;

        let mut messages = prompt::assemble(&PromptInputs {
            persona: &self.config.persona,
            instructions: &self.config.instructions,
            character,
            passages: &passages,
            history: &history,
            user_text,
        });

        let text = self.generate(&mut messages).await?;

        let storage_warning = match self.persist(user_text, &text).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!(error = %e, "failed to persist turn");
                Some(format!("turn not saved to history: {e}"))
            }
        };

        Ok(TurnReply {
            text,
            storage_warning,
        })
    }

    async fn load_history(&self) -> Result<Vec<Turn>, AgentError> {
        if !self.config.include_history {
            return Ok(Vec::new());
        }

        let mut turns = self
            .sessions
            .load(&self.config.session_id)
            .await
            .map_err(|source| AgentError::Storage {
                stage: Stage::History,
                source,
            })?;

        if turns.len() > self.config.max_history_turns {
            turns = turns.split_off(turns.len() - self.config.max_history_turns);
        }

        Ok(turns)
    }

    /// Retrieve context for the raw user text. An empty index degrades to
    /// an empty context instead of failing the turn.
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>, AgentError> {
        match self
            .retriever
            .search(query, self.config.top_k, self.config.retrieval_mode)
            .await
        {
            Ok(passages) => Ok(passages),
            Err(SearchError::EmptyIndex) => {
                tracing::debug!("knowledge index is empty, continuing without context");
                Ok(Vec::new())
            }
            Err(SearchError::Provider(source)) => Err(AgentError::Provider {
                stage: Stage::Retrieval,
                source,
            }),
            Err(source) => Err(AgentError::Search {
                stage: Stage::Retrieval,
                source,
            }),
        }
    }

    /// Run the generation loop, executing knowledge-search tool calls until
    /// the model answers or the per-turn bound is reached.
    async fn generate(&self, messages: &mut Vec<ChatMessage>) -> Result<String, AgentError> {
        let tools = [self.search_tool_spec()];

        let mut completion = self.complete(messages, &tools).await?;
        let mut executed = 0usize;

        while !completion.tool_calls.is_empty() {
            if executed >= self.config.max_tool_calls {
                tracing::debug!(
                    executed,
                    "tool-call budget exhausted, forcing a final answer"
                );
                completion = self.complete(messages, &[]).await?;
                break;
            }

            messages.push(ChatMessage {
                role: "assistant".to_string(),
                content: completion.text.clone(),
                tool_calls: completion.tool_calls.clone(),
                tool_call_id: None,
            });

            for call in &completion.tool_calls {
                tracing::debug!(tool = %call.name, args = %call.arguments, "executing tool call");
                let result = self.execute_tool(call).await?;
                messages.push(ChatMessage::tool(call.id.clone(), result));
                executed += 1;
            }

            completion = self.complete(messages, &tools).await?;
        }

        Ok(completion.text.unwrap_or_default())
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<Completion, AgentError> {
        self.generator
            .complete(messages, tools)
            .await
            .map_err(|source| AgentError::Provider {
                stage: Stage::Generation,
                source,
            })
    }

    /// Execute one model-requested tool call. Malformed arguments and an
    /// empty index are reported back to the model as tool output; provider
    /// failures abort the turn.
    async fn execute_tool(&self, call: &ToolCall) -> Result<String, AgentError> {
        if call.name != SEARCH_TOOL {
            return Ok(format!("unknown tool: {}", call.name));
        }

        let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(v) => v,
            Err(e) => return Ok(format!("invalid tool arguments: {e}")),
        };

        let query = match args.get("query").and_then(|q| q.as_str()) {
            Some(q) if !q.trim().is_empty() => q.to_string(),
            _ => return Ok("invalid tool arguments: 'query' is required".to_string()),
        };

        let limit = args
            .get("limit")
            .and_then(|l| l.as_u64())
            .map(|l| l as usize)
            .unwrap_or(self.config.top_k);

        match self
            .retriever
            .search(&query, limit, self.config.retrieval_mode)
            .await
        {
            Ok(passages) if passages.is_empty() => Ok("no matching passages".to_string()),
            Ok(passages) => Ok(prompt::render_passages(&passages)),
            Err(SearchError::EmptyIndex) => Ok("the knowledge base is empty".to_string()),
            Err(SearchError::InvalidQuery(e)) => Ok(format!("invalid query: {e}")),
            Err(SearchError::Provider(source)) => Err(AgentError::Provider {
                stage: Stage::ToolCall,
                source,
            }),
            Err(source) => Err(AgentError::Search {
                stage: Stage::ToolCall,
                source,
            }),
        }
    }

    /// Append both turns of the exchange. Called only after generation
    /// succeeded, so a failed turn never writes a half-pair into history.
    async fn persist(&self, user_text: &str, reply: &str) -> Result<(), StoreError> {
        self.sessions
            .append(&self.config.session_id, Role::User, user_text)
            .await?;
        self.sessions
            .append(&self.config.session_id, Role::Assistant, reply)
            .await
    }

    fn search_tool_spec(&self) -> ToolSpec {
        ToolSpec {
            name: SEARCH_TOOL.to_string(),
            description: "Search the novel for passages relevant to a query. \
Use specific, focused queries such as direct quotes, scenes, or events."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search query" },
                    "limit": { "type": "integer", "description": "Max passages", "default": self.config.top_k }
                },
                "required": ["query"]
            }),
        }
    }
}
