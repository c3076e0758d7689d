//! # Persona Chat
//!
//! A retrieval-grounded character roleplay chatbot. Point it at a novel
//! (PDF), pick a character, and converse: every answer is generated in
//! character, grounded in passages retrieved from the indexed text, with
//! the conversation persisted across runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │ Document │──▶│   Indexer     │──▶│  SQLite    │
//! │  (PDF)   │   │ Chunk+Embed  │   │ FTS5+Vec  │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                ┌──────────┐       ┌─────▼─────┐
//!   Character:   │  Shell   │──────▶│   Agent    │──▶ chat provider
//!   You: ...     │(persona) │◀──────│ (retrieve, │◀── tool calls
//!                └──────────┘       │  history)  │
//!                                   └─────┬─────┘
//!                                         │
//!                                   ┌─────▼─────┐
//!                                   │  Session   │
//!                                   │  (SQLite)  │
//!                                   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! persona init                  # create databases
//! persona load                  # index the configured document
//! persona search "soma" --mode hybrid
//! persona chat                  # Character: / You: / Agent:
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | Document text extraction |
//! | [`chunk`] | Paragraph-boundary chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`generate`] | Chat-completion provider abstraction |
//! | [`provider`] | Shared provider HTTP plumbing |
//! | [`knowledge`] | Document indexing |
//! | [`retrieve`] | Keyword, vector, and hybrid retrieval |
//! | [`session`] | Durable conversation history |
//! | [`prompt`] | Prompt assembly |
//! | [`agent`] | Per-turn orchestration |
//! | [`shell`] | Interactive loop |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod generate;
pub mod knowledge;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod provider;
pub mod retrieve;
pub mod session;
pub mod shell;
