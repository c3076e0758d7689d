//! Component tests for the agent orchestrator, run against real SQLite
//! stores with stub providers.

mod common;

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use persona_chat::agent::{AgentConfig, CharacterAgent};
use persona_chat::embedding::Embedder;
use persona_chat::generate::Generator;
use persona_chat::knowledge;
use persona_chat::models::Role;
use persona_chat::retrieve::{Retriever, SearchMode};
use persona_chat::session::SessionStore;
use persona_chat::shell;

use common::{BagOfWordsEmbedder, InsatiableGenerator, ScriptedGenerator};

const DOCUMENT: &str = "The sky is blue.\n\n\
The grass grew green and soft across the rolling meadows of the reservation.\n\n\
The river ran cold and swift in the deep of winter beyond the northern wall.";

fn agent_config() -> AgentConfig {
    AgentConfig {
        persona: "You are a character from the novel.".to_string(),
        instructions: "Stay immersed as {character}.".to_string(),
        session_id: "anchor".to_string(),
        include_history: true,
        max_history_turns: 20,
        retrieval_mode: SearchMode::Hybrid,
        top_k: 3,
        max_tool_calls: 2,
    }
}

/// Index `document` and wire an agent around the given stubs.
async fn setup_agent(
    dir: &Path,
    document: &str,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    config: AgentConfig,
) -> CharacterAgent {
    let doc_path = dir.join("novel.txt");
    std::fs::write(&doc_path, document).unwrap();

    let cfg = common::test_config(dir, &doc_path);
    let pool = common::knowledge_pool(dir).await;
    knowledge::load(&pool, embedder.as_ref(), &cfg, false)
        .await
        .unwrap();

    let retriever = Retriever::new(
        pool,
        embedder,
        cfg.knowledge.collection.clone(),
        cfg.retrieval.clone(),
    );
    let sessions = SessionStore::open(&cfg.session.path, "novel").await.unwrap();

    CharacterAgent::new(retriever, generator, sessions, config)
}

#[tokio::test]
async fn end_to_end_sky_is_blue() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::always_text(
        "Why, the sky above us is blue, of course.",
    ));
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator.clone(),
        agent_config(),
    )
    .await;

    let reply = agent
        .respond("John", "What color is the sky?")
        .await
        .unwrap();
    assert_eq!(reply.text, "Why, the sky above us is blue, of course.");
    assert!(reply.storage_warning.is_none());

    // The assembled system prompt must carry the retrieved sentence verbatim.
    let messages = generator.request_messages(0);
    let system = messages[0].content.as_deref().unwrap();
    assert!(
        system.contains("The sky is blue."),
        "prompt missing retrieved passage: {system}"
    );

    // The framed user message names the character.
    let user = messages.last().unwrap().content.as_deref().unwrap();
    assert!(user.contains("You are John in the novel."));
    assert!(user.contains("What color is the sky?"));
}

#[tokio::test]
async fn exchange_is_persisted_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::always_text("An answer."));
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator,
        agent_config(),
    )
    .await;

    agent.respond("John", "First question?").await.unwrap();
    agent.respond("John", "Second question?").await.unwrap();

    let sessions = SessionStore::open(&dir.path().join("chat.sqlite"), "novel")
        .await
        .unwrap();
    let turns = sessions.load("anchor").await.unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0].role, Role::User);
    assert_eq!(turns[0].content, "First question?");
    assert_eq!(turns[1].role, Role::Assistant);
    assert_eq!(turns[2].content, "Second question?");
    assert_eq!(turns[3].role, Role::Assistant);
}

#[tokio::test]
async fn history_replays_into_later_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::always_text("Indeed."));
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator.clone(),
        agent_config(),
    )
    .await;

    agent.respond("John", "Remember the river.").await.unwrap();
    agent.respond("John", "What did I mention?").await.unwrap();

    let messages = generator.request_messages(1);
    let all_text: String = messages
        .iter()
        .filter_map(|m| m.content.clone())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(all_text.contains("Remember the river."));
}

#[tokio::test]
async fn disabled_history_excludes_prior_turns() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::always_text("Indeed."));
    let mut config = agent_config();
    config.include_history = false;
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator.clone(),
        config,
    )
    .await;

    agent
        .respond("John", "Remember the albatross.")
        .await
        .unwrap();
    agent.respond("John", "What did I mention?").await.unwrap();

    // Second prompt must contain nothing from the first exchange.
    let messages = generator.request_messages(1);
    let all_text: String = messages
        .iter()
        .filter_map(|m| m.content.clone())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(!all_text.contains("albatross"));
    // System + framed user message only.
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn empty_index_degrades_to_empty_context() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::always_text("I know nothing."));

    // No document loaded: build the agent by hand over an empty store.
    let cfg = common::test_config(dir.path(), &dir.path().join("missing.txt"));
    let pool = common::knowledge_pool(dir.path()).await;
    let retriever = Retriever::new(
        pool,
        Arc::new(BagOfWordsEmbedder),
        cfg.knowledge.collection.clone(),
        cfg.retrieval.clone(),
    );
    let sessions = SessionStore::open(&cfg.session.path, "novel").await.unwrap();
    let agent = CharacterAgent::new(retriever, generator.clone(), sessions, agent_config());

    let reply = agent.respond("John", "What color is the sky?").await.unwrap();
    assert_eq!(reply.text, "I know nothing.");

    let system = generator.request_messages(0)[0].content.clone().unwrap();
    assert!(system.contains("No passages were retrieved"));
}

#[tokio::test]
async fn tool_call_results_feed_back_into_generation() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::new(vec![
        ScriptedGenerator::tool_call("call_1", "river in winter"),
        ScriptedGenerator::text("The river runs cold, as I recall."),
    ]));
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator.clone(),
        agent_config(),
    )
    .await;

    let reply = agent.respond("John", "Tell me of the river.").await.unwrap();
    assert_eq!(reply.text, "The river runs cold, as I recall.");
    assert_eq!(generator.call_count(), 2);

    // Second request must contain the tool result with the passage text.
    let messages = generator.request_messages(1);
    let tool_message = messages.iter().find(|m| m.role == "tool").unwrap();
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    assert!(tool_message
        .content
        .as_deref()
        .unwrap()
        .contains("The river ran cold and swift"));
}

#[tokio::test]
async fn tool_loop_terminates_against_insatiable_provider() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(InsatiableGenerator::new());
    let config = agent_config();
    let max_tool_calls = config.max_tool_calls;
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator.clone(),
        config,
    )
    .await;

    let reply = agent.respond("John", "Anything?").await.unwrap();
    // The provider never produced text, but the loop must still terminate.
    assert!(reply.text.is_empty());
    // One initial call, one per executed tool call, one forced final call.
    assert_eq!(generator.call_count(), max_tool_calls + 2);
}

#[tokio::test]
async fn storage_failure_keeps_the_answer() {
    let dir = tempfile::tempdir().unwrap();
    let doc_path = dir.path().join("novel.txt");
    std::fs::write(&doc_path, DOCUMENT).unwrap();

    let cfg = common::test_config(dir.path(), &doc_path);
    let pool = common::knowledge_pool(dir.path()).await;
    let embedder: Arc<dyn Embedder> = Arc::new(BagOfWordsEmbedder);
    knowledge::load(&pool, embedder.as_ref(), &cfg, false)
        .await
        .unwrap();

    let retriever = Retriever::new(
        pool,
        embedder,
        cfg.knowledge.collection.clone(),
        cfg.retrieval.clone(),
    );
    let sessions = SessionStore::open(&cfg.session.path, "novel").await.unwrap();

    // Break the session store after opening it.
    let session_pool = persona_chat::db::connect(&cfg.session.path).await.unwrap();
    sqlx::query("DROP TABLE turns")
        .execute(&session_pool)
        .await
        .unwrap();

    let generator = Arc::new(ScriptedGenerator::always_text("Still here."));
    let agent = CharacterAgent::new(retriever, generator, sessions, agent_config());

    let reply = agent.respond("John", "Does the answer survive?").await.unwrap();
    assert_eq!(reply.text, "Still here.");
    assert!(reply.storage_warning.is_some());
}

#[tokio::test]
async fn shell_runs_a_conversation_and_exits_on_eof() {
    let dir = tempfile::tempdir().unwrap();
    let generator = Arc::new(ScriptedGenerator::always_text("A fine day, is it not?"));
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator,
        agent_config(),
    )
    .await;

    let input = Cursor::new("John\nHow is the weather?\n");
    let mut output = Vec::new();
    shell::run(&agent, input, &mut output).await.unwrap();

    let printed = String::from_utf8(output).unwrap();
    assert!(printed.contains("Character: "));
    assert!(printed.contains("You: "));
    assert!(printed.contains("Agent: A fine day, is it not?"));
}

#[tokio::test]
async fn shell_reports_turn_errors_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    // A generator with an empty script fails every call.
    let generator = Arc::new(ScriptedGenerator::new(vec![]));
    let agent = setup_agent(
        dir.path(),
        DOCUMENT,
        Arc::new(BagOfWordsEmbedder),
        generator,
        agent_config(),
    )
    .await;

    let input = Cursor::new("John\nfirst try\nsecond try\n");
    let mut output = Vec::new();
    shell::run(&agent, input, &mut output).await.unwrap();

    let printed = String::from_utf8(output).unwrap();
    // Both turns failed, both were reported, the shell exited cleanly.
    assert_eq!(printed.matches("error: ").count(), 2);
    assert!(printed.contains("generation"));
}
