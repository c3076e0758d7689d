//! Prompt assembly.
//!
//! Builds the message sequence sent to the chat provider, in fixed order:
//! persona description, behavioral instructions (character substituted),
//! retrieved passages tagged with provenance, prior turns oldest first, and
//! the new user message wrapped in the role-play framing template. Kept
//! separate from the orchestrator so the layout is testable on its own.

use crate::generate::ChatMessage;
use crate::models::{RetrievedPassage, Role, Turn};

/// Everything the prompt needs for one turn.
pub struct PromptInputs<'a> {
    pub persona: &'a str,
    pub instructions: &'a str,
    pub character: &'a str,
    pub passages: &'a [RetrievedPassage],
    pub history: &'a [Turn],
    pub user_text: &'a str,
}

/// Wrap the raw user input in the role-play framing that names the target
/// character.
pub fn frame_user_message(character: &str, query: &str) -> String {
    format!(
        "You are {character} in the novel. Behave like a real character \
according to the novel context and background.\n\nQuestion: {query}"
    )
}

/// Render retrieved passages with enough provenance to tell them apart.
pub fn render_passages(passages: &[RetrievedPassage]) -> String {
    let mut out = String::new();
    for (i, p) in passages.iter().enumerate() {
        out.push_str(&format!(
            "[{}] {} #{}\n{}\n\n",
            i + 1,
            p.source,
            p.chunk_index,
            p.text
        ));
    }
    out.trim_end().to_string()
}

/// Assemble the full message sequence for one turn.
pub fn assemble(inputs: &PromptInputs<'_>) -> Vec<ChatMessage> {
    let instructions = inputs.instructions.replace("{character}", inputs.character);

    let mut system = String::new();
    system.push_str(inputs.persona);
    system.push_str("\n\n");
    system.push_str(&instructions);

    if inputs.passages.is_empty() {
        system.push_str("\n\nNo passages were retrieved for this question.");
    } else {
        system.push_str("\n\nRetrieved passages from the novel:\n\n");
        system.push_str(&render_passages(inputs.passages));
    }

    let mut messages = vec![ChatMessage::system(system)];

    for turn in inputs.history {
        match turn.role {
            Role::User => messages.push(ChatMessage::user(turn.content.clone())),
            Role::Assistant => messages.push(ChatMessage::assistant(turn.content.clone())),
        }
    }

    messages.push(ChatMessage::user(frame_user_message(
        inputs.character,
        inputs.user_text,
    )));

    messages
}
