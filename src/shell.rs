//! Interactive chat shell.
//!
//! Reads the character name once, then loops: read a user line, hand it to
//! the orchestrator, print the reply. End-of-input terminates cleanly. A
//! failed turn is reported and the loop continues; history already written
//! is unaffected.

use anyhow::Result;
use std::io::{BufRead, Write};

use crate::agent::CharacterAgent;

/// Run the shell over arbitrary streams (stdin/stdout in production,
/// buffers in tests).
pub async fn run<R: BufRead, W: Write>(
    agent: &CharacterAgent,
    mut input: R,
    mut output: W,
) -> Result<()> {
    write!(output, "Character: ")?;
    output.flush()?;

    let mut character = String::new();
    if input.read_line(&mut character)? == 0 {
        return Ok(());
    }
    let character = character.trim().to_string();

    loop {
        write!(output, "You: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(());
        }
        let query = line.trim();
        if query.is_empty() {
            continue;
        }

        match agent.respond(&character, query).await {
            Ok(reply) => {
                writeln!(output, "Agent: {}", reply.text)?;
                if let Some(warning) = reply.storage_warning {
                    writeln!(output, "warning: {}", warning)?;
                }
            }
            Err(e) => {
                writeln!(output, "error: {}", e)?;
            }
        }
    }
}
