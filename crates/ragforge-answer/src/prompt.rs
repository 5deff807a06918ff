//! Prompt assembly: template substitution, context rendering, and
//! conversation history.

use ragforge_core::{ChatMessage, ContextPart};

pub const SYSTEM_PROMPT: &str = "You are a helpful RAG assistant.";

const DEFAULT_INSTRUCTION: &str =
    "Answer the question using the provided summaries and cite titles/sections/pages \
     where relevant.";

/// Render the selected context parts as header/body blocks.
pub fn render_context(parts: &[ContextPart]) -> String {
    parts
        .iter()
        .map(|part| {
            if part.header.is_empty() {
                part.body.clone()
            } else {
                format!("{}\n{}", part.header, part.body)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the user prompt. A configured template has every
/// `{{context}}` and `{{question}}` occurrence substituted; otherwise
/// the default instruction wraps context and question.
pub fn build_prompt(template: Option<&str>, context: &str, question: &str) -> String {
    match template {
        Some(template) => template
            .replace("{{context}}", context)
            .replace("{{question}}", question),
        None => format!(
            "{}\n\nContext:\n{}\n\nQuestion: {}",
            DEFAULT_INSTRUCTION, context, question
        ),
    }
}

/// Prepend recent conversation turns to the prompt.
pub fn merge_history(prompt: &str, history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return prompt.to_string();
    }
    let lines: Vec<String> = history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect();
    format!("Conversation:\n{}\n\n{}", lines.join("\n"), prompt)
}
