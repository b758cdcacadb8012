//! Rendering a conversation as a single text-completion prompt, and the model
//! set that selects that path.

use crate::message::{Message, Role};

/// Models that take a flattened `prompt` string instead of a message array.
pub const TEXT_COMPLETION_MODELS: &[&str] = &[
    "gpt-3.5-turbo-instruct",
    "gpt-3.5-turbo-instruct-0914",
    "text-davinci-003",
    "text-davinci-002",
    "text-davinci-001",
    "text-curie-001",
    "text-babbage-001",
    "text-ada-001",
    "code-davinci-002",
    "code-davinci-001",
    "code-cushman-002",
    "code-cushman-001",
    "text-davinci-edit-001",
    "code-davinci-edit-001",
    "text-embedding-ada-002",
    "text-similarity-davinci-001",
    "text-similarity-curie-001",
    "text-similarity-babbage-001",
    "text-similarity-ada-001",
    "text-search-davinci-doc-001",
    "text-search-curie-doc-001",
    "text-search-babbage-doc-001",
    "text-search-ada-doc-001",
    "code-search-babbage-code-001",
    "code-search-ada-code-001",
];

pub fn is_text_completion_model(model: &str) -> bool {
    TEXT_COMPLETION_MODELS.contains(&model)
}

/// Render a conversation as `"{Role-or-Name}: {content}"` lines with a
/// trailing `assistant:` line for the model to continue from.
pub fn flatten_conversation(messages: &[Message]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(messages.len());
    for message in messages {
        let text = message.content.as_text();
        let line = match (&message.role, message.name.as_deref()) {
            (Role::System, None) => format!("System: {text}"),
            (Role::System, Some(name)) => format!("{name}: {text}"),
            (role, _) => format!("{}: {}", role.as_str(), text),
        };
        lines.push(line);
    }

    let mut prompt = lines.join("\n");
    prompt.push_str("\nassistant:");
    prompt
}
