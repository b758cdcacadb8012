//! Message normalization: name-prefix injection, content flattening with
//! attachment token substitution, consecutive-role merging, and token
//! reconstitution. Every step is total — malformed input is repaired, never
//! rejected.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;

use crate::config::PROMPT_PLACEHOLDER;
use crate::message::{ContentPart, Message, MessageContent, PromptNames, Role};

/// Separator used when flattening part sequences and joining merged bodies.
const PART_SEPARATOR: &str = "\n\n";

/// Byte length of the random token standing in for an attachment part while
/// the merge operates on text.
const TOKEN_BYTES: usize = 32;

/// Merge consecutive same-role messages, injecting name prefixes and
/// preserving attachment parts across the textual merge.
///
/// `strict` allows only the leading message to remain a system message;
/// `placeholders` additionally guarantees a user message in the positions
/// strict providers require.
pub fn merge_messages(
    messages: Vec<Message>,
    names: &PromptNames,
    strict: bool,
    placeholders: bool,
) -> Vec<Message> {
    let merged = merge_pass(messages, names);
    if !strict {
        return merged;
    }

    // Strict adjustments retag and insert entries, so the result goes through
    // exactly one more non-strict pass. The second pass cannot re-trigger
    // strict insertions, so two iterations always suffice.
    let adjusted = apply_strict(merged, placeholders);
    merge_pass(adjusted, names)
}

/// One full normalization pass: per-message preparation, the linear merge
/// scan, the non-empty guarantee, and token reconstitution.
fn merge_pass(messages: Vec<Message>, names: &PromptNames) -> Vec<Message> {
    let mut tokens: HashMap<String, ContentPart> = HashMap::new();

    // After preparation every message is a plain (role, text) pair: content
    // flattened, prefixes injected, Tool rewritten, provider fields stripped.
    let prepared: Vec<(Role, String)> = messages
        .into_iter()
        .map(|message| prepare_message(message, names, &mut tokens))
        .collect();

    // Single linear scan: append to the previous entry iff it has the same
    // role and the current content is non-empty.
    let mut merged: Vec<(Role, String)> = Vec::with_capacity(prepared.len());
    for (role, text) in prepared {
        match merged.last_mut() {
            Some((prev_role, prev_text)) if *prev_role == role && !text.is_empty() => {
                prev_text.push_str(PART_SEPARATOR);
                prev_text.push_str(&text);
            }
            _ => merged.push((role, text)),
        }
    }

    if merged.is_empty() {
        merged.push((Role::User, PROMPT_PLACEHOLDER.to_string()));
    }

    let mut result: Vec<Message> = merged
        .into_iter()
        .map(|(role, text)| Message::text(role, text))
        .collect();

    if !tokens.is_empty() {
        for message in &mut result {
            reconstitute(message, &tokens);
        }
    }

    result
}

/// Flatten content to text, inject name prefixes, rewrite Tool to User, and
/// strip provider-specific fields. Prefix injection checks the existing
/// prefix first, so re-running never double-prefixes.
fn prepare_message(
    message: Message,
    names: &PromptNames,
    tokens: &mut HashMap<String, ContentPart>,
) -> (Role, String) {
    let mut text = match message.content {
        MessageContent::Text(text) => text,
        MessageContent::Parts(parts) => {
            let rendered: Vec<String> = parts
                .into_iter()
                .map(|part| match part {
                    ContentPart::Text { text } => text,
                    attachment @ ContentPart::Attachment(_) => {
                        let token = substitution_token();
                        tokens.insert(token.clone(), attachment);
                        token
                    }
                })
                .collect();
            rendered.join(PART_SEPARATOR)
        }
    };

    if message.role == Role::System
        && message.name.as_deref() == Some("example_assistant")
        && !names.char_name.is_empty()
        && !text.starts_with(&format!("{}: ", names.char_name))
        && !names.starts_with_group_name(&text)
    {
        text = format!("{}: {}", names.char_name, text);
    }

    if message.role == Role::System
        && message.name.as_deref() == Some("example_user")
        && !names.user_name.is_empty()
        && !text.starts_with(&format!("{}: ", names.user_name))
    {
        text = format!("{}: {}", names.user_name, text);
    }

    if message.role != Role::System
        && let Some(name) = message.name.as_deref()
        && !text.starts_with(&format!("{name}: "))
    {
        text = format!("{name}: {text}");
    }

    let role = if message.role == Role::Tool {
        Role::User
    } else {
        message.role
    };

    (role, text)
}

/// Replace recorded substitution tokens with their original attachment parts,
/// re-coalescing the surrounding text. Messages with no recorded token keep
/// their plain text content.
fn reconstitute(message: &mut Message, tokens: &HashMap<String, ContentPart>) {
    let MessageContent::Text(text) = &message.content else {
        return;
    };
    if !tokens.keys().any(|token| text.contains(token)) {
        return;
    }

    let mut parts: Vec<ContentPart> = Vec::new();
    for segment in text.split(PART_SEPARATOR) {
        match tokens.get(segment) {
            Some(attachment) => parts.push(attachment.clone()),
            None => match parts.last_mut() {
                Some(ContentPart::Text { text: prev }) => {
                    prev.push_str(PART_SEPARATOR);
                    prev.push_str(segment);
                }
                _ => parts.push(ContentPart::Text {
                    text: segment.to_string(),
                }),
            },
        }
    }

    message.content = MessageContent::Parts(parts);
}

/// Demote every system message past index 0 and, when `placeholders` is set,
/// insert placeholder user messages where strict providers require one.
fn apply_strict(mut messages: Vec<Message>, placeholders: bool) -> Vec<Message> {
    for message in messages.iter_mut().skip(1) {
        if message.role == Role::System {
            message.role = Role::User;
        }
    }

    if placeholders && !messages.is_empty() {
        if messages[0].role == Role::System
            && messages.get(1).is_none_or(|m| m.role != Role::User)
        {
            messages.insert(1, Message::text(Role::User, PROMPT_PLACEHOLDER));
        } else if messages[0].role != Role::System && messages[0].role != Role::User {
            messages.insert(0, Message::text(Role::User, PROMPT_PLACEHOLDER));
        }
    }

    messages
}

/// Fresh random token, unique within a normalization call for any practical
/// purpose (32 random bytes, base64-rendered).
fn substitution_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}
