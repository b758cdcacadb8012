use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Message role. Defaults to `User` so a message arriving without a role is
/// repaired rather than rejected; `Tool` is rewritten to `User` during
/// normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// One element of a multimodal content sequence.
///
/// Anything that is not a text part is carried as an opaque JSON value
/// (image URLs, audio references, whatever the caller sent) and round-trips
/// byte-exact through normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(untagged)]
    Attachment(serde_json::Value),
}

/// Message content: a plain string or an ordered part sequence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    /// Absent content is repaired to empty text.
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Text view of the content. Part sequences join their text parts with a
    /// blank line; attachment parts contribute nothing.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            MessageContent::Text(text) => Cow::Borrowed(text),
            MessageContent::Parts(parts) => {
                let texts: Vec<&str> = parts
                    .iter()
                    .filter_map(|part| match part {
                        ContentPart::Text { text } => Some(text.as_str()),
                        ContentPart::Attachment(_) => None,
                    })
                    .collect();
                Cow::Owned(texts.join("\n\n"))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

/// A single conversation message. Mutable during normalization, immutable
/// once handed to the dispatch engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn text(role: Role, content: impl Into<MessageContent>) -> Self {
        Message {
            role,
            name: None,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Character/user names supplied by the caller. Used only to decide whether a
/// name prefix must be injected into example system messages.
#[derive(Clone, Debug, Default)]
pub struct PromptNames {
    pub char_name: String,
    pub user_name: String,
    pub group_names: Vec<String>,
}

impl PromptNames {
    pub fn starts_with_group_name(&self, content: &str) -> bool {
        self.group_names
            .iter()
            .any(|name| content.starts_with(&format!("{name}: ")))
    }
}
