pub mod flatten;
pub mod merge;

use crate::message::{Message, PromptNames};

/// How a provider variant wants its conversation reshaped before dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeVariant {
    /// Merge consecutive roles, system messages allowed anywhere.
    Lenient,
    /// Lenient merge plus demotion of any system message past index 0.
    Strict,
    /// Strict merge plus placeholder user messages where required.
    StrictPlaceholders,
    /// Unknown provider: pass the conversation through unmodified.
    Passthrough,
}

impl MergeVariant {
    pub fn for_source(source: &str) -> Self {
        match source {
            "deepseek" | "merge" | "claude" => MergeVariant::Lenient,
            "semi" => MergeVariant::Strict,
            "strict" => MergeVariant::StrictPlaceholders,
            _ => MergeVariant::Passthrough,
        }
    }
}

/// Apply the variant's normalization to a conversation.
pub fn post_process(
    messages: Vec<Message>,
    variant: MergeVariant,
    names: &PromptNames,
) -> Vec<Message> {
    match variant {
        MergeVariant::Lenient => merge::merge_messages(messages, names, false, false),
        MergeVariant::Strict => merge::merge_messages(messages, names, true, false),
        MergeVariant::StrictPlaceholders => merge::merge_messages(messages, names, true, true),
        MergeVariant::Passthrough => messages,
    }
}
