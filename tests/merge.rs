//! Tests for conversation normalization: name-prefix injection, the
//! consecutive-role merge, attachment round-trips, and strict mode.

use gale::config::PROMPT_PLACEHOLDER;
use gale::message::{ContentPart, Message, MessageContent, PromptNames, Role};
use gale::prompt::merge::merge_messages;
use gale::prompt::{MergeVariant, post_process};
use serde_json::json;

fn no_names() -> PromptNames {
    PromptNames::default()
}

fn named(role: Role, name: &str, content: &str) -> Message {
    Message {
        name: Some(name.to_string()),
        ..Message::text(role, content)
    }
}

fn text_of(message: &Message) -> &str {
    match &message.content {
        MessageContent::Text(text) => text,
        MessageContent::Parts(_) => panic!("expected text content"),
    }
}

fn attachment(url: &str) -> ContentPart {
    ContentPart::Attachment(json!({
        "type": "image_url",
        "image_url": { "url": url }
    }))
}

// ---------------------------------------------------------------------------
// Name-prefix injection and the basic merge
// ---------------------------------------------------------------------------

#[test]
fn named_user_messages_get_prefixed_and_merged() {
    let messages = vec![
        named(Role::User, "bob", "hi"),
        Message::text(Role::User, "there"),
    ];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].role, Role::User);
    assert_eq!(text_of(&merged[0]), "bob: hi\n\nthere");
    assert!(merged[0].name.is_none());
}

#[test]
fn prefix_injection_is_idempotent() {
    let messages = vec![named(Role::User, "bob", "bob: hi")];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(text_of(&merged[0]), "bob: hi");
}

#[test]
fn example_assistant_gets_char_name_prefix() {
    let names = PromptNames {
        char_name: "Alice".to_string(),
        ..PromptNames::default()
    };
    let messages = vec![named(Role::System, "example_assistant", "hello")];

    let merged = merge_messages(messages, &names, false, false);

    assert_eq!(merged[0].role, Role::System);
    assert_eq!(text_of(&merged[0]), "Alice: hello");
}

#[test]
fn example_assistant_with_group_name_prefix_is_untouched() {
    let names = PromptNames {
        char_name: "Alice".to_string(),
        group_names: vec!["Bob".to_string(), "Carol".to_string()],
        ..PromptNames::default()
    };
    let messages = vec![named(Role::System, "example_assistant", "Carol: hi there")];

    let merged = merge_messages(messages, &names, false, false);

    assert_eq!(text_of(&merged[0]), "Carol: hi there");
}

#[test]
fn example_user_gets_user_name_prefix() {
    let names = PromptNames {
        user_name: "Dave".to_string(),
        ..PromptNames::default()
    };
    let messages = vec![named(Role::System, "example_user", "how are you")];

    let merged = merge_messages(messages, &names, false, false);

    assert_eq!(text_of(&merged[0]), "Dave: how are you");
}

#[test]
fn system_messages_with_other_names_are_not_prefixed() {
    let messages = vec![named(Role::System, "narrator", "scene opens")];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(text_of(&merged[0]), "scene opens");
}

// ---------------------------------------------------------------------------
// Role rewrite and field stripping
// ---------------------------------------------------------------------------

#[test]
fn tool_messages_become_user_and_provider_fields_are_stripped() {
    let messages = vec![Message {
        role: Role::Tool,
        name: None,
        content: MessageContent::Text("result".to_string()),
        tool_calls: Some(json!([{ "id": "call_1" }])),
        tool_call_id: Some("call_1".to_string()),
    }];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].role, Role::User);
    assert!(merged[0].name.is_none());
    assert!(merged[0].tool_calls.is_none());
    assert!(merged[0].tool_call_id.is_none());
}

// ---------------------------------------------------------------------------
// Merge mechanics
// ---------------------------------------------------------------------------

#[test]
fn consecutive_roles_merge_but_alternating_roles_do_not() {
    let messages = vec![
        Message::text(Role::System, "rules"),
        Message::text(Role::User, "a"),
        Message::text(Role::User, "b"),
        Message::text(Role::Assistant, "c"),
        Message::text(Role::User, "d"),
    ];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(merged.len(), 4);
    assert_eq!(text_of(&merged[1]), "a\n\nb");
    assert_eq!(text_of(&merged[2]), "c");
    assert_eq!(text_of(&merged[3]), "d");
}

#[test]
fn empty_content_starts_a_new_entry_even_for_same_role() {
    let messages = vec![
        Message::text(Role::User, "a"),
        Message::text(Role::User, ""),
    ];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(merged.len(), 2);
    assert_eq!(text_of(&merged[0]), "a");
    assert_eq!(text_of(&merged[1]), "");
}

#[test]
fn merge_is_a_fixpoint() {
    let messages = vec![
        named(Role::User, "bob", "hi"),
        Message::text(Role::User, "there"),
        Message::text(Role::Assistant, "hello"),
        Message::text(Role::Assistant, "again"),
    ];

    let once = merge_messages(messages, &no_names(), false, false);
    let twice = merge_messages(once.clone(), &no_names(), false, false);

    assert_eq!(once, twice);
}

#[test]
fn missing_content_is_repaired_to_empty_text() {
    let message: Message = serde_json::from_value(json!({ "role": "user" })).unwrap();

    let merged = merge_messages(vec![message], &no_names(), false, false);

    assert_eq!(text_of(&merged[0]), "");
}

#[test]
fn empty_conversation_yields_placeholder_user_message() {
    let merged = merge_messages(vec![], &no_names(), false, false);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].role, Role::User);
    assert_eq!(text_of(&merged[0]), PROMPT_PLACEHOLDER);
}

// ---------------------------------------------------------------------------
// Attachment token round-trips
// ---------------------------------------------------------------------------

#[test]
fn attachment_survives_merge_with_adjacent_message() {
    let image = attachment("https://example.com/cat.png");
    let messages = vec![
        Message::text(
            Role::User,
            MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "a".to_string(),
                },
                image.clone(),
                ContentPart::Text {
                    text: "b".to_string(),
                },
            ]),
        ),
        Message::text(Role::User, "c"),
    ];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(merged.len(), 1);
    let expected = MessageContent::Parts(vec![
        ContentPart::Text {
            text: "a".to_string(),
        },
        image,
        ContentPart::Text {
            text: "b\n\nc".to_string(),
        },
    ]);
    assert_eq!(merged[0].content, expected);
}

#[test]
fn attachment_only_message_round_trips_exactly() {
    let image = attachment("https://example.com/dog.png");
    let messages = vec![Message::text(
        Role::User,
        MessageContent::Parts(vec![image.clone()]),
    )];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].content, MessageContent::Parts(vec![image]));
}

#[test]
fn text_only_messages_stay_plain_text_when_attachments_exist_elsewhere() {
    let messages = vec![
        Message::text(
            Role::User,
            MessageContent::Parts(vec![attachment("https://example.com/a.png")]),
        ),
        Message::text(Role::Assistant, "plain"),
    ];

    let merged = merge_messages(messages, &no_names(), false, false);

    assert_eq!(merged.len(), 2);
    assert!(matches!(merged[0].content, MessageContent::Parts(_)));
    assert_eq!(text_of(&merged[1]), "plain");
}

// ---------------------------------------------------------------------------
// Strict mode
// ---------------------------------------------------------------------------

#[test]
fn strict_demotes_system_messages_past_index_zero() {
    let messages = vec![
        Message::text(Role::System, "rules"),
        Message::text(Role::User, "hi"),
        Message::text(Role::System, "more rules"),
    ];

    let merged = merge_messages(messages, &no_names(), true, false);

    // Demoted system message merges into the preceding user message on the
    // second pass.
    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].role, Role::System);
    assert_eq!(merged[1].role, Role::User);
    assert_eq!(text_of(&merged[1]), "hi\n\nmore rules");
}

#[test]
fn strict_placeholders_insert_user_after_lone_system() {
    let messages = vec![Message::text(Role::System, "rules")];

    let merged = merge_messages(messages, &no_names(), true, true);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].role, Role::System);
    assert_eq!(merged[1].role, Role::User);
    assert_eq!(text_of(&merged[1]), PROMPT_PLACEHOLDER);
}

#[test]
fn strict_placeholders_insert_user_before_leading_assistant() {
    let messages = vec![Message::text(Role::Assistant, "hello")];

    let merged = merge_messages(messages, &no_names(), true, true);

    assert_eq!(merged.len(), 2);
    assert_eq!(merged[0].role, Role::User);
    assert_eq!(text_of(&merged[0]), PROMPT_PLACEHOLDER);
    assert_eq!(merged[1].role, Role::Assistant);
}

#[test]
fn strict_output_is_stable_under_reapplication() {
    let messages = vec![
        Message::text(Role::System, "rules"),
        Message::text(Role::System, "appendix"),
        Message::text(Role::Assistant, "greeting"),
        Message::text(Role::User, "hi"),
        Message::text(Role::System, "reminder"),
    ];

    let once = merge_messages(messages, &no_names(), true, true);
    let twice = merge_messages(once.clone(), &no_names(), true, true);

    assert_eq!(once, twice);
    let system_positions: Vec<usize> = once
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::System)
        .map(|(i, _)| i)
        .collect();
    assert!(system_positions.is_empty() || system_positions == vec![0]);
}

// ---------------------------------------------------------------------------
// Variant selection
// ---------------------------------------------------------------------------

#[test]
fn merge_variant_per_provider_source() {
    assert_eq!(MergeVariant::for_source("deepseek"), MergeVariant::Lenient);
    assert_eq!(MergeVariant::for_source("merge"), MergeVariant::Lenient);
    assert_eq!(MergeVariant::for_source("claude"), MergeVariant::Lenient);
    assert_eq!(MergeVariant::for_source("semi"), MergeVariant::Strict);
    assert_eq!(
        MergeVariant::for_source("strict"),
        MergeVariant::StrictPlaceholders
    );
    assert_eq!(
        MergeVariant::for_source("somewhere-else"),
        MergeVariant::Passthrough
    );
}

#[test]
fn passthrough_variant_leaves_conversation_unmodified() {
    let messages = vec![
        named(Role::User, "bob", "hi"),
        Message::text(Role::User, "there"),
    ];

    let out = post_process(messages.clone(), MergeVariant::Passthrough, &no_names());

    assert_eq!(out, messages);
}
