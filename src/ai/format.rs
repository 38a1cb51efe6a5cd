//! Rendering of structured messages into commit text.

use std::fmt;

use crate::ai::schema::{CommitMessage, PartialBodyItem, PartialCommitMessage};

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn push_header(
    out: &mut String,
    emoji: Option<&str>,
    commit_type: Option<&str>,
    scope: Option<&str>,
    description: Option<&str>,
) {
    if let Some(emoji) = emoji {
        out.push_str(emoji);
    }
    if let Some(commit_type) = commit_type {
        if emoji.is_some() {
            out.push(' ');
        }
        out.push_str(commit_type);
    }
    if let Some(scope) = scope {
        out.push('(');
        out.push_str(scope);
        out.push(')');
    }
    if let Some(description) = description {
        out.push_str(": ");
        out.push_str(description);
    }
}

fn push_body_item(out: &mut String, item: &PartialBodyItem) {
    out.push_str("* ");
    push_header(
        out,
        non_empty(&item.emoji),
        non_empty(&item.commit_type),
        non_empty(&item.scope),
        non_empty(&item.description),
    );
}

/// Renders a possibly incomplete message as `emoji type(scope): description`,
/// followed by one `* ` line per body item.
///
/// Missing or empty fields are left out; the function never fails.
#[must_use]
pub fn format_partial(message: &PartialCommitMessage) -> String {
    let mut out = String::new();
    push_header(
        &mut out,
        non_empty(&message.emoji),
        non_empty(&message.commit_type),
        non_empty(&message.scope),
        non_empty(&message.description),
    );

    if let Some(body) = message.body.as_ref().filter(|b| !b.is_empty()) {
        for item in body {
            out.push('\n');
            push_body_item(&mut out, item);
        }
    }

    out
}

/// Renders a complete message.
#[must_use]
pub fn format_commit_message(message: &CommitMessage) -> String {
    format_partial(&PartialCommitMessage::from(message))
}

impl fmt::Display for CommitMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_commit_message(self))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ai::schema::CommitBodyItem;
    use proptest::prelude::*;

    fn login() -> CommitMessage {
        CommitMessage {
            emoji: "✨".into(),
            commit_type: "feat".into(),
            scope: None,
            description: "add login".into(),
            body: None,
        }
    }

    #[test]
    fn header_only() {
        assert_eq!(format_commit_message(&login()), "✨ feat: add login");
    }

    #[test]
    fn header_with_scope() {
        let msg = CommitMessage {
            scope: Some("auth".into()),
            ..login()
        };
        assert_eq!(msg.to_string(), "✨ feat(auth): add login");
    }

    #[test]
    fn empty_scope_is_omitted() {
        let msg = CommitMessage {
            scope: Some(String::new()),
            ..login()
        };
        assert_eq!(msg.to_string(), "✨ feat: add login");
    }

    #[test]
    fn body_items_are_bulleted() {
        let msg = CommitMessage {
            scope: Some("auth".into()),
            body: Some(vec![
                CommitBodyItem {
                    emoji: "🐛".into(),
                    commit_type: "fix".into(),
                    scope: None,
                    description: "null check".into(),
                },
                CommitBodyItem {
                    emoji: "📝".into(),
                    commit_type: "docs".into(),
                    scope: Some("readme".into()),
                    description: "document login".into(),
                },
            ]),
            ..login()
        };
        insta::assert_snapshot!(msg.to_string(), @r"
        ✨ feat(auth): add login
        * 🐛 fix: null check
        * 📝 docs(readme): document login
        ");
    }

    #[test]
    fn single_body_item_appends_one_line() {
        let msg = CommitMessage {
            body: Some(vec![CommitBodyItem {
                emoji: "🐛".into(),
                commit_type: "fix".into(),
                scope: None,
                description: "null check".into(),
            }]),
            ..login()
        };
        assert_eq!(msg.to_string(), "✨ feat: add login\n* 🐛 fix: null check");
    }

    #[test]
    fn empty_body_adds_nothing() {
        let msg = CommitMessage {
            body: Some(vec![]),
            ..login()
        };
        assert_eq!(msg.to_string(), "✨ feat: add login");
    }

    #[test]
    fn partial_messages_omit_missing_fields() {
        assert_eq!(format_partial(&PartialCommitMessage::default()), "");

        let msg = PartialCommitMessage {
            emoji: Some("✨".into()),
            ..Default::default()
        };
        assert_eq!(format_partial(&msg), "✨");

        let msg = PartialCommitMessage {
            emoji: Some("✨".into()),
            commit_type: Some("fe".into()),
            ..Default::default()
        };
        assert_eq!(format_partial(&msg), "✨ fe");

        let msg = PartialCommitMessage {
            emoji: Some("✨".into()),
            commit_type: Some("feat".into()),
            body: Some(vec![PartialBodyItem {
                commit_type: Some("fix".into()),
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert_eq!(format_partial(&msg), "✨ feat\n* fix");
    }

    fn opt_text() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-z✨🐛 ]{0,8}")
    }

    fn partial_item() -> impl Strategy<Value = PartialBodyItem> {
        (opt_text(), opt_text(), opt_text(), opt_text()).prop_map(
            |(emoji, commit_type, scope, description)| PartialBodyItem {
                emoji,
                commit_type,
                scope,
                description,
            },
        )
    }

    proptest! {
        #[test]
        fn format_is_total_and_omits_absent_fields(
            emoji in opt_text(),
            commit_type in opt_text(),
            scope in opt_text(),
            description in opt_text(),
            body in proptest::option::of(proptest::collection::vec(partial_item(), 0..4)),
        ) {
            let msg = PartialCommitMessage { emoji, commit_type, scope, description, body };
            let text = format_partial(&msg);

            let has_scope = msg.scope.as_deref().is_some_and(|s| !s.is_empty());
            let has_desc = msg.description.as_deref().is_some_and(|s| !s.is_empty());
            let header = text.lines().next().unwrap_or("");
            prop_assert_eq!(has_scope, header.contains('('));
            prop_assert_eq!(has_desc, header.contains(": "));

            let body_lines = msg.body.as_ref().map_or(0, Vec::len);
            prop_assert_eq!(text.matches("\n* ").count(), body_lines);

            // Same fields, same text.
            prop_assert_eq!(format_partial(&msg.clone()), text);
        }
    }
}
