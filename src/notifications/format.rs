//! Alert rendering for Telegram's MarkdownV2 parse mode.

use crate::models::Decision;

/// Characters MarkdownV2 reserves outside of entities.
const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn format_decision(decision: &Decision) -> String {
    format!(
        "*{action}* {ticker}\nRule: _{rule}_\n{explanation}",
        action = escape_markdown_v2(decision.action.as_str()),
        ticker = escape_markdown_v2(&decision.ticker),
        rule = escape_markdown_v2(&decision.rule),
        explanation = escape_markdown_v2(&decision.explanation),
    )
}
