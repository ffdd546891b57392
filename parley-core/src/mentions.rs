// ABOUTME: Mention parser - extracts @name tokens from free text.
// ABOUTME: Identifiers are word characters only; the result is a set.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

/// Receiver token that expands to every registered agent except the sender
pub const ALL: &str = "all";
/// Receiver token for the person at the console
pub const HUMAN: &str = "human";
/// Sender name used for announcements and reminder notifications
pub const SYSTEM: &str = "system";

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\w+)").expect("valid mention regex"));

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+$").expect("valid name regex"));

/// Distinct identifiers mentioned in `text`, with the `@` stripped.
///
/// ```
/// use parley_core::mentions::parse_mentions;
/// let ids = parse_mentions("hi @bob and @alice, @bob again");
/// assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec!["alice", "bob"]);
/// ```
pub fn parse_mentions(text: &str) -> BTreeSet<String> {
    MENTION_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// True if `name` could be produced by `parse_mentions`
pub fn is_valid_identifier(name: &str) -> bool {
    NAME_RE.is_match(name)
}

/// Remove every `@name` token for `id` and tidy the whitespace left behind
pub fn strip_mention(text: &str, id: &str) -> String {
    let token = format!("@{id}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(&token) {
        let after = &rest[pos + token.len()..];
        // `@human` must not eat the prefix of `@humane`
        let boundary = after
            .chars()
            .next()
            .map(|c| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(true);
        out.push_str(&rest[..pos]);
        if !boundary {
            out.push_str(&token);
        }
        rest = after;
    }
    out.push_str(rest);
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
