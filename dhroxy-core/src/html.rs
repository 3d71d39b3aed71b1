//! Cleaning of the HTML fragments labsvar embeds in narrative fields.

use regex::Regex;
use std::sync::LazyLock;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break pattern"));

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag pattern"));

/// Entities seen in labsvar payloads. Anything else is left as-is.
const ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&#230;", "æ"),
    ("&#248;", "ø"),
    ("&#229;", "å"),
    ("&#198;", "Æ"),
    ("&#216;", "Ø"),
    ("&#197;", "Å"),
    ("&aelig;", "æ"),
    ("&oslash;", "ø"),
    ("&aring;", "å"),
    ("&AElig;", "Æ"),
    ("&Oslash;", "Ø"),
    ("&Aring;", "Å"),
];

/// Turn an HTML fragment into plain text.
///
/// Line breaks become `\n`, remaining tags are dropped and the known
/// entities decoded. Only horizontal whitespace is trimmed so that line
/// structure survives. Returns `None` for absent or blank input.
pub fn clean_text(html: Option<&str>) -> Option<String> {
    let html = html?;
    if html.trim().is_empty() {
        return None;
    }

    let text = LINE_BREAK.replace_all(html, "\n");
    let text = TAG.replace_all(&text, "");
    let mut text = text.into_owned();
    for (entity, replacement) in ENTITIES {
        if text.contains(entity) {
            text = text.replace(entity, replacement);
        }
    }

    let trimmed = text.trim_matches(|c: char| c == ' ' || c == '\t' || c == '\u{a0}');
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
