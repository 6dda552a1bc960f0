//! Line-framing helpers shared by the CLI request/response and
//! publish/subscribe contexts (spec §4.7/§4.8): whitespace/paren
//! stripping, the `'`-sigil convention, and the backward-compatibility
//! root-name prefixing rule.

use decof_core::ObjectDictionary;

/// Strips a single outer pair of parentheses plus leading/trailing
/// whitespace (spec §4.7, applied identically by the pub/sub listener).
pub(crate) fn strip_line(line: &str) -> &str {
    let s = line.trim();
    match s.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => inner.trim(),
        None => s,
    }
}

pub(crate) fn split_first_word(s: &str) -> (&str, &str) {
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

pub(crate) fn strip_quote_sigil(uri: &str) -> &str {
    uri.strip_prefix('\'').unwrap_or(uri)
}

/// Prepends `<root><separator>` unless the URI already starts with it or
/// is exactly the root name (spec §4.7 "backward compatibility").
pub(crate) fn qualify_uri(dictionary: &ObjectDictionary, uri: &str) -> String {
    if uri.is_empty() {
        return String::new();
    }
    let root = dictionary.root().name();
    let sep = dictionary.separator();
    if uri == root || uri.starts_with(&format!("{root}{sep}")) {
        uri.to_string()
    } else {
        format!("{root}{sep}{uri}")
    }
}
