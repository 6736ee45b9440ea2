//! Line-level textual repairs for malformed documents.
//!
//! Each repair is a pure function that either returns the patched text or
//! `None` when it does not apply. The reader tries them in [`REPAIRS`] order
//! after every failed parse.

use std::sync::LazyLock;

use regex::Regex;

use crate::tree::{FailureKind, ParseFailure};

/// Identifies the repair that was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repair {
    DropPrefix,
    SeparateStrayQuote,
    EscapeAmpersand,
    BlankUnterminatedComments,
    MergeDuplicateRoot,
}

type RepairFn = fn(&str, &ParseFailure) -> Option<String>;

/// Repairs in the order they are attempted.
pub const REPAIRS: &[(Repair, RepairFn)] = &[
    (Repair::DropPrefix, drop_prefix),
    (Repair::SeparateStrayQuote, separate_stray_quote),
    (Repair::EscapeAmpersand, escape_bare_ampersands),
    (Repair::BlankUnterminatedComments, blank_unterminated_comments),
    (Repair::MergeDuplicateRoot, merge_duplicate_root),
];

/// Apply the first repair that changes `text`.
pub fn apply_first(text: &str, failure: &ParseFailure) -> Option<(Repair, String)> {
    REPAIRS
        .iter()
        .find_map(|(repair, apply)| apply(text, failure).map(|patched| (*repair, patched)))
}

static STRAY_QUOTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(=\s*"[^"]*")([A-Za-z_])"#).expect("valid stray quote pattern")
});

/// Offset of the first `<` that opens an element, declaration or comment.
fn first_tag_offset(text: &str) -> Option<usize> {
    text.char_indices().find_map(|(index, ch)| {
        if ch != '<' {
            return None;
        }
        let next = text[index + 1..].chars().next()?;
        (next.is_ascii_alphabetic() || next == '?' || next == '!').then_some(index)
    })
}

fn line_range(text: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(text.len());
    let start = text[..offset].rfind('\n').map(|newline| newline + 1).unwrap_or(0);
    let end = text[offset..]
        .find('\n')
        .map(|newline| offset + newline)
        .unwrap_or(text.len());
    (start, end)
}

fn patch_line(text: &str, offset: usize, patch: impl Fn(&str) -> String) -> Option<String> {
    let offset = (0..=offset.min(text.len()))
        .rev()
        .find(|candidate| text.is_char_boundary(*candidate))
        .unwrap_or(0);
    let (start, end) = line_range(text, offset);
    let line = &text[start..end];
    let patched = patch(line);
    if patched == line {
        return None;
    }
    Some(format!("{}{}{}", &text[..start], patched, &text[end..]))
}

/// Drop whatever precedes the first real tag when the failure lies there.
pub fn drop_prefix(text: &str, failure: &ParseFailure) -> Option<String> {
    let first = first_tag_offset(text)?;
    if first == 0 || failure.offset > first {
        return None;
    }
    Some(text[first..].to_string())
}

/// Insert a space between a quoted attribute value and a following name.
pub fn separate_stray_quote(text: &str, failure: &ParseFailure) -> Option<String> {
    patch_line(text, failure.offset, |line| {
        STRAY_QUOTE.replace_all(line, "$1 $2").into_owned()
    })
}

/// Escape `&` characters on the failing line that do not start an entity.
pub fn escape_bare_ampersands(text: &str, failure: &ParseFailure) -> Option<String> {
    if !matches!(failure.kind, FailureKind::Escape | FailureKind::Syntax) {
        return None;
    }
    patch_line(text, failure.offset, escape_line_ampersands)
}

fn escape_line_ampersands(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for (index, ch) in line.char_indices() {
        if ch == '&' && !starts_entity(&line[index + 1..]) {
            out.push_str("&amp;");
        } else {
            out.push(ch);
        }
    }
    out
}

fn starts_entity(rest: &str) -> bool {
    let Some(end) = rest.find(';') else {
        return false;
    };
    let body = &rest[..end];
    if let Some(hex) = body.strip_prefix("#x") {
        return !hex.is_empty() && hex.chars().all(|ch| ch.is_ascii_hexdigit());
    }
    if let Some(decimal) = body.strip_prefix('#') {
        return !decimal.is_empty() && decimal.chars().all(|ch| ch.is_ascii_digit());
    }
    !body.is_empty() && body.chars().all(|ch| ch.is_ascii_alphanumeric())
}

/// Start of the first `<!--` that has no matching `-->` after it.
fn unterminated_comment(text: &str) -> Option<usize> {
    let mut cursor = 0;
    while let Some(found) = text[cursor..].find("<!--") {
        let open = cursor + found;
        let body = open + "<!--".len();
        match text[body..].find("-->") {
            Some(close) => cursor = body + close + "-->".len(),
            None => return Some(open),
        }
    }
    None
}

/// Blank an unterminated comment opener, from `<!--` to the end of its line,
/// when the failure lies at or after it. Terminated comments are never
/// touched, so commented-out content stays commented out.
pub fn blank_unterminated_comments(text: &str, failure: &ParseFailure) -> Option<String> {
    if failure.kind != FailureKind::Syntax {
        return None;
    }
    let open = unterminated_comment(text)?;
    if failure.offset < open {
        return None;
    }
    let (_, end) = line_range(text, open);
    Some(format!("{}{}", &text[..open], &text[end..]))
}

/// Merge a second top-level element into the first by dropping the first
/// root's closing tag and the second root's opening tag.
pub fn merge_duplicate_root(text: &str, failure: &ParseFailure) -> Option<String> {
    let FailureKind::DuplicateRoot { name } = &failure.kind else {
        return None;
    };
    let second = failure.offset.min(text.len());
    let open_end = text[second..].find('>').map(|end| second + end + 1)?;
    if text[second..open_end].ends_with("/>") {
        // A self-closing duplicate carries nothing worth merging.
        return Some(format!("{}{}", &text[..second], &text[open_end..]));
    }
    let closing = format!("</{name}>");
    let close_start = text[..second].rfind(&closing)?;
    let close_end = close_start + closing.len();
    Some(format!(
        "{}{}{}",
        &text[..close_start],
        &text[close_end..second],
        &text[open_end..]
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(kind: FailureKind, offset: usize) -> ParseFailure {
        ParseFailure {
            kind,
            offset,
            message: "test".to_string(),
        }
    }

    #[test]
    fn drop_prefix_removes_leading_junk() {
        let text = "exported by tool v2 & friends\n<GameData/>";
        let patched = drop_prefix(text, &failure(FailureKind::Syntax, 10)).unwrap();
        assert_eq!(patched, "<GameData/>");
    }

    #[test]
    fn drop_prefix_ignores_failures_after_first_tag() {
        let text = "junk<GameData/>";
        assert_eq!(drop_prefix(text, &failure(FailureKind::Syntax, 12)), None);
        assert_eq!(drop_prefix("<GameData/>", &failure(FailureKind::Syntax, 0)), None);
    }

    #[test]
    fn stray_quote_gets_separator() {
        let text = "<GameData>\n<Row Type=\"A\"Kind=\"B\"/>\n</GameData>";
        let offset = text.find("Kind").unwrap();
        let patched = separate_stray_quote(text, &failure(FailureKind::Attribute, offset)).unwrap();
        assert_eq!(patched, "<GameData>\n<Row Type=\"A\" Kind=\"B\"/>\n</GameData>");
    }

    #[test]
    fn bare_ampersand_is_escaped_but_entities_survive() {
        let text = "<Row Name=\"Salt & Pepper &amp; &#38; &#x26;\"/>";
        let patched = escape_bare_ampersands(text, &failure(FailureKind::Escape, 5)).unwrap();
        assert_eq!(patched, "<Row Name=\"Salt &amp; Pepper &amp; &#38; &#x26;\"/>");
    }

    #[test]
    fn unterminated_comment_opener_is_blanked() {
        let text = "<GameData>\n<Row A=\"1\"/> <!-- broken\n<!-- fine -->\n</GameData>";
        let open = text.find("<!-- broken").unwrap();
        let patched = blank_unterminated_comments(text, &failure(FailureKind::Syntax, open)).unwrap();
        assert_eq!(patched, "<GameData>\n<Row A=\"1\"/> \n<!-- fine -->\n</GameData>");
        assert_eq!(blank_unterminated_comments(&patched, &failure(FailureKind::Syntax, open)), None);
    }

    #[test]
    fn terminated_comments_are_left_alone() {
        let text = "<GameData>\n<!-- disabled\n<Kinds/>\n-->\n</GameData>\n<GameData/>";
        let offset = text.rfind("<GameData").unwrap();
        assert_eq!(blank_unterminated_comments(text, &failure(FailureKind::Syntax, offset)), None);
    }

    #[test]
    fn unterminated_comment_after_failure_is_left_alone() {
        let text = "<GameData>\n<Row A=\"1\"B=\"2\"/>\n<!-- trailing";
        let offset = text.find("B=").unwrap();
        assert_eq!(blank_unterminated_comments(text, &failure(FailureKind::Syntax, offset)), None);
    }

    #[test]
    fn duplicate_root_is_merged() {
        let text = "<GameData><A/></GameData>\n<GameData><B/></GameData>";
        let offset = text.rfind("<GameData>").unwrap();
        let kind = FailureKind::DuplicateRoot {
            name: "GameData".to_string(),
        };
        let patched = merge_duplicate_root(text, &failure(kind, offset)).unwrap();
        assert_eq!(patched, "<GameData><A/>\n<B/></GameData>");
    }
}
