//! Minimal lexical helpers shared by the rewriting passes

use std::ops::Range;

/// Copy of `text` with the inside of literals, IRIs and comments blanked
///
/// Every masked character becomes as many spaces as it has bytes, so byte
/// offsets into the mask are valid offsets into `text`. Quote characters and
/// the `<`/`>` delimiters are kept; only what they enclose is hidden.
pub(crate) fn mask_opaque(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut quote: Option<char> = None;
    let mut in_iri = false;
    let mut in_comment = false;
    let mut escaped = false;

    let blank = |out: &mut String, c: char| out.extend(std::iter::repeat(' ').take(c.len_utf8()));

    for (i, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
                out.push(c);
                continue;
            }
            blank(&mut out, c);
            continue;
        }
        if in_iri {
            if c == '>' {
                in_iri = false;
                out.push(c);
            } else {
                blank(&mut out, c);
            }
            continue;
        }
        if in_comment {
            if c == '\n' {
                in_comment = false;
                out.push(c);
            } else {
                blank(&mut out, c);
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '<' => in_iri = looks_like_iri(&text.as_bytes()[i + 1..]),
            '#' => {
                in_comment = true;
                blank(&mut out, c);
                continue;
            }
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Index of the `}` that closes the `{` at `open`
///
/// Braces inside quoted literals, IRIs and comments are ignored. Returns
/// `None` when `open` is not a `{` or the block never closes.
pub(crate) fn matching_brace(text: &str, open: usize) -> Option<usize> {
    if text.as_bytes().get(open) != Some(&b'{') {
        return None;
    }
    let masked = mask_opaque(text);

    let mut depth = 0usize;
    for (i, &b) in masked.as_bytes().iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Byte ranges of the operations of a request, split at top-level `;`
///
/// Separators are not part of any range. A `;` inside braces (a predicate
/// list), a literal, an IRI or a comment does not split.
pub(crate) fn operation_ranges(text: &str) -> Vec<Range<usize>> {
    let masked = mask_opaque(text);
    let mut ranges = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, &b) in masked.as_bytes().iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => {
                ranges.push(start..i);
                start = i + 1;
            }
            _ => {}
        }
    }
    ranges.push(start..text.len());
    ranges
}

/// `<` opens an IRI only when a `>` follows before any whitespace.
fn looks_like_iri(rest: &[u8]) -> bool {
    rest.iter()
        .take_while(|b| !b.is_ascii_whitespace())
        .any(|&b| b == b'>')
}
