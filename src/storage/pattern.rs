//! Glob matching for the `KEYS` command.
//!
//! Supports `*`, `?`, character classes (`[abc]`, `[^abc]`, `[a-z]`) and
//! `\` escapes. Matching works on raw bytes so binary keys are handled.

/// Returns true if `text` matches the glob `pattern`.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    if pattern.is_empty() {
        return text.is_empty();
    }

    match pattern[0] {
        b'*' => {
            let rest = &pattern[1..];
            if rest.is_empty() {
                return true;
            }
            (0..=text.len()).any(|i| glob_match(rest, &text[i..]))
        }
        b'?' => !text.is_empty() && glob_match(&pattern[1..], &text[1..]),
        b'[' => {
            if text.is_empty() {
                return false;
            }
            match match_class(&pattern[1..], text[0]) {
                Some((matched, class_len)) => {
                    matched && glob_match(&pattern[1 + class_len..], &text[1..])
                }
                // Unterminated class: treat '[' as a literal.
                None => text[0] == b'[' && glob_match(&pattern[1..], &text[1..]),
            }
        }
        b'\\' if pattern.len() > 1 => {
            !text.is_empty() && pattern[1] == text[0] && glob_match(&pattern[2..], &text[1..])
        }
        c => !text.is_empty() && c == text[0] && glob_match(&pattern[1..], &text[1..]),
    }
}

/// Matches `c` against a class body (the bytes after `[`).
///
/// Returns whether it matched and how many bytes the body used, closing
/// `]` included, or None if the class never closes.
fn match_class(class: &[u8], c: u8) -> Option<(bool, usize)> {
    let mut i = 0;
    let negate = class.first() == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < class.len() && class[i] != b']' {
        if class[i] == b'\\' && i + 1 < class.len() {
            matched |= class[i + 1] == c;
            i += 2;
            continue;
        }
        if i + 2 < class.len() && class[i + 1] == b'-' && class[i + 2] != b']' {
            let (lo, hi) = if class[i] <= class[i + 2] {
                (class[i], class[i + 2])
            } else {
                (class[i + 2], class[i])
            };
            matched |= lo <= c && c <= hi;
            i += 3;
            continue;
        }
        matched |= class[i] == c;
        i += 1;
    }

    if i >= class.len() {
        return None;
    }

    Some((matched != negate, i + 1))
}
