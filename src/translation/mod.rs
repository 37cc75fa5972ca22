use std::borrow::Cow;

mod parsers;
mod scanner;

use parsers::{
    is_block_comment_end, is_block_comment_start, is_escaped_percent, is_format_placeholder,
    is_line_comment_start,
};
use scanner::State;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Marker {
    /// `%s`
    Placeholder,
    /// `%%`
    Percent,
}

/// Walk `sql` and report every `%s` / `%%` found outside string literals, quoted identifiers and
/// comments. Both markers are two bytes wide.
fn scan_markers(sql: &str, mut visit: impl FnMut(Marker, usize)) {
    let bytes = sql.as_bytes();
    let mut state = State::Normal;
    let mut idx = 0;

    while idx < bytes.len() {
        let b = bytes[idx];
        match state {
            State::Normal => match b {
                b'\'' => state = State::SingleQuoted,
                b'"' => state = State::DoubleQuoted,
                b'`' => state = State::Backticked,
                _ if is_line_comment_start(bytes, idx) => state = State::LineComment,
                _ if is_block_comment_start(bytes, idx) => {
                    state = State::BlockComment(1);
                    idx += 1;
                }
                _ if is_format_placeholder(bytes, idx) => {
                    visit(Marker::Placeholder, idx);
                    idx += 1;
                }
                _ if is_escaped_percent(bytes, idx) => {
                    visit(Marker::Percent, idx);
                    idx += 1;
                }
                _ => {}
            },
            State::SingleQuoted | State::DoubleQuoted | State::Backticked => {
                if Some(b) == state.closing_quote() {
                    if bytes.get(idx + 1) == Some(&b) {
                        idx += 1; // doubled quote is an escape
                    } else {
                        state = State::Normal;
                    }
                }
            }
            State::LineComment => {
                if b == b'\n' {
                    state = State::Normal;
                }
            }
            State::BlockComment(depth) => {
                if is_block_comment_start(bytes, idx) {
                    state = State::BlockComment(depth + 1);
                    idx += 1;
                } else if is_block_comment_end(bytes, idx) {
                    state = if depth == 1 {
                        State::Normal
                    } else {
                        State::BlockComment(depth - 1)
                    };
                    idx += 1;
                }
            }
        }
        idx += 1;
    }
}

/// Rewrite `%s` placeholders into SQLite's numbered `?N` form and unescape `%%`.
///
/// Quoted strings, back-quoted identifiers and comments are copied untouched. Returns a borrowed
/// `Cow` when nothing needs rewriting.
#[must_use]
pub fn translate_placeholders(sql: &str) -> Cow<'_, str> {
    let mut out: Option<String> = None;
    let mut copied_until = 0;
    let mut next_index = 1;

    scan_markers(sql, |marker, idx| {
        let buf = out.get_or_insert_with(|| String::with_capacity(sql.len() + 8));
        buf.push_str(&sql[copied_until..idx]);
        match marker {
            Marker::Placeholder => {
                buf.push('?');
                buf.push_str(&next_index.to_string());
                next_index += 1;
            }
            Marker::Percent => buf.push('%'),
        }
        copied_until = idx + 2;
    });

    match out {
        Some(mut buf) => {
            buf.push_str(&sql[copied_until..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(sql),
    }
}

/// Number of `%s` placeholders outside literals and comments.
#[must_use]
pub fn count_placeholders(sql: &str) -> usize {
    let mut count = 0;
    scan_markers(sql, |marker, _| {
        if marker == Marker::Placeholder {
            count += 1;
        }
    });
    count
}
