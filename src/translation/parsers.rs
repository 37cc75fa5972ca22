pub(super) fn is_line_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'-') && bytes.get(idx + 1) == Some(&b'-')
}

pub(super) fn is_block_comment_start(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'/') && bytes.get(idx + 1) == Some(&b'*')
}

pub(super) fn is_block_comment_end(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'*') && bytes.get(idx + 1) == Some(&b'/')
}

/// `%s` placeholder at `idx`.
pub(super) fn is_format_placeholder(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'%') && bytes.get(idx + 1) == Some(&b's')
}

/// `%%` escape at `idx`.
pub(super) fn is_escaped_percent(bytes: &[u8], idx: usize) -> bool {
    bytes.get(idx) == Some(&b'%') && bytes.get(idx + 1) == Some(&b'%')
}
