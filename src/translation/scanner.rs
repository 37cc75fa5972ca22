#[derive(Clone, Copy, PartialEq, Eq)]
pub(super) enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    Backticked,
    LineComment,
    BlockComment(u32),
}

impl State {
    /// Closing quote byte for the quoted states.
    pub(super) fn closing_quote(self) -> Option<u8> {
        match self {
            State::SingleQuoted => Some(b'\''),
            State::DoubleQuoted => Some(b'"'),
            State::Backticked => Some(b'`'),
            _ => None,
        }
    }
}
