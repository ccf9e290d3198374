//! Character classifier for JS-style object literal text.
//!
//! Every character is classified exactly once as code, string delimiter,
//! string body, or comment. Later stages (balanced extraction, normalization)
//! only look at `Code` characters when deciding structure.

use std::iter::Peekable;
use std::str::CharIndices;

/// The three string quote styles accepted in data dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuoteKind {
    Double,
    Single,
    Backtick,
}

impl QuoteKind {
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '"' => Some(QuoteKind::Double),
            '\'' => Some(QuoteKind::Single),
            '`' => Some(QuoteKind::Backtick),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            QuoteKind::Double => '"',
            QuoteKind::Single => '\'',
            QuoteKind::Backtick => '`',
        }
    }

    /// Back-quoted strings may span lines; the other two end at a raw newline.
    fn spans_lines(self) -> bool {
        matches!(self, QuoteKind::Backtick)
    }
}

/// Classification of a single character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    /// Structural or literal text outside strings and comments
    Code,
    /// Code character neutralized by a preceding backslash
    Escaped,
    /// Quote that opens a string
    OpenQuote(QuoteKind),
    /// Quote that closes the string it matches
    CloseQuote(QuoteKind),
    /// Content between the delimiters, escape sequences included
    StringBody(QuoteKind),
    /// Part of a `//` or `/* */` comment, markers included
    Comment,
}

impl CharClass {
    /// True for delimiters and body characters of a string literal
    pub fn in_string(self) -> bool {
        matches!(
            self,
            CharClass::OpenQuote(_) | CharClass::CloseQuote(_) | CharClass::StringBody(_)
        )
    }
}

/// One classified character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scanned {
    /// Byte offset into the scanned text
    pub pos: usize,
    pub ch: char,
    pub class: CharClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code { escaped: bool },
    String { quote: QuoteKind, escaped: bool },
    LineComment,
    BlockCommentOpen,
    BlockComment,
    BlockCommentClose,
}

/// Iterator over the characters of a text, tagged with their [`CharClass`].
///
/// Malformed input never stops the scan: an unterminated back-quoted string
/// or block comment simply runs to end-of-text, and a raw newline ends an
/// unterminated single- or double-quoted string.
pub struct Scanner<'a> {
    chars: Peekable<CharIndices<'a>>,
    state: State,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
            state: State::Code { escaped: false },
        }
    }

    /// Quote style of the string open after the last consumed character
    pub fn open_quote(&self) -> Option<QuoteKind> {
        match self.state {
            State::String { quote, .. } => Some(quote),
            _ => None,
        }
    }

    /// Whether the last consumed character left the scanner inside a string
    pub fn in_string(&self) -> bool {
        self.open_quote().is_some()
    }

    fn classify(&mut self, ch: char, next: Option<char>) -> CharClass {
        match self.state {
            State::Code { escaped: true } => {
                self.state = State::Code { escaped: false };
                CharClass::Escaped
            }
            State::Code { escaped: false } => {
                if ch == '\\' {
                    self.state = State::Code { escaped: true };
                    CharClass::Code
                } else if let Some(quote) = QuoteKind::from_char(ch) {
                    self.state = State::String { quote, escaped: false };
                    CharClass::OpenQuote(quote)
                } else if ch == '/' && next == Some('/') {
                    self.state = State::LineComment;
                    CharClass::Comment
                } else if ch == '/' && next == Some('*') {
                    self.state = State::BlockCommentOpen;
                    CharClass::Comment
                } else {
                    CharClass::Code
                }
            }
            State::String { quote, escaped: true } => {
                // `\` before CRLF escapes both characters
                let crlf = ch == '\r' && next == Some('\n');
                self.state = State::String { quote, escaped: crlf };
                CharClass::StringBody(quote)
            }
            State::String { quote, escaped: false } => {
                if ch == '\\' {
                    self.state = State::String { quote, escaped: true };
                    CharClass::StringBody(quote)
                } else if ch == quote.as_char() {
                    self.state = State::Code { escaped: false };
                    CharClass::CloseQuote(quote)
                } else if ch == '\n' && !quote.spans_lines() {
                    self.state = State::Code { escaped: false };
                    CharClass::Code
                } else {
                    CharClass::StringBody(quote)
                }
            }
            State::LineComment => {
                if ch == '\n' {
                    self.state = State::Code { escaped: false };
                    CharClass::Code
                } else {
                    CharClass::Comment
                }
            }
            State::BlockCommentOpen => {
                self.state = State::BlockComment;
                CharClass::Comment
            }
            State::BlockComment => {
                if ch == '*' && next == Some('/') {
                    self.state = State::BlockCommentClose;
                }
                CharClass::Comment
            }
            State::BlockCommentClose => {
                self.state = State::Code { escaped: false };
                CharClass::Comment
            }
        }
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Scanned;

    fn next(&mut self) -> Option<Scanned> {
        let (pos, ch) = self.chars.next()?;
        let next = self.chars.peek().map(|&(_, c)| c);
        let class = self.classify(ch, next);
        Some(Scanned { pos, ch, class })
    }
}

/// Quote style of the string literal covering byte offset `pos`, if any.
///
/// Delimiters count as part of their string. Offsets past the end of the text
/// report the state left by an unterminated string, if one is still open.
pub fn string_state_at(text: &str, pos: usize) -> Option<QuoteKind> {
    let mut scanner = Scanner::new(text);
    while let Some(item) = scanner.next() {
        if item.pos == pos {
            return match item.class {
                CharClass::OpenQuote(q) | CharClass::CloseQuote(q) | CharClass::StringBody(q) => {
                    Some(q)
                }
                _ => None,
            };
        }
        if item.pos > pos {
            return None;
        }
    }
    scanner.open_quote()
}
