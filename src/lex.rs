/// #Notes
/// `-` could be an operator or the start of a negative number. This lexer
///  does not attempt to distinguish: it always becomes a Minus token and the
///  parser applies negation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenType {
    ParenLeft,
    ParenRight,
    BraceLeft,
    BraceRight,
    BracketLeft,
    BracketRight,
    Comma,
    Dot,
    Question,
    Colon,
    Plus,
    Minus,
    Asterisk,
    ForwardSlash,
    Percent,
    Arrow,     // =>
    Equals,    // ==
    NotEquals, // !=
    Bang,      // !
    LT,        // <
    GT,        // >
    LTE,       // <=
    GTE,       // >=
    And,       // &&
    Or,        // ||
    Number,
    Identifier,
    String,         // "with \"escapes\""
    VerbatimString, // @"with ""doubled"" quotes"
    Char,           // 'c'
    True,
    False,
    Null,
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub ty: TokenType,

    // Byte indexes into the source
    start: usize,
    end: usize,
}

impl Token {
    pub fn start(&self) -> usize {
        self.start
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} at {}", self.ty, self.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("unterminated literal starting at {0}")]
    UnterminatedStringLiteral(usize),
    #[error("unexpected character at {0}")]
    UnexpectedCharacter(usize),
}

/// This type simply holds a reference to the source bytes and an index, so it's
///  cheap to copy, making lookahead/rewind operations in the parser very easy.
#[derive(Clone)]
pub struct Lexer<'input> {
    source: &'input [u8],
    current: usize,
}

impl<'input> Lexer<'input> {
    pub fn new(source: &'input [u8]) -> Self {
        Self { source, current: 0 }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current >= self.source.len()
    }

    #[inline]
    pub fn peek(&self) -> Option<u8> {
        self.source.get(self.current).copied()
    }

    #[inline]
    pub fn peek_at(&self, at: usize) -> Option<u8> {
        self.source.get(self.current + at).copied()
    }

    /// If current starts with [prefix], consume it and return true.
    pub fn consume1(&mut self, prefix: u8) -> bool {
        if let Some(c) = self.peek()
            && c == prefix
        {
            self.current += 1;
            true
        } else {
            false
        }
    }

    #[inline]
    fn consume_while(&mut self, predicate: impl Fn(u8) -> bool) {
        while let Some(c) = self.peek()
            && predicate(c)
        {
            self.current += 1;
        }
    }

    #[inline]
    fn consume_whitespace(&mut self) {
        self.consume_while(|b| b.is_ascii_whitespace());
    }

    fn consume_number(&mut self) {
        self.consume_while(|b| b.is_ascii_digit());

        // A dot only continues the number when a digit follows: `1.ToString()`
        //  is a member access
        if self.peek() == Some(b'.')
            && let Some(b'0'..=b'9') = self.peek_at(1)
        {
            self.current += 1;
            self.consume_while(|b| b.is_ascii_digit());
        }

        // Type suffixes: 10L, 1.5m, 2f, 3UL
        self.consume_while(|b| matches!(b.to_ascii_lowercase(), b'l' | b'u' | b'm' | b'd' | b'f'));
    }

    /// Consumes up to and including the closing `term`. Backslash escapes the
    ///  next byte unless `verbatim`, in which case a doubled `term` is literal.
    fn consume_quoted(&mut self, term: u8, verbatim: bool, start: usize) -> Result<(), Error> {
        loop {
            match self.peek() {
                None => return Err(Error::UnterminatedStringLiteral(start)),
                Some(b'\\') if !verbatim => {
                    self.current += 1;
                    if self.is_empty() {
                        return Err(Error::UnterminatedStringLiteral(start));
                    }
                    self.current += 1;
                }
                Some(b) if b == term => {
                    self.current += 1;
                    if verbatim && self.consume1(term) {
                        continue;
                    }
                    return Ok(());
                }
                Some(_) => self.current += 1,
            }
        }
    }

    /// Returns the slice of the source that this token was lexed from.
    #[inline]
    pub fn source_of(&self, token: &Token) -> &'input [u8] {
        &self.source[token.start..token.end]
    }

    /// Like [source_of] but omits the quotes (and `@`) of string and char
    ///  literal tokens. Escapes are left for the parser.
    #[inline]
    pub fn contents(&self, token: &Token) -> &'input [u8] {
        let s = self.source_of(token);
        match token.ty {
            TokenType::String | TokenType::Char => &s[1..s.len() - 1],
            TokenType::VerbatimString => &s[2..s.len() - 1],
            _ => s,
        }
    }

    /// The next token without consuming it.
    pub fn peek_token(&self) -> Result<Option<Token>, Error> {
        self.clone().next_token()
    }

    /// Consumes the next token if it is a `ty`.
    pub fn consume(&mut self, ty: TokenType) -> Result<bool, Error> {
        let mut ahead = self.clone();
        match ahead.next_token()? {
            Some(tok) if tok.ty == ty => {
                *self = ahead;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, Error> {
        self.consume_whitespace();

        let Some(first) = self.peek() else {
            return Ok(None);
        };
        let start = self.current;
        self.current += 1;

        // Convenience macro for returning a token from `start` to `self.current`
        // The match below will borrow self as mutable, so a simple closure won't
        //  do the trick.
        macro_rules! tok {
            ($name:ident) => {{
                Token {
                    ty: TokenType::$name,
                    start,
                    end: self.current,
                }
            }};
        }

        Ok(Some(match first {
            b'(' => tok!(ParenLeft),
            b')' => tok!(ParenRight),
            b'{' => tok!(BraceLeft),
            b'}' => tok!(BraceRight),
            b'[' => tok!(BracketLeft),
            b']' => tok!(BracketRight),
            b',' => tok!(Comma),
            b'.' => tok!(Dot),
            b'?' => tok!(Question),
            b':' => tok!(Colon),
            b'+' => tok!(Plus),
            b'-' => tok!(Minus),
            b'*' => tok!(Asterisk),
            b'/' => tok!(ForwardSlash),
            b'%' => tok!(Percent),
            b'=' => {
                if self.consume1(b'>') {
                    tok!(Arrow)
                } else if self.consume1(b'=') {
                    tok!(Equals)
                } else {
                    return Err(Error::UnexpectedCharacter(start));
                }
            }
            b'!' => {
                if self.consume1(b'=') {
                    tok!(NotEquals)
                } else {
                    tok!(Bang)
                }
            }
            b'<' => {
                if self.consume1(b'=') {
                    tok!(LTE)
                } else {
                    tok!(LT)
                }
            }
            b'>' => {
                if self.consume1(b'=') {
                    tok!(GTE)
                } else {
                    tok!(GT)
                }
            }
            b'&' if self.consume1(b'&') => tok!(And),
            b'|' if self.consume1(b'|') => tok!(Or),

            b'"' => {
                self.consume_quoted(b'"', false, start)?;
                tok!(String)
            }
            b'@' if self.consume1(b'"') => {
                self.consume_quoted(b'"', true, start)?;
                tok!(VerbatimString)
            }
            b'\'' => {
                self.consume_quoted(b'\'', false, start)?;
                tok!(Char)
            }

            // Identifiers start with a-Z or underscore
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                self.consume_while(|b| matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_'));
                match &self.source[start..self.current] {
                    b"true" => tok!(True),
                    b"false" => tok!(False),
                    b"null" => tok!(Null),
                    b"new" => tok!(New),
                    _ => tok!(Identifier),
                }
            }

            b'0'..=b'9' => {
                self.consume_number();
                tok!(Number)
            }
            _ => return Err(Error::UnexpectedCharacter(start)),
        }))
    }
}
