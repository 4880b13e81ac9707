//! Expression lexer (tokenizer).
//!
//! Converts the text inside `{{ }}` or a control tag's condition into a
//! stream of [`Token`]s: literals, identifiers, operators, and punctuation.

use ajinja_rs_core::error::JinjaError;

/// Operators recognised by the lexer, including the word operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Or,
    And,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl Operator {
    /// The operator as written in source.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Not => "not",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::NotIn => "not in",
            Self::Is => "is",
            Self::IsNot => "is not",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "**",
        }
    }
}

/// The kind of a [`Token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Int,
    Float,
    /// A string literal; the token text holds the unescaped contents.
    String,
    True,
    False,
    None,
    Identifier,
    Operator(Operator),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Pipe,
}

/// A token produced by the expression lexer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte offset of the token in the source.
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, text: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            position,
        }
    }
}

const TWO_CHAR_OPERATORS: [(&str, Operator); 6] = [
    ("==", Operator::Eq),
    ("!=", Operator::Ne),
    (">=", Operator::Ge),
    ("<=", Operator::Le),
    ("**", Operator::Pow),
    ("//", Operator::FloorDiv),
];

/// Tokenizes an expression.
///
/// Leading and trailing whitespace is ignored.
///
/// # Errors
///
/// Returns [`JinjaError::LexError`] on an unterminated string literal, a
/// malformed number, or an unexpected character.
pub fn tokenize(source: &str) -> Result<Vec<Token>, JinjaError> {
    Lexer::new(source).run()
}

struct Lexer<'s> {
    source: &'s str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    const fn new(source: &'s str) -> Self {
        Self {
            source,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, JinjaError> {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.pos += ch.len_utf8();
                continue;
            }

            let start = self.pos;
            match ch {
                '\'' | '"' => self.string(ch)?,
                c if c.is_ascii_digit() => self.number()?,
                c if c == '_' || c.is_ascii_alphabetic() => self.word(),
                _ => {
                    if !self.operator_or_punct() {
                        return Err(JinjaError::LexError {
                            message: format!("unexpected character '{ch}'"),
                            position: start,
                        });
                    }
                }
            }
        }
        Ok(self.tokens)
    }

    fn rest(&self) -> &'s str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn push(&mut self, kind: TokenKind, text: impl Into<String>, position: usize) {
        self.tokens.push(Token::new(kind, text, position));
    }

    fn string(&mut self, quote: char) -> Result<(), JinjaError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        let mut chars = self.rest().char_indices();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                c if c == quote => {
                    self.pos += offset + 1;
                    self.push(TokenKind::String, value, start);
                    return Ok(());
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, 'r')) => value.push('\r'),
                    Some((_, c @ ('\\' | '\'' | '"'))) => value.push(c),
                    Some((_, other)) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => break,
                },
                c => value.push(c),
            }
        }

        Err(JinjaError::LexError {
            message: "unterminated string literal".to_string(),
            position: start,
        })
    }

    /// Digits with at most one `.`. Directly after a `.` token only digits
    /// are read, so `items.0.name` lexes as attribute access.
    fn number(&mut self) -> Result<(), JinjaError> {
        let start = self.pos;
        let after_dot = matches!(self.tokens.last(), Some(t) if t.kind == TokenKind::Dot);
        let bytes = self.source.as_bytes();
        let mut end = start;
        let mut seen_dot = after_dot;

        while end < bytes.len() {
            match bytes[end] {
                b'0'..=b'9' => end += 1,
                b'.' if !seen_dot => {
                    seen_dot = true;
                    end += 1;
                }
                _ => break,
            }
        }

        let text = &self.source[start..end];
        self.pos = end;
        if text.contains('.') {
            let value: f64 = text.parse().map_err(|_| JinjaError::LexError {
                message: format!("invalid number '{text}'"),
                position: start,
            })?;
            self.push(TokenKind::Float, value.to_string(), start);
        } else {
            // `-9223372036854775808` only fits once the sign is applied.
            let after_minus = matches!(
                self.tokens.last(),
                Some(t) if t.kind == TokenKind::Operator(Operator::Sub)
            );
            let fits = text.parse::<i64>().is_ok()
                || (after_minus && format!("-{text}").parse::<i64>().is_ok());
            if !fits {
                return Err(JinjaError::LexError {
                    message: format!("integer literal '{text}' is out of range"),
                    position: start,
                });
            }
            self.push(TokenKind::Int, text, start);
        }
        Ok(())
    }

    fn read_identifier(&self, from: usize) -> &'s str {
        let rest = &self.source[from..];
        let len = rest
            .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
            .unwrap_or(rest.len());
        &rest[..len]
    }

    /// If the next non-whitespace word after `from` is `word`, returns the
    /// position just past it.
    fn followed_by_word(&self, from: usize, word: &str) -> Option<usize> {
        let rest = &self.source[from..];
        let skipped = rest.len() - rest.trim_start().len();
        if skipped == 0 {
            return None;
        }
        let at = from + skipped;
        (self.read_identifier(at) == word).then(|| at + word.len())
    }

    fn word(&mut self) {
        let start = self.pos;
        let ident = self.read_identifier(start);
        let after = start + ident.len();

        let (kind, end) = match ident {
            "True" | "true" => (TokenKind::True, after),
            "False" | "false" => (TokenKind::False, after),
            "None" | "none" => (TokenKind::None, after),
            "or" => (TokenKind::Operator(Operator::Or), after),
            "and" => (TokenKind::Operator(Operator::And), after),
            "not" => match self.followed_by_word(after, "in") {
                Some(end) => (TokenKind::Operator(Operator::NotIn), end),
                None => (TokenKind::Operator(Operator::Not), after),
            },
            "is" => match self.followed_by_word(after, "not") {
                Some(end) => (TokenKind::Operator(Operator::IsNot), end),
                None => (TokenKind::Operator(Operator::Is), after),
            },
            "in" => (TokenKind::Operator(Operator::In), after),
            _ => (TokenKind::Identifier, after),
        };

        let text = match kind {
            TokenKind::Operator(op) => op.symbol(),
            _ => ident,
        };
        self.push(kind, text, start);
        self.pos = end;
    }

    fn operator_or_punct(&mut self) -> bool {
        let start = self.pos;
        let rest = self.rest();

        for (symbol, op) in TWO_CHAR_OPERATORS {
            if rest.starts_with(symbol) {
                self.push(TokenKind::Operator(op), symbol, start);
                self.pos += 2;
                return true;
            }
        }

        let kind = match rest.as_bytes().first() {
            Some(b'+') => TokenKind::Operator(Operator::Add),
            Some(b'-') => TokenKind::Operator(Operator::Sub),
            Some(b'*') => TokenKind::Operator(Operator::Mul),
            Some(b'/') => TokenKind::Operator(Operator::Div),
            Some(b'%') => TokenKind::Operator(Operator::Mod),
            Some(b'<') => TokenKind::Operator(Operator::Lt),
            Some(b'>') => TokenKind::Operator(Operator::Gt),
            Some(b'(') => TokenKind::LParen,
            Some(b')') => TokenKind::RParen,
            Some(b'[') => TokenKind::LBracket,
            Some(b']') => TokenKind::RBracket,
            Some(b'{') => TokenKind::LBrace,
            Some(b'}') => TokenKind::RBrace,
            Some(b',') => TokenKind::Comma,
            Some(b'.') => TokenKind::Dot,
            Some(b':') => TokenKind::Colon,
            Some(b'|') => TokenKind::Pipe,
            _ => return false,
        };
        self.push(kind, &rest[..1], start);
        self.pos += 1;
        true
    }
}
