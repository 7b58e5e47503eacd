use std::collections::VecDeque;

use super::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,

    // Identifiers & keywords
    Ident(String),
    /// `@container.key` with the leading `@` stripped.
    BindVariable(String),
    If,
    Else,
    While,
    Record,

    // Type names
    IntTy,
    FloatTy,
    StringTy,
    BoolTy,
    VoidTy,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Question, // ?

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Lt,
    Gt,
    Le,   // <=
    Ge,   // >=
    EqEq, // ==
    Ne,   // !=
    And,  // &&
    Or,   // ||
    Bang, // !
    Eq,   // =

    Eof,
}

impl Token {
    /// Human-readable spelling for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Int(n) => n.to_string(),
            Token::Float(f) => format!("{f:?}"),
            Token::Str(s) => format!("\"{s}\""),
            Token::Bool(b) => b.to_string(),
            Token::Null => "null".into(),
            Token::Ident(name) => format!("identifier '{name}'"),
            Token::BindVariable(name) => format!("@{name}"),
            Token::Eof => "end of input".into(),
            other => format!("'{}'", other.spelling()),
        }
    }

    fn spelling(&self) -> &'static str {
        match self {
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Record => "record",
            Token::IntTy => "int",
            Token::FloatTy => "float",
            Token::StringTy => "string",
            Token::BoolTy => "bool",
            Token::VoidTy => "void",
            _ => TWO_CHAR
                .iter()
                .chain(ONE_CHAR.iter())
                .find(|(_, t)| t == self)
                .map_or("?", |(s, _)| *s),
        }
    }
}

/// Two-character operators. Always tried before [`ONE_CHAR`].
const TWO_CHAR: &[(&str, Token)] = &[
    ("==", Token::EqEq),
    ("!=", Token::Ne),
    (">=", Token::Ge),
    ("<=", Token::Le),
    ("&&", Token::And),
    ("||", Token::Or),
];

const ONE_CHAR: &[(&str, Token)] = &[
    ("+", Token::Plus),
    ("-", Token::Minus),
    ("*", Token::Star),
    ("/", Token::Slash),
    (">", Token::Gt),
    ("<", Token::Lt),
    ("=", Token::Eq),
    ("!", Token::Bang),
    ("?", Token::Question),
    (":", Token::Colon),
    (";", Token::Semicolon),
    (",", Token::Comma),
    (".", Token::Dot),
    ("(", Token::LParen),
    (")", Token::RParen),
    ("{", Token::LBrace),
    ("}", Token::RBrace),
];

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
}

/// Tokenize the whole input at once. The parser pulls tokens on demand through
/// [`Lexer`]; this is used by tooling and tests.
pub fn lex(source: &str) -> Result<Vec<SpannedToken>, CompileError> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let tok = lexer.advance()?;
        let done = tok.token == Token::Eof;
        tokens.push(tok);
        if done {
            return Ok(tokens);
        }
    }
}

/// On-demand token stream with up to two tokens of lookahead.
pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    buffer: VecDeque<SpannedToken>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            buffer: VecDeque::new(),
        }
    }

    /// Line of the next unread token.
    pub fn line(&mut self) -> usize {
        let current = self.line;
        self.peek().map_or(current, |t| t.line)
    }

    pub fn peek(&mut self) -> Result<&SpannedToken, CompileError> {
        self.nth(0)
    }

    pub fn lookahead(&mut self) -> Result<&SpannedToken, CompileError> {
        self.nth(1)
    }

    pub fn lookahead2(&mut self) -> Result<&SpannedToken, CompileError> {
        self.nth(2)
    }

    fn nth(&mut self, n: usize) -> Result<&SpannedToken, CompileError> {
        while self.buffer.len() <= n {
            let tok = self.next_token()?;
            self.buffer.push_back(tok);
        }
        self.buffer
            .get(n)
            .ok_or_else(|| CompileError::syntax("unexpected end of input", self.line))
    }

    pub fn advance(&mut self) -> Result<SpannedToken, CompileError> {
        if let Some(tok) = self.buffer.pop_front() {
            return Ok(tok);
        }
        self.next_token()
    }

    /// Consume the next token, which must be `expected`.
    pub fn expect(&mut self, expected: &Token) -> Result<SpannedToken, CompileError> {
        let tok = self.advance()?;
        if &tok.token == expected {
            Ok(tok)
        } else {
            Err(CompileError::syntax(
                format!("expected {}, found {}", expected.describe(), tok.token.describe()),
                tok.line,
            ))
        }
    }

    /// Consume the next token only if it is `expected`.
    pub fn optional_match(&mut self, expected: &Token) -> Result<bool, CompileError> {
        if &self.peek()?.token == expected {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn next_token(&mut self) -> Result<SpannedToken, CompileError> {
        self.skip_whitespace_and_comments()?;
        let line = self.line;
        let Some(&ch) = self.bytes.get(self.pos) else {
            return Ok(SpannedToken {
                token: Token::Eof,
                line,
            });
        };

        let token = match ch {
            b'"' | b'\'' => self.lex_string(ch)?,
            b'0'..=b'9' => self.lex_number()?,
            b'a'..=b'z' | b'A'..=b'Z' => self.lex_ident(),
            b'@' => self.lex_bind_variable()?,
            _ => self.lex_operator()?,
        };
        Ok(SpannedToken { token, line })
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), CompileError> {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b' ' | b'\t' | b'\r' => self.pos += 1,
                b'\n' => {
                    self.line += 1;
                    self.pos += 1;
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    let start_line = self.line;
                    self.pos += 2;
                    loop {
                        match self.bytes.get(self.pos) {
                            None => {
                                return Err(CompileError::lexical(
                                    "unterminated block comment",
                                    start_line,
                                ))
                            }
                            Some(b'*') if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                                self.pos += 2;
                                break;
                            }
                            Some(b'\n') => {
                                self.line += 1;
                                self.pos += 1;
                            }
                            Some(_) => self.pos += 1,
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn lex_operator(&mut self) -> Result<Token, CompileError> {
        let source = self.source;
        let rest = &source[self.pos..];
        for (spelling, token) in TWO_CHAR.iter().chain(ONE_CHAR.iter()) {
            if rest.starts_with(spelling) {
                self.pos += spelling.len();
                return Ok(token.clone());
            }
        }
        let ch = rest.chars().next().unwrap_or('\0');
        Err(CompileError::lexical(
            format!("unrecognized character '{ch}'"),
            self.line,
        ))
    }

    fn lex_string(&mut self, quote: u8) -> Result<Token, CompileError> {
        let start_line = self.line;
        self.pos += 1;
        let mut text = String::new();
        loop {
            let Some(ch) = self.source[self.pos..].chars().next() else {
                return Err(CompileError::lexical("unterminated string literal", start_line));
            };
            self.pos += ch.len_utf8();
            match ch {
                '\n' => {
                    return Err(CompileError::lexical("unterminated string literal", start_line))
                }
                c if c == char::from(quote) => return Ok(Token::Str(text)),
                '\\' => {
                    let escaped = self.source[self.pos..].chars().next();
                    let resolved = match (quote, escaped) {
                        (_, Some('\\')) => '\\',
                        (b'"', Some('"')) => '"',
                        (b'"', Some('n')) => '\n',
                        (b'"', Some('t')) => '\t',
                        (b'"', Some('r')) => '\r',
                        (b'"', Some('0')) => '\0',
                        (b'\'', Some('\'')) => '\'',
                        (_, Some(other)) => {
                            return Err(CompileError::lexical(
                                format!("invalid escape sequence '\\{other}'"),
                                self.line,
                            ))
                        }
                        (_, None) => {
                            return Err(CompileError::lexical(
                                "unterminated string literal",
                                start_line,
                            ))
                        }
                    };
                    self.pos += 1;
                    text.push(resolved);
                }
                c => text.push(c),
            }
        }
    }

    fn lex_number(&mut self) -> Result<Token, CompileError> {
        let start = self.pos;
        let mut dots = 0;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_digit() || self.bytes[self.pos] == b'.')
        {
            if self.bytes[self.pos] == b'.' {
                dots += 1;
            }
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        match dots {
            0 => text.parse::<i64>().map(Token::Int).map_err(|_| {
                CompileError::lexical(format!("integer literal {text} is out of range"), self.line)
            }),
            1 => text
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| CompileError::lexical(format!("malformed number {text}"), self.line)),
            _ => Err(CompileError::lexical(
                format!("malformed number {text}"),
                self.line,
            )),
        }
    }

    fn scan_word(&mut self) -> &'a str {
        let source = self.source;
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        &source[start..self.pos]
    }

    fn lex_ident(&mut self) -> Token {
        let word = self.scan_word();
        match word {
            "if" => Token::If,
            "else" => Token::Else,
            "while" => Token::While,
            "record" => Token::Record,
            "int" => Token::IntTy,
            "float" => Token::FloatTy,
            "string" => Token::StringTy,
            "bool" => Token::BoolTy,
            "void" => Token::VoidTy,
            w if w.eq_ignore_ascii_case("true") => Token::Bool(true),
            w if w.eq_ignore_ascii_case("false") => Token::Bool(false),
            w if w.eq_ignore_ascii_case("null") => Token::Null,
            _ => Token::Ident(word.to_string()),
        }
    }

    fn lex_bind_variable(&mut self) -> Result<Token, CompileError> {
        self.pos += 1; // skip '@'
        if !self.bytes.get(self.pos).is_some_and(u8::is_ascii_alphabetic) {
            return Err(CompileError::lexical(
                "expected a name after '@'",
                self.line,
            ));
        }
        let mut name = self.scan_word().to_string();
        while self.bytes.get(self.pos) == Some(&b'.')
            && self.bytes.get(self.pos + 1).is_some_and(u8::is_ascii_alphabetic)
        {
            self.pos += 1;
            name.push('.');
            name.push_str(self.scan_word());
        }
        Ok(Token::BindVariable(name))
    }
}
