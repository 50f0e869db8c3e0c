use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Single-character tokens
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Comma,
    Dot,
    Minus,
    Plus,
    Semicolon,
    Slash,
    Star,

    // One or two character tokens
    Bang,
    BangEqual,
    Equal,
    EqualEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,

    // Literals
    Identifier,
    String,
    Number,

    // Keywords
    And,
    Class,
    Else,
    False,
    Fun,
    For,
    If,
    Nil,
    Or,
    Print,
    Return,
    Super,
    This,
    True,
    Var,
    While,

    /// Lexical error; the token's lexeme holds the diagnostic message.
    Error,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftParen => write!(f, "("),
            Self::RightParen => write!(f, ")"),
            Self::LeftBrace => write!(f, "{{"),
            Self::RightBrace => write!(f, "}}"),
            Self::Comma => write!(f, ","),
            Self::Dot => write!(f, "."),
            Self::Minus => write!(f, "-"),
            Self::Plus => write!(f, "+"),
            Self::Semicolon => write!(f, ";"),
            Self::Slash => write!(f, "/"),
            Self::Star => write!(f, "*"),
            Self::Bang => write!(f, "!"),
            Self::BangEqual => write!(f, "!="),
            Self::Equal => write!(f, "="),
            Self::EqualEqual => write!(f, "=="),
            Self::Greater => write!(f, ">"),
            Self::GreaterEqual => write!(f, ">="),
            Self::Less => write!(f, "<"),
            Self::LessEqual => write!(f, "<="),
            Self::Identifier => write!(f, "IDENTIFIER"),
            Self::String => write!(f, "STRING"),
            Self::Number => write!(f, "NUMBER"),
            Self::And => write!(f, "and"),
            Self::Class => write!(f, "class"),
            Self::Else => write!(f, "else"),
            Self::False => write!(f, "false"),
            Self::Fun => write!(f, "fun"),
            Self::For => write!(f, "for"),
            Self::If => write!(f, "if"),
            Self::Nil => write!(f, "nil"),
            Self::Or => write!(f, "or"),
            Self::Print => write!(f, "print"),
            Self::Return => write!(f, "return"),
            Self::Super => write!(f, "super"),
            Self::This => write!(f, "this"),
            Self::True => write!(f, "true"),
            Self::Var => write!(f, "var"),
            Self::While => write!(f, "while"),
            Self::Error => write!(f, "ERROR"),
            Self::Eof => write!(f, "EOF"),
        }
    }
}

/// A token borrowed from the source buffer it was scanned from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub lexeme: &'src str,
    pub line: usize,
    /// Byte offset of the lexeme in the source, used for diagnostic spans.
    pub offset: usize,
}

impl<'src> Token<'src> {
    pub fn new(kind: TokenKind, lexeme: &'src str, line: usize, offset: usize) -> Self {
        Self {
            kind,
            lexeme,
            line,
            offset,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == TokenKind::Error
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:4} {:?} '{}'", self.line, self.kind, self.lexeme)
    }
}

/// Resolve an identifier run to its keyword kind, dispatching on the first
/// character and matching the remaining suffix exactly.
pub fn identifier_kind(ident: &str) -> TokenKind {
    let bytes = ident.as_bytes();
    match bytes.first() {
        Some(b'a') => check_keyword(ident, 1, "nd", TokenKind::And),
        Some(b'c') => check_keyword(ident, 1, "lass", TokenKind::Class),
        Some(b'e') => check_keyword(ident, 1, "lse", TokenKind::Else),
        Some(b'f') => match bytes.get(1) {
            Some(b'a') => check_keyword(ident, 2, "lse", TokenKind::False),
            Some(b'o') => check_keyword(ident, 2, "r", TokenKind::For),
            Some(b'u') => check_keyword(ident, 2, "n", TokenKind::Fun),
            _ => TokenKind::Identifier,
        },
        Some(b'i') => check_keyword(ident, 1, "f", TokenKind::If),
        Some(b'n') => check_keyword(ident, 1, "il", TokenKind::Nil),
        Some(b'o') => check_keyword(ident, 1, "r", TokenKind::Or),
        Some(b'p') => check_keyword(ident, 1, "rint", TokenKind::Print),
        Some(b'r') => check_keyword(ident, 1, "eturn", TokenKind::Return),
        Some(b's') => check_keyword(ident, 1, "uper", TokenKind::Super),
        Some(b't') => match bytes.get(1) {
            Some(b'h') => check_keyword(ident, 2, "is", TokenKind::This),
            Some(b'r') => check_keyword(ident, 2, "ue", TokenKind::True),
            _ => TokenKind::Identifier,
        },
        Some(b'v') => check_keyword(ident, 1, "ar", TokenKind::Var),
        Some(b'w') => check_keyword(ident, 1, "hile", TokenKind::While),
        _ => TokenKind::Identifier,
    }
}

fn check_keyword(ident: &str, start: usize, rest: &str, kind: TokenKind) -> TokenKind {
    if ident.get(start..) == Some(rest) {
        kind
    } else {
        TokenKind::Identifier
    }
}
