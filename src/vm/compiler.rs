use tracing::debug;

use crate::error::{CompileError, ErrorLocation};
use crate::scanner::Scanner;
use crate::scanner::token::{Token, TokenKind};
use crate::vm::chunk::{Chunk, OpCode};
use crate::vm::value::Value;

/// Operator binding power, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    None,
    Assignment, // =
    Or,         // or
    And,        // and
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    /// The next tighter level; used by binary operators to stay left-associative.
    pub fn next(self) -> Self {
        match self {
            Self::None => Self::Assignment,
            Self::Assignment => Self::Or,
            Self::Or => Self::And,
            Self::And => Self::Equality,
            Self::Equality => Self::Comparison,
            Self::Comparison => Self::Term,
            Self::Term => Self::Factor,
            Self::Factor => Self::Unary,
            Self::Unary => Self::Call,
            Self::Call | Self::Primary => Self::Primary,
        }
    }
}

type ParseFn = for<'src, 'c> fn(&mut Compiler<'src, 'c>);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

impl ParseRule {
    fn new(prefix: Option<ParseFn>, infix: Option<ParseFn>, precedence: Precedence) -> Self {
        Self {
            prefix,
            infix,
            precedence,
        }
    }
}

/// Deepest nesting of prefix operators and groupings a single expression may use.
pub const MAX_NESTING: usize = 256;

fn rule(kind: TokenKind) -> ParseRule {
    use TokenKind as T;
    match kind {
        T::LeftParen => ParseRule::new(Some(grouping), None, Precedence::None),
        T::Minus => ParseRule::new(Some(unary), Some(binary), Precedence::Term),
        T::Plus => ParseRule::new(None, Some(binary), Precedence::Term),
        T::Slash | T::Star => ParseRule::new(None, Some(binary), Precedence::Factor),
        T::Bang => ParseRule::new(Some(unary), None, Precedence::None),
        T::BangEqual | T::EqualEqual => ParseRule::new(None, Some(binary), Precedence::Equality),
        T::Greater | T::GreaterEqual | T::Less | T::LessEqual => {
            ParseRule::new(None, Some(binary), Precedence::Comparison)
        }
        T::Number => ParseRule::new(Some(number), None, Precedence::None),
        T::String => ParseRule::new(Some(string), None, Precedence::None),
        T::False | T::Nil | T::True => ParseRule::new(Some(literal), None, Precedence::None),
        _ => ParseRule::new(None, None, Precedence::None),
    }
}

/// Single-pass compiler: pulls tokens from the scanner with one token of
/// lookahead and writes bytecode straight into the target chunk.
pub struct Compiler<'src, 'c> {
    scanner: Scanner<'src>,
    current: Token<'src>,
    previous: Token<'src>,
    chunk: &'c mut Chunk,
    had_error: bool,
    panic_mode: bool,
    error: Option<CompileError>,
    depth: usize,
}

impl<'src, 'c> Compiler<'src, 'c> {
    pub fn new(source: &'src str, chunk: &'c mut Chunk) -> Self {
        let start = Token::new(TokenKind::Eof, "", 1, 0);
        Self {
            scanner: Scanner::new(source),
            current: start,
            previous: start,
            chunk,
            had_error: false,
            panic_mode: false,
            error: None,
            depth: 0,
        }
    }

    /// Compile one expression followed by end of input.
    ///
    /// Returns the first diagnostic when anything went wrong; the chunk must
    /// then be discarded even though it may hold instructions.
    pub fn compile(mut self) -> Result<(), CompileError> {
        self.advance();
        expression(&mut self);
        self.consume(TokenKind::Eof, "Expected end of expression.");
        self.end_compiler();
        match self.error {
            Some(err) if self.had_error => Err(err),
            _ => Ok(()),
        }
    }

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if !self.current.is_error() {
                break;
            }
            let message = self.current.lexeme;
            self.error_at_current(message);
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        if self.depth >= MAX_NESTING {
            self.error_at_current("Expression nested too deeply.");
            return;
        }
        self.depth += 1;
        self.parse_operand(precedence);
        self.depth -= 1;
    }

    fn parse_operand(&mut self, precedence: Precedence) {
        self.advance();
        let Some(prefix) = rule(self.previous.kind).prefix else {
            self.error("Expected expression.");
            return;
        };
        prefix(self);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                infix(self);
            }
        }
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.chunk.write_op(op, line);
    }

    fn emit_constant(&mut self, value: Value) {
        let line = self.previous.line;
        if let Err(overflow) = self.chunk.write_constant(value, line) {
            self.error(&overflow.to_string());
        }
    }

    fn end_compiler(&mut self) {
        self.emit_op(OpCode::Return);
        if !self.had_error {
            debug!("compiled chunk\n{}", self.chunk.disassemble("code"));
        }
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;

        let err = match token.kind {
            TokenKind::Error => CompileError::scan(message, token.line, token.offset, 1),
            TokenKind::Eof => {
                CompileError::parse(message, ErrorLocation::End, token.line, token.offset, 0)
            }
            _ => CompileError::parse(
                message,
                ErrorLocation::Lexeme(token.lexeme.to_string()),
                token.line,
                token.offset,
                token.lexeme.len(),
            ),
        };
        debug!(line = token.line, "{err}");
        self.error = Some(err);
    }
}

/// Compile `source` into `chunk`.
pub fn compile(source: &str, chunk: &mut Chunk) -> Result<(), CompileError> {
    Compiler::new(source, chunk).compile()
}

fn expression(c: &mut Compiler<'_, '_>) {
    c.parse_precedence(Precedence::Assignment);
}

fn grouping(c: &mut Compiler<'_, '_>) {
    expression(c);
    c.consume(TokenKind::RightParen, "Expected ')' after expression.");
}

fn number(c: &mut Compiler<'_, '_>) {
    match c.previous.lexeme.parse::<f64>() {
        Ok(n) => c.emit_constant(Value::Number(n)),
        // unreachable for scanner output, which is always digits[.digits]
        Err(_) => c.error("Invalid number literal."),
    }
}

fn string(c: &mut Compiler<'_, '_>) {
    let lexeme = c.previous.lexeme;
    let text = lexeme
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(lexeme);
    c.emit_constant(Value::String(text.to_string()));
}

fn literal(c: &mut Compiler<'_, '_>) {
    match c.previous.kind {
        TokenKind::False => c.emit_op(OpCode::False),
        TokenKind::Nil => c.emit_op(OpCode::Nil),
        TokenKind::True => c.emit_op(OpCode::True),
        _ => {}
    }
}

fn unary(c: &mut Compiler<'_, '_>) {
    let operator = c.previous.kind;
    c.parse_precedence(Precedence::Unary);
    match operator {
        TokenKind::Minus => c.emit_op(OpCode::Negate),
        TokenKind::Bang => c.emit_op(OpCode::Not),
        _ => {}
    }
}

fn binary(c: &mut Compiler<'_, '_>) {
    let operator = c.previous.kind;
    c.parse_precedence(rule(operator).precedence.next());

    let op = match operator {
        TokenKind::Plus => OpCode::Add,
        TokenKind::Minus => OpCode::Subtract,
        TokenKind::Star => OpCode::Multiply,
        TokenKind::Slash => OpCode::Divide,
        TokenKind::EqualEqual => OpCode::Equal,
        TokenKind::BangEqual => OpCode::NotEqual,
        TokenKind::Greater => OpCode::Greater,
        TokenKind::GreaterEqual => OpCode::GreaterEqual,
        TokenKind::Less => OpCode::Less,
        TokenKind::LessEqual => OpCode::LessEqual,
        _ => return,
    };
    c.emit_op(op);
}
