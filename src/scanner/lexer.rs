use winnow::combinator::{dispatch, empty, fail, opt};
use winnow::error::ContextError;
use winnow::prelude::*;
use winnow::stream::{LocatingSlice, Location, Stream};
use winnow::token::{any, take_till, take_while};

use crate::scanner::token::{Token, TokenKind, identifier_kind};

type Input<'src> = LocatingSlice<&'src str>;

/// Skip blanks and `//` comments, returning the number of newlines consumed.
fn trivia<'src>(input: &mut Input<'src>) -> ModalResult<usize> {
    let mut newlines = 0;
    loop {
        let blank: &'src str =
            take_while(0.., |c: char| matches!(c, ' ' | '\t' | '\r' | '\n')).parse_next(input)?;
        newlines += blank.matches('\n').count();

        if input.starts_with("//") {
            take_till(0.., '\n').void().parse_next(input)?;
        } else {
            return Ok(newlines);
        }
    }
}

fn identifier<'src>(input: &mut Input<'src>) -> ModalResult<&'src str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)
}

fn number<'src>(input: &mut Input<'src>) -> ModalResult<()> {
    take_while(1.., |c: char| c.is_ascii_digit())
        .void()
        .parse_next(input)?;
    // A '.' only belongs to the number when a digit follows it.
    opt(('.', take_while(1.., |c: char| c.is_ascii_digit())))
        .void()
        .parse_next(input)
}

/// Scan a string literal, returning its body and whether the closing quote was found.
fn string_literal<'src>(input: &mut Input<'src>) -> ModalResult<(&'src str, bool)> {
    '"'.parse_next(input)?;
    let body = take_till(0.., '"').parse_next(input)?;
    let closed = opt('"').parse_next(input)?.is_some();
    Ok((body, closed))
}

fn either(matched: Option<char>, two: TokenKind, one: TokenKind) -> TokenKind {
    if matched.is_some() { two } else { one }
}

fn punctuation(input: &mut Input<'_>) -> ModalResult<TokenKind> {
    dispatch! {any;
        '(' => empty.value(TokenKind::LeftParen),
        ')' => empty.value(TokenKind::RightParen),
        '{' => empty.value(TokenKind::LeftBrace),
        '}' => empty.value(TokenKind::RightBrace),
        ',' => empty.value(TokenKind::Comma),
        '.' => empty.value(TokenKind::Dot),
        '-' => empty.value(TokenKind::Minus),
        '+' => empty.value(TokenKind::Plus),
        ';' => empty.value(TokenKind::Semicolon),
        '/' => empty.value(TokenKind::Slash),
        '*' => empty.value(TokenKind::Star),
        '!' => opt('=').map(|m| either(m, TokenKind::BangEqual, TokenKind::Bang)),
        '=' => opt('=').map(|m| either(m, TokenKind::EqualEqual, TokenKind::Equal)),
        '<' => opt('=').map(|m| either(m, TokenKind::LessEqual, TokenKind::Less)),
        '>' => opt('=').map(|m| either(m, TokenKind::GreaterEqual, TokenKind::Greater)),
        _ => fail,
    }
    .parse_next(input)
}

/// A cursor over fully resident source text that produces tokens on demand.
///
/// Lexical problems never abort scanning: they come back as [`TokenKind::Error`]
/// tokens whose lexeme is the diagnostic message. Once the end of input is
/// reached every further call yields an `Eof` token.
pub struct Scanner<'src> {
    source: &'src str,
    input: Input<'src>,
    line: usize,
    finished: bool,
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            input: LocatingSlice::new(source),
            line: 1,
            finished: false,
        }
    }

    pub fn scan_token(&mut self) -> Token<'src> {
        if let Ok(newlines) = trivia(&mut self.input) {
            self.line += newlines;
        }

        let start = self.input.current_token_start();
        let Some(c) = self.input.chars().next() else {
            return self.make_token(TokenKind::Eof, start);
        };

        if c == '"' {
            return self.string(start);
        }

        let checkpoint = self.input.checkpoint();
        let scanned = if c.is_ascii_alphabetic() || c == '_' {
            identifier.parse_next(&mut self.input).map(identifier_kind)
        } else if c.is_ascii_digit() {
            number
                .parse_next(&mut self.input)
                .map(|()| TokenKind::Number)
        } else {
            punctuation.parse_next(&mut self.input)
        };

        match scanned {
            Ok(kind) => self.make_token(kind, start),
            Err(_) => {
                self.input.reset(&checkpoint);
                let _ = any::<_, ContextError>.parse_next(&mut self.input);
                self.error_token("Unexpected character.", start)
            }
        }
    }

    fn string(&mut self, start: usize) -> Token<'src> {
        match string_literal.parse_next(&mut self.input) {
            Ok((body, closed)) => {
                self.line += body.matches('\n').count();
                if closed {
                    self.make_token(TokenKind::String, start)
                } else {
                    self.error_token("Unterminated string.", start)
                }
            }
            Err(_) => self.error_token("Unterminated string.", start),
        }
    }

    fn make_token(&self, kind: TokenKind, start: usize) -> Token<'src> {
        let end = self.input.current_token_start();
        let lexeme = self.source.get(start..end).unwrap_or_default();
        Token::new(kind, lexeme, self.line, start)
    }

    fn error_token(&self, message: &'static str, start: usize) -> Token<'src> {
        Token::new(TokenKind::Error, message, self.line, start)
    }
}

impl<'src> Iterator for Scanner<'src> {
    type Item = Token<'src>;

    /// Yields every token up to and including the first `Eof`.
    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.scan_token();
        self.finished = token.kind == TokenKind::Eof;
        Some(token)
    }
}
