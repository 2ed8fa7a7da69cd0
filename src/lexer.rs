//! UTF-8 source text to a finite token stream (§4.1).
//!
//! A straightforward character-driven scanner; the "states" named in the
//! spec (`Start, InNumber, InIdent, InString, InPunct`) are just the
//! branches of [`Lexer::next_token`]'s match rather than a literal state
//! enum, since nothing here needs to suspend mid-token.

use std::fmt;
use std::str::Chars;

use crate::error::{Diagnostic, ErrorKind, Position};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Int(i64),
    Float(f64),
    String(String),
    Ident(String),

    True,
    False,
    Null,
    In,
    Matches,
    Contains,
    StartsWith,
    EndsWith,
    And,
    Or,
    Not,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    StarStar,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Question,
    QuestionDot,
    QuestionQuestion,
    Hash,
    Pipe,
    FatArrow,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    AndAnd,
    OrOr,
    Bang,
    Amp,
    Caret,
    Tilde,
    ShiftL,
    ShiftR,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "{n}"),
            TokenKind::Float(n) => write!(f, "{n}"),
            TokenKind::String(s) => write!(f, "{s:?}"),
            TokenKind::Ident(s) => write!(f, "{s}"),
            other => write!(f, "{other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Position,
}

impl Token {
    #[must_use]
    pub fn new(kind: TokenKind, pos: Position) -> Self {
        Self { kind, pos }
    }
}

/// Reserved words whose textual form compiles to an operator or literal
/// rather than staying an `Ident` (§4.1).
fn keyword(word: &str) -> Option<TokenKind> {
    Some(match word {
        "true" => TokenKind::True,
        "false" => TokenKind::False,
        "null" => TokenKind::Null,
        "in" => TokenKind::In,
        "matches" => TokenKind::Matches,
        "contains" => TokenKind::Contains,
        "startsWith" => TokenKind::StartsWith,
        "endsWith" => TokenKind::EndsWith,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        _ => return None,
    })
}

pub struct Lexer<'a> {
    chars: Chars<'a>,
    peeked: Option<char>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        let mut chars = source.chars();
        let peeked = chars.next();
        Self {
            chars,
            peeked,
            line: 1,
            column: 1,
        }
    }

    /// Scans the entire source into a token stream, ending with `Eof`.
    /// Fails on the first illegal character, per §4.1.
    pub fn tokenize(mut self) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let is_eof = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if is_eof {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.peeked
    }

    fn peek2(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peeked?;
        self.peeked = self.chars.next();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek2() == Some('/') => {
                    while !matches!(self.peek(), None | Some('\n')) {
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, Diagnostic> {
        self.skip_whitespace_and_comments();
        let pos = self.pos();
        let Some(c) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, pos));
        };

        if c.is_ascii_digit() {
            return self.lex_number(pos);
        }
        if c == '"' || c == '\'' {
            return self.lex_string(pos, c);
        }
        if c == '_' || c.is_alphabetic() {
            return self.lex_ident(pos);
        }

        self.lex_punct(pos)
    }

    fn lex_number(&mut self, pos: Position) -> Result<Token, Diagnostic> {
        let mut text = String::new();
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            text.push(self.bump().unwrap());
        }
        let mut is_float = false;
        // A `.` only starts a fraction if followed by a digit (so `3.length()`
        // is a member access on the int `3`, not a malformed float) and
        // requires at least one trailing digit (§4.1: "leading/trailing
        // digits required around `.`").
        if self.peek() == Some('.') && self.peek2().is_some_and(|c| c.is_ascii_digit()) {
            is_float = true;
            text.push(self.bump().unwrap());
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                text.push(self.bump().unwrap());
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let mut lookahead = self.chars.clone();
            let mut la_peek = self.peeked;
            let mut exp_text = String::new();
            exp_text.push(la_peek.unwrap());
            la_peek = lookahead.next();
            if matches!(la_peek, Some('+') | Some('-')) {
                exp_text.push(la_peek.unwrap());
                la_peek = lookahead.next();
            }
            if la_peek.is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push(self.bump().unwrap());
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.bump().unwrap());
                }
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    text.push(self.bump().unwrap());
                }
            }
        }
        if is_float {
            let value: f64 = text
                .parse()
                .map_err(|_| Diagnostic::new(ErrorKind::LexicalError, Some(pos), format!("invalid float literal '{text}'")))?;
            Ok(Token::new(TokenKind::Float(value), pos))
        } else {
            let value: i64 = text
                .parse()
                .map_err(|_| Diagnostic::new(ErrorKind::LexicalError, Some(pos), format!("invalid int literal '{text}'")))?;
            Ok(Token::new(TokenKind::Int(value), pos))
        }
    }

    fn lex_string(&mut self, pos: Position, quote: char) -> Result<Token, Diagnostic> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(Diagnostic::new(ErrorKind::LexicalError, Some(pos), "unterminated string literal")),
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| Diagnostic::new(ErrorKind::LexicalError, Some(pos), "unterminated string literal"))?;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        '0' => '\0',
                        '\\' => '\\',
                        '\'' => '\'',
                        '"' => '"',
                        other => {
                            return Err(Diagnostic::new(
                                ErrorKind::LexicalError,
                                Some(pos),
                                format!("unknown escape sequence '\\{other}'"),
                            ))
                        }
                    });
                }
                Some(c) => out.push(c),
            }
        }
        Ok(Token::new(TokenKind::String(out), pos))
    }

    fn lex_ident(&mut self, pos: Position) -> Result<Token, Diagnostic> {
        let mut text = String::new();
        while self.peek().is_some_and(|c| c == '_' || c.is_alphanumeric()) {
            text.push(self.bump().unwrap());
        }
        let kind = keyword(&text).unwrap_or(TokenKind::Ident(text));
        Ok(Token::new(kind, pos))
    }

    fn lex_punct(&mut self, pos: Position) -> Result<Token, Diagnostic> {
        let c = self.bump().unwrap();
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => {
                if self.peek() == Some('*') {
                    self.bump();
                    TokenKind::StarStar
                } else {
                    TokenKind::Star
                }
            }
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '.' => TokenKind::Dot,
            '#' => TokenKind::Hash,
            '~' => TokenKind::Tilde,
            '^' => TokenKind::Caret,
            '?' => {
                if self.peek() == Some('.') {
                    self.bump();
                    TokenKind::QuestionDot
                } else if self.peek() == Some('?') {
                    self.bump();
                    TokenKind::QuestionQuestion
                } else {
                    TokenKind::Question
                }
            }
            '|' => {
                if self.peek() == Some('|') {
                    self.bump();
                    TokenKind::OrOr
                } else {
                    TokenKind::Pipe
                }
            }
            '&' => {
                if self.peek() == Some('&') {
                    self.bump();
                    TokenKind::AndAnd
                } else {
                    TokenKind::Amp
                }
            }
            '<' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Le
                } else if self.peek() == Some('<') {
                    self.bump();
                    TokenKind::ShiftL
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ge
                } else if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::ShiftR
                } else {
                    TokenKind::Gt
                }
            }
            '=' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::EqEq
                } else if self.peek() == Some('>') {
                    self.bump();
                    TokenKind::FatArrow
                } else {
                    return Err(Diagnostic::new(ErrorKind::LexicalError, Some(pos), "unexpected character '='"));
                }
            }
            '!' => {
                if self.peek() == Some('=') {
                    self.bump();
                    TokenKind::Ne
                } else {
                    TokenKind::Bang
                }
            }
            other => {
                return Err(Diagnostic::new(
                    ErrorKind::LexicalError,
                    Some(pos),
                    format!("illegal character '{other}'"),
                ))
            }
        };
        Ok(Token::new(kind, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("1 2.5 10"), vec![TokenKind::Int(1), TokenKind::Float(2.5), TokenKind::Int(10), TokenKind::Eof]);
    }

    #[test]
    fn member_access_after_int_literal_is_not_a_float() {
        assert_eq!(
            kinds("3.length()"),
            vec![
                TokenKind::Int(3),
                TokenKind::Dot,
                TokenKind::Ident("length".into()),
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(kinds(r#""a\nb""#), vec![TokenKind::String("a\nb".into()), TokenKind::Eof]);
    }

    #[test]
    fn operators_and_keywords() {
        assert_eq!(
            kinds("a ?. b ?? c && d || !e"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::QuestionDot,
                TokenKind::Ident("b".into()),
                TokenKind::QuestionQuestion,
                TokenKind::Ident("c".into()),
                TokenKind::AndAnd,
                TokenKind::Ident("d".into()),
                TokenKind::OrOr,
                TokenKind::Bang,
                TokenKind::Ident("e".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn illegal_character_is_positioned() {
        let err = Lexer::new("1 @ 2").tokenize().unwrap_err();
        assert_eq!(err.kind, ErrorKind::LexicalError);
        assert_eq!(err.position.unwrap().column, 3);
    }

    #[test]
    fn unterminated_string_fails() {
        assert!(Lexer::new("\"abc").tokenize().is_err());
    }
}
