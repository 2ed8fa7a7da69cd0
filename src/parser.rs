//! Token stream to AST: a Pratt / precedence-climbing parser (§4.2).
//!
//! Precedence, low to high, matches the table in §4.2 exactly; binding
//! powers below are spaced by 10 purely so inserting a level later doesn't
//! require renumbering everything else.

use std::rc::Rc;

use crate::ast::{InfixOp, Node, NodeKind, PrefixOp, VarDecl};
use crate::builtins::Builtin;
use crate::error::{Diagnostic, ErrorKind, Position};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::value::Value;

type ParseResult<T> = Result<T, Diagnostic>;

pub fn parse(source: &str) -> ParseResult<Node> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_expr(0)?;
    parser.expect(&TokenKind::Eof)?;
    Ok(node)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

/// Binding power of each infix/postfix operator. Higher binds tighter.
/// `None` means the token never starts an infix/postfix continuation.
fn infix_binding_power(kind: &TokenKind) -> Option<(u8, u8)> {
    use TokenKind::*;
    Some(match kind {
        Pipe => (10, 11),
        QuestionQuestion => (21, 20), // right-associative
        Question => (31, 30),         // ternary, right-associative
        OrOr | Or => (40, 41),
        AndAnd | And => (50, 51),
        EqEq | Ne => (60, 61),
        Lt | Le | Gt | Ge | In | Matches | Contains | StartsWith | EndsWith => (70, 71),
        // Bitwise `|`/`&` use distinct tokens from logical `||`/`&&` already,
        // but `^` (Caret) and bare `Amp`/`Pipe` (bitwise) share this band.
        Caret => (80, 81),
        Amp => (90, 91),
        ShiftL | ShiftR => (100, 101),
        Plus | Minus => (110, 111),
        Star | Slash | Percent => (120, 121),
        StarStar => (131, 130), // right-associative
        LParen | LBracket | Dot | QuestionDot => (200, 201),
        _ => return None,
    })
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_pos(&self) -> Position {
        self.tokens[self.pos].pos
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.peek() == kind {
            Ok(self.bump())
        } else {
            Err(Diagnostic::new(
                ErrorKind::ParseError,
                Some(self.peek_pos()),
                format!("expected {kind}, found {}", self.peek()),
            ))
        }
    }

    /// Parses a full expression at or above `min_bp` using precedence
    /// climbing: a prefix/primary parse followed by a loop that consumes
    /// infix/postfix operators whose left binding power clears `min_bp`.
    fn parse_expr(&mut self, min_bp: u8) -> ParseResult<Node> {
        let mut lhs = self.parse_prefix()?;

        loop {
            let kind = self.peek().clone();
            let Some((lbp, rbp)) = infix_binding_power(&kind) else {
                break;
            };
            if lbp < min_bp {
                break;
            }

            lhs = match kind {
                TokenKind::LParen => self.parse_call(lhs)?,
                TokenKind::LBracket => self.parse_index(lhs)?,
                TokenKind::Dot => self.parse_member(lhs, false)?,
                TokenKind::QuestionDot => self.parse_member(lhs, true)?,
                TokenKind::Question => self.parse_ternary(lhs)?,
                TokenKind::QuestionQuestion => {
                    let pos = self.bump().pos;
                    let rhs = self.parse_expr(rbp)?;
                    Node::new(
                        NodeKind::NullCoalesce {
                            left: Rc::new(lhs),
                            right: Rc::new(rhs),
                        },
                        pos,
                    )
                }
                _ => {
                    let op_tok = self.bump();
                    let op = infix_op(&op_tok.kind).ok_or_else(|| {
                        Diagnostic::new(ErrorKind::ParseError, Some(op_tok.pos), format!("'{}' is not an infix operator", op_tok.kind))
                    })?;
                    let rhs = self.parse_expr(rbp)?;
                    Node::new(
                        NodeKind::Infix {
                            op,
                            left: Rc::new(lhs),
                            right: Rc::new(rhs),
                        },
                        op_tok.pos,
                    )
                }
            };
        }

        Ok(lhs)
    }

    fn parse_ternary(&mut self, cond: Node) -> ParseResult<Node> {
        let pos = self.expect(&TokenKind::Question)?.pos;
        let then_branch = self.parse_expr(0)?;
        self.expect(&TokenKind::Colon)?;
        let else_branch = self.parse_expr(30)?;
        Ok(Node::new(
            NodeKind::Ternary {
                cond: Rc::new(cond),
                then_branch: Rc::new(then_branch),
                else_branch: Rc::new(else_branch),
            },
            pos,
        ))
    }

    fn parse_member(&mut self, object: Node, optional: bool) -> ParseResult<Node> {
        let pos = self.bump().pos; // `.` or `?.`
        let name_tok = self.bump();
        let TokenKind::Ident(name) = name_tok.kind else {
            return Err(Diagnostic::new(
                ErrorKind::ParseError,
                Some(name_tok.pos),
                format!("expected a property name, found {}", name_tok.kind),
            ));
        };
        // `obj.method(args)` is parsed here as `Call{callee: Member{...}}`
        // (§4.2: method calls are not a dedicated node) by letting the loop
        // in `parse_expr` pick up the following `(` as a postfix call over
        // this `Member` node on its next iteration.
        let kind = if optional {
            NodeKind::OptionalMember {
                object: Rc::new(object),
                property: name,
            }
        } else {
            NodeKind::Member {
                object: Rc::new(object),
                property: name,
            }
        };
        Ok(Node::new(kind, pos))
    }

    fn parse_index(&mut self, object: Node) -> ParseResult<Node> {
        let pos = self.expect(&TokenKind::LBracket)?.pos;
        let index = self.parse_expr(0)?;
        self.expect(&TokenKind::RBracket)?;
        Ok(Node::new(
            NodeKind::Index {
                object: Rc::new(object),
                index: Rc::new(index),
            },
            pos,
        ))
    }

    fn parse_call(&mut self, callee: Node) -> ParseResult<Node> {
        let pos = self.expect(&TokenKind::LParen)?.pos;
        let args = self.parse_args()?;
        // A call over a bare identifier naming a known builtin is a
        // syntactic pre-binding to `BuiltinCall` (§4.2): the set of builtin
        // names is fixed, so the parser can resolve it immediately rather
        // than waiting for the checker/compiler.
        if let NodeKind::Identifier(name) = &callee.kind {
            if let Some(builtin) = Builtin::lookup(name) {
                return Ok(Node::new(NodeKind::BuiltinCall { builtin, args }, pos));
            }
        }
        Ok(Node::new(
            NodeKind::Call {
                callee: Rc::new(callee),
                args,
            },
            pos,
        ))
    }

    fn parse_args(&mut self) -> ParseResult<Vec<Node>> {
        let mut args = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                args.push(self.parse_expr(0)?);
                if self.peek() == &TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    /// Prefix position: unary operators, literals, grouping, array/map
    /// literals, lambdas, and the placeholder.
    fn parse_prefix(&mut self) -> ParseResult<Node> {
        let tok = self.tokens[self.pos].clone();
        match &tok.kind {
            TokenKind::Minus => {
                self.bump();
                let expr = self.parse_expr(150)?;
                Ok(Node::new(
                    NodeKind::Prefix {
                        op: PrefixOp::Neg,
                        expr: Rc::new(expr),
                    },
                    tok.pos,
                ))
            }
            TokenKind::Bang | TokenKind::Not => {
                self.bump();
                let expr = self.parse_expr(150)?;
                Ok(Node::new(
                    NodeKind::Prefix {
                        op: PrefixOp::Not,
                        expr: Rc::new(expr),
                    },
                    tok.pos,
                ))
            }
            TokenKind::Tilde => {
                self.bump();
                let expr = self.parse_expr(150)?;
                Ok(Node::new(
                    NodeKind::Prefix {
                        op: PrefixOp::BitNot,
                        expr: Rc::new(expr),
                    },
                    tok.pos,
                ))
            }
            TokenKind::Int(n) => {
                self.bump();
                Ok(Node::new(NodeKind::Literal(Value::Int(*n)), tok.pos))
            }
            TokenKind::Float(n) => {
                self.bump();
                Ok(Node::new(NodeKind::Literal(Value::Float(*n)), tok.pos))
            }
            TokenKind::String(s) => {
                self.bump();
                Ok(Node::new(NodeKind::Literal(Value::string(s.clone())), tok.pos))
            }
            TokenKind::True => {
                self.bump();
                Ok(Node::new(NodeKind::Literal(Value::Bool(true)), tok.pos))
            }
            TokenKind::False => {
                self.bump();
                Ok(Node::new(NodeKind::Literal(Value::Bool(false)), tok.pos))
            }
            TokenKind::Null => {
                self.bump();
                Ok(Node::new(NodeKind::Literal(Value::Nil), tok.pos))
            }
            TokenKind::Hash => {
                self.bump();
                Ok(Node::new(NodeKind::Placeholder, tok.pos))
            }
            TokenKind::Ident(_) => self.parse_ident_or_lambda(),
            TokenKind::LParen => self.parse_paren_or_lambda(),
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_map_literal(),
            other => Err(Diagnostic::new(ErrorKind::ParseError, Some(tok.pos), format!("unexpected token {other}"))),
        }
    }

    /// `x => expr` (single-parameter lambda, no parens) vs. a plain
    /// identifier expression.
    fn parse_ident_or_lambda(&mut self) -> ParseResult<Node> {
        let tok = self.bump();
        let TokenKind::Ident(name) = tok.kind else {
            unreachable!("caller checked TokenKind::Ident");
        };
        if self.peek() == &TokenKind::FatArrow {
            self.bump();
            let body = self.parse_expr(11)?;
            return Ok(Node::new(
                NodeKind::Lambda {
                    params: vec![VarDecl { name, pos: tok.pos }],
                    body: Rc::new(body),
                },
                tok.pos,
            ));
        }
        Ok(Node::new(NodeKind::Identifier(name), tok.pos))
    }

    /// Disambiguates `(expr)` grouping from `(x, y) => expr`: both start
    /// with `(`, so this speculatively scans for a matching `) =>` before
    /// committing to the lambda-parameter-list parse.
    fn parse_paren_or_lambda(&mut self) -> ParseResult<Node> {
        if self.looks_like_lambda_params() {
            return self.parse_lambda_with_parens();
        }
        let pos = self.expect(&TokenKind::LParen)?.pos;
        let inner = self.parse_expr(0)?;
        self.expect(&TokenKind::RParen)?;
        // Grouping doesn't need its own node kind: the inner expression
        // already carries its own position; reuse `pos` only if the inner
        // node's position would otherwise be lost (it isn't, `inner.pos`
        // is kept), so just return `inner` unchanged.
        let _ = pos;
        Ok(inner)
    }

    fn looks_like_lambda_params(&self) -> bool {
        // Scan forward from `(` for a matching `)` at depth 0, then check
        // whether `=>` follows immediately. Bounded by the token stream
        // length so a malformed program can't loop forever.
        let mut depth = 0i32;
        let mut i = self.pos;
        loop {
            match &self.tokens[i].kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.tokens.get(i + 1).map(|t| &t.kind), Some(TokenKind::FatArrow));
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            if i + 1 >= self.tokens.len() {
                return false;
            }
            i += 1;
        }
    }

    fn parse_lambda_with_parens(&mut self) -> ParseResult<Node> {
        let pos = self.expect(&TokenKind::LParen)?.pos;
        let mut params = Vec::new();
        if self.peek() != &TokenKind::RParen {
            loop {
                let tok = self.bump();
                let TokenKind::Ident(name) = tok.kind else {
                    return Err(Diagnostic::new(ErrorKind::ParseError, Some(tok.pos), "expected a parameter name"));
                };
                params.push(VarDecl { name, pos: tok.pos });
                if self.peek() == &TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;
        self.expect(&TokenKind::FatArrow)?;
        let body = self.parse_expr(11)?;
        Ok(Node::new(NodeKind::Lambda { params, body: Rc::new(body) }, pos))
    }

    fn parse_array_literal(&mut self) -> ParseResult<Node> {
        let pos = self.expect(&TokenKind::LBracket)?.pos;
        let mut items = Vec::new();
        if self.peek() != &TokenKind::RBracket {
            loop {
                items.push(self.parse_expr(0)?);
                if self.peek() == &TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Node::new(NodeKind::ArrayLiteral(items), pos))
    }

    fn parse_map_literal(&mut self) -> ParseResult<Node> {
        let pos = self.expect(&TokenKind::LBrace)?.pos;
        let mut entries = Vec::new();
        if self.peek() != &TokenKind::RBrace {
            loop {
                let key_tok = self.bump();
                let key = match key_tok.kind {
                    TokenKind::String(s) => s,
                    TokenKind::Ident(s) => s,
                    other => {
                        return Err(Diagnostic::new(
                            ErrorKind::ParseError,
                            Some(key_tok.pos),
                            format!("expected a map key, found {other}"),
                        ))
                    }
                };
                self.expect(&TokenKind::Colon)?;
                let value = self.parse_expr(0)?;
                entries.push((key, value));
                if self.peek() == &TokenKind::Comma {
                    self.bump();
                } else {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Node::new(NodeKind::MapLiteral(entries), pos))
    }
}

fn infix_op(kind: &TokenKind) -> Option<InfixOp> {
    use TokenKind as T;
    Some(match kind {
        T::Plus => InfixOp::Add,
        T::Minus => InfixOp::Sub,
        T::Star => InfixOp::Mul,
        T::Slash => InfixOp::Div,
        T::Percent => InfixOp::Mod,
        T::StarStar => InfixOp::Pow,
        T::EqEq => InfixOp::Eq,
        T::Ne => InfixOp::Ne,
        T::Gt => InfixOp::Gt,
        T::Ge => InfixOp::Ge,
        T::Lt => InfixOp::Lt,
        T::Le => InfixOp::Le,
        T::AndAnd | T::And => InfixOp::And,
        T::OrOr | T::Or => InfixOp::Or,
        T::Amp => InfixOp::BitAnd,
        T::Pipe => InfixOp::BitOr,
        T::Caret => InfixOp::BitXor,
        T::ShiftL => InfixOp::ShiftL,
        T::ShiftR => InfixOp::ShiftR,
        T::In => InfixOp::In,
        T::Matches => InfixOp::Matches,
        T::Contains => InfixOp::Contains,
        T::StartsWith => InfixOp::StartsWith,
        T::EndsWith => InfixOp::EndsWith,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Node {
        parse(src).unwrap_or_else(|e| panic!("parse failed for {src:?}: {e}"))
    }

    #[test]
    fn arithmetic_precedence() {
        let node = parse_ok("1 + 2 * 3");
        match node.kind {
            NodeKind::Infix { op: InfixOp::Add, .. } => {}
            other => panic!("expected outer Add, got {other:?}"),
        }
    }

    #[test]
    fn pipeline_and_placeholder() {
        let node = parse_ok("numbers | filter(# > 5) | map(# * 2)");
        match node.kind {
            NodeKind::Pipe { .. } => {}
            other => panic!("expected Pipe, got {other:?}"),
        }
    }

    #[test]
    fn builtin_call_preborund_at_parse_time() {
        let node = parse_ok("len(x)");
        assert!(matches!(node.kind, NodeKind::BuiltinCall { builtin: Builtin::Len, .. }));
    }

    #[test]
    fn method_call_is_call_over_member() {
        let node = parse_ok("\"hi\".length()");
        match &node.kind {
            NodeKind::Call { callee, args } => {
                assert!(args.is_empty());
                assert!(matches!(&callee.kind, NodeKind::Member { property, .. } if property == "length"));
            }
            other => panic!("expected Call over Member, got {other:?}"),
        }
    }

    #[test]
    fn single_param_lambda() {
        let node = parse_ok("x => x + 1");
        assert!(matches!(node.kind, NodeKind::Lambda { .. }));
    }

    #[test]
    fn multi_param_lambda() {
        let node = parse_ok("(a, b) => a + b");
        match node.kind {
            NodeKind::Lambda { params, .. } => assert_eq!(params.len(), 2),
            other => panic!("expected Lambda, got {other:?}"),
        }
    }

    #[test]
    fn optional_chain_and_null_coalesce() {
        let node = parse_ok("user?.profile?.name ?? \"Anon\"");
        assert!(matches!(node.kind, NodeKind::NullCoalesce { .. }));
    }

    #[test]
    fn comparison_operators_and_relational_keywords() {
        assert!(matches!(
            parse_ok("a < b").kind,
            NodeKind::Infix { op: InfixOp::Lt, .. }
        ));
        assert!(matches!(
            parse_ok("a in b").kind,
            NodeKind::Infix { op: InfixOp::In, .. }
        ));
    }

    #[test]
    fn array_and_map_literals() {
        assert!(matches!(parse_ok("[1, 2, 3]").kind, NodeKind::ArrayLiteral(_)));
        assert!(matches!(parse_ok("{a: 1, b: 2}").kind, NodeKind::MapLiteral(_)));
    }

    #[test]
    fn unexpected_token_is_a_positioned_parse_error() {
        let err = parse(") bad (").unwrap_err();
        assert_eq!(err.kind, ErrorKind::ParseError);
    }
}
