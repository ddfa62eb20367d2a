//! Recursive-descent parser.
//!
//! Consumes the lexer's token stream and produces an [`AST`]. The
//! precedence tower, lowest to highest: `;` (sequence), `let`,
//! `if`/`match`, `<-`, tuple comma, `||`, `&&`, relational, additive,
//! multiplicative, unary, application, `.()` access.
//!
//! `e1; e2` is sugar for `let _ = e1 in e2` with a fresh binder that
//! cannot be referenced. There is no error recovery: the first
//! unexpected token aborts the parse.

use std::fmt;
use std::num::IntErrorKind;
use std::rc::Rc;

use crate::ast::{BinOp, Expr, FuncDef, Param, Symbol, TypeDecl, TypeExpr, UnaryOp, AST};
use crate::source::{Source, Span};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone)]
pub struct ParseError {
    pub msg: String,
    pub span: Span,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error at {}: {}", self.span.start, self.msg)
    }
}

impl std::error::Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parses a whole token stream into an AST.
pub fn parse(tokens: impl Iterator<Item = Token>) -> ParseResult<AST> {
    let mut parser = Parser::new(tokens)?;
    let mut type_decls = Vec::new();
    while parser.kind() == TokenKind::Type {
        type_decls.push(parser.parse_type_decl()?);
    }
    let root = parser.parse_expr()?;
    if parser.kind() != TokenKind::Eof {
        return Err(parser.unexpected("end of input"));
    }
    Ok(AST {
        root,
        file: parser.file,
        type_decls,
    })
}

struct Parser<I: Iterator<Item = Token>> {
    tokens: I,
    current: Token,
    file: Rc<Source>,
}

impl<I: Iterator<Item = Token>> Parser<I> {
    fn new(mut tokens: I) -> ParseResult<Parser<I>> {
        let current = match tokens.next() {
            Some(tok) => tok,
            None => {
                return Err(ParseError {
                    msg: "empty token stream".to_string(),
                    span: Span::default(),
                })
            }
        };
        let file = Rc::clone(&current.file);
        Ok(Parser {
            tokens,
            current,
            file,
        })
    }

    fn kind(&self) -> TokenKind {
        self.current.kind
    }

    fn advance(&mut self) -> Token {
        let next = match self.tokens.next() {
            Some(tok) => tok,
            // The lexer terminates with Eof/Illegal; keep the last
            // token sticky in case a caller reads past it.
            None => self.current.clone(),
        };
        std::mem::replace(&mut self.current, next)
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.kind() == kind {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        ParseError {
            msg: format!(
                "expected {} but found {}",
                expected,
                describe_token(&self.current)
            ),
            span: self.current.span(),
        }
    }

    fn error(&self, msg: impl Into<String>) -> ParseError {
        ParseError {
            msg: msg.into(),
            span: self.current.span(),
        }
    }

    fn expect_ident(&mut self) -> ParseResult<(String, Span)> {
        let tok = self.expect(TokenKind::Ident)?;
        Ok((tok.value().to_string(), tok.span()))
    }

    fn parse_type_decl(&mut self) -> ParseResult<TypeDecl> {
        let start = self.expect(TokenKind::Type)?;
        let (name, _) = self.expect_ident()?;
        self.expect(TokenKind::Equal)?;
        let type_expr = self.parse_type()?;
        Ok(TypeDecl {
            span: start.span().merge(type_expr.span()),
            name,
            type_expr,
        })
    }

    fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_seq()
    }

    // e1; e2  ==  let _ = e1 in e2 (right-nested)
    fn parse_seq(&mut self) -> ParseResult<Expr> {
        let e = self.parse_element()?;
        if self.kind() != TokenKind::Semicolon {
            return Ok(e);
        }
        self.advance();
        let rest = self.parse_seq()?;
        let span = e.span().merge(rest.span());
        Ok(Expr::Let {
            span,
            symbol: Symbol::new("_"),
            type_ann: None,
            bound: Box::new(e),
            body: Box::new(rest),
        })
    }

    fn parse_element(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            TokenKind::Let => self.parse_let(),
            TokenKind::If => self.parse_if(),
            TokenKind::Match => self.parse_match(),
            _ => self.parse_tuple(),
        }
    }

    fn parse_let(&mut self) -> ParseResult<Expr> {
        let let_tok = self.expect(TokenKind::Let)?;
        match self.kind() {
            TokenKind::LParen => self.parse_let_tuple(let_tok),
            TokenKind::Rec => self.parse_let_rec(let_tok),
            _ => {
                let (name, _) = self.expect_ident()?;
                let type_ann = self.parse_optional_annotation()?;
                self.expect(TokenKind::Equal)?;
                let bound = self.parse_expr()?;
                self.expect(TokenKind::In)?;
                let body = self.parse_expr()?;
                Ok(Expr::Let {
                    span: let_tok.span().merge(body.span()),
                    symbol: Symbol::new(name),
                    type_ann,
                    bound: Box::new(bound),
                    body: Box::new(body),
                })
            }
        }
    }

    fn parse_let_tuple(&mut self, let_tok: Token) -> ParseResult<Expr> {
        self.expect(TokenKind::LParen)?;
        let mut symbols = Vec::new();
        let (first, _) = self.expect_ident()?;
        symbols.push(Symbol::new(first));
        while self.kind() == TokenKind::Comma {
            self.advance();
            let (name, _) = self.expect_ident()?;
            symbols.push(Symbol::new(name));
        }
        self.expect(TokenKind::RParen)?;
        let type_ann = self.parse_optional_annotation()?;
        self.expect(TokenKind::Equal)?;
        let bound = self.parse_expr()?;
        self.expect(TokenKind::In)?;
        let body = self.parse_expr()?;
        Ok(Expr::LetTuple {
            span: let_tok.span().merge(body.span()),
            symbols,
            type_ann,
            bound: Box::new(bound),
            body: Box::new(body),
        })
    }

    fn parse_let_rec(&mut self, let_tok: Token) -> ParseResult<Expr> {
        self.expect(TokenKind::Rec)?;
        let (fname, _) = self.expect_ident()?;
        let mut params = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Ident => {
                    let (name, _) = self.expect_ident()?;
                    params.push(Param {
                        symbol: Symbol::new(name),
                        type_ann: None,
                    });
                }
                TokenKind::LParen => {
                    self.advance();
                    let (name, _) = self.expect_ident()?;
                    self.expect(TokenKind::Colon)?;
                    let ann = self.parse_type()?;
                    self.expect(TokenKind::RParen)?;
                    params.push(Param {
                        symbol: Symbol::new(name),
                        type_ann: Some(ann),
                    });
                }
                _ => break,
            }
        }
        if params.is_empty() {
            return Err(self.unexpected("parameter of function definition"));
        }
        let ret_type = self.parse_optional_annotation()?;
        self.expect(TokenKind::Equal)?;
        let fbody = self.parse_expr()?;
        self.expect(TokenKind::In)?;
        let body = self.parse_expr()?;
        Ok(Expr::LetRec {
            span: let_tok.span().merge(body.span()),
            func: FuncDef {
                symbol: Symbol::new(fname),
                params,
                body: Box::new(fbody),
                ret_type,
            },
            body: Box::new(body),
        })
    }

    fn parse_optional_annotation(&mut self) -> ParseResult<Option<TypeExpr>> {
        if self.kind() == TokenKind::Colon {
            self.advance();
            Ok(Some(self.parse_type()?))
        } else {
            Ok(None)
        }
    }

    fn parse_if(&mut self) -> ParseResult<Expr> {
        let if_tok = self.expect(TokenKind::If)?;
        let cond = self.parse_expr()?;
        self.expect(TokenKind::Then)?;
        let then_expr = self.parse_element()?;
        self.expect(TokenKind::Else)?;
        let else_expr = self.parse_element()?;
        Ok(Expr::If {
            span: if_tok.span().merge(else_expr.span()),
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
        })
    }

    // match e with Some x -> e1 | None -> e2
    fn parse_match(&mut self) -> ParseResult<Expr> {
        let match_tok = self.expect(TokenKind::Match)?;
        let target = self.parse_expr()?;
        self.expect(TokenKind::With)?;
        self.expect(TokenKind::Some)?;
        let (some_name, _) = self.expect_ident()?;
        self.expect(TokenKind::MinusGreater)?;
        let if_some = self.parse_element()?;
        self.expect(TokenKind::Bar)?;
        self.expect(TokenKind::None)?;
        self.expect(TokenKind::MinusGreater)?;
        let if_none = self.parse_element()?;
        Ok(Expr::Match {
            span: match_tok.span().merge(if_none.span()),
            target: Box::new(target),
            if_some: Box::new(if_some),
            if_none: Box::new(if_none),
            some_sym: Symbol::new(some_name),
        })
    }

    fn parse_tuple(&mut self) -> ParseResult<Expr> {
        let first = self.parse_or()?;
        if self.kind() != TokenKind::Comma {
            return Ok(first);
        }
        let mut elems = vec![first];
        while self.kind() == TokenKind::Comma {
            self.advance();
            elems.push(self.parse_tuple_elem()?);
        }
        let span = elems[0].span().merge(elems[elems.len() - 1].span());
        Ok(Expr::Tuple { span, elems })
    }

    // A trailing `if`/`match`/`let` element extends to the right, the
    // way it does after any other operator.
    fn parse_tuple_elem(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            TokenKind::Let | TokenKind::If | TokenKind::Match => self.parse_element(),
            _ => self.parse_or(),
        }
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut e = self.parse_and()?;
        while self.kind() == TokenKind::BarBar {
            self.advance();
            let rhs = self.parse_and()?;
            e = binary(BinOp::Or, e, rhs);
        }
        Ok(e)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut e = self.parse_cmp()?;
        while self.kind() == TokenKind::AndAnd {
            self.advance();
            let rhs = self.parse_cmp()?;
            e = binary(BinOp::And, e, rhs);
        }
        Ok(e)
    }

    fn parse_cmp(&mut self) -> ParseResult<Expr> {
        let mut e = self.parse_additive()?;
        loop {
            let op = match self.kind() {
                TokenKind::Equal => BinOp::Eq,
                TokenKind::LessGreater => BinOp::NotEq,
                TokenKind::Less => BinOp::Less,
                TokenKind::LessEqual => BinOp::LessEq,
                TokenKind::Greater => BinOp::Greater,
                TokenKind::GreaterEqual => BinOp::GreaterEq,
                _ => return Ok(e),
            };
            self.advance();
            let rhs = self.parse_additive()?;
            e = binary(op, e, rhs);
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut e = self.parse_mult()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::PlusDot => BinOp::FAdd,
                TokenKind::MinusDot => BinOp::FSub,
                _ => return Ok(e),
            };
            self.advance();
            let rhs = self.parse_mult()?;
            e = binary(op, e, rhs);
        }
    }

    fn parse_mult(&mut self) -> ParseResult<Expr> {
        let mut e = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                TokenKind::StarDot => BinOp::FMul,
                TokenKind::SlashDot => BinOp::FDiv,
                _ => return Ok(e),
            };
            self.advance();
            let rhs = self.parse_unary()?;
            e = binary(op, e, rhs);
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            TokenKind::Minus => {
                let tok = self.advance();
                let child = self.parse_unary()?;
                // `-3.14` negates a float, not an int
                let op = if matches!(child, Expr::Float { .. }) {
                    UnaryOp::FNeg
                } else {
                    UnaryOp::Neg
                };
                Ok(Expr::Unary {
                    span: tok.span().merge(child.span()),
                    op,
                    child: Box::new(child),
                })
            }
            TokenKind::MinusDot => {
                let tok = self.advance();
                let child = self.parse_unary()?;
                Ok(Expr::Unary {
                    span: tok.span().merge(child.span()),
                    op: UnaryOp::FNeg,
                    child: Box::new(child),
                })
            }
            TokenKind::Not => {
                let tok = self.advance();
                let child = self.parse_unary()?;
                Ok(Expr::Unary {
                    span: tok.span().merge(child.span()),
                    op: UnaryOp::Not,
                    child: Box::new(child),
                })
            }
            _ => self.parse_app(),
        }
    }

    fn parse_app(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            TokenKind::ArrayCreate => {
                let tok = self.advance();
                let size = self.parse_simple()?;
                let elem = self.parse_simple()?;
                Ok(Expr::ArrayCreate {
                    span: tok.span().merge(elem.span()),
                    size: Box::new(size),
                    elem: Box::new(elem),
                })
            }
            TokenKind::ArraySize => {
                let tok = self.advance();
                let target = self.parse_simple()?;
                Ok(Expr::ArraySize {
                    span: tok.span().merge(target.span()),
                    target: Box::new(target),
                })
            }
            TokenKind::Some => {
                let tok = self.advance();
                let child = self.parse_simple()?;
                Ok(Expr::Some {
                    span: tok.span().merge(child.span()),
                    child: Box::new(child),
                })
            }
            _ => {
                let callee = self.parse_simple()?;
                if !self.starts_simple() {
                    return Ok(callee);
                }
                let mut args = Vec::new();
                while self.starts_simple() {
                    args.push(self.parse_simple()?);
                }
                let span = callee.span().merge(args[args.len() - 1].span());
                Ok(Expr::Apply {
                    span,
                    callee: Box::new(callee),
                    args,
                })
            }
        }
    }

    fn starts_simple(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Int
                | TokenKind::Float
                | TokenKind::StringLiteral
                | TokenKind::Bool
                | TokenKind::Ident
                | TokenKind::LParen
                | TokenKind::None
        )
    }

    fn parse_simple(&mut self) -> ParseResult<Expr> {
        let mut e = self.parse_atom()?;
        while self.kind() == TokenKind::Dot {
            self.advance();
            self.expect(TokenKind::LParen)?;
            let index = self.parse_expr()?;
            let rparen = self.expect(TokenKind::RParen)?;
            e = Expr::Get {
                span: e.span().merge(rparen.span()),
                array: Box::new(e),
                index: Box::new(index),
            };
        }
        // `e.(i) <- v`: the assignment swallows everything to its
        // right, and the whole thing is one operand to whatever is on
        // the left (`1.0 = a.(0) <- 2.0` assigns first, compares after).
        match (self.kind(), e) {
            (TokenKind::LessMinus, Expr::Get { span, array, index }) => {
                self.advance();
                let value = self.parse_element()?;
                Ok(Expr::Put {
                    span: span.merge(value.span()),
                    array,
                    index,
                    value: Box::new(value),
                })
            }
            (_, e) => Ok(e),
        }
    }

    fn parse_atom(&mut self) -> ParseResult<Expr> {
        match self.kind() {
            TokenKind::Int => {
                let tok = self.advance();
                let value = parse_int_literal(&tok)?;
                Ok(Expr::Int {
                    span: tok.span(),
                    value,
                })
            }
            TokenKind::Float => {
                let tok = self.advance();
                let value = parse_float_literal(&tok)?;
                Ok(Expr::Float {
                    span: tok.span(),
                    value,
                })
            }
            TokenKind::StringLiteral => {
                let tok = self.advance();
                let value = unescape_string(&tok)?;
                Ok(Expr::String {
                    span: tok.span(),
                    value,
                })
            }
            TokenKind::Bool => {
                let tok = self.advance();
                Ok(Expr::Bool {
                    span: tok.span(),
                    value: tok.value() == "true",
                })
            }
            TokenKind::Ident => {
                let tok = self.advance();
                Ok(Expr::VarRef {
                    span: tok.span(),
                    symbol: Symbol::new(tok.value()),
                })
            }
            TokenKind::None => {
                let tok = self.advance();
                Ok(Expr::None { span: tok.span() })
            }
            TokenKind::LParen => {
                let lparen = self.advance();
                if self.kind() == TokenKind::RParen {
                    let rparen = self.advance();
                    return Ok(Expr::Unit {
                        span: lparen.span().merge(rparen.span()),
                    });
                }
                let e = self.parse_expr()?;
                if self.kind() == TokenKind::Colon {
                    self.advance();
                    let type_expr = self.parse_type()?;
                    let rparen = self.expect(TokenKind::RParen)?;
                    return Ok(Expr::Typed {
                        span: lparen.span().merge(rparen.span()),
                        child: Box::new(e),
                        type_expr,
                    });
                }
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            _ => Err(self.unexpected("expression")),
        }
    }

    // Type expression grammar:
    //   ty       := tuple ('->' tuple)*            (right-assoc arrow)
    //   tuple    := postfix ('*' postfix)*
    //   postfix  := atom IDENT*                    (`int array`)
    //   atom     := IDENT | '(' ty (',' ty)* ')'   (multi means ctor args)
    fn parse_type(&mut self) -> ParseResult<TypeExpr> {
        let first = self.parse_type_tuple()?;
        if self.kind() != TokenKind::MinusGreater {
            return Ok(first);
        }
        let mut list = vec![first];
        while self.kind() == TokenKind::MinusGreater {
            self.advance();
            list.push(self.parse_type_tuple()?);
        }
        let ret = list.pop().unwrap();
        let span = list[0].span().merge(ret.span());
        Ok(TypeExpr::Func {
            span,
            params: list,
            ret: Box::new(ret),
        })
    }

    fn parse_type_tuple(&mut self) -> ParseResult<TypeExpr> {
        let first = self.parse_type_postfix()?;
        if self.kind() != TokenKind::Star {
            return Ok(first);
        }
        let mut elems = vec![first];
        while self.kind() == TokenKind::Star {
            self.advance();
            elems.push(self.parse_type_postfix()?);
        }
        let span = elems[0].span().merge(elems[elems.len() - 1].span());
        Ok(TypeExpr::Tuple { span, elems })
    }

    fn parse_type_postfix(&mut self) -> ParseResult<TypeExpr> {
        let mut t = match self.kind() {
            TokenKind::Ident => {
                let tok = self.advance();
                TypeExpr::Ctor {
                    span: tok.span(),
                    name: tok.value().to_string(),
                    args: vec![],
                }
            }
            TokenKind::LParen => {
                let lparen = self.advance();
                let mut types = vec![self.parse_type()?];
                while self.kind() == TokenKind::Comma {
                    self.advance();
                    types.push(self.parse_type()?);
                }
                self.expect(TokenKind::RParen)?;
                if types.len() == 1 {
                    types.pop().unwrap()
                } else {
                    // `(int, string) pair`
                    let (name, span) = self.expect_ident().map_err(|_| {
                        self.error("expected type constructor after type parameter list")
                    })?;
                    TypeExpr::Ctor {
                        span: lparen.span().merge(span),
                        name,
                        args: types,
                    }
                }
            }
            _ => return Err(self.unexpected("type")),
        };
        while self.kind() == TokenKind::Ident {
            let tok = self.advance();
            t = TypeExpr::Ctor {
                span: t.span().merge(tok.span()),
                name: tok.value().to_string(),
                args: vec![t],
            };
        }
        Ok(t)
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        span: left.span().merge(right.span()),
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

fn parse_int_literal(tok: &Token) -> ParseResult<i64> {
    tok.value().parse::<i64>().map_err(|e| {
        let reason = match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => "value out of range",
            _ => "invalid digits",
        };
        ParseError {
            msg: format!("integer literal '{}' is invalid: {}", tok.value(), reason),
            span: tok.span(),
        }
    })
}

fn parse_float_literal(tok: &Token) -> ParseResult<f64> {
    let value = tok.value().parse::<f64>().map_err(|_| ParseError {
        msg: format!("float literal '{}' is invalid", tok.value()),
        span: tok.span(),
    })?;
    if value.is_infinite() {
        return Err(ParseError {
            msg: format!(
                "float literal '{}' is invalid: value out of range",
                tok.value()
            ),
            span: tok.span(),
        });
    }
    Ok(value)
}

fn unescape_string(tok: &Token) -> ParseResult<String> {
    let raw = tok.value();
    let inner = &raw[1..raw.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                return Err(ParseError {
                    msg: "string literal cannot contain a line break".to_string(),
                    span: tok.span(),
                })
            }
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                Some('\'') => out.push('\''),
                Some(other) => out.push(other),
                None => break,
            },
            c => out.push(c),
        }
    }
    Ok(out)
}

fn describe_token(tok: &Token) -> String {
    use TokenKind::*;
    match tok.kind {
        Ident => format!("identifier '{}'", tok.value()),
        Int => format!("integer literal '{}'", tok.value()),
        Float => format!("float literal '{}'", tok.value()),
        Bool => format!("boolean literal '{}'", tok.value()),
        StringLiteral => format!("string literal {}", tok.value()),
        kind => kind.describe().to_string(),
    }
}
