//! Streaming lexer.
//!
//! The lexer is a single producer over one source buffer. It implements
//! [`Iterator`] so the parser can pull tokens one at a time in source
//! order; the stream ends with exactly one `Eof` or `Illegal` token.
//!
//! On a lexical error the error callback (if any) is invoked with a
//! message and the offending position, then `Illegal` is emitted and
//! the stream stops.

use std::rc::Rc;

use crate::source::{Pos, Source};
use crate::token::{Token, TokenKind};

/// Called with a message and the position of a lexical error.
pub type ErrorCallback = Box<dyn FnMut(&str, Pos)>;

pub struct Lexer {
    src: Rc<Source>,
    start: Pos,
    current: Pos,
    done: bool,
    on_error: Option<ErrorCallback>,
}

impl Iterator for Lexer {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.done {
            return None;
        }
        let tok = self.next_token();
        if matches!(tok.kind, TokenKind::Eof | TokenKind::Illegal) {
            self.done = true;
        }
        Some(tok)
    }
}

impl Lexer {
    pub fn new(src: Rc<Source>) -> Lexer {
        Lexer {
            src,
            start: Pos::start(),
            current: Pos::start(),
            done: false,
            on_error: None,
        }
    }

    /// Install the error callback. By default errors are only visible
    /// through the `Illegal` token.
    pub fn with_error_callback(mut self, cb: ErrorCallback) -> Lexer {
        self.on_error = Some(cb);
        self
    }

    fn next_token(&mut self) -> Token {
        use TokenKind as T;
        loop {
            self.start = self.current;
            let c = match self.top() {
                Some(c) => c,
                None => return self.emit(T::Eof),
            };
            match c {
                c if c.is_whitespace() => {
                    self.eat();
                }
                '(' => {
                    self.eat();
                    if self.top() == Some('*') {
                        self.eat();
                        match self.skip_comment() {
                            Ok(()) => continue,
                            Err(tok) => return tok,
                        }
                    }
                    return self.emit(T::LParen);
                }
                ')' => return self.eat_and_emit(T::RParen),
                '+' => {
                    self.eat();
                    return if self.top() == Some('.') {
                        self.eat_and_emit(T::PlusDot)
                    } else {
                        self.emit(T::Plus)
                    };
                }
                '-' => {
                    self.eat();
                    return match self.top() {
                        Some('.') => self.eat_and_emit(T::MinusDot),
                        Some('>') => self.eat_and_emit(T::MinusGreater),
                        _ => self.emit(T::Minus),
                    };
                }
                '*' => {
                    self.eat();
                    return if self.top() == Some('.') {
                        self.eat_and_emit(T::StarDot)
                    } else {
                        self.emit(T::Star)
                    };
                }
                '/' => {
                    self.eat();
                    return if self.top() == Some('.') {
                        self.eat_and_emit(T::SlashDot)
                    } else {
                        self.emit(T::Slash)
                    };
                }
                '%' => return self.eat_and_emit(T::Percent),
                '=' => return self.eat_and_emit(T::Equal),
                '<' => {
                    self.eat();
                    return match self.top() {
                        Some('>') => self.eat_and_emit(T::LessGreater),
                        Some('=') => self.eat_and_emit(T::LessEqual),
                        Some('-') => self.eat_and_emit(T::LessMinus),
                        _ => self.emit(T::Less),
                    };
                }
                '>' => {
                    self.eat();
                    return if self.top() == Some('=') {
                        self.eat_and_emit(T::GreaterEqual)
                    } else {
                        self.emit(T::Greater)
                    };
                }
                ',' => return self.eat_and_emit(T::Comma),
                '.' => return self.eat_and_emit(T::Dot),
                ';' => return self.eat_and_emit(T::Semicolon),
                ':' => return self.eat_and_emit(T::Colon),
                '|' => {
                    self.eat();
                    return if self.top() == Some('|') {
                        self.eat_and_emit(T::BarBar)
                    } else {
                        self.emit(T::Bar)
                    };
                }
                '&' => {
                    self.eat();
                    return if self.top() == Some('&') {
                        self.eat_and_emit(T::AndAnd)
                    } else {
                        self.expected("'&&'");
                        self.illegal()
                    };
                }
                '"' => return self.scan_string(),
                c if c.is_ascii_digit() => return self.scan_number(),
                _ => return self.scan_ident(),
            }
        }
    }

    fn skip_comment(&mut self) -> Result<(), Token> {
        loop {
            match self.top() {
                None => {
                    self.error("Expected '*)' for closing comment but got EOF");
                    return Err(self.illegal());
                }
                Some('*') => {
                    self.eat();
                    if self.top() == Some(')') {
                        self.eat();
                        return Ok(());
                    }
                }
                Some(_) => {
                    self.eat();
                }
            }
        }
    }

    // The token carries the raw text including escape sequences; the
    // parser performs the unescaping.
    fn scan_string(&mut self) -> Token {
        self.eat();
        loop {
            match self.top() {
                None => {
                    self.error("Expected '\"' for closing string literal but got EOF");
                    return self.illegal();
                }
                Some('"') => {
                    self.eat();
                    return self.emit(TokenKind::StringLiteral);
                }
                Some('\\') => {
                    self.eat();
                    if self.top().is_none() {
                        self.error("Expected '\"' for closing string literal but got EOF");
                        return self.illegal();
                    }
                    self.eat();
                }
                Some(_) => {
                    self.eat();
                }
            }
        }
    }

    // e.g. 123, 3.14, 1., 123.45e10
    fn scan_number(&mut self) -> Token {
        let mut kind = TokenKind::Int;
        self.eat();
        while self.top().is_some_and(|c| c.is_ascii_digit()) {
            self.eat();
        }

        // Allow `1.` as `1.0`
        if self.top() == Some('.') {
            kind = TokenKind::Float;
            self.eat();
            while self.top().is_some_and(|c| c.is_ascii_digit()) {
                self.eat();
            }
        }

        if matches!(self.top(), Some('e') | Some('E')) {
            kind = TokenKind::Float;
            self.eat();
            if matches!(self.top(), Some('+') | Some('-')) {
                self.eat();
            }
            if !self.top().is_some_and(|c| c.is_ascii_digit()) {
                self.expected("number for exponential part of float literal");
                return self.illegal();
            }
            while self.top().is_some_and(|c| c.is_ascii_digit()) {
                self.eat();
            }
        }

        self.emit(kind)
    }

    fn scan_ident(&mut self) -> Token {
        if !self.eat_ident_head() {
            return self.illegal();
        }
        let text = self.text();
        if text == "Array" {
            return self.scan_array_op();
        }
        self.emit(keyword_or_ident(text))
    }

    // `Array` must continue with `.create`, `.make` or `.length`.
    fn scan_array_op(&mut self) -> Token {
        if self.top() != Some('.') {
            self.expected("'.' for 'Array.create'");
            return self.illegal();
        }
        self.eat();
        if !self.eat_ident_head() {
            return self.illegal();
        }
        match self.text() {
            "Array.create" | "Array.make" => self.emit(TokenKind::ArrayCreate),
            "Array.length" => self.emit(TokenKind::ArraySize),
            text => {
                let msg = format!(
                    "Expected 'create', 'make' or 'length' for array operation but got '{}'",
                    text
                );
                self.error(&msg);
                self.illegal()
            }
        }
    }

    /// Eats one identifier starting at the current position. Reports an
    /// error and returns false if the head character is not a letter.
    fn eat_ident_head(&mut self) -> bool {
        if !self.top().is_some_and(is_letter) {
            self.expected("letter for head character of identifier");
            return false;
        }
        self.eat();
        while self
            .top()
            .is_some_and(|c| is_letter(c) || c.is_ascii_digit())
        {
            self.eat();
        }
        true
    }

    fn top(&self) -> Option<char> {
        self.src.code[self.current.offset..].chars().next()
    }

    fn eat(&mut self) {
        if let Some(c) = self.top() {
            let size = c.len_utf8();
            self.current.offset += size;
            if c == '\n' {
                self.current.line += 1;
                self.current.column = 1;
            } else {
                self.current.column += size;
            }
        }
    }

    fn text(&self) -> &str {
        &self.src.code[self.start.offset..self.current.offset]
    }

    fn emit(&mut self, kind: TokenKind) -> Token {
        let tok = Token::new(kind, self.start, self.current, Rc::clone(&self.src));
        self.start = self.current;
        tok
    }

    fn eat_and_emit(&mut self, kind: TokenKind) -> Token {
        self.eat();
        self.emit(kind)
    }

    fn illegal(&mut self) -> Token {
        self.emit(TokenKind::Illegal)
    }

    fn expected(&mut self, what: &str) {
        let msg = match self.top() {
            Some(c) => format!("Expected {} but got '{}'", what, c),
            None => format!("Expected {} but got EOF", what),
        };
        self.error(&msg);
    }

    fn error(&mut self, msg: &str) {
        if let Some(cb) = &mut self.on_error {
            cb(msg, self.current);
        }
    }
}

fn is_letter(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn keyword_or_ident(text: &str) -> TokenKind {
    use TokenKind::*;
    match text {
        "true" | "false" => Bool,
        "if" => If,
        "then" => Then,
        "else" => Else,
        "let" => Let,
        "in" => In,
        "rec" => Rec,
        "not" => Not,
        "match" => Match,
        "with" => With,
        "Some" => Some,
        "None" => None,
        "type" => Type,
        _ => Ident,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn lex_kinds(code: &str) -> Vec<TokenKind> {
        Lexer::new(Source::dummy(code)).map(|t| t.kind).collect()
    }

    fn lex_with_errors(code: &str) -> (Vec<TokenKind>, Vec<String>) {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let kinds = Lexer::new(Source::dummy(code))
            .with_error_callback(Box::new(move |msg, _pos| {
                sink.borrow_mut().push(msg.to_string())
            }))
            .map(|t| t.kind)
            .collect();
        let msgs = errors.borrow().clone();
        (kinds, msgs)
    }

    #[test]
    fn test_operators() {
        use TokenKind::*;
        assert_eq!(
            lex_kinds("+ - * / % +. -. *. /. = <> < <= > >= <- -> && || | : ;"),
            vec![
                Plus,
                Minus,
                Star,
                Slash,
                Percent,
                PlusDot,
                MinusDot,
                StarDot,
                SlashDot,
                Equal,
                LessGreater,
                Less,
                LessEqual,
                Greater,
                GreaterEqual,
                LessMinus,
                MinusGreater,
                AndAnd,
                BarBar,
                Bar,
                Colon,
                Semicolon,
                Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_idents() {
        use TokenKind::*;
        assert_eq!(
            lex_kinds("let rec in if then else not match with Some None type true false foo _"),
            vec![
                Let, Rec, In, If, Then, Else, Not, Match, With, Some, None, Type, Bool, Bool,
                Ident, Ident, Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        use TokenKind::*;
        assert_eq!(
            lex_kinds("42 3.14 1. 2e10 1.5E-3 7e+2"),
            vec![Int, Float, Float, Float, Float, Float, Eof]
        );
    }

    #[test]
    fn test_number_positions() {
        let tokens: Vec<_> = Lexer::new(Source::dummy("12 3.5")).collect();
        assert_eq!(tokens[0].value(), "12");
        assert_eq!(tokens[0].start.offset, 0);
        assert_eq!(tokens[0].end.offset, 2);
        assert_eq!(tokens[1].value(), "3.5");
        assert_eq!(tokens[1].start.column, 4);
    }

    #[test]
    fn test_array_ops() {
        use TokenKind::*;
        assert_eq!(
            lex_kinds("Array.create Array.make Array.length"),
            vec![ArrayCreate, ArrayCreate, ArraySize, Eof]
        );
    }

    #[test]
    fn test_array_op_invalid() {
        let (kinds, errors) = lex_with_errors("Array.foo");
        assert_eq!(kinds.last(), Some(&TokenKind::Illegal));
        assert!(errors[0].contains("Expected 'create', 'make' or 'length'"));
    }

    #[test]
    fn test_comment_skipped() {
        use TokenKind::*;
        assert_eq!(
            lex_kinds("1 (* comment * with stars *) 2"),
            vec![Int, Int, Eof]
        );
    }

    #[test]
    fn test_unterminated_comment() {
        let (kinds, errors) = lex_with_errors("1 (* never closed");
        assert_eq!(kinds, vec![TokenKind::Int, TokenKind::Illegal]);
        assert!(errors[0].contains("closing comment"));
    }

    #[test]
    fn test_malformed_exponent() {
        let (kinds, errors) = lex_with_errors("1e");
        assert_eq!(kinds.last(), Some(&TokenKind::Illegal));
        assert!(errors[0].contains("exponential part of float literal"));
    }

    #[test]
    fn test_string_literal() {
        let tokens: Vec<_> = Lexer::new(Source::dummy(r#""hi \"there\"""#)).collect();
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].value(), r#""hi \"there\"""#);
    }

    #[test]
    fn test_unclosed_string() {
        let (kinds, errors) = lex_with_errors("\"abc");
        assert_eq!(kinds.last(), Some(&TokenKind::Illegal));
        assert!(errors[0].contains("closing string literal"));
    }

    #[test]
    fn test_single_ampersand() {
        let (kinds, errors) = lex_with_errors("1 & 2");
        assert_eq!(kinds, vec![TokenKind::Int, TokenKind::Illegal]);
        assert!(errors[0].contains("Expected '&&'"));
    }

    #[test]
    fn test_line_tracking() {
        let tokens: Vec<_> = Lexer::new(Source::dummy("1\n  2")).collect();
        assert_eq!(tokens[1].start.line, 2);
        assert_eq!(tokens[1].start.column, 3);
    }

    #[test]
    fn test_stream_stops_after_eof() {
        let mut lexer = Lexer::new(Source::dummy("1"));
        assert_eq!(lexer.next().map(|t| t.kind), Some(TokenKind::Int));
        assert_eq!(lexer.next().map(|t| t.kind), Some(TokenKind::Eof));
        assert!(lexer.next().is_none());
    }
}
