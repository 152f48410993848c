use crate::{
    diag::Diagnostics,
    span::Position,
    token::{Token, TokenKind},
};

const EOF: u8 = b'\0';

/// Byte-level scanner. Lexing does not stop at the first error; bad
/// input produces `Error` tokens and the driver aborts before parsing
/// when the sink holds errors.
#[derive(Debug)]
pub struct Lexer<'a> {
    source:     &'a str,
    input:      &'a [u8],
    start:      usize,
    cur:        usize,
    line:       u32,
    line_start: u32,
    diags:      &'a mut Diagnostics,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, diags: &'a mut Diagnostics) -> Self {
        Self {
            source,
            input: source.as_bytes(),
            start: 0,
            cur: 0,
            line: 1,
            line_start: 0,
            diags,
        }
    }

    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            self.start = self.cur;
            if self.is_eof() {
                tokens.push(Token::new(TokenKind::Eof, "EOF", self.position_at(self.cur)));
                return tokens;
            }
            let token = self.next_token();
            tokens.push(token);
        }
    }

    fn is_eof(&self) -> bool {
        self.cur >= self.input.len()
    }

    fn peek(&self) -> u8 {
        self.input.get(self.cur).copied().unwrap_or(EOF)
    }

    fn peek_next(&self) -> u8 {
        self.input.get(self.cur + 1).copied().unwrap_or(EOF)
    }

    fn bump(&mut self) -> Option<u8> {
        self.cur += 1;
        self.input.get(self.cur - 1).copied()
    }

    fn eat_while<P>(&mut self, mut predicate: P)
    where
        P: FnMut(u8) -> bool,
    {
        while !self.is_eof() && predicate(self.peek()) {
            self.bump();
        }
    }

    fn newline(&mut self) {
        self.bump();
        self.line += 1;
        self.line_start = self.cur as u32;
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\t' | b'\r' => {
                    self.bump();
                }
                b'\n' => self.newline(),
                b'/' if self.peek_next() == b'/' => {
                    self.eat_while(|c| c != b'\n');
                }
                b'/' if self.peek_next() == b'*' => {
                    self.bump();
                    self.bump();
                    // no nesting; a comment still open at EOF is dropped
                    loop {
                        if self.is_eof() {
                            return;
                        }
                        if self.peek() == b'*' && self.peek_next() == b'/' {
                            self.bump();
                            self.bump();
                            break;
                        }
                        if self.peek() == b'\n' {
                            self.newline();
                        } else {
                            self.bump();
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        let lexeme = &self.source[self.start..self.cur];
        Token::new(kind, lexeme, self.position())
    }

    fn position(&self) -> Position {
        Position::new(
            self.start as u32,
            self.cur as u32,
            self.line,
            self.line_start,
        )
    }

    fn position_at(&self, index: usize) -> Position {
        Position::new(index as u32, index as u32 + 1, self.line, self.line_start)
    }

    fn next_token(&mut self) -> Token {
        let c = self.peek();

        if c.is_ascii_digit() {
            return self.number();
        }
        if TokenKind::is_ident_start(c) {
            return self.name();
        }
        if c == b'"' || c == b'\'' {
            return self.string(c);
        }

        self.bump();
        match c {
            b'(' => self.make_token(TokenKind::LParen),
            b')' => self.make_token(TokenKind::RParen),
            b'{' => self.make_token(TokenKind::LBrace),
            b'}' => self.make_token(TokenKind::RBrace),
            b'[' => self.make_token(TokenKind::LBracket),
            b']' => self.make_token(TokenKind::RBracket),
            b';' => self.make_token(TokenKind::Semicolon),
            b',' => self.make_token(TokenKind::Comma),
            b'.' => self.make_token(TokenKind::Dot),
            b':' => self.make_token(TokenKind::Colon),
            b'^' => self.make_token(TokenKind::Caret),
            b'%' => self.make_token(TokenKind::Percent),
            b'&' => self.make_token(TokenKind::Ampersand),
            b'|' => self.make_token(TokenKind::Pipe),
            b'~' => self.make_token(TokenKind::Tilde),
            b'+' => self.one_or_two(b'=', TokenKind::PlusEq, TokenKind::Plus),
            b'*' => self.one_or_two(b'=', TokenKind::StarEq, TokenKind::Star),
            b'/' => self.one_or_two(b'=', TokenKind::SlashEq, TokenKind::Slash),
            b'!' => self.one_or_two(b'=', TokenKind::BangEq, TokenKind::Bang),
            b'<' => self.one_or_two(b'=', TokenKind::LessEq, TokenKind::Less),
            b'>' => self.one_or_two(b'=', TokenKind::GreaterEq, TokenKind::Greater),
            // `->` and `=>` win over the single-character readings
            b'-' => match self.peek() {
                b'>' => {
                    self.bump();
                    self.make_token(TokenKind::Arrow)
                }
                b'=' => {
                    self.bump();
                    self.make_token(TokenKind::MinusEq)
                }
                _ => self.make_token(TokenKind::Minus),
            },
            b'=' => match self.peek() {
                b'>' => {
                    self.bump();
                    self.make_token(TokenKind::DoubleArrow)
                }
                b'=' => {
                    self.bump();
                    self.make_token(TokenKind::EqEq)
                }
                _ => self.make_token(TokenKind::Eq),
            },
            _ => {
                self.diags.error(
                    format!("Unknown Character '{}'", c as char),
                    self.position(),
                );
                self.make_token(TokenKind::Error)
            }
        }
    }

    fn one_or_two(&mut self, next: u8, double: TokenKind, single: TokenKind) -> Token {
        if self.peek() == next {
            self.bump();
            self.make_token(double)
        } else {
            self.make_token(single)
        }
    }

    fn number(&mut self) -> Token {
        let mut is_float = false;
        loop {
            let c = self.peek();
            if c.is_ascii_digit() {
                self.bump();
            } else if c == b'.' {
                if is_float {
                    // second dot stays in the stream; the token so far
                    // becomes an error token
                    self.diags.error("Unexpected '.'", self.position_at(self.cur));
                    return self.make_token(TokenKind::Error);
                }
                is_float = true;
                self.bump();
            } else {
                break;
            }
        }
        if is_float {
            self.make_token(TokenKind::FloatLit)
        } else {
            self.make_token(TokenKind::IntLit)
        }
    }

    fn name(&mut self) -> Token {
        self.eat_while(TokenKind::is_ident_char);
        let s = &self.source[self.start..self.cur];
        match TokenKind::keyword(s) {
            Some(kw) => self.make_token(kw),
            None => self.make_token(TokenKind::Identifier),
        }
    }

    fn string(&mut self, quote: u8) -> Token {
        self.bump();
        let mut last = self.start;
        while !self.is_eof() && self.peek() != quote && self.peek() != b'\n' {
            last = self.cur;
            self.bump();
        }

        let kind = if quote == b'"' {
            TokenKind::StringLit
        } else {
            TokenKind::CharLit
        };

        if self.peek() == quote {
            self.bump();
            let lexeme = &self.source[self.start + 1..self.cur - 1];
            Token::new(kind, lexeme, self.position())
        } else {
            self.diags.error(
                "Unterminated string or character literal",
                self.position_at(last),
            );
            let lexeme = &self.source[self.start + 1..self.cur];
            Token::new(kind, lexeme, self.position())
        }
    }
}
