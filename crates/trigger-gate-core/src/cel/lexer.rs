//! Tokenizer for CEL source text.

use super::CelError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(u64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Ident(String),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Not,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Eof,
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub position: usize,
}

// Words CEL reserves for future use; they cannot be identifiers.
const RESERVED: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let", "loop",
    "package", "namespace", "return", "var", "void", "while",
];

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, CelError> {
    Lexer {
        src: source.as_bytes(),
        source,
        pos: 0,
    }
    .run()
}

struct Lexer<'a> {
    src: &'a [u8],
    source: &'a str,
    pos: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> CelError {
    CelError::Syntax {
        position,
        message: message.into(),
    }
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Spanned>, CelError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let position = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    position,
                });
                return Ok(tokens);
            };

            let token = match c {
                b'0'..=b'9' => self.number()?,
                b'.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                b'"' | b'\'' => self.string_literal(false, false)?,
                b'r' | b'R' | b'b' | b'B' if self.is_prefixed_literal() => self.prefixed_literal()?,
                c if c == b'_' || c.is_ascii_alphabetic() => self.ident()?,
                _ => self.punctuation()?,
            };
            tokens.push(Spanned { token, position });
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else if c == b'/' && self.peek_at(1) == Some(b'/') {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn punctuation(&mut self) -> Result<Token, CelError> {
        let start = self.pos;
        let c = self.src[start];
        let next = self.peek_at(1);
        let (token, width) = match (c, next) {
            (b'&', Some(b'&')) => (Token::AndAnd, 2),
            (b'|', Some(b'|')) => (Token::OrOr, 2),
            (b'=', Some(b'=')) => (Token::EqEq, 2),
            (b'!', Some(b'=')) => (Token::NotEq, 2),
            (b'<', Some(b'=')) => (Token::LessEq, 2),
            (b'>', Some(b'=')) => (Token::GreaterEq, 2),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b'[', _) => (Token::LBracket, 1),
            (b']', _) => (Token::RBracket, 1),
            (b'{', _) => (Token::LBrace, 1),
            (b'}', _) => (Token::RBrace, 1),
            (b'.', _) => (Token::Dot, 1),
            (b',', _) => (Token::Comma, 1),
            (b':', _) => (Token::Colon, 1),
            (b'?', _) => (Token::Question, 1),
            (b'!', _) => (Token::Not, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'+', _) => (Token::Plus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'%', _) => (Token::Percent, 1),
            (b'<', _) => (Token::Less, 1),
            (b'>', _) => (Token::Greater, 1),
            _ => {
                let ch = self.source[start..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character '{ch}'")));
            }
        };
        self.pos += width;
        Ok(token)
    }

    fn ident(&mut self) -> Result<Token, CelError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c == b'_' || c.is_ascii_alphanumeric())
        {
            self.pos += 1;
        }
        let word = &self.source[start..self.pos];
        Ok(match word {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            w if RESERVED.contains(&w) => {
                return Err(syntax(start, format!("reserved identifier '{w}'")));
            }
            w => Token::Ident(w.to_string()),
        })
    }

    fn number(&mut self) -> Result<Token, CelError> {
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.source[digits_start..self.pos];
            let value = u64::from_str_radix(digits, 16)
                .map_err(|_| syntax(start, format!("invalid hex literal '0x{digits}'")))?;
            return self.int_suffix(start, value);
        }

        let mut is_double = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut lookahead = 1;
            if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                lookahead = 2;
            }
            if self.peek_at(lookahead).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                self.pos += lookahead;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }

        let text = &self.source[start..self.pos];
        if is_double {
            let value: f64 = text
                .parse()
                .map_err(|_| syntax(start, format!("invalid double literal '{text}'")))?;
            return Ok(Token::Double(value));
        }

        let value: u64 = text
            .parse()
            .map_err(|_| syntax(start, format!("integer literal '{text}' out of range")))?;
        self.int_suffix(start, value)
    }

    fn int_suffix(&mut self, start: usize, value: u64) -> Result<Token, CelError> {
        if matches!(self.peek(), Some(b'u' | b'U')) {
            return Err(syntax(start, "unsigned integer literals are not supported"));
        }
        if self
            .peek()
            .is_some_and(|c| c == b'_' || c.is_ascii_alphabetic())
        {
            return Err(syntax(self.pos, "invalid numeric literal suffix"));
        }
        Ok(Token::Int(value))
    }

    fn is_prefixed_literal(&self) -> bool {
        let first = self.peek_at(1);
        match first {
            Some(b'"' | b'\'') => true,
            Some(b'r' | b'R' | b'b' | b'B') => {
                let pair = (
                    self.src[self.pos].to_ascii_lowercase(),
                    first.map(|c| c.to_ascii_lowercase()),
                );
                matches!(pair, (b'r', Some(b'b')) | (b'b', Some(b'r')))
                    && matches!(self.peek_at(2), Some(b'"' | b'\''))
            }
            _ => false,
        }
    }

    fn prefixed_literal(&mut self) -> Result<Token, CelError> {
        let mut raw = false;
        let mut bytes = false;
        while let Some(c) = self.peek() {
            match c.to_ascii_lowercase() {
                b'r' => raw = true,
                b'b' => bytes = true,
                _ => break,
            }
            self.pos += 1;
        }
        self.string_literal(raw, bytes)
    }

    fn string_literal(&mut self, raw: bool, bytes: bool) -> Result<Token, CelError> {
        let start = self.pos;
        let quote = self.src[start];
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(syntax(start, "unterminated string literal"));
            };

            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if !triple && (c == b'\n' || c == b'\r') {
                return Err(syntax(self.pos, "newline in string literal"));
            }

            if c == b'\\' && !raw {
                self.escape(&mut out, bytes)?;
            } else {
                out.push(c);
                self.pos += 1;
            }
        }

        if bytes {
            return Ok(Token::Bytes(out));
        }
        String::from_utf8(out)
            .map(Token::String)
            .map_err(|_| syntax(start, "string literal is not valid UTF-8"))
    }

    fn escape(&mut self, out: &mut Vec<u8>, bytes: bool) -> Result<(), CelError> {
        let start = self.pos;
        self.pos += 1;
        let Some(c) = self.peek() else {
            return Err(syntax(start, "unterminated escape sequence"));
        };
        self.pos += 1;

        let simple = match c {
            b'\\' => Some(b'\\'),
            b'\'' => Some(b'\''),
            b'"' => Some(b'"'),
            b'`' => Some(b'`'),
            b'?' => Some(b'?'),
            b'a' => Some(0x07),
            b'b' => Some(0x08),
            b'f' => Some(0x0c),
            b'n' => Some(b'\n'),
            b'r' => Some(b'\r'),
            b't' => Some(b'\t'),
            b'v' => Some(0x0b),
            _ => None,
        };
        if let Some(b) = simple {
            out.push(b);
            return Ok(());
        }

        match c {
            b'x' | b'X' => {
                let code = self.hex_digits(start, 2)?;
                self.push_code(out, code, bytes, start)
            }
            b'u' if !bytes => {
                let code = self.hex_digits(start, 4)?;
                self.push_code(out, code, false, start)
            }
            b'U' if !bytes => {
                let code = self.hex_digits(start, 8)?;
                self.push_code(out, code, false, start)
            }
            b'0'..=b'3' => {
                let mut code = u32::from(c - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            code = code * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => return Err(syntax(start, "octal escape needs three digits")),
                    }
                }
                self.push_code(out, code, bytes, start)
            }
            _ => Err(syntax(start, format!("invalid escape sequence '\\{}'", c as char))),
        }
    }

    fn hex_digits(&mut self, start: usize, count: usize) -> Result<u32, CelError> {
        let end = self.pos + count;
        let digits = self
            .source
            .get(self.pos..end)
            .filter(|d| d.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| syntax(start, "invalid hex escape"))?;
        let code =
            u32::from_str_radix(digits, 16).map_err(|_| syntax(start, "invalid hex escape"))?;
        self.pos = end;
        Ok(code)
    }

    fn push_code(
        &self,
        out: &mut Vec<u8>,
        code: u32,
        raw_byte: bool,
        start: usize,
    ) -> Result<(), CelError> {
        if raw_byte {
            let byte = u8::try_from(code).map_err(|_| syntax(start, "byte escape out of range"))?;
            out.push(byte);
            return Ok(());
        }
        let ch = char::from_u32(code).ok_or_else(|| syntax(start, "invalid unicode escape"))?;
        let mut buf = [0u8; 4];
        out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

#[cfg(test)]
#[path = "lexer_tests.rs"]
mod tests;
