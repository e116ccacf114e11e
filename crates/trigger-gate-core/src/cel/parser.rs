//! Recursive descent parser producing the expression tree.
//!
//! Operator precedence, lowest first: `?:`, `||`, `&&`, relations
//! (`< <= > >= == != in`), `+ -`, `* / %`, unary `! -`, member access.
//! Macros (`has`, `all`, `exists`, `exists_one`, `map`, `filter`) are expanded
//! here into dedicated nodes.

use super::{
    lexer::{tokenize, Spanned, Token},
    value::Value,
    CelError,
};

/// Nesting depth at which parsing gives up.
///
/// Every operator and member access in a chain counts as one level, so this
/// also bounds the height of the tree that checking and evaluation recurse
/// over.
const MAX_DEPTH: usize = 128;

/// Namespaces whose functions are called with a qualified name.
const FUNCTION_NAMESPACES: &[&str] = &["base64"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl BinaryOp {
    pub(crate) fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MacroKind {
    All,
    Exists,
    ExistsOne,
    Map,
    Filter,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Literal(Value),
    Ident(String),
    Select {
        operand: Box<Expr>,
        field: String,
        /// Set for `has(operand.field)`.
        test_only: bool,
    },
    Index {
        operand: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        function: String,
        target: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Comprehension {
        kind: MacroKind,
        range: Box<Expr>,
        variable: String,
        /// Predicate for `all`/`exists`/`exists_one`/`filter` and the
        /// optional filter of three argument `map`.
        predicate: Option<Box<Expr>>,
        /// Transform for `map`.
        transform: Option<Box<Expr>>,
    },
}

pub(crate) fn parse(source: &str) -> Result<Expr, CelError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(parser.error(format!("unexpected token {}", describe(other)))),
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => format!("integer {i}"),
        Token::Double(d) => format!("double {d}"),
        Token::String(_) => "string literal".to_string(),
        Token::Bytes(_) => "bytes literal".to_string(),
        Token::Ident(name) => format!("identifier '{name}'"),
        Token::Eof => "end of input".to_string(),
        other => format!("{other:?}"),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.position)
            .unwrap_or(0)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), CelError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}, found {}", describe(self.peek()))))
        }
    }

    fn error(&self, message: impl Into<String>) -> CelError {
        CelError::Syntax {
            position: self.position(),
            message: message.into(),
        }
    }

    fn enter(&mut self) -> Result<(), CelError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, CelError> {
        self.enter()?;
        let condition = self.or()?;
        let result = if self.eat(&Token::Question) {
            let then = self.or()?;
            self.expect(Token::Colon, "':'")?;
            let otherwise = self.expr()?;
            Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            }
        } else {
            condition
        };
        self.depth -= 1;
        Ok(result)
    }

    fn or(&mut self) -> Result<Expr, CelError> {
        let base = self.depth;
        let mut lhs = self.and()?;
        while self.eat(&Token::OrOr) {
            self.enter()?;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, CelError> {
        let base = self.depth;
        let mut lhs = self.relation()?;
        while self.eat(&Token::AndAnd) {
            self.enter()?;
            let rhs = self.relation()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn relation(&mut self) -> Result<Expr, CelError> {
        let base = self.depth;
        let mut lhs = self.addition()?;
        loop {
            let op = match self.peek() {
                Token::Less => BinaryOp::Lt,
                Token::LessEq => BinaryOp::Le,
                Token::Greater => BinaryOp::Gt,
                Token::GreaterEq => BinaryOp::Ge,
                Token::EqEq => BinaryOp::Eq,
                Token::NotEq => BinaryOp::Ne,
                Token::In => BinaryOp::In,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let rhs = self.addition()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn addition(&mut self) -> Result<Expr, CelError> {
        let base = self.depth;
        let mut lhs = self.multiplication()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let rhs = self.multiplication()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn multiplication(&mut self) -> Result<Expr, CelError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        self.depth = base;
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CelError> {
        match self.peek() {
            Token::Not => {
                self.advance();
                self.enter()?;
                let operand = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            Token::Minus => {
                self.advance();
                // Fold negative literals so that i64::MIN is expressible.
                if let Token::Int(magnitude) = *self.peek() {
                    let next = self.tokens.get(self.pos + 1).map(|s| &s.token);
                    if !matches!(next, Some(Token::Dot | Token::LBracket)) {
                        self.advance();
                        let value = i64::try_from(-(i128::from(magnitude)))
                            .map_err(|_| self.error("integer literal out of range"))?;
                        return self.member_suffix(Expr::Literal(Value::Int(value)));
                    }
                }
                self.enter()?;
                let operand = self.unary()?;
                self.depth -= 1;
                Ok(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            _ => self.member(),
        }
    }

    fn member(&mut self) -> Result<Expr, CelError> {
        let primary = self.primary()?;
        self.member_suffix(primary)
    }

    fn member_suffix(&mut self, mut expr: Expr) -> Result<Expr, CelError> {
        let base = self.depth;
        loop {
            match self.peek() {
                Token::Dot => {
                    self.advance();
                    self.enter()?;
                    let field = match self.advance() {
                        Token::Ident(name) => name,
                        other => {
                            return Err(self.error(format!(
                                "expected field name after '.', found {}",
                                describe(&other)
                            )))
                        }
                    };
                    if self.eat(&Token::LParen) {
                        let args = self.arguments(Token::RParen)?;
                        expr = self.member_call(expr, field, args)?;
                    } else {
                        expr = Expr::Select {
                            operand: Box::new(expr),
                            field,
                            test_only: false,
                        };
                    }
                }
                Token::LBracket => {
                    self.advance();
                    self.enter()?;
                    let index = self.expr()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index {
                        operand: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => break,
            }
        }
        self.depth = base;
        Ok(expr)
    }

    fn primary(&mut self) -> Result<Expr, CelError> {
        let position = self.position();
        match self.advance() {
            Token::Int(i) => i64::try_from(i)
                .map(|v| Expr::Literal(Value::Int(v)))
                .map_err(|_| CelError::Syntax {
                    position,
                    message: "integer literal out of range".to_string(),
                }),
            Token::Double(d) => Ok(Expr::Literal(Value::Double(d))),
            Token::String(s) => Ok(Expr::Literal(Value::String(s))),
            Token::Bytes(b) => Ok(Expr::Literal(Value::Bytes(b))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Null)),
            Token::Dot => match self.advance() {
                Token::Ident(name) => self.identifier(name),
                other => Err(self.error(format!(
                    "expected identifier after leading '.', found {}",
                    describe(&other)
                ))),
            },
            Token::Ident(name) => self.identifier(name),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                self.enter()?;
                let items = self.arguments(Token::RBracket)?;
                self.depth -= 1;
                Ok(Expr::List(items))
            }
            Token::LBrace => {
                self.enter()?;
                let entries = self.map_entries()?;
                self.depth -= 1;
                Ok(Expr::Map(entries))
            }
            other => Err(CelError::Syntax {
                position,
                message: format!("unexpected {}", describe(&other)),
            }),
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr, CelError> {
        if !self.eat(&Token::LParen) {
            return Ok(Expr::Ident(name));
        }
        let args = self.arguments(Token::RParen)?;
        if name == "has" {
            return self.has_macro(args);
        }
        Ok(Expr::Call {
            function: name,
            target: None,
            args,
        })
    }

    /// Parse a comma separated list up to `close`, allowing a trailing comma.
    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>, CelError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.expr()?);
            if self.eat(&Token::Comma) {
                if self.eat(&close) {
                    return Ok(items);
                }
                continue;
            }
            let what = if close == Token::RParen { "')'" } else { "']'" };
            self.expect(close, what)?;
            return Ok(items);
        }
    }

    fn map_entries(&mut self) -> Result<Vec<(Expr, Expr)>, CelError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(entries);
        }
        loop {
            let key = self.expr()?;
            self.expect(Token::Colon, "':'")?;
            let value = self.expr()?;
            entries.push((key, value));
            if self.eat(&Token::Comma) {
                if self.eat(&Token::RBrace) {
                    return Ok(entries);
                }
                continue;
            }
            self.expect(Token::RBrace, "'}'")?;
            return Ok(entries);
        }
    }

    fn has_macro(&self, mut args: Vec<Expr>) -> Result<Expr, CelError> {
        if args.len() != 1 {
            return Err(self.error("has() takes exactly one argument"));
        }
        match args.pop() {
            Some(Expr::Select { operand, field, .. }) => Ok(Expr::Select {
                operand,
                field,
                test_only: true,
            }),
            _ => Err(self.error("has() argument must be a field selection")),
        }
    }

    fn member_call(
        &self,
        target: Expr,
        function: String,
        mut args: Vec<Expr>,
    ) -> Result<Expr, CelError> {
        let kind = match function.as_str() {
            "all" => Some(MacroKind::All),
            "exists" => Some(MacroKind::Exists),
            "exists_one" => Some(MacroKind::ExistsOne),
            "map" => Some(MacroKind::Map),
            "filter" => Some(MacroKind::Filter),
            _ => None,
        };

        if let Some(kind) = kind {
            let arity_ok = match kind {
                MacroKind::Map => args.len() == 2 || args.len() == 3,
                _ => args.len() == 2,
            };
            if !arity_ok {
                return Err(self.error(format!("wrong number of arguments to {function}()")));
            }
            let variable = match args.first() {
                Some(Expr::Ident(name)) => name.clone(),
                _ => {
                    return Err(self.error(format!(
                        "first argument to {function}() must be a variable name"
                    )))
                }
            };
            let mut rest = args.drain(1..);
            let (predicate, transform) = match (kind, rest.len()) {
                (MacroKind::Map, 1) => (None, rest.next()),
                (MacroKind::Map, _) => (rest.next(), rest.next()),
                _ => (rest.next(), None),
            };
            return Ok(Expr::Comprehension {
                kind,
                range: Box::new(target),
                variable,
                predicate: predicate.map(Box::new),
                transform: transform.map(Box::new),
            });
        }

        if let Expr::Ident(namespace) = &target {
            if FUNCTION_NAMESPACES.contains(&namespace.as_str()) {
                return Ok(Expr::Call {
                    function: format!("{namespace}.{function}"),
                    target: None,
                    args,
                });
            }
        }

        Ok(Expr::Call {
            function,
            target: Some(Box::new(target)),
            args,
        })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
