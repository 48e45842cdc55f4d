//! Restricted boolean expression language for `script` conditions.
//!
//! Operators cover comparisons, substring and regex tests, and the usual
//! boolean combinators over request facets:
//!
//! ```text
//! query.plan == 'gold' && (body.amount > 1000 || header.x-vip)
//! ```
//!
//! Facet references are `query.<key>`, `header.<key>`, `param.<key>`,
//! `body.<dotted.path>`, `method` and `path`; a leading `req.` is accepted
//! and stripped. A bare reference tests presence and truthiness. The
//! language has no loops, no recursion and no host access, so evaluation
//! always terminates.

use crate::evaluator::RequestFacets;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExprError {
    #[error("unexpected character '{0}' at byte {1}")]
    UnexpectedChar(char, usize),

    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("invalid regex '{0}': {1}")]
    BadRegex(String, regex::Error),

    #[error("empty expression")]
    Empty,
}

/// Parse and evaluate a predicate against the request.
pub fn eval_predicate(source: &str, facets: &RequestFacets) -> Result<bool, ExprError> {
    let expr = parse(source)?;
    expr.eval(facets)
}

/// Parse a predicate, reporting syntax errors without evaluating.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(ExprError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(ExprError::UnexpectedToken(format!("{tok:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    LParen,
    RParen,
    And,
    Or,
    Not,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    Matches,
    True,
    False,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let bytes = source.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' if bytes.get(i + 1) == Some(&b'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if bytes.get(i + 1) == Some(&b'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '=' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '>' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '<' if bytes.get(i + 1) == Some(&b'=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut lit = String::new();
                i += 1;
                loop {
                    match source[i..].chars().next() {
                        None => return Err(ExprError::UnterminatedString),
                        Some('\\') => {
                            let Some(escaped) = source[i + 1..].chars().next() else {
                                return Err(ExprError::UnterminatedString);
                            };
                            lit.push(escaped);
                            i += 1 + escaped.len_utf8();
                        }
                        Some(ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            lit.push(ch);
                            i += ch.len_utf8();
                        }
                    }
                }
                tokens.push(Token::Str(lit));
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_digit() || bytes[i] == b'.')
                {
                    i += 1;
                }
                let text = &source[start..i];
                let num = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::UnexpectedToken(text.to_string()))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let ch = bytes[i] as char;
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '.' || ch == '-' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let word = &source[start..i];
                tokens.push(match word {
                    "contains" => Token::Contains,
                    "matches" => Token::Matches,
                    "true" => Token::True,
                    "false" => Token::False,
                    _ => Token::Ident(word.to_string()),
                });
            }
            other => return Err(ExprError::UnexpectedChar(other, i)),
        }
    }

    Ok(tokens)
}

/// Parsed predicate tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp {
        lhs: Operand,
        op: CmpOp,
        rhs: Operand,
    },
    /// Bare operand: presence-and-truthiness test.
    Truthy(Operand),
}

#[derive(Debug, Clone)]
pub enum Operand {
    /// Facet reference such as `query.plan` or `body.customer.tier`.
    Ref(String),
    Str(String),
    Num(f64),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    Matches,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary_expr()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let rhs = self.unary_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let inner = self.unary_expr()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.primary_expr()
    }

    fn primary_expr(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.or_expr()?;
            match self.next() {
                Some(Token::RParen) => return Ok(inner),
                Some(other) => return Err(ExprError::UnexpectedToken(format!("{other:?}"))),
                None => return Err(ExprError::UnexpectedEnd),
            }
        }

        let lhs = self.operand()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Contains) => CmpOp::Contains,
            Some(Token::Matches) => CmpOp::Matches,
            _ => return Ok(Expr::Truthy(lhs)),
        };
        self.next();
        let rhs = self.operand()?;
        Ok(Expr::Cmp { lhs, op, rhs })
    }

    fn operand(&mut self) -> Result<Operand, ExprError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(Operand::Ref(name)),
            Some(Token::Str(s)) => Ok(Operand::Str(s)),
            Some(Token::Num(n)) => Ok(Operand::Num(n)),
            Some(Token::True) => Ok(Operand::Bool(true)),
            Some(Token::False) => Ok(Operand::Bool(false)),
            Some(other) => Err(ExprError::UnexpectedToken(format!("{other:?}"))),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

impl Expr {
    fn eval(&self, facets: &RequestFacets) -> Result<bool, ExprError> {
        match self {
            Expr::Or(lhs, rhs) => Ok(lhs.eval(facets)? || rhs.eval(facets)?),
            Expr::And(lhs, rhs) => Ok(lhs.eval(facets)? && rhs.eval(facets)?),
            Expr::Not(inner) => Ok(!inner.eval(facets)?),
            Expr::Truthy(operand) => Ok(truthy(operand.resolve(facets).as_ref())),
            Expr::Cmp { lhs, op, rhs } => {
                let left = lhs.resolve(facets);
                let right = rhs.resolve(facets);
                compare(*op, left, right)
            }
        }
    }
}

impl Operand {
    fn resolve(&self, facets: &RequestFacets) -> Option<Value> {
        match self {
            Operand::Str(s) => Some(Value::String(s.clone())),
            Operand::Num(n) => serde_json::Number::from_f64(*n).map(Value::Number),
            Operand::Bool(b) => Some(Value::Bool(*b)),
            Operand::Ref(name) => resolve_ref(name, facets),
        }
    }
}

fn resolve_ref(name: &str, facets: &RequestFacets) -> Option<Value> {
    let name = name.strip_prefix("req.").unwrap_or(name);

    if name == "method" {
        return Some(Value::String(facets.method.clone()));
    }
    if name == "path" {
        return Some(Value::String(facets.path.clone()));
    }

    let (facet, key) = name.split_once('.')?;
    match facet {
        "query" => facets.query.get(key).cloned().map(Value::String),
        "header" => facets.header(key).map(|v| Value::String(v.to_string())),
        "param" => facets.params.get(key).cloned().map(Value::String),
        "body" => {
            let mut current = facets.body.as_ref()?;
            for part in key.split('.') {
                current = current.get(part)?;
            }
            if current.is_null() {
                None
            } else {
                Some(current.clone())
            }
        }
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty() && s != "false" && s != "0",
        Some(_) => true,
    }
}

fn compare(op: CmpOp, left: Option<Value>, right: Option<Value>) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq | CmpOp::Ne => {
            let equal = match (&left, &right) {
                (Some(l), Some(r)) => match (as_number(l), as_number(r)) {
                    (Some(ln), Some(rn)) => ln == rn,
                    _ => as_text(l) == as_text(r),
                },
                _ => false,
            };
            Ok(if op == CmpOp::Eq { equal } else { !equal })
        }
        CmpOp::Gt | CmpOp::Ge | CmpOp::Lt | CmpOp::Le => {
            let (Some(l), Some(r)) = (
                left.as_ref().and_then(|v| as_number(v)),
                right.as_ref().and_then(|v| as_number(v)),
            ) else {
                return Ok(false);
            };
            Ok(match op {
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                _ => unreachable!(),
            })
        }
        CmpOp::Contains => {
            let (Some(l), Some(r)) = (left, right) else {
                return Ok(false);
            };
            Ok(as_text(&l).contains(&as_text(&r)))
        }
        CmpOp::Matches => {
            let (Some(l), Some(r)) = (left, right) else {
                return Ok(false);
            };
            let pattern = as_text(&r);
            let re = Regex::new(&pattern).map_err(|e| ExprError::BadRegex(pattern, e))?;
            Ok(re.is_match(&as_text(&l)))
        }
    }
}
