//! Condition expressions for event triggers.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | "(" or ")" | compare
//! compare := operand (("<" | "<=" | ">" | ">=" | "==" | "!=") operand)?
//! operand := number | "true" | "false" | path
//! ```
//!
//! Parsing yields a [`Predicate`] over raw path strings; [`Predicate::compile`] resolves the
//! paths once at build time so evaluation does no string handling.

use crate::core::values::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
#[error("cannot parse condition '{expression}' at offset {offset}: {reason}")]
pub struct ParseError {
    pub expression: String,
    pub offset: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    fn apply_f64(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand<P> {
    Number(f64),
    Bool(bool),
    Path(P),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate<P> {
    Compare {
        lhs: Operand<P>,
        op: CompareOp,
        rhs: Operand<P>,
    },
    /// Bare operand, true when its value is truthy
    Truthy(Operand<P>),
    Not(Box<Predicate<P>>),
    And(Box<Predicate<P>>, Box<Predicate<P>>),
    Or(Box<Predicate<P>>, Box<Predicate<P>>),
}

impl Predicate<String> {
    pub fn parse(expression: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(expression)?;
        let mut parser = Parser {
            expression,
            tokens,
            position: 0,
        };
        let predicate = parser.parse_or()?;
        if let Some((offset, token)) = parser.tokens.get(parser.position) {
            return Err(parser.error_at(*offset, format!("unexpected {:?}", token)));
        }
        Ok(predicate)
    }
}

impl<P> Predicate<P> {
    /// Resolve every path with `resolve`, collecting all failures
    pub fn compile<Q, E>(self, resolve: &mut impl FnMut(&P) -> Result<Q, E>) -> Result<Predicate<Q>, Vec<E>> {
        let mut errors = Vec::new();
        let compiled = self.map_paths(resolve, &mut errors);
        match compiled {
            Some(predicate) if errors.is_empty() => Ok(predicate),
            _ => Err(errors),
        }
    }

    fn map_paths<Q, E>(
        self,
        resolve: &mut impl FnMut(&P) -> Result<Q, E>,
        errors: &mut Vec<E>,
    ) -> Option<Predicate<Q>> {
        Some(match self {
            Predicate::Compare { lhs, op, rhs } => {
                let lhs = map_operand(lhs, resolve, errors);
                let rhs = map_operand(rhs, resolve, errors);
                Predicate::Compare { lhs: lhs?, op, rhs: rhs? }
            }
            Predicate::Truthy(operand) => Predicate::Truthy(map_operand(operand, resolve, errors)?),
            Predicate::Not(inner) => Predicate::Not(Box::new(inner.map_paths(resolve, errors)?)),
            Predicate::And(a, b) => {
                let a = a.map_paths(resolve, errors);
                let b = b.map_paths(resolve, errors);
                Predicate::And(Box::new(a?), Box::new(b?))
            }
            Predicate::Or(a, b) => {
                let a = a.map_paths(resolve, errors);
                let b = b.map_paths(resolve, errors);
                Predicate::Or(Box::new(a?), Box::new(b?))
            }
        })
    }

    /// Evaluate with `lookup` supplying path values; a missing value makes its comparison false
    pub fn evaluate(&self, lookup: &impl Fn(&P) -> Option<Value>) -> bool {
        match self {
            Predicate::Compare { lhs, op, rhs } => {
                match (operand_value(lhs, lookup), operand_value(rhs, lookup)) {
                    (Some(a), Some(b)) => compare(&a, *op, &b),
                    _ => false,
                }
            }
            Predicate::Truthy(operand) => operand_value(operand, lookup).map_or(false, |v| truthy(&v)),
            Predicate::Not(inner) => !inner.evaluate(lookup),
            Predicate::And(a, b) => a.evaluate(lookup) && b.evaluate(lookup),
            Predicate::Or(a, b) => a.evaluate(lookup) || b.evaluate(lookup),
        }
    }

    /// Every path the predicate reads
    pub fn paths(&self) -> Vec<&P> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a P>) {
        match self {
            Predicate::Compare { lhs, rhs, .. } => {
                push_path(lhs, out);
                push_path(rhs, out);
            }
            Predicate::Truthy(operand) => push_path(operand, out),
            Predicate::Not(inner) => inner.collect_paths(out),
            Predicate::And(a, b) | Predicate::Or(a, b) => {
                a.collect_paths(out);
                b.collect_paths(out);
            }
        }
    }
}

fn push_path<'a, P>(operand: &'a Operand<P>, out: &mut Vec<&'a P>) {
    if let Operand::Path(p) = operand {
        out.push(p);
    }
}

fn map_operand<P, Q, E>(
    operand: Operand<P>,
    resolve: &mut impl FnMut(&P) -> Result<Q, E>,
    errors: &mut Vec<E>,
) -> Option<Operand<Q>> {
    match operand {
        Operand::Number(n) => Some(Operand::Number(n)),
        Operand::Bool(b) => Some(Operand::Bool(b)),
        Operand::Path(p) => match resolve(&p) {
            Ok(q) => Some(Operand::Path(q)),
            Err(e) => {
                errors.push(e);
                None
            }
        },
    }
}

fn operand_value<P>(operand: &Operand<P>, lookup: &impl Fn(&P) -> Option<Value>) -> Option<Value> {
    match operand {
        Operand::Number(n) => Some(Value::Number(*n)),
        Operand::Bool(b) => Some(Value::Bool(*b)),
        Operand::Path(p) => lookup(p),
    }
}

fn compare(lhs: &Value, op: CompareOp, rhs: &Value) -> bool {
    if let (Value::Text(a), Value::Text(b)) = (lhs, rhs) {
        return match op {
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
            _ => false,
        };
    }
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => op.apply_f64(a, b),
        _ => false,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => *n != 0.0,
        Value::Text(s) => !s.is_empty(),
        Value::Null => false,
        Value::List(items) => !items.is_empty(),
        Value::Map(map) => !map.is_empty(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Compare(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
}

fn tokenize(expression: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let error = |offset: usize, reason: &str| ParseError {
        expression: expression.to_string(),
        offset,
        reason: reason.to_string(),
    };
    let chars: Vec<(usize, char)> = expression.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);
        let (token, width) = match (c, next) {
            (c, _) if c.is_whitespace() => {
                i += 1;
                continue;
            }
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('<', Some('=')) => (Token::Compare(CompareOp::Le), 2),
            ('>', Some('=')) => (Token::Compare(CompareOp::Ge), 2),
            ('=', Some('=')) => (Token::Compare(CompareOp::Eq), 2),
            ('!', Some('=')) => (Token::Compare(CompareOp::Ne), 2),
            ('<', _) => (Token::Compare(CompareOp::Lt), 1),
            ('>', _) => (Token::Compare(CompareOp::Gt), 1),
            ('!', _) => (Token::Not, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (c, next) if c.is_ascii_digit() || (c == '-' && next.map_or(false, |n| n.is_ascii_digit() || n == '.')) || c == '.' => {
                let start = i;
                i += 1;
                while i < chars.len() {
                    let ch = chars[i].1;
                    let exponent_sign = (ch == '-' || ch == '+') && matches!(chars[i - 1].1, 'e' | 'E');
                    if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' || exponent_sign {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| error(offset, &format!("invalid number '{}'", text)))?;
                tokens.push((offset, Token::Number(number)));
                continue;
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].1.is_alphanumeric() || matches!(chars[i].1, '_' | '.' | '-')) {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| *c).collect();
                tokens.push((offset, Token::Ident(text)));
                continue;
            }
            _ => return Err(error(offset, &format!("unexpected character '{}'", c))),
        };
        tokens.push((offset, token));
        i += width;
    }
    Ok(tokens)
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<(usize, Token)>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn error_at(&self, offset: usize, reason: impl Into<String>) -> ParseError {
        ParseError {
            expression: self.expression.to_string(),
            offset,
            reason: reason.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.expression.len(), |(o, _)| *o)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).map(|(_, t)| t.clone());
        self.position += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Predicate<String>, ParseError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Predicate::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Predicate<String>, ParseError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Predicate<String>, ParseError> {
        match self.peek() {
            Some(Token::Not) => {
                self.advance();
                Ok(Predicate::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_or()?;
                if self.peek() != Some(&Token::RParen) {
                    return Err(self.error_at(self.offset(), "expected ')'"));
                }
                self.advance();
                Ok(inner)
            }
            _ => self.parse_compare(),
        }
    }

    fn parse_compare(&mut self) -> Result<Predicate<String>, ParseError> {
        let lhs = self.parse_operand()?;
        if let Some(Token::Compare(op)) = self.peek() {
            let op = *op;
            self.advance();
            let rhs = self.parse_operand()?;
            return Ok(Predicate::Compare { lhs, op, rhs });
        }
        Ok(Predicate::Truthy(lhs))
    }

    fn parse_operand(&mut self) -> Result<Operand<String>, ParseError> {
        let offset = self.offset();
        match self.advance() {
            Some(Token::Number(n)) => Ok(Operand::Number(n)),
            Some(Token::Ident(name)) => Ok(match name.as_str() {
                "true" => Operand::Bool(true),
                "false" => Operand::Bool(false),
                _ => Operand::Path(name),
            }),
            Some(other) => Err(self.error_at(offset, format!("expected a value, found {:?}", other))),
            None => Err(self.error_at(offset, "unexpected end of expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn eval(expression: &str, values: &[(&str, Value)]) -> bool {
        let values: HashMap<String, Value> = values.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        Predicate::parse(expression)
            .unwrap()
            .evaluate(&|path: &String| values.get(path).cloned())
    }

    #[test]
    fn test_parse_compound_condition() {
        let predicate = Predicate::parse("tank1.level > 15.0 && pump.state.running == 1").unwrap();
        assert_eq!(predicate.paths(), vec!["tank1.level", "pump.state.running"]);
        assert!(matches!(predicate, Predicate::And(_, _)));
    }

    #[test]
    fn test_evaluate_precedence_and_negation() {
        let values = [("a.x", Value::from(2.0)), ("b.on", Value::from(false))];
        assert!(eval("a.x >= 2 || b.on && a.x > 100", &values));
        assert!(eval("!(a.x < 1) && !b.on", &values));
        assert!(!eval("(a.x >= 2 || b.on) && a.x > 100", &values));
        assert!(eval("b.on == false", &values));
        assert!(eval("a.x != -2.5e0", &values));
    }

    #[test]
    fn test_missing_value_is_false() {
        assert!(!eval("ghost.level > 0", &[]));
        assert!(eval("!(ghost.level > 0)", &[]));
    }

    #[test]
    fn test_text_equality() {
        let values = [("gate.active_model", Value::from("orifice"))];
        let predicate = Predicate::parse("gate.active_model == gate.active_model").unwrap();
        let lookup = |p: &String| values.iter().find(|(k, _)| k == p).map(|(_, v)| v.clone());
        assert!(predicate.evaluate(&lookup));
    }

    #[test]
    fn test_parse_errors_report_offset() {
        let err = Predicate::parse("a.x > ").unwrap_err();
        assert!(err.reason.contains("end of expression"));
        let err = Predicate::parse("(a.x > 1").unwrap_err();
        assert!(err.reason.contains("')'"));
        let err = Predicate::parse("a.x > 1 b.y").unwrap_err();
        assert_eq!(err.offset, 8);
        assert!(Predicate::parse("a.x # 1").is_err());
    }

    #[test]
    fn test_compile_collects_all_failures() {
        let predicate = Predicate::parse("x.a > 1 && y.b < 2 || ok.c == 0").unwrap();
        let result: Result<Predicate<usize>, Vec<String>> = predicate.compile(&mut |p: &String| {
            if p.starts_with("ok") {
                Ok(0)
            } else {
                Err(p.clone())
            }
        });
        assert_eq!(result.unwrap_err(), vec!["x.a", "y.b"]);
    }
}
