//! Arithmetic expressions for `custom` metrics.
//!
//! A formula combines sample fields with numbers, `+ - * /`, unary minus,
//! parentheses and the functions `min`, `max` and `abs`, e.g.
//! `(correct_tokens / max(total_tokens, 1)) * 100`.

use prompt_eval_core::{CoreError, JsonObject};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function {0} expects {1} argument(s)")]
    Arity(String, &'static str),

    #[error("sample field not found: {0}")]
    MissingField(String),

    #[error("sample field is not numeric: {0}")]
    NonNumericField(String),

    #[error("formula nests deeper than {0} levels")]
    TooDeep(usize),
}

impl From<FormulaError> for CoreError {
    fn from(err: FormulaError) -> Self {
        CoreError::Validation(format!("formula: {}", err))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedToken(literal.clone()))?;
                tokens.push(Token::Number(number));
                continue;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
                continue;
            }
            other => return Err(FormulaError::UnexpectedChar(other, i)),
        }
        i += 1;
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Min,
    Max,
    Abs,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Field(String),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

/// Bound on nested parentheses, calls and unary minus.
const MAX_DEPTH: usize = 64;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(FormulaError::UnexpectedToken(format!("{:?}", token))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        self.descend()?;
        let expr = self.sum();
        self.depth -= 1;
        expr
    }

    fn sum(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            self.descend()?;
            let operand = self.unary();
            self.depth -= 1;
            return Ok(Expr::Negate(Box::new(operand?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    self.call(name)
                } else {
                    Ok(Expr::Field(name))
                }
            }
            Some(token) => Err(FormulaError::UnexpectedToken(format!("{:?}", token))),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, FormulaError> {
        let function = match name.as_str() {
            "min" => Function::Min,
            "max" => Function::Max,
            "abs" => Function::Abs,
            _ => return Err(FormulaError::UnknownFunction(name)),
        };

        let mut args = Vec::new();
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.peek() == Some(&Token::Comma) {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        match function {
            Function::Abs if args.len() != 1 => Err(FormulaError::Arity(name, "1")),
            Function::Min | Function::Max if args.is_empty() => {
                Err(FormulaError::Arity(name, "at least 1"))
            }
            _ => Ok(Expr::Call(function, args)),
        }
    }
}

/// A parsed formula, reusable across samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    root: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        let mut parser = Parser {
            tokens: tokenize(source)?,
            pos: 0,
            depth: 0,
        };
        let root = parser.expression()?;
        if let Some(token) = parser.next() {
            return Err(FormulaError::UnexpectedToken(format!("{:?}", token)));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against a sample. Division by zero evaluates to 0.
    pub fn evaluate(&self, sample: &JsonObject) -> Result<f64, FormulaError> {
        eval(&self.root, sample)
    }
}

fn eval(expr: &Expr, sample: &JsonObject) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Field(name) => field_value(sample, name),
        Expr::Negate(inner) => Ok(-eval(inner, sample)?),
        Expr::Binary(op, lhs, rhs) => {
            let a = eval(lhs, sample)?;
            let b = eval(rhs, sample)?;
            Ok(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div if b == 0.0 => 0.0,
                BinaryOp::Div => a / b,
            })
        }
        Expr::Call(function, args) => {
            let values = args
                .iter()
                .map(|arg| eval(arg, sample))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match function {
                Function::Min => values.into_iter().fold(f64::INFINITY, f64::min),
                Function::Max => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
                Function::Abs => values[0].abs(),
            })
        }
    }
}

fn field_value(sample: &JsonObject, name: &str) -> Result<f64, FormulaError> {
    match sample.get(name) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| FormulaError::NonNumericField(name.to_string())),
        Some(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FormulaError::NonNumericField(name.to_string())),
        Some(_) => Err(FormulaError::NonNumericField(name.to_string())),
        None => Err(FormulaError::MissingField(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(value: Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_precedence() {
        let formula = Formula::parse("1 + 2 * 3").unwrap();
        assert_eq!(formula.evaluate(&JsonObject::new()).unwrap(), 7.0);

        let formula = Formula::parse("(1 + 2) * 3").unwrap();
        assert_eq!(formula.evaluate(&JsonObject::new()).unwrap(), 9.0);
    }

    #[test]
    fn test_unary_minus_and_functions() {
        let formula = Formula::parse("abs(-a) + max(a, b, 0.5) - min(b)").unwrap();
        let value = formula.evaluate(&sample(json!({"a": 2, "b": 3}))).unwrap();
        assert_eq!(value, 2.0 + 3.0 - 3.0);
    }

    #[test]
    fn test_division_by_zero_is_zero() {
        let formula = Formula::parse("hits / total").unwrap();
        let value = formula.evaluate(&sample(json!({"hits": 4, "total": 0}))).unwrap();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_booleans_and_numeric_strings() {
        let formula = Formula::parse("ok * score").unwrap();
        let value = formula
            .evaluate(&sample(json!({"ok": true, "score": "0.25"})))
            .unwrap();
        assert_eq!(value, 0.25);
    }

    #[test]
    fn test_missing_field() {
        let formula = Formula::parse("latency_ms / 1000").unwrap();
        let err = formula.evaluate(&JsonObject::new()).unwrap_err();
        assert_eq!(err, FormulaError::MissingField("latency_ms".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(Formula::parse("1 +"), Err(FormulaError::UnexpectedEnd)));
        assert!(matches!(Formula::parse("(1"), Err(FormulaError::UnexpectedEnd)));
        assert!(matches!(Formula::parse("1 $ 2"), Err(FormulaError::UnexpectedChar('$', 2))));
        assert!(matches!(Formula::parse("sqrt(4)"), Err(FormulaError::UnknownFunction(_))));
        assert!(matches!(Formula::parse("abs(1, 2)"), Err(FormulaError::Arity(_, _))));
        assert!(matches!(Formula::parse("1 2"), Err(FormulaError::UnexpectedToken(_))));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(Formula::parse(&nested), Err(FormulaError::TooDeep(MAX_DEPTH)));

        let negations = format!("{}1", "-".repeat(10_000));
        assert_eq!(Formula::parse(&negations), Err(FormulaError::TooDeep(MAX_DEPTH)));

        let calls = format!("{}1{}", "abs(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(Formula::parse(&calls), Err(FormulaError::TooDeep(MAX_DEPTH)));
    }

    #[test]
    fn test_moderate_nesting_is_accepted() {
        let nested = format!("{}1{}", "(".repeat(30), ")".repeat(30));
        assert_eq!(Formula::parse(&nested).unwrap().evaluate(&JsonObject::new()).unwrap(), 1.0);
    }
}
