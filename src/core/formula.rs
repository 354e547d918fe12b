// Formula evaluation for calculated attributes.
//
// Formulas are parsed against a fixed arithmetic grammar and evaluated over
// named attribute values. Nothing in a formula or a value is ever executed.
//
//   expr    := term (('+' | '-') term)*
//   term    := unary (('*' | '/' | '%') unary)*
//   unary   := ('-' | '+') unary | primary
//   primary := number | identifier | '[' name ']' | '(' expr ')'

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::core::strong_types::TypedValue;

const MAX_DEPTH: usize = 64;
/// Also bounds the depth of the parsed tree, which evaluation walks recursively.
const MAX_TOKENS: usize = 512;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(?:(?P<num>(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?)|(?P<ident>[A-Za-z_][A-Za-z0-9_]*)|\[(?P<quoted>[^\]]+)\]|(?P<sym>[-+*/%()]))",
    )
    .expect("formula token pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    UnexpectedCharacter(usize),
    UnexpectedToken(String),
    UnexpectedEnd,
    TooDeep,
    TooLong,
    UnknownVariable(String),
    NonNumericValue(String),
    DivisionByZero,
    NonFinite,
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::UnexpectedCharacter(pos) => {
                write!(f, "unexpected character at offset {}", pos)
            }
            FormulaError::UnexpectedToken(tok) => write!(f, "unexpected token '{}'", tok),
            FormulaError::UnexpectedEnd => write!(f, "unexpected end of formula"),
            FormulaError::TooDeep => write!(f, "formula nests too deeply"),
            FormulaError::TooLong => write!(f, "formula has more than {} tokens", MAX_TOKENS),
            FormulaError::UnknownVariable(name) => write!(f, "unknown variable '{}'", name),
            FormulaError::NonNumericValue(name) => {
                write!(f, "value of '{}' is not numeric", name)
            }
            FormulaError::DivisionByZero => write!(f, "division by zero"),
            FormulaError::NonFinite => write!(f, "result is not a finite number"),
        }
    }
}

impl std::error::Error for FormulaError {}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Op(char),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Name(name) => f.write_str(name),
            Token::Op(c) => write!(f, "{}", c),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, FormulaError> {
    let mut tokens = Vec::new();
    let mut pos = 0;

    while !input[pos..].trim().is_empty() {
        let caps = TOKEN_RE
            .captures(&input[pos..])
            .ok_or_else(|| FormulaError::UnexpectedCharacter(pos + leading_ws(&input[pos..])))?;

        if let Some(m) = caps.name("num") {
            let n = m
                .as_str()
                .parse::<f64>()
                .map_err(|_| FormulaError::UnexpectedToken(m.as_str().to_string()))?;
            tokens.push(Token::Number(n));
        } else if let Some(m) = caps.name("ident") {
            tokens.push(Token::Name(m.as_str().to_string()));
        } else if let Some(m) = caps.name("quoted") {
            tokens.push(Token::Name(m.as_str().trim().to_string()));
        } else if let Some(m) = caps.name("sym") {
            tokens.push(match m.as_str() {
                "(" => Token::LParen,
                ")" => Token::RParen,
                s => Token::Op(s.chars().next().unwrap_or('+')),
            });
        }
        if tokens.len() > MAX_TOKENS {
            return Err(FormulaError::TooLong);
        }

        pos += caps.get(0).map(|m| m.end()).unwrap_or(0);
    }

    Ok(tokens)
}

fn leading_ws(s: &str) -> usize {
    s.len() - s.trim_start().len()
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    Binary(char, Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
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

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep);
        }
        let result = match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                self.unary().map(|e| Expr::Neg(Box::new(e)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.primary(),
        };
        self.depth -= 1;
        result
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Name(name)) => Ok(Expr::Variable(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(tok) => Err(FormulaError::UnexpectedToken(tok.to_string())),
                    None => Err(FormulaError::UnexpectedEnd),
                }
            }
            Some(tok) => Err(FormulaError::UnexpectedToken(tok.to_string())),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }
}

/// A parsed formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    root: Expr,
}

impl Formula {
    pub fn parse(input: &str) -> Result<Self, FormulaError> {
        let mut parser = Parser {
            tokens: tokenize(input)?,
            pos: 0,
            depth: 0,
        };
        let root = parser.expr()?;
        if let Some(tok) = parser.peek() {
            return Err(FormulaError::UnexpectedToken(tok.to_string()));
        }
        Ok(Self { root })
    }

    /// Names of all variables the formula reads, sorted.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        collect_variables(&self.root, &mut names);
        names
    }

    pub fn evaluate(&self, values: &HashMap<String, TypedValue>) -> Result<f64, FormulaError> {
        let result = eval(&self.root, values)?;
        if result.is_finite() {
            Ok(result)
        } else {
            Err(FormulaError::NonFinite)
        }
    }
}

fn collect_variables(expr: &Expr, names: &mut BTreeSet<String>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Variable(name) => {
            names.insert(name.clone());
        }
        Expr::Neg(inner) => collect_variables(inner, names),
        Expr::Binary(_, lhs, rhs) => {
            collect_variables(lhs, names);
            collect_variables(rhs, names);
        }
    }
}

fn eval(expr: &Expr, values: &HashMap<String, TypedValue>) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Variable(name) => values
            .get(name)
            .ok_or_else(|| FormulaError::UnknownVariable(name.clone()))?
            .as_number()
            .ok_or_else(|| FormulaError::NonNumericValue(name.clone())),
        Expr::Neg(inner) => Ok(-eval(inner, values)?),
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, values)?;
            let r = eval(rhs, values)?;
            match op {
                '+' => Ok(l + r),
                '-' => Ok(l - r),
                '*' => Ok(l * r),
                '/' | '%' if r == 0.0 => Err(FormulaError::DivisionByZero),
                '/' => Ok(l / r),
                // Floored, so the result takes the sign of the divisor
                '%' => Ok(l - r * (l / r).floor()),
                other => Err(FormulaError::UnexpectedToken(other.to_string())),
            }
        }
    }
}

/// Parse and evaluate in one step.
pub fn evaluate_formula(
    formula: &str,
    values: &HashMap<String, TypedValue>,
) -> Result<f64, FormulaError> {
    Formula::parse(formula)?.evaluate(values)
}

/// Evaluate a formula and format the result for storage. `None` is the failure sentinel.
pub fn calculate_formula(formula: &str, values: &HashMap<String, TypedValue>) -> Option<String> {
    evaluate_formula(formula, values).ok().map(format_number)
}

/// Whole numbers print without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
