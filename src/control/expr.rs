// src/control/expr.rs

//! Condition language for control rules.
//!
//! A deliberately small, closed grammar: literals, variable lookup (with
//! dotted paths into maps), list literals, comparisons, membership and the
//! boolean connectives. Conditions are parsed into an [`Expr`] tree once and
//! evaluated against a [`ConditionEnv`]; nothing else can be executed.
//!
//! ```text
//! expr    := or
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | cmp
//! cmp     := primary (op primary)?
//! primary := literal | ident ("." ident)* | "(" expr ")" | "[" [expr ("," expr)*] "]"
//! ```

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Variables visible to a condition.
pub type ConditionEnv = BTreeMap<String, Value>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("name '{0}' is not defined")]
    UnknownVariable(String),

    #[error("{0}")]
    Type(String),
}

impl ExprError {
    /// Short category name, used in user-facing diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            ExprError::Syntax { .. } => "SyntaxError",
            ExprError::UnknownVariable(_) => "NameError",
            ExprError::Type(_) => "TypeError",
        }
    }
}

/// Runtime value of a condition sub-expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(m) => write!(f, "<map of {} entries>", m.len()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<toml::Value> for Value {
    fn from(v: toml::Value) -> Self {
        match v {
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Integer(i) => Value::Int(i),
            toml::Value::String(s) => Value::Str(s),
            toml::Value::Float(x) => Value::Str(x.to_string()),
            toml::Value::Datetime(d) => Value::Str(d.to_string()),
            toml::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            toml::Value::Table(t) => Value::from(t),
        }
    }
}

impl From<toml::Table> for Value {
    fn from(t: toml::Table) -> Self {
        Value::Map(t.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
}

/// Parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(Vec<String>),
    List(Vec<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
}

/// A parsed condition together with its source text.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
            depth: 0,
        };
        let expr = parser.parse_or()?;
        if let Some((offset, tok)) = parser.peek_with_offset() {
            return Err(ExprError::Syntax {
                offset,
                message: format!("unexpected {tok}"),
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, env: &ConditionEnv) -> Result<Value, ExprError> {
        eval(&self.expr, env)
    }

    pub fn is_true(&self, env: &ConditionEnv) -> Result<bool, ExprError> {
        Ok(self.evaluate(env)?.truthy())
    }
}

fn eval(expr: &Expr, env: &ConditionEnv) -> Result<Value, ExprError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Var(path) => lookup(path, env),
        Expr::List(items) => items
            .iter()
            .map(|e| eval(e, env))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.truthy())),
        Expr::And(lhs, rhs) => {
            if !eval(lhs, env)?.truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval(rhs, env)?.truthy()))
        }
        Expr::Or(lhs, rhs) => {
            if eval(lhs, env)?.truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval(rhs, env)?.truthy()))
        }
        Expr::Compare(op, lhs, rhs) => {
            let l = eval(lhs, env)?;
            let r = eval(rhs, env)?;
            compare(*op, &l, &r).map(Value::Bool)
        }
    }
}

fn lookup(path: &[String], env: &ConditionEnv) -> Result<Value, ExprError> {
    let unknown = || ExprError::UnknownVariable(path.join("."));
    let (first, rest) = path.split_first().ok_or_else(unknown)?;
    let mut current = env.get(first).ok_or_else(unknown)?;
    for segment in rest {
        current = match current {
            Value::Map(m) => m.get(segment).ok_or_else(unknown)?,
            other => {
                return Err(ExprError::Type(format!(
                    "cannot access '{segment}' on a value of type {}",
                    other.type_name()
                )));
            }
        };
    }
    Ok(current.clone())
}

fn compare(op: CmpOp, l: &Value, r: &Value) -> Result<bool, ExprError> {
    use std::cmp::Ordering;

    let ordering = |l: &Value, r: &Value| -> Result<Ordering, ExprError> {
        match (l, r) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            _ => Err(ExprError::Type(format!(
                "cannot order {} and {}",
                l.type_name(),
                r.type_name()
            ))),
        }
    };

    match op {
        CmpOp::Eq => Ok(l == r),
        CmpOp::Ne => Ok(l != r),
        CmpOp::Lt => Ok(ordering(l, r)? == Ordering::Less),
        CmpOp::Le => Ok(ordering(l, r)? != Ordering::Greater),
        CmpOp::Gt => Ok(ordering(l, r)? == Ordering::Greater),
        CmpOp::Ge => Ok(ordering(l, r)? != Ordering::Less),
        CmpOp::In => contains(r, l),
        CmpOp::NotIn => contains(r, l).map(|b| !b),
    }
}

fn contains(container: &Value, item: &Value) -> Result<bool, ExprError> {
    match (container, item) {
        (Value::List(items), _) => Ok(items.contains(item)),
        (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Map(m), Value::Str(key)) => Ok(m.contains_key(key)),
        _ => Err(ExprError::Type(format!(
            "'in' not supported between {} and {}",
            item.type_name(),
            container.type_name()
        ))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Op(CmpOp),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "name '{s}'"),
            Token::Int(i) => write!(f, "integer {i}"),
            Token::Str(s) => write!(f, "string {s:?}"),
            Token::True => f.write_str("'true'"),
            Token::False => f.write_str("'false'"),
            Token::And => f.write_str("'and'"),
            Token::Or => f.write_str("'or'"),
            Token::Not => f.write_str("'not'"),
            Token::In => f.write_str("'in'"),
            Token::Op(op) => write!(f, "operator {op:?}"),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::LBracket => f.write_str("'['"),
            Token::RBracket => f.write_str("']'"),
            Token::Comma => f.write_str("','"),
            Token::Dot => f.write_str("'.'"),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let syntax = |offset: usize, message: String| ExprError::Syntax { offset, message };

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);

        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '(' | ')' | '[' | ']' | ',' | '.' => {
                tokens.push((
                    offset,
                    match c {
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '[' => Token::LBracket,
                        ']' => Token::RBracket,
                        ',' => Token::Comma,
                        _ => Token::Dot,
                    },
                ));
                i += 1;
            }
            '=' | '!' | '<' | '>' => {
                let (op, width) = match (c, next) {
                    ('=', Some('=')) => (CmpOp::Eq, 2),
                    ('!', Some('=')) => (CmpOp::Ne, 2),
                    ('<', Some('=')) => (CmpOp::Le, 2),
                    ('>', Some('=')) => (CmpOp::Ge, 2),
                    ('<', _) => (CmpOp::Lt, 1),
                    ('>', _) => (CmpOp::Gt, 1),
                    _ => return Err(syntax(offset, format!("unexpected character '{c}'"))),
                };
                tokens.push((offset, Token::Op(op)));
                i += width;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    let Some(&(_, ch)) = chars.get(j) else {
                        return Err(syntax(offset, "unterminated string literal".to_string()));
                    };
                    match ch {
                        '\\' => {
                            let Some(&(_, escaped)) = chars.get(j + 1) else {
                                return Err(syntax(offset, "unterminated string literal".to_string()));
                            };
                            value.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                            j += 2;
                        }
                        ch if ch == quote => {
                            j += 1;
                            break;
                        }
                        ch => {
                            value.push(ch);
                            j += 1;
                        }
                    }
                }
                tokens.push((offset, Token::Str(value)));
                i = j;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i + 1;
                while chars.get(j).is_some_and(|&(_, d)| d.is_ascii_digit()) {
                    j += 1;
                }
                let end = chars.get(j).map(|&(o, _)| o).unwrap_or(src.len());
                let text = &src[offset..end];
                let value = text
                    .parse::<i64>()
                    .map_err(|e| syntax(offset, format!("invalid integer '{text}': {e}")))?;
                tokens.push((offset, Token::Int(value)));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while chars
                    .get(j)
                    .is_some_and(|&(_, d)| d.is_alphanumeric() || d == '_')
                {
                    j += 1;
                }
                let end = chars.get(j).map(|&(o, _)| o).unwrap_or(src.len());
                let word = &src[offset..end];
                let token = match word {
                    "true" | "True" => Token::True,
                    "false" | "False" => Token::False,
                    "and" => Token::And,
                    "or" => Token::Or,
                    "not" => Token::Not,
                    "in" => Token::In,
                    _ => Token::Ident(word.to_string()),
                };
                tokens.push((offset, token));
                i = j;
            }
            other => return Err(syntax(offset, format!("unexpected character '{other}'"))),
        }
    }

    Ok(tokens)
}

/// Deepest nesting of `not`, parentheses and lists a condition may use.
pub const MAX_NESTING: usize = 128;

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ExprError>,
    ) -> Result<T, ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::Syntax {
                offset: self.offset(),
                message: "expression nested too deeply".to_string(),
            });
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        parsed
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(_, t)| t)
    }

    fn peek_with_offset(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.pos).map(|(o, t)| (*o, t))
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        let offset = self.offset();
        match self.bump() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(ExprError::Syntax {
                offset,
                message: format!("expected {expected}, found {tok}"),
            }),
            None => Err(ExprError::Syntax {
                offset,
                message: format!("expected {expected}, found end of input"),
            }),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.bump();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.peek() == Some(&Token::And) {
            self.bump();
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.bump();
            let inner = self.nested(Self::parse_not)?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.parse_primary()?;
        let (op, width) = match (self.peek(), self.peek_at(1)) {
            (Some(Token::Op(op)), _) => (*op, 1),
            (Some(Token::In), _) => (CmpOp::In, 1),
            (Some(Token::Not), Some(Token::In)) => (CmpOp::NotIn, 2),
            _ => return Ok(lhs),
        };
        for _ in 0..width {
            self.bump();
        }
        let rhs = self.parse_primary()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let offset = self.offset();
        match self.bump() {
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Str(s))),
            Some(Token::Ident(name)) => {
                let mut path = vec![name];
                while self.peek() == Some(&Token::Dot) {
                    self.bump();
                    let offset = self.offset();
                    match self.bump() {
                        Some(Token::Ident(seg)) => path.push(seg),
                        _ => {
                            return Err(ExprError::Syntax {
                                offset,
                                message: "expected a name after '.'".to_string(),
                            });
                        }
                    }
                }
                Ok(Expr::Var(path))
            }
            Some(Token::LParen) => {
                let inner = self.nested(Self::parse_or)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => self.nested(Self::parse_list),
            Some(tok) => Err(ExprError::Syntax {
                offset,
                message: format!("unexpected {tok}"),
            }),
            None => Err(ExprError::Syntax {
                offset,
                message: "unexpected end of input".to_string(),
            }),
        }
    }

    /// The rest of a list literal, after its opening bracket.
    fn parse_list(&mut self) -> Result<Expr, ExprError> {
        let mut items = Vec::new();
        if self.peek() == Some(&Token::RBracket) {
            self.bump();
            return Ok(Expr::List(items));
        }
        loop {
            items.push(self.parse_or()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.bump();
                    // Allow a trailing comma.
                    if self.peek() == Some(&Token::RBracket) {
                        self.bump();
                        break;
                    }
                }
                _ => {
                    self.expect(Token::RBracket)?;
                    break;
                }
            }
        }
        Ok(Expr::List(items))
    }
}
