//! Sandboxed arithmetic expressions for user-supplied rigidity spectra.
//!
//! The accepted language is deliberately small:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary (('^' | '**') unary)?
//! primary := number | name | name '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Names resolve against a fixed allow-list: the rigidity variable `R`,
//! the caller's constants, `pi`, `e`, and the functions `sin`, `cos`, `tan`,
//! `exp`, `log`, `log10`, `sqrt`, `abs` and `power`. Functions may carry
//! an `np.` prefix so formulas written for the desktop tool keep working.
//! Everything else is rejected when the expression is compiled, so
//! evaluation itself cannot fail.

use std::collections::BTreeMap;

use thiserror::Error;

/// Name of the rigidity variable (GV).
pub const RIGIDITY_VARIABLE: &str = "R";

/// Deepest nesting of parentheses, unary signs, exponents and function
/// arguments accepted by the parser.
pub const MAX_DEPTH: usize = 256;

/// Longest accepted expression, in tokens. Bounds the depth of operator
/// chains such as `R + R + ... + R`.
pub const MAX_TOKENS: usize = 4096;

/// Errors from compiling an expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Expression is empty")]
    Empty,

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("Unexpected {found} at position {pos}")]
    UnexpectedToken { pos: usize, found: String },

    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unknown name '{0}'")]
    UnknownName(String),

    #[error("'{0}' is not an allowed function")]
    UnknownFunction(String),

    #[error("Attribute access '{0}' is not allowed")]
    AttributeAccess(String),

    #[error("Function '{name}' takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Expression nests deeper than {max} levels at position {pos}", max = MAX_DEPTH)]
    TooDeep { pos: usize },

    #[error("Expression has {0} tokens; at most {max} are allowed", max = MAX_TOKENS)]
    TooLong(usize),

    #[error("Variable name '{0}' is reserved")]
    ReservedName(String),

    #[error("Invalid variable definition on line {line}: {message}")]
    VariableDefinition { line: usize, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Log10,
    Sqrt,
    Abs,
    Power,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let bare = name.strip_prefix("np.").unwrap_or(name);
        Some(match bare {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "exp" => Function::Exp,
            "log" => Function::Log,
            "log10" => Function::Log10,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "power" => Function::Power,
            _ => return None,
        })
    }

    fn arity(&self) -> usize {
        match self {
            Function::Power => 2,
            _ => 1,
        }
    }

    fn apply(&self, args: &[f64]) -> f64 {
        let x = args.first().copied().unwrap_or(f64::NAN);
        match self {
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
            Function::Exp => x.exp(),
            Function::Log => x.ln(),
            Function::Log10 => x.log10(),
            Function::Sqrt => x.sqrt(),
            Function::Abs => x.abs(),
            Function::Power => x.powf(args.get(1).copied().unwrap_or(f64::NAN)),
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name.strip_prefix("np.").unwrap_or(name) {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Rigidity,
    Variable(usize),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Number(n) => format!("number {}", n),
            Token::Name(n) => format!("name '{}'", n),
            Token::Plus => "'+'".into(),
            Token::Minus => "'-'".into(),
            Token::Star => "'*'".into(),
            Token::Slash => "'/'".into(),
            Token::Caret => "power operator".into(),
            Token::LParen => "'('".into(),
            Token::RParen => "')'".into(),
            Token::Comma => "','".into(),
        }
    }
}

fn tokenize(src: &str) -> Result<Vec<(usize, Token)>, ExprError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '+' => tokens.push((start, Token::Plus)),
            '-' => tokens.push((start, Token::Minus)),
            '/' => tokens.push((start, Token::Slash)),
            '^' => tokens.push((start, Token::Caret)),
            '(' => tokens.push((start, Token::LParen)),
            ')' => tokens.push((start, Token::RParen)),
            ',' => tokens.push((start, Token::Comma)),
            '*' => {
                if chars.get(i + 1) == Some(&'*') {
                    i += 1;
                    tokens.push((start, Token::Caret));
                } else {
                    tokens.push((start, Token::Star));
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::InvalidNumber(text.clone()))?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                // A dotted name is only meaningful as the `np.` namespace.
                while i < chars.len() && chars[i] == '.' {
                    let seg_start = i + 1;
                    let mut j = seg_start;
                    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
                        j += 1;
                    }
                    i = j;
                }
                let name: String = chars[start..i].iter().collect();
                if name.contains('.') {
                    let rest = name.strip_prefix("np.").unwrap_or("");
                    if rest.is_empty() || rest.contains('.') {
                        return Err(ExprError::AttributeAccess(name));
                    }
                }
                tokens.push((start, Token::Name(name)));
                continue;
            }
            other => return Err(ExprError::UnexpectedChar { pos: start, ch: other }),
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    variables: &'a [String],
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<(usize, Token)> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(0, |(p, _)| *p)
    }

    /// Run `f` one nesting level deeper.
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, ExprError>) -> Result<T, ExprError> {
        if self.depth >= MAX_DEPTH {
            return Err(ExprError::TooDeep {
                pos: self.position(),
            });
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        match self.next() {
            Some((_, t)) if t == expected => Ok(()),
            Some((pos, t)) => Err(ExprError::UnexpectedToken {
                pos,
                found: t.describe(),
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn expr(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Node, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Node, ExprError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.nested(Self::unary)?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.nested(Self::unary)
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Node, ExprError> {
        let base = self.primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.pos += 1;
            let exponent = self.nested(Self::unary)?;
            return Ok(Node::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Node, ExprError> {
        match self.next() {
            Some((_, Token::Number(v))) => Ok(Node::Number(v)),
            Some((_, Token::LParen)) => {
                let inner = self.nested(Self::expr)?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some((_, Token::Name(name))) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    return self.call(name);
                }
                self.name(&name)
            }
            Some((pos, tok)) => Err(ExprError::UnexpectedToken {
                pos,
                found: tok.describe(),
            }),
            None => Err(ExprError::UnexpectedEnd),
        }
    }

    fn call(&mut self, name: String) -> Result<Node, ExprError> {
        let func = Function::lookup(&name).ok_or_else(|| ExprError::UnknownFunction(name.clone()))?;
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
        } else {
            loop {
                args.push(self.nested(Self::expr)?);
                match self.next() {
                    Some((_, Token::Comma)) => continue,
                    Some((_, Token::RParen)) => break,
                    Some((pos, tok)) => {
                        return Err(ExprError::UnexpectedToken {
                            pos,
                            found: tok.describe(),
                        })
                    }
                    None => return Err(ExprError::UnexpectedEnd),
                }
            }
        }
        if args.len() != func.arity() {
            return Err(ExprError::Arity {
                name,
                expected: func.arity(),
                found: args.len(),
            });
        }
        Ok(Node::Call(func, args))
    }

    fn name(&self, name: &str) -> Result<Node, ExprError> {
        if name == RIGIDITY_VARIABLE {
            return Ok(Node::Rigidity);
        }
        if let Some(idx) = self.variables.iter().position(|v| v == name) {
            return Ok(Node::Variable(idx));
        }
        if let Some(value) = constant(name) {
            return Ok(Node::Number(value));
        }
        if Function::lookup(name).is_some() {
            return Err(ExprError::UnexpectedToken {
                pos: self.tokens.get(self.pos.saturating_sub(1)).map_or(0, |(p, _)| *p),
                found: format!("function '{}' without arguments", name),
            });
        }
        Err(ExprError::UnknownName(name.to_string()))
    }
}

fn eval(node: &Node, rigidity: f64, values: &[f64]) -> f64 {
    match node {
        Node::Number(v) => *v,
        Node::Rigidity => rigidity,
        Node::Variable(idx) => values.get(*idx).copied().unwrap_or(f64::NAN),
        Node::Neg(inner) => -eval(inner, rigidity, values),
        Node::Binary(op, lhs, rhs) => {
            let a = eval(lhs, rigidity, values);
            let b = eval(rhs, rigidity, values);
            match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                BinaryOp::Pow => a.powf(b),
            }
        }
        Node::Call(func, args) => {
            let vals: Vec<f64> = args.iter().map(|a| eval(a, rigidity, values)).collect();
            func.apply(&vals)
        }
    }
}

/// A validated expression of the rigidity `R` and a fixed set of constants.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    root: Node,
    names: Vec<String>,
    values: Vec<f64>,
}

impl CompiledExpression {
    /// Compile `source` with the given named constants.
    pub fn compile(source: &str, variables: &BTreeMap<String, f64>) -> Result<Self, ExprError> {
        for name in variables.keys() {
            let reserved = name == RIGIDITY_VARIABLE
                || constant(name).is_some()
                || Function::lookup(name).is_some()
                || name == "np";
            let valid_ident = name
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if reserved || !valid_ident {
                return Err(ExprError::ReservedName(name.clone()));
            }
        }

        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        if tokens.len() > MAX_TOKENS {
            return Err(ExprError::TooLong(tokens.len()));
        }

        let names: Vec<String> = variables.keys().cloned().collect();
        let values: Vec<f64> = variables.values().copied().collect();
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            variables: &names,
        };
        let root = parser.expr()?;
        if let Some((pos, tok)) = parser.next() {
            return Err(ExprError::UnexpectedToken {
                pos,
                found: tok.describe(),
            });
        }

        Ok(Self {
            source: source.to_string(),
            root,
            names,
            values,
        })
    }

    /// Evaluate at rigidity `r` (GV).
    pub fn evaluate(&self, r: f64) -> f64 {
        eval(&self.root, r, &self.values)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variable_names(&self) -> &[String] {
        &self.names
    }
}

/// Parse `name = value` lines into a variable map. Blank lines and lines
/// starting with `#` are skipped.
pub fn parse_variable_lines(text: &str) -> Result<BTreeMap<String, f64>, ExprError> {
    let mut out = BTreeMap::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (name, value) = line.split_once('=').ok_or_else(|| ExprError::VariableDefinition {
            line: idx + 1,
            message: "expected 'name = value'".into(),
        })?;
        let value: f64 = value.trim().parse().map_err(|_| ExprError::VariableDefinition {
            line: idx + 1,
            message: format!("'{}' is not a number", value.trim()),
        })?;
        out.insert(name.trim().to_string(), value);
    }
    Ok(out)
}
