use std::fmt;
use std::str::FromStr;

use crate::error::{ViewerError, ViewerResult};

use super::lexer::{Spanned, Token, tokenize};

/// Built-in numeric functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    Abs,
    Sqrt,
    Exp,
    Ln,
    Log,
    Log10,
    Log2,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    Pow,
    Min,
    Max,
    Floor,
    Ceil,
    Round,
    Sign,
    Hypot,
    Clamp,
}

impl Function {
    pub const ALL: [Self; 26] = [
        Self::Abs,
        Self::Sqrt,
        Self::Exp,
        Self::Ln,
        Self::Log,
        Self::Log10,
        Self::Log2,
        Self::Sin,
        Self::Cos,
        Self::Tan,
        Self::Asin,
        Self::Acos,
        Self::Atan,
        Self::Atan2,
        Self::Sinh,
        Self::Cosh,
        Self::Tanh,
        Self::Pow,
        Self::Min,
        Self::Max,
        Self::Floor,
        Self::Ceil,
        Self::Round,
        Self::Sign,
        Self::Hypot,
        Self::Clamp,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Log2 => "log2",
            Self::Sin => "sin",
            Self::Cos => "cos",
            Self::Tan => "tan",
            Self::Asin => "asin",
            Self::Acos => "acos",
            Self::Atan => "atan",
            Self::Atan2 => "atan2",
            Self::Sinh => "sinh",
            Self::Cosh => "cosh",
            Self::Tanh => "tanh",
            Self::Pow => "pow",
            Self::Min => "min",
            Self::Max => "max",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Round => "round",
            Self::Sign => "sign",
            Self::Hypot => "hypot",
            Self::Clamp => "clamp",
        }
    }

    /// Accepted argument count as an inclusive range; `None` upper bound is variadic.
    #[must_use]
    pub const fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Log => (1, Some(2)),
            Self::Atan2 | Self::Pow | Self::Hypot => (2, Some(2)),
            Self::Min | Self::Max => (1, None),
            Self::Clamp => (3, Some(3)),
            _ => (1, Some(1)),
        }
    }

    fn check_arity(self, count: usize) -> Result<(), String> {
        let (min, max) = self.arity();
        let ok = count >= min && max.is_none_or(|max| count <= max);
        if ok {
            return Ok(());
        }
        let expected = match max {
            Some(max) if max == min => format!("{min}"),
            Some(max) => format!("{min} to {max}"),
            None => format!("at least {min}"),
        };
        Err(format!(
            "function `{}` takes {expected} argument(s), got {count}",
            self.name()
        ))
    }

    #[must_use]
    pub fn apply1(self, x: f64) -> f64 {
        match self {
            Self::Abs => x.abs(),
            Self::Sqrt => x.sqrt(),
            Self::Exp => x.exp(),
            Self::Ln | Self::Log => x.ln(),
            Self::Log10 => x.log10(),
            Self::Log2 => x.log2(),
            Self::Sin => x.sin(),
            Self::Cos => x.cos(),
            Self::Tan => x.tan(),
            Self::Asin => x.asin(),
            Self::Acos => x.acos(),
            Self::Atan => x.atan(),
            Self::Sinh => x.sinh(),
            Self::Cosh => x.cosh(),
            Self::Tanh => x.tanh(),
            Self::Floor => x.floor(),
            Self::Ceil => x.ceil(),
            Self::Round => x.round(),
            Self::Sign => {
                if x == 0.0 || x.is_nan() {
                    x
                } else {
                    x.signum()
                }
            }
            Self::Min | Self::Max => x,
            Self::Atan2 | Self::Pow | Self::Hypot | Self::Clamp => f64::NAN,
        }
    }

    #[must_use]
    pub fn apply2(self, x: f64, y: f64) -> f64 {
        match self {
            Self::Log => x.ln() / y.ln(),
            Self::Atan2 => x.atan2(y),
            Self::Pow => x.powf(y),
            Self::Hypot => x.hypot(y),
            Self::Min => x.min(y),
            Self::Max => x.max(y),
            _ => f64::NAN,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Function {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|function| function.name() == value)
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
}

impl BinaryOp {
    #[must_use]
    pub fn apply(self, left: f64, right: f64) -> f64 {
        match self {
            Self::Add => left + right,
            Self::Subtract => left - right,
            Self::Multiply => left * right,
            Self::Divide => left / right,
            Self::Remainder => left % right,
            Self::Power => left.powf(right),
        }
    }
}

/// Parsed expression tree with unresolved names.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Visits every variable name in source order.
    pub fn visit_variables<'a>(&'a self, visit: &mut impl FnMut(&'a str)) {
        match self {
            Self::Number(_) => {}
            Self::Variable(name) => visit(name),
            Self::Negate(inner) => inner.visit_variables(visit),
            Self::Binary { left, right, .. } => {
                left.visit_variables(visit);
                right.visit_variables(visit);
            }
            Self::Call { args, .. } => {
                for arg in args {
                    arg.visit_variables(visit);
                }
            }
        }
    }
}

/// Parses an expression.
///
/// Precedence, lowest first: `+ -`, `* / %`, unary `+ -`, `^` (right
/// associative), primary.
pub fn parse(expression: &str) -> ViewerResult<Expr> {
    let tokens = tokenize(expression)?;
    Parser { tokens, index: 0 }
        .parse()
        .map_err(|message| ViewerError::expression(expression, message))
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
}

impl Parser {
    fn parse(mut self) -> Result<Expr, String> {
        let expr = self.parse_add_sub()?;
        if let Some(extra) = self.tokens.get(self.index) {
            return Err(format!("unexpected trailing token at {}", extra.offset));
        }
        Ok(expr)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|spanned| &spanned.token)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|spanned| spanned.token.clone());
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn position(&self) -> String {
        self.tokens
            .get(self.index)
            .map_or_else(|| "end of input".to_owned(), |spanned| format!("offset {}", spanned.offset))
    }

    fn parse_add_sub(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_mul_div()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Subtract,
                _ => break,
            };
            let _ = self.consume();
            let rhs = self.parse_mul_div()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_mul_div(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Multiply,
                Some(Token::Slash) => BinaryOp::Divide,
                Some(Token::Percent) => BinaryOp::Remainder,
                _ => break,
            };
            let _ = self.consume();
            let rhs = self.parse_unary()?;
            expr = Expr::Binary {
                op,
                left: Box::new(expr),
                right: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                let _ = self.consume();
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                let _ = self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, String> {
        let base = self.parse_primary()?;
        if matches!(self.peek(), Some(Token::Caret)) {
            let _ = self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Power,
                left: Box::new(base),
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let at = self.position();
        match self.consume() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if !matches!(self.peek(), Some(Token::LParen)) {
                    return Ok(Expr::Variable(name));
                }
                let _ = self.consume();
                let function = name
                    .parse::<Function>()
                    .map_err(|()| format!("unknown function `{name}`"))?;
                let mut args = Vec::new();
                if !matches!(self.peek(), Some(Token::RParen)) {
                    loop {
                        args.push(self.parse_add_sub()?);
                        if matches!(self.peek(), Some(Token::Comma)) {
                            let _ = self.consume();
                            continue;
                        }
                        break;
                    }
                }
                if !matches!(self.consume(), Some(Token::RParen)) {
                    return Err(format!("function `{name}` is missing closing `)`"));
                }
                function.check_arity(args.len())?;
                Ok(Expr::Call { function, args })
            }
            Some(Token::LParen) => {
                let expr = self.parse_add_sub()?;
                if !matches!(self.consume(), Some(Token::RParen)) {
                    return Err(format!("missing `)` opened before {at}"));
                }
                Ok(expr)
            }
            _ => Err(format!("unexpected token at {at}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BinaryOp, Expr, parse};

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let expr = parse("-2^2").expect("parse");
        let Expr::Negate(inner) = expr else {
            panic!("expected negation at the root");
        };
        assert!(matches!(*inner, Expr::Binary { op: BinaryOp::Power, .. }));
    }

    #[test]
    fn power_is_right_associative() {
        let expr = parse("2^3^2").expect("parse");
        let Expr::Binary { op: BinaryOp::Power, right, .. } = expr else {
            panic!("expected power");
        };
        assert!(matches!(*right, Expr::Binary { op: BinaryOp::Power, .. }));
    }

    #[test]
    fn unknown_functions_and_arity_are_compile_errors() {
        assert!(parse("foo(1)").is_err());
        assert!(parse("pow(1)").is_err());
        assert!(parse("clamp(a0, 0)").is_err());
        assert!(parse("max(a0, a1, a2)").is_ok());
        assert!(parse("log(a0, 10)").is_ok());
    }

    #[test]
    fn unbalanced_input_is_rejected() {
        assert!(parse("(a0 + 1").is_err());
        assert!(parse("a0 +").is_err());
        assert!(parse("a0 a1").is_err());
    }

    #[test]
    fn variables_are_visited_in_source_order() {
        let expr = parse("sqrt(a0^2 + IA^2) * t").expect("parse");
        let mut names = Vec::new();
        expr.visit_variables(&mut |name| names.push(name));
        assert_eq!(names, vec!["a0", "IA", "t"]);
    }
}
