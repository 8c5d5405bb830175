use smallvec::SmallVec;

use crate::core::ChannelKind;
use crate::error::{ViewerError, ViewerResult};

use super::parser::{BinaryOp, Expr, Function, parse};
use super::scope::{Scope, ScopeLayout, SlotSource};

/// Parsed expression with its free variable names, independent of any scope.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpression {
    source: String,
    expr: Expr,
    variables: Vec<String>,
}

impl CompiledExpression {
    pub fn compile(source: &str) -> ViewerResult<Self> {
        let expr = parse(source)?;
        let mut variables: Vec<String> = Vec::new();
        expr.visit_variables(&mut |name| {
            if !variables.iter().any(|known| known == name) {
                variables.push(name.to_owned());
            }
        });
        Ok(Self {
            source: source.to_owned(),
            expr,
            variables,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Distinct variable names in first-use order.
    #[must_use]
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Resolves names to slots. Names not bound by the layout fall back to the
    /// constants `pi` and `e`; anything else is an error.
    pub fn bind(&self, layout: &ScopeLayout) -> ViewerResult<BoundExpression> {
        let mut used_slots = SmallVec::new();
        let root = lower(&self.expr, layout, &mut used_slots)
            .map_err(|message| ViewerError::expression(self.source.as_str(), message))?;
        let referenced_kinds = used_slots
            .iter()
            .filter_map(|&slot| match layout.source(slot) {
                Some(SlotSource::Channel { kind, .. }) => Some(kind),
                _ => None,
            })
            .fold(SmallVec::<[ChannelKind; 3]>::new(), |mut kinds, kind| {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
                kinds
            });
        Ok(BoundExpression {
            root,
            used_slots,
            referenced_kinds,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Const(f64),
    Slot(usize),
    Negate(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call1(Function, Box<Node>),
    Call2(Function, Box<Node>, Box<Node>),
    Clamp(Box<Node>, Box<Node>, Box<Node>),
    Fold(Function, Vec<Node>),
}

impl Node {
    fn eval(&self, slots: &[f64]) -> f64 {
        match self {
            Self::Const(value) => *value,
            Self::Slot(slot) => slots.get(*slot).copied().unwrap_or(f64::NAN),
            Self::Negate(inner) => -inner.eval(slots),
            Self::Binary(op, left, right) => op.apply(left.eval(slots), right.eval(slots)),
            Self::Call1(function, arg) => function.apply1(arg.eval(slots)),
            Self::Call2(function, x, y) => function.apply2(x.eval(slots), y.eval(slots)),
            Self::Clamp(value, low, high) => {
                let (value, low, high) = (value.eval(slots), low.eval(slots), high.eval(slots));
                if low > high || low.is_nan() || high.is_nan() {
                    f64::NAN
                } else {
                    value.clamp(low, high)
                }
            }
            Self::Fold(function, args) => {
                let mut iter = args.iter().map(|arg| arg.eval(slots));
                let first = iter.next().unwrap_or(f64::NAN);
                iter.fold(first, |acc, value| {
                    if acc.is_nan() || value.is_nan() {
                        f64::NAN
                    } else {
                        function.apply2(acc, value)
                    }
                })
            }
        }
    }
}

fn lower(expr: &Expr, layout: &ScopeLayout, used: &mut SmallVec<[usize; 8]>) -> Result<Node, String> {
    Ok(match expr {
        Expr::Number(value) => Node::Const(*value),
        Expr::Variable(name) => match layout.slot_of(name) {
            Some(slot) => {
                if !used.contains(&slot) {
                    used.push(slot);
                }
                Node::Slot(slot)
            }
            None => match name.as_str() {
                "pi" | "PI" => Node::Const(std::f64::consts::PI),
                "e" | "E" => Node::Const(std::f64::consts::E),
                _ => return Err(format!("unknown variable `{name}`")),
            },
        },
        Expr::Negate(inner) => Node::Negate(Box::new(lower(inner, layout, used)?)),
        Expr::Binary { op, left, right } => Node::Binary(
            *op,
            Box::new(lower(left, layout, used)?),
            Box::new(lower(right, layout, used)?),
        ),
        Expr::Call { function, args } => {
            let mut lowered = args
                .iter()
                .map(|arg| lower(arg, layout, used))
                .collect::<Result<Vec<_>, _>>()?;
            match (function, lowered.len()) {
                (Function::Clamp, 3) => {
                    let high = lowered.pop().unwrap_or(Node::Const(f64::NAN));
                    let low = lowered.pop().unwrap_or(Node::Const(f64::NAN));
                    let value = lowered.pop().unwrap_or(Node::Const(f64::NAN));
                    Node::Clamp(Box::new(value), Box::new(low), Box::new(high))
                }
                (Function::Min | Function::Max, n) if n > 2 => Node::Fold(*function, lowered),
                (_, 1) => Node::Call1(*function, Box::new(lowered.remove(0))),
                (_, 2) => {
                    let y = lowered.pop().unwrap_or(Node::Const(f64::NAN));
                    let x = lowered.pop().unwrap_or(Node::Const(f64::NAN));
                    Node::Call2(*function, Box::new(x), Box::new(y))
                }
                (_, n) => return Err(format!("function `{function}` cannot take {n} arguments")),
            }
        }
    })
}

/// Expression resolved against one [`ScopeLayout`]; evaluation allocates nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundExpression {
    root: Node,
    used_slots: SmallVec<[usize; 8]>,
    referenced_kinds: SmallVec<[ChannelKind; 3]>,
}

impl BoundExpression {
    /// Slots the expression reads; only these need loading per sample.
    #[must_use]
    pub fn used_slots(&self) -> &[usize] {
        &self.used_slots
    }

    /// Channel kinds the expression reads, in first-use order.
    #[must_use]
    pub fn referenced_kinds(&self) -> &[ChannelKind] {
        &self.referenced_kinds
    }

    #[must_use]
    pub fn evaluate(&self, scope: &Scope) -> f64 {
        self.root.eval(scope.values())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use approx::assert_relative_eq;

    use super::CompiledExpression;
    use crate::core::{ChannelKind, ChannelRow, ChannelState, DataState};
    use crate::expression::{Scope, ScopeLayout};

    fn layout() -> Rc<ScopeLayout> {
        let state = ChannelState::from_rows(
            vec![ChannelRow::new("IA"), ChannelRow::new("IB")],
            vec![ChannelRow::new("TRIP")],
        )
        .expect("state");
        Rc::new(ScopeLayout::for_state(&state, &DataState::default()))
    }

    fn eval(source: &str, values: &[(&str, f64)]) -> f64 {
        let layout = layout();
        let bound = CompiledExpression::compile(source)
            .expect("compile")
            .bind(&layout)
            .expect("bind");
        let mut scope = Scope::new(Rc::clone(&layout));
        for (name, value) in values {
            let slot = layout.slot_of(name).expect("slot");
            scope.set_slot(slot, *value);
        }
        bound.evaluate(&scope)
    }

    #[test]
    fn evaluates_operators_and_functions() {
        assert_relative_eq!(eval("a0 + IB * 2", &[("a0", 1.0), ("a1", 3.0)]), 7.0);
        assert_relative_eq!(eval("-2^2", &[]), -4.0);
        assert_relative_eq!(eval("7 % 4", &[]), 3.0);
        assert_relative_eq!(eval("hypot(3, 4)", &[]), 5.0);
        assert_relative_eq!(eval("max(1, 5, 3)", &[]), 5.0);
        assert_relative_eq!(eval("clamp(IA, 0, 1)", &[("IA", 4.0)]), 1.0);
        assert_relative_eq!(eval("log(100, 10)", &[]), 2.0);
        assert_relative_eq!(eval("cos(pi)", &[]), -1.0);
    }

    #[test]
    fn unknown_variables_fail_at_bind() {
        let compiled = CompiledExpression::compile("a0 + VB").expect("compile");
        let error = compiled.bind(&layout()).expect_err("unknown");
        assert!(error.to_string().contains("VB"));
    }

    #[test]
    fn referenced_kinds_follow_first_use() {
        let bound = CompiledExpression::compile("TRIP * a1 + a0")
            .expect("compile")
            .bind(&layout())
            .expect("bind");
        assert_eq!(
            bound.referenced_kinds(),
            &[ChannelKind::Digital, ChannelKind::Analog]
        );
        assert_eq!(bound.used_slots().len(), 3);
    }
}
