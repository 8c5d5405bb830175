//! Numeric expression engine for computed channels.
//!
//! Expressions are compiled once (memoized by source string), bound to a
//! [`ScopeLayout`] that maps channel names to slots, then evaluated per sample
//! against a reused [`Scope`].

mod cache;
mod compiled;
mod evaluator;
mod lexer;
mod parser;
mod scope;
mod stats;

pub use cache::{ExpressionCacheStats, ExpressionEngine};
pub use compiled::{BoundExpression, CompiledExpression};
pub use evaluator::{Evaluation, evaluate_compiled, evaluate_samples};
pub use parser::{BinaryOp, Expr, Function, parse};
pub use scope::{Scope, ScopeLayout, SlotSource, TIME_VARIABLE};
pub use stats::ChannelStats;
