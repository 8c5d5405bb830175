use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use crate::core::{ChannelKind, ChannelState, DataState};
use crate::error::ViewerResult;

use super::cache::ExpressionEngine;
use super::compiled::{BoundExpression, CompiledExpression};
use super::scope::{Scope, ScopeLayout};
use super::stats::ChannelStats;

/// Result buffer of one expression evaluated over every sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub values: Vec<f64>,
    pub stats: ChannelStats,
    pub referenced_kinds: Vec<ChannelKind>,
}

impl Evaluation {
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.values.len()
    }
}

/// Evaluates `bound` for every sample of `data`.
///
/// The scope is reused across samples and only referenced slots are rewritten.
/// Non-finite results are stored as `0.0` and excluded from the statistics.
pub fn evaluate_samples(bound: &BoundExpression, scope: &mut Scope, data: &DataState) -> Evaluation {
    let sample_count = data.sample_count();
    let mut values = vec![0.0; sample_count];
    let mut valid = vec![false; sample_count];
    let slots = bound.used_slots();
    for (index, (value, is_valid)) in values.iter_mut().zip(valid.iter_mut()).enumerate() {
        scope.load_sample(data, slots, index);
        let result = bound.evaluate(scope);
        if result.is_finite() {
            *value = result;
            *is_valid = true;
        }
    }
    let stats = ChannelStats::from_masked(&values, &valid);
    Evaluation {
        values,
        stats,
        referenced_kinds: bound.referenced_kinds().to_vec(),
    }
}

/// Binds `compiled` against the current state and evaluates it.
pub fn evaluate_compiled(
    compiled: &CompiledExpression,
    state: &ChannelState,
    data: &DataState,
) -> ViewerResult<Evaluation> {
    let started = Instant::now();
    let layout = Rc::new(ScopeLayout::for_state(state, data));
    let bound = compiled.bind(&layout)?;
    let mut scope = Scope::new(layout);
    let evaluation = evaluate_samples(&bound, &mut scope, data);
    debug!(
        expression = compiled.source(),
        samples = evaluation.sample_count(),
        valid = evaluation.stats.valid_count,
        elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
        "expression evaluated"
    );
    Ok(evaluation)
}

impl ExpressionEngine {
    /// Compiles (memoized) and evaluates `source` over the current state.
    pub fn evaluate(
        &mut self,
        source: &str,
        state: &ChannelState,
        data: &DataState,
    ) -> ViewerResult<Evaluation> {
        let compiled = self.compile(source)?;
        evaluate_compiled(&compiled, state, data)
    }
}
