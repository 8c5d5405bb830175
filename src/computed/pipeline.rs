use tracing::{info, warn};

use crate::core::ChannelKind;
use crate::error::ViewerResult;
use crate::expression::{Evaluation, ExpressionCacheStats, ExpressionEngine};

use super::model::{ComputedSave, SavedChannel};
use super::store::ComputedChannelStore;

/// User input of the "new computed channel" dialog.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputeRequest {
    pub equation: String,
    pub name: Option<String>,
    pub group: Option<String>,
    pub unit: Option<String>,
    pub color: Option<String>,
    pub scaling_factor: Option<f64>,
}

impl ComputeRequest {
    #[must_use]
    pub fn new(equation: impl Into<String>) -> Self {
        Self {
            equation: equation.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_scaling(mut self, scaling_factor: f64) -> Self {
        self.scaling_factor = Some(scaling_factor);
        self
    }

    fn into_save(self, evaluation: Evaluation) -> ComputedSave {
        let made_from = source_kind(&evaluation.referenced_kinds);
        ComputedSave {
            equation: self.equation,
            stats: evaluation.stats,
            values: evaluation.values,
            scaling_factor: self.scaling_factor.unwrap_or(1.0),
            color: self.color,
            group: self.group,
            unit: self.unit,
            name: self.name,
            id: None,
            made_from: Some(made_from),
        }
    }
}

/// Kind recorded as the channel's origin: digital only when no analog input is used.
fn source_kind(referenced: &[ChannelKind]) -> ChannelKind {
    if referenced.contains(&ChannelKind::Digital) && !referenced.contains(&ChannelKind::Analog) {
        ChannelKind::Digital
    } else {
        ChannelKind::Analog
    }
}

/// Evaluates expressions against the live state and saves the results.
#[derive(Debug)]
pub struct ComputedPipeline {
    engine: ExpressionEngine,
    store: ComputedChannelStore,
}

impl ComputedPipeline {
    #[must_use]
    pub fn new(engine: ExpressionEngine, store: ComputedChannelStore) -> Self {
        Self { engine, store }
    }

    #[must_use]
    pub fn store(&self) -> &ComputedChannelStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ComputedChannelStore {
        &mut self.store
    }

    #[must_use]
    pub fn cache_stats(&self) -> ExpressionCacheStats {
        self.engine.stats()
    }

    /// Evaluates without saving.
    pub fn preview(&mut self, equation: &str) -> ViewerResult<Evaluation> {
        let live = self.store.live().clone();
        let state = live.state();
        let data = live.data();
        self.engine.evaluate(equation, &state, &data)
    }

    /// Evaluates `request.equation` over every sample and saves the channel.
    pub fn create(&mut self, request: ComputeRequest) -> ViewerResult<SavedChannel> {
        let evaluation = self.preview(&request.equation)?;
        let save = request.into_save(evaluation);
        self.store.save(save)
    }

    pub fn delete(&mut self, id: &str) -> ViewerResult<bool> {
        self.store.delete(id)
    }

    /// Re-evaluates every stored channel against the current samples, e.g. after
    /// a new recording is loaded. Channels whose expression no longer binds are
    /// left untouched.
    pub fn refresh_all(&mut self) -> ViewerResult<usize> {
        let targets: Vec<(String, String)> = self
            .store
            .channels()
            .iter()
            .map(|channel| (channel.id().to_owned(), channel.meta.equation.clone()))
            .collect();
        let mut refreshed = 0;
        for (id, equation) in targets {
            let evaluation = match self.preview(&equation) {
                Ok(evaluation) => evaluation,
                Err(error) => {
                    warn!(%id, %error, "computed channel not refreshed");
                    continue;
                }
            };
            let scaling = self
                .store
                .get(&id)
                .map_or(1.0, |channel| channel.meta.scaling_factor);
            let save = ComputedSave {
                id: Some(id),
                made_from: Some(source_kind(&evaluation.referenced_kinds)),
                stats: evaluation.stats,
                ..ComputedSave::new(equation, evaluation.values)
            };
            self.store.save(save.with_scaling(scaling))?;
            refreshed += 1;
        }
        info!(refreshed, "computed channels refreshed");
        Ok(refreshed)
    }
}
