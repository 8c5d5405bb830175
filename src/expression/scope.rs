use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::core::{ChannelKind, ChannelState, DataState};

/// Name bound to the shared time value.
pub const TIME_VARIABLE: &str = "t";

/// Where a scope slot reads its per-sample value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotSource {
    Channel { kind: ChannelKind, position: usize },
    Time,
}

/// Name → slot mapping built once per evaluation batch.
///
/// `a{i}`, `d{i}` and `c{i}` name channel positions; every channel id is an
/// alias of the same slot. On alias collisions the first kind in
/// analog, digital, computed order keeps the name.
#[derive(Debug, Clone, Default)]
pub struct ScopeLayout {
    names: IndexMap<String, usize>,
    sources: Vec<SlotSource>,
}

impl ScopeLayout {
    #[must_use]
    pub fn for_state(state: &ChannelState, data: &DataState) -> Self {
        let mut layout = Self::default();
        if data.time().is_some() {
            let slot = layout.push_source(SlotSource::Time);
            layout.names.insert(TIME_VARIABLE.to_owned(), slot);
        }
        for kind in ChannelKind::ALL {
            for (position, channel_id) in state.kind(kind).channel_ids.iter().enumerate() {
                let slot = layout.push_source(SlotSource::Channel { kind, position });
                layout
                    .names
                    .insert(format!("{}{position}", kind.scope_prefix()), slot);
                if layout.names.contains_key(channel_id.as_str()) {
                    debug!(channel = %channel_id, kind = %kind, "channel id alias already bound");
                    continue;
                }
                layout.names.insert(channel_id.clone(), slot);
            }
        }
        layout
    }

    fn push_source(&mut self, source: SlotSource) -> usize {
        self.sources.push(source);
        self.sources.len() - 1
    }

    #[must_use]
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    #[must_use]
    pub fn source(&self, slot: usize) -> Option<SlotSource> {
        self.sources.get(slot).copied()
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.sources.len()
    }

    /// Bound names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }
}

/// Preallocated per-batch value record, rewritten for every sample.
#[derive(Debug, Clone)]
pub struct Scope {
    layout: Rc<ScopeLayout>,
    values: Vec<f64>,
}

impl Scope {
    #[must_use]
    pub fn new(layout: Rc<ScopeLayout>) -> Self {
        let values = vec![0.0; layout.slot_count()];
        Self { layout, values }
    }

    #[must_use]
    pub fn layout(&self) -> &ScopeLayout {
        &self.layout
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn set_slot(&mut self, slot: usize, value: f64) {
        if let Some(target) = self.values.get_mut(slot) {
            *target = value;
        }
    }

    /// Value currently bound to `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.layout
            .slot_of(name)
            .and_then(|slot| self.values.get(slot).copied())
    }

    /// Writes sample `index` into the given slots; missing samples read as NaN.
    pub fn load_sample(&mut self, data: &DataState, slots: &[usize], index: usize) {
        for &slot in slots {
            let value = match self.layout.source(slot) {
                Some(SlotSource::Time) => data
                    .time()
                    .and_then(|time| time.get(index).copied()),
                Some(SlotSource::Channel { kind, position }) => data
                    .channel(kind, position)
                    .and_then(|samples| samples.get(index).copied()),
                None => None,
            };
            self.set_slot(slot, value.unwrap_or(f64::NAN));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::{Scope, ScopeLayout};
    use crate::core::{ChannelRow, ChannelState, DataState};

    #[test]
    fn channel_ids_alias_positional_names() {
        let state = ChannelState::from_rows(
            vec![ChannelRow::new("IA"), ChannelRow::new("IB")],
            vec![ChannelRow::new("TRIP")],
        )
        .expect("state");
        let data = DataState {
            time: Some(vec![0.0, 0.5]),
            analog: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            digital: vec![vec![0.0, 1.0]],
            ..DataState::default()
        };
        let layout = Rc::new(ScopeLayout::for_state(&state, &data));
        assert_eq!(layout.slot_of("a1"), layout.slot_of("IB"));
        assert_eq!(layout.slot_of("d0"), layout.slot_of("TRIP"));

        let mut scope = Scope::new(Rc::clone(&layout));
        let slots: Vec<usize> = (0..layout.slot_count()).collect();
        scope.load_sample(&data, &slots, 1);
        assert_eq!(scope.get("a1"), Some(4.0));
        assert_eq!(scope.get("IB"), Some(4.0));
        assert_eq!(scope.get("t"), Some(0.5));
        assert_eq!(scope.get("TRIP"), Some(1.0));
    }
}
