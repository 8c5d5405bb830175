use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::core::{
    AxisMetaField, ChannelField, ChannelKind, ChannelRow, ChannelState, DataState,
    validate_hex_color,
};
use crate::error::{ViewerError, ViewerResult};

use super::{
    ChangeKind, ChangeRecord, Dispatcher, PropertyOptions, StatePath, StateValue, SubscriptionId,
};

/// Root key under which sample replacements are reported: `data.{kind}`, `data.time`.
pub const DATA_KEY: &str = "data";
pub const TIME_KEY: &str = "time";

struct StoreInner {
    channels: RefCell<ChannelState>,
    data: RefCell<DataState>,
    dispatcher: Dispatcher,
}

/// Typed reactive store over [`ChannelState`] and [`DataState`].
///
/// Attribute paths are `[kind, field]` for whole-sequence replacement and
/// `[kind, field, index]` for single elements, so leaf-property subscribers
/// see the same shapes a generic [`super::ReactiveTree`] would produce.
/// State borrows are always released before a change is emitted; subscribers
/// may read the store and may mutate it (nested changes are queued).
#[derive(Clone)]
pub struct ChannelStore {
    inner: Rc<StoreInner>,
}

impl fmt::Debug for ChannelStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = self.inner.channels.borrow();
        f.debug_struct("ChannelStore")
            .field("analog", &channels.analog.len())
            .field("digital", &channels.digital.len())
            .field("computed", &channels.computed.len())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

impl ChannelStore {
    pub fn new(channels: ChannelState, data: DataState) -> ViewerResult<Self> {
        channels.check_parallel()?;
        Ok(Self {
            inner: Rc::new(StoreInner {
                channels: RefCell::new(channels),
                data: RefCell::new(data),
                dispatcher: Dispatcher::new(),
            }),
        })
    }

    #[must_use]
    pub fn state(&self) -> Ref<'_, ChannelState> {
        self.inner.channels.borrow()
    }

    #[must_use]
    pub fn data(&self) -> Ref<'_, DataState> {
        self.inner.data.borrow()
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    #[must_use]
    pub fn len(&self, kind: ChannelKind) -> usize {
        self.inner.channels.borrow().kind(kind).len()
    }

    #[must_use]
    pub fn channel_row(&self, kind: ChannelKind, index: usize) -> Option<ChannelRow> {
        self.inner.channels.borrow().kind(kind).row(index)
    }

    #[must_use]
    pub fn position_of(&self, kind: ChannelKind, channel_id: &str) -> Option<usize> {
        self.inner.channels.borrow().kind(kind).position_of(channel_id)
    }

    pub fn subscribe(
        &self,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.subscribe(callback)
    }

    pub fn subscribe_path(
        &self,
        path: StatePath,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.subscribe_path(path, callback)
    }

    pub fn subscribe_property(
        &self,
        name: impl Into<String>,
        options: PropertyOptions,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.inner
            .dispatcher
            .subscribe_property(name, options, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }

    /// Single-element write at `[kind, field, index]`.
    pub fn set_cell(
        &self,
        kind: ChannelKind,
        field: ChannelField,
        index: usize,
        value: StateValue,
    ) -> ViewerResult<()> {
        let old = self
            .inner
            .channels
            .borrow_mut()
            .kind_mut(kind)
            .set_cell(field, index, value.clone())?;
        self.emit(ChangeRecord::new(
            field_path(kind, field).child(index),
            ChangeKind::ElementSet,
            Some(old),
            Some(value),
        ));
        Ok(())
    }

    pub fn set_line_color(&self, kind: ChannelKind, index: usize, color: &str) -> ViewerResult<()> {
        validate_hex_color(color)?;
        self.set_cell(kind, ChannelField::LineColors, index, StateValue::from(color))
    }

    pub fn set_label(&self, kind: ChannelKind, index: usize, label: &str) -> ViewerResult<()> {
        self.set_cell(kind, ChannelField::YLabels, index, StateValue::from(label))
    }

    pub fn set_unit(&self, kind: ChannelKind, index: usize, unit: &str) -> ViewerResult<()> {
        self.set_cell(kind, ChannelField::YUnits, index, StateValue::from(unit))
    }

    pub fn set_group(&self, kind: ChannelKind, index: usize, group: &str) -> ViewerResult<()> {
        self.set_cell(kind, ChannelField::Groups, index, StateValue::from(group.trim()))
    }

    pub fn set_axes_scale(&self, kind: ChannelKind, index: usize, scale: f64) -> ViewerResult<()> {
        self.set_cell(kind, ChannelField::AxesScales, index, StateValue::Number(scale))
    }

    pub fn set_start(&self, kind: ChannelKind, index: usize, start: Option<f64>) -> ViewerResult<()> {
        self.set_cell(kind, ChannelField::Starts, index, StateValue::optional_number(start))
    }

    pub fn set_duration(
        &self,
        kind: ChannelKind,
        index: usize,
        duration: Option<f64>,
    ) -> ViewerResult<()> {
        self.set_cell(
            kind,
            ChannelField::Durations,
            index,
            StateValue::optional_number(duration),
        )
    }

    pub fn set_invert(&self, kind: ChannelKind, index: usize, invert: bool) -> ViewerResult<()> {
        self.set_cell(kind, ChannelField::Inverts, index, StateValue::Bool(invert))
    }

    /// Whole-sequence replacement at `[kind, field]`.
    ///
    /// A shorter sequence overwrites the leading positions and keeps the rest.
    pub fn replace_field(
        &self,
        kind: ChannelKind,
        field: ChannelField,
        values: Vec<StateValue>,
    ) -> ViewerResult<()> {
        let (old, new) = {
            let mut channels = self.inner.channels.borrow_mut();
            let record = channels.kind_mut(kind);
            let old = record.replace_field(field, values)?;
            (old, record.field_value(field).unwrap_or_default())
        };
        self.emit(ChangeRecord::new(
            field_path(kind, field),
            ChangeKind::ArrayReplace,
            Some(old),
            Some(new),
        ));
        Ok(())
    }

    pub fn replace_groups<S: AsRef<str>>(&self, kind: ChannelKind, groups: &[S]) -> ViewerResult<()> {
        let values = groups
            .iter()
            .map(|group| StateValue::from(group.as_ref().trim()))
            .collect();
        self.replace_field(kind, ChannelField::Groups, values)
    }

    pub fn replace_line_colors<S: AsRef<str>>(
        &self,
        kind: ChannelKind,
        colors: &[S],
    ) -> ViewerResult<()> {
        for color in colors {
            validate_hex_color(color.as_ref())?;
        }
        let values = colors
            .iter()
            .map(|color| StateValue::from(color.as_ref()))
            .collect();
        self.replace_field(kind, ChannelField::LineColors, values)
    }

    /// Appends a channel and its samples; emits one insert per parallel sequence.
    pub fn push_channel(
        &self,
        kind: ChannelKind,
        row: ChannelRow,
        samples: Vec<f64>,
    ) -> ViewerResult<usize> {
        if kind == ChannelKind::Computed && row.equation.is_none() {
            return Err(ViewerError::InvalidData(format!(
                "computed channel `{}` needs an equation",
                row.channel_id
            )));
        }
        let (index, records) = {
            let mut channels = self.inner.channels.borrow_mut();
            let record = channels.kind_mut(kind);
            let index = record.push_row(row)?;
            let records = record
                .fields()
                .into_iter()
                .map(|field| {
                    ChangeRecord::new(
                        field_path(kind, field).child(index),
                        ChangeKind::Insert,
                        None,
                        record.cell(field, index),
                    )
                })
                .collect::<Vec<_>>();
            (index, records)
        };
        {
            let mut data = self.inner.data.borrow_mut();
            let sequences = data.kind_mut(kind);
            if sequences.len() < index {
                sequences.resize(index, Vec::new());
            }
            sequences.insert(index, samples);
        }
        debug!(kind = %kind, index, "channel appended");
        self.inner.dispatcher.emit_all(records);
        Ok(index)
    }

    /// Overwrites every attribute of an existing channel, one element change per
    /// field whose value differs.
    pub fn update_channel(&self, kind: ChannelKind, index: usize, row: &ChannelRow) -> ViewerResult<()> {
        let current = self.channel_row(kind, index).ok_or_else(|| {
            ViewerError::MissingState(format!("no {kind} channel at position {index}"))
        })?;
        let changes = [
            (ChannelField::ChannelIds, current.channel_id != row.channel_id, StateValue::from(row.channel_id.as_str())),
            (ChannelField::YLabels, current.y_label != row.y_label, StateValue::from(row.y_label.as_str())),
            (ChannelField::LineColors, current.line_color != row.line_color, StateValue::from(row.line_color.as_str())),
            (ChannelField::YUnits, current.y_unit != row.y_unit, StateValue::from(row.y_unit.as_str())),
            (ChannelField::AxesScales, current.axes_scale != row.axes_scale, StateValue::Number(row.axes_scale)),
            (ChannelField::Starts, current.start != row.start, StateValue::optional_number(row.start)),
            (ChannelField::Durations, current.duration != row.duration, StateValue::optional_number(row.duration)),
            (ChannelField::Inverts, current.invert != row.invert, StateValue::Bool(row.invert)),
            (ChannelField::Groups, current.group != row.group, StateValue::from(row.group.as_str())),
        ];
        for (field, changed, value) in changes {
            if changed {
                self.set_cell(kind, field, index, value)?;
            }
        }
        if let Some(equation) = row.equation.as_deref() {
            if current.equation.as_deref() != Some(equation) {
                self.set_cell(kind, ChannelField::Equations, index, StateValue::from(equation))?;
            }
        }
        Ok(())
    }

    /// Removes a channel and its samples; emits one remove per parallel sequence.
    pub fn remove_channel(&self, kind: ChannelKind, index: usize) -> ViewerResult<ChannelRow> {
        let (row, fields) = {
            let mut channels = self.inner.channels.borrow_mut();
            let record = channels.kind_mut(kind);
            let fields = record.fields();
            (record.remove_row(index)?, fields)
        };
        {
            let mut data = self.inner.data.borrow_mut();
            let sequences = data.kind_mut(kind);
            if index < sequences.len() {
                sequences.remove(index);
            }
        }
        let records = fields
            .into_iter()
            .map(|field| {
                ChangeRecord::new(
                    field_path(kind, field).child(index),
                    ChangeKind::Remove,
                    None,
                    None,
                )
            })
            .collect::<Vec<_>>();
        debug!(kind = %kind, index, channel = %row.channel_id, "channel removed");
        self.inner.dispatcher.emit_all(records);
        Ok(row)
    }

    /// Replaces every sample sequence of a kind.
    ///
    /// Sample payloads are not copied into the change record; `new_value`
    /// carries the channel count.
    pub fn replace_data(&self, kind: ChannelKind, sequences: Vec<Vec<f64>>) -> ViewerResult<()> {
        let expected = self.len(kind);
        if sequences.len() != expected {
            return Err(ViewerError::InvalidData(format!(
                "{kind} data has {} sequences for {expected} channels",
                sequences.len()
            )));
        }
        let count = sequences.len() as f64;
        *self.inner.data.borrow_mut().kind_mut(kind) = sequences;
        self.emit(ChangeRecord::new(
            data_path(kind),
            ChangeKind::ArrayReplace,
            None,
            Some(StateValue::Number(count)),
        ));
        Ok(())
    }

    /// Replaces the samples of one channel; reported at `data.{kind}.{index}`.
    pub fn set_channel_samples(
        &self,
        kind: ChannelKind,
        index: usize,
        samples: Vec<f64>,
    ) -> ViewerResult<()> {
        let count = samples.len() as f64;
        {
            let mut data = self.inner.data.borrow_mut();
            let slot = data.kind_mut(kind).get_mut(index).ok_or_else(|| {
                ViewerError::MissingState(format!("no {kind} samples at position {index}"))
            })?;
            *slot = samples;
        }
        self.emit(ChangeRecord::new(
            data_path(kind).child(index),
            ChangeKind::ElementSet,
            None,
            Some(StateValue::Number(count)),
        ));
        Ok(())
    }

    pub fn replace_time(&self, time: Option<Vec<f64>>) {
        let count = time.as_ref().map(Vec::len);
        self.inner.data.borrow_mut().time = time;
        self.emit(ChangeRecord::new(
            StatePath::root().child(DATA_KEY).child(TIME_KEY),
            ChangeKind::Set,
            None,
            Some(StateValue::optional_number(count.map(|n| n as f64))),
        ));
    }

    pub fn set_axis_meta(&self, field: AxisMetaField, value: StateValue) -> ViewerResult<()> {
        let kind = if value.is_list() {
            ChangeKind::ArrayReplace
        } else {
            ChangeKind::Set
        };
        let old = self
            .inner
            .channels
            .borrow_mut()
            .set_axis_meta(field, value.clone())?;
        self.emit(ChangeRecord::new(
            StatePath::root().child(field.as_str()),
            kind,
            Some(old),
            Some(value),
        ));
        Ok(())
    }

    pub fn set_x_label(&self, label: &str) -> ViewerResult<()> {
        self.set_axis_meta(AxisMetaField::XLabel, StateValue::from(label))
    }

    pub fn set_x_unit(&self, unit: &str) -> ViewerResult<()> {
        self.set_axis_meta(AxisMetaField::XUnit, StateValue::from(unit))
    }

    pub fn set_order<S: AsRef<str>>(&self, order: &[S]) -> ViewerResult<()> {
        self.set_axis_meta(AxisMetaField::Order, StateValue::texts(order))
    }

    /// Swaps in freshly loaded state; reported as a root assignment.
    pub fn load(&self, channels: ChannelState, data: DataState) -> ViewerResult<()> {
        channels.check_parallel()?;
        *self.inner.channels.borrow_mut() = channels;
        *self.inner.data.borrow_mut() = data;
        self.emit(ChangeRecord::new(
            StatePath::root(),
            ChangeKind::Set,
            None,
            None,
        ));
        Ok(())
    }

    fn emit(&self, record: ChangeRecord) {
        self.inner.dispatcher.emit(record);
    }
}

#[must_use]
pub fn field_path(kind: ChannelKind, field: ChannelField) -> StatePath {
    StatePath::root().child(kind.as_str()).child(field.as_str())
}

#[must_use]
pub fn data_path(kind: ChannelKind) -> StatePath {
    StatePath::root().child(DATA_KEY).child(kind.as_str())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::ChannelStore;
    use crate::core::{ChannelKind, ChannelRow, ChannelState, DataState};
    use crate::reactive::{ChangeKind, PropertyOptions, StateValue};

    fn store() -> ChannelStore {
        let state = ChannelState::from_rows(
            vec![
                ChannelRow::new("IA").with_unit("A").with_group("G0"),
                ChannelRow::new("IB").with_unit("A").with_group("G0"),
            ],
            Vec::new(),
        )
        .expect("state");
        let data = DataState {
            time: Some(vec![0.0, 1.0]),
            analog: vec![vec![1.0, 2.0], vec![3.0, 4.0]],
            ..DataState::default()
        };
        ChannelStore::new(state, data).expect("store")
    }

    #[test]
    fn element_and_replace_shapes_reach_property_subscribers() {
        let store = store();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        store.subscribe_property("groups", PropertyOptions::default(), move |record| {
            sink.borrow_mut().push((record.kind, record.element_index()));
            Ok(())
        });

        store.set_group(ChannelKind::Analog, 1, "G1").expect("set");
        store
            .replace_groups(ChannelKind::Analog, &["G2", "G2"])
            .expect("replace");

        assert_eq!(
            *seen.borrow(),
            vec![
                (ChangeKind::ElementSet, Some(1)),
                (ChangeKind::ArrayReplace, None)
            ]
        );
        assert_eq!(store.state().analog.groups, vec!["G2", "G2"]);
    }

    #[test]
    fn push_and_remove_keep_data_aligned() {
        let store = store();
        let inserts = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&inserts);
        store.subscribe(move |record| {
            if record.kind == ChangeKind::Insert {
                *counter.borrow_mut() += 1;
            }
            Ok(())
        });

        let index = store
            .push_channel(
                ChannelKind::Analog,
                ChannelRow::new("IC").with_unit("A"),
                vec![5.0, 6.0],
            )
            .expect("push");
        assert_eq!(index, 2);
        assert_eq!(*inserts.borrow(), 9);
        assert_eq!(store.data().analog[2], vec![5.0, 6.0]);

        let removed = store.remove_channel(ChannelKind::Analog, 0).expect("remove");
        assert_eq!(removed.channel_id, "IA");
        assert_eq!(store.data().analog.len(), 2);
        store.state().check_parallel().expect("parallel");
    }

    #[test]
    fn invalid_color_is_rejected_without_emitting() {
        let store = store();
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        store.subscribe(move |_| {
            *counter.borrow_mut() += 1;
            Ok(())
        });
        assert!(store.set_line_color(ChannelKind::Analog, 0, "red").is_err());
        assert!(
            store
                .set_cell(ChannelKind::Analog, crate::core::ChannelField::Inverts, 0, StateValue::from("yes"))
                .is_err()
        );
        assert_eq!(*count.borrow(), 0);
    }

    #[test]
    fn computed_channels_require_an_equation() {
        let store = store();
        let result = store.push_channel(ChannelKind::Computed, ChannelRow::new("C"), vec![]);
        assert!(result.is_err());
        store
            .push_channel(
                ChannelKind::Computed,
                ChannelRow::new("C").with_equation("a0"),
                vec![1.0, 2.0],
            )
            .expect("push");
        assert_eq!(store.len(ChannelKind::Computed), 1);
    }
}
