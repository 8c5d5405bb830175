use serde::{Deserialize, Serialize};

use crate::error::{ViewerError, ViewerResult};
use crate::reactive::StateValue;

use super::ChannelKind;

/// Parallel sequences of a [`KindChannels`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelField {
    ChannelIds,
    YLabels,
    LineColors,
    YUnits,
    AxesScales,
    Starts,
    Durations,
    Inverts,
    Groups,
    Equations,
}

impl ChannelField {
    pub const ALL: [Self; 10] = [
        Self::ChannelIds,
        Self::YLabels,
        Self::LineColors,
        Self::YUnits,
        Self::AxesScales,
        Self::Starts,
        Self::Durations,
        Self::Inverts,
        Self::Groups,
        Self::Equations,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChannelIds => "channelIDs",
            Self::YLabels => "yLabels",
            Self::LineColors => "lineColors",
            Self::YUnits => "yUnits",
            Self::AxesScales => "axesScales",
            Self::Starts => "starts",
            Self::Durations => "durations",
            Self::Inverts => "inverts",
            Self::Groups => "groups",
            Self::Equations => "equations",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }
}

/// Chart-wide metadata members living next to the per-kind records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisMetaField {
    XLabel,
    XUnit,
    Order,
}

impl AxisMetaField {
    pub const ALL: [Self; 3] = [Self::XLabel, Self::XUnit, Self::Order];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::XLabel => "xLabel",
            Self::XUnit => "xUnit",
            Self::Order => "order",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == name)
    }
}

/// One channel's attributes, used to insert or read a whole position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRow {
    #[serde(rename = "channelID")]
    pub channel_id: String,
    pub y_label: String,
    pub line_color: String,
    pub y_unit: String,
    pub axes_scale: f64,
    pub start: Option<f64>,
    pub duration: Option<f64>,
    pub invert: bool,
    pub group: String,
    pub equation: Option<String>,
}

impl ChannelRow {
    #[must_use]
    pub fn new(channel_id: impl Into<String>) -> Self {
        let channel_id = channel_id.into();
        Self {
            y_label: channel_id.clone(),
            channel_id,
            line_color: "#1f77b4".to_owned(),
            y_unit: String::new(),
            axes_scale: 1.0,
            start: None,
            duration: None,
            invert: false,
            group: String::new(),
            equation: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.y_label = label.into();
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.line_color = color.into();
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.y_unit = unit.into();
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    #[must_use]
    pub fn with_scale(mut self, axes_scale: f64) -> Self {
        self.axes_scale = axes_scale;
        self
    }

    #[must_use]
    pub fn with_equation(mut self, equation: impl Into<String>) -> Self {
        self.equation = Some(equation.into());
        self
    }
}

/// Parallel attribute sequences of one channel kind.
///
/// Every sequence has the same length; `equations` exists only for computed
/// channels.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KindChannels {
    #[serde(rename = "channelIDs")]
    pub channel_ids: Vec<String>,
    pub y_labels: Vec<String>,
    pub line_colors: Vec<String>,
    pub y_units: Vec<String>,
    pub axes_scales: Vec<f64>,
    pub starts: Vec<Option<f64>>,
    pub durations: Vec<Option<f64>>,
    pub inverts: Vec<bool>,
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equations: Option<Vec<String>>,
}

impl KindChannels {
    #[must_use]
    pub fn empty(kind: ChannelKind) -> Self {
        Self {
            equations: (kind == ChannelKind::Computed).then(Vec::new),
            ..Self::default()
        }
    }

    pub fn from_rows(kind: ChannelKind, rows: Vec<ChannelRow>) -> ViewerResult<Self> {
        let mut channels = Self::empty(kind);
        for row in rows {
            channels.push_row(row)?;
        }
        Ok(channels)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channel_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channel_ids.is_empty()
    }

    #[must_use]
    pub fn has_equations(&self) -> bool {
        self.equations.is_some()
    }

    #[must_use]
    pub fn position_of(&self, channel_id: &str) -> Option<usize> {
        self.channel_ids.iter().position(|id| id == channel_id)
    }

    #[must_use]
    pub fn fields(&self) -> Vec<ChannelField> {
        ChannelField::ALL
            .into_iter()
            .filter(|field| *field != ChannelField::Equations || self.has_equations())
            .collect()
    }

    /// Length of each present parallel sequence, in [`ChannelField::ALL`] order.
    #[must_use]
    pub fn field_lengths(&self) -> Vec<(ChannelField, usize)> {
        self.fields()
            .into_iter()
            .map(|field| (field, self.field_len(field)))
            .collect()
    }

    fn field_len(&self, field: ChannelField) -> usize {
        match field {
            ChannelField::ChannelIds => self.channel_ids.len(),
            ChannelField::YLabels => self.y_labels.len(),
            ChannelField::LineColors => self.line_colors.len(),
            ChannelField::YUnits => self.y_units.len(),
            ChannelField::AxesScales => self.axes_scales.len(),
            ChannelField::Starts => self.starts.len(),
            ChannelField::Durations => self.durations.len(),
            ChannelField::Inverts => self.inverts.len(),
            ChannelField::Groups => self.groups.len(),
            ChannelField::Equations => self.equations.as_ref().map_or(0, Vec::len),
        }
    }

    pub fn check_parallel(&self) -> ViewerResult<()> {
        let expected = self.len();
        for (field, len) in self.field_lengths() {
            if len != expected {
                return Err(ViewerError::InvalidData(format!(
                    "parallel sequence `{}` has length {len}, expected {expected}",
                    field.as_str()
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<ChannelRow> {
        if index >= self.len() {
            return None;
        }
        Some(ChannelRow {
            channel_id: self.channel_ids[index].clone(),
            y_label: self.y_labels[index].clone(),
            line_color: self.line_colors[index].clone(),
            y_unit: self.y_units[index].clone(),
            axes_scale: self.axes_scales[index],
            start: self.starts[index],
            duration: self.durations[index],
            invert: self.inverts[index],
            group: self.groups[index].clone(),
            equation: self
                .equations
                .as_ref()
                .and_then(|equations| equations.get(index).cloned()),
        })
    }

    pub fn push_row(&mut self, row: ChannelRow) -> ViewerResult<usize> {
        if row.channel_id.is_empty() {
            return Err(ViewerError::InvalidData(
                "channel id must not be empty".to_owned(),
            ));
        }
        if self.position_of(&row.channel_id).is_some() {
            return Err(ViewerError::InvalidData(format!(
                "channel id `{}` already exists",
                row.channel_id
            )));
        }
        if let Some(equations) = self.equations.as_mut() {
            equations.push(row.equation.unwrap_or_default());
        }
        self.channel_ids.push(row.channel_id);
        self.y_labels.push(row.y_label);
        self.line_colors.push(row.line_color);
        self.y_units.push(row.y_unit);
        self.axes_scales.push(row.axes_scale);
        self.starts.push(row.start);
        self.durations.push(row.duration);
        self.inverts.push(row.invert);
        self.groups.push(row.group);
        Ok(self.len() - 1)
    }

    pub fn remove_row(&mut self, index: usize) -> ViewerResult<ChannelRow> {
        let row = self.row(index).ok_or_else(|| {
            ViewerError::MissingState(format!("no channel at position {index}"))
        })?;
        self.channel_ids.remove(index);
        self.y_labels.remove(index);
        self.line_colors.remove(index);
        self.y_units.remove(index);
        self.axes_scales.remove(index);
        self.starts.remove(index);
        self.durations.remove(index);
        self.inverts.remove(index);
        self.groups.remove(index);
        if let Some(equations) = self.equations.as_mut() {
            equations.remove(index);
        }
        Ok(row)
    }

    /// Whole sequence as a reactive value.
    #[must_use]
    pub fn field_value(&self, field: ChannelField) -> Option<StateValue> {
        Some(match field {
            ChannelField::ChannelIds => StateValue::texts(&self.channel_ids),
            ChannelField::YLabels => StateValue::texts(&self.y_labels),
            ChannelField::LineColors => StateValue::texts(&self.line_colors),
            ChannelField::YUnits => StateValue::texts(&self.y_units),
            ChannelField::AxesScales => StateValue::numbers(&self.axes_scales),
            ChannelField::Starts => {
                StateValue::List(self.starts.iter().copied().map(StateValue::optional_number).collect())
            }
            ChannelField::Durations => StateValue::List(
                self.durations
                    .iter()
                    .copied()
                    .map(StateValue::optional_number)
                    .collect(),
            ),
            ChannelField::Inverts => {
                StateValue::List(self.inverts.iter().copied().map(StateValue::Bool).collect())
            }
            ChannelField::Groups => StateValue::texts(&self.groups),
            ChannelField::Equations => StateValue::texts(self.equations.as_ref()?),
        })
    }

    #[must_use]
    pub fn cell(&self, field: ChannelField, index: usize) -> Option<StateValue> {
        if index >= self.len() {
            return None;
        }
        Some(match field {
            ChannelField::ChannelIds => StateValue::from(self.channel_ids[index].as_str()),
            ChannelField::YLabels => StateValue::from(self.y_labels[index].as_str()),
            ChannelField::LineColors => StateValue::from(self.line_colors[index].as_str()),
            ChannelField::YUnits => StateValue::from(self.y_units[index].as_str()),
            ChannelField::AxesScales => StateValue::Number(self.axes_scales[index]),
            ChannelField::Starts => StateValue::optional_number(self.starts[index]),
            ChannelField::Durations => StateValue::optional_number(self.durations[index]),
            ChannelField::Inverts => StateValue::Bool(self.inverts[index]),
            ChannelField::Groups => StateValue::from(self.groups[index].as_str()),
            ChannelField::Equations => {
                StateValue::from(self.equations.as_ref()?.get(index)?.as_str())
            }
        })
    }

    /// Writes one element; returns the previous value.
    pub fn set_cell(
        &mut self,
        field: ChannelField,
        index: usize,
        value: StateValue,
    ) -> ViewerResult<StateValue> {
        let old = self.cell(field, index).ok_or_else(|| {
            ViewerError::MissingState(format!(
                "no `{}` element at position {index}",
                field.as_str()
            ))
        })?;
        match field {
            ChannelField::ChannelIds => {
                let id = expect_text(field, &value)?;
                if self
                    .position_of(&id)
                    .is_some_and(|existing| existing != index)
                {
                    return Err(ViewerError::InvalidData(format!(
                        "channel id `{id}` already exists"
                    )));
                }
                self.channel_ids[index] = id;
            }
            ChannelField::YLabels => self.y_labels[index] = expect_text(field, &value)?,
            ChannelField::LineColors => self.line_colors[index] = expect_text(field, &value)?,
            ChannelField::YUnits => self.y_units[index] = expect_text(field, &value)?,
            ChannelField::AxesScales => self.axes_scales[index] = expect_number(field, &value)?,
            ChannelField::Starts => self.starts[index] = expect_optional_number(field, &value)?,
            ChannelField::Durations => {
                self.durations[index] = expect_optional_number(field, &value)?;
            }
            ChannelField::Inverts => self.inverts[index] = expect_bool(field, &value)?,
            ChannelField::Groups => self.groups[index] = expect_text(field, &value)?,
            ChannelField::Equations => {
                let text = expect_text(field, &value)?;
                if let Some(equations) = self.equations.as_mut() {
                    equations[index] = text;
                }
            }
        }
        Ok(old)
    }

    /// Replaces a whole sequence.
    ///
    /// A shorter replacement keeps the previous values for the missing tail so
    /// the parallel-length invariant holds; a longer one is rejected.
    pub fn replace_field(
        &mut self,
        field: ChannelField,
        values: Vec<StateValue>,
    ) -> ViewerResult<StateValue> {
        if values.len() > self.len() {
            return Err(ViewerError::InvalidData(format!(
                "replacement for `{}` has {} elements but only {} channels exist",
                field.as_str(),
                values.len(),
                self.len()
            )));
        }
        if field == ChannelField::Equations && !self.has_equations() {
            return Err(ViewerError::InvalidData(
                "equations exist only for computed channels".to_owned(),
            ));
        }
        let old = self.field_value(field).unwrap_or_default();
        let mut staged = self.clone();
        for (index, value) in values.into_iter().enumerate() {
            staged.set_cell(field, index, value)?;
        }
        *self = staged;
        Ok(old)
    }
}

fn expect_text(field: ChannelField, value: &StateValue) -> ViewerResult<String> {
    value
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| type_error(field, "text", value))
}

fn expect_number(field: ChannelField, value: &StateValue) -> ViewerResult<f64> {
    value
        .as_f64()
        .filter(|number| number.is_finite())
        .ok_or_else(|| type_error(field, "finite number", value))
}

fn expect_optional_number(field: ChannelField, value: &StateValue) -> ViewerResult<Option<f64>> {
    match value {
        StateValue::Null => Ok(None),
        other => expect_number(field, other).map(Some),
    }
}

fn expect_bool(field: ChannelField, value: &StateValue) -> ViewerResult<bool> {
    value
        .as_bool()
        .ok_or_else(|| type_error(field, "bool", value))
}

fn type_error(field: ChannelField, expected: &str, value: &StateValue) -> ViewerError {
    ViewerError::InvalidData(format!(
        "`{}` expects {expected}, got {}",
        field.as_str(),
        value.type_name()
    ))
}

/// Channel attributes of every kind plus chart-wide axis metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    pub analog: KindChannels,
    pub digital: KindChannels,
    pub computed: KindChannels,
    #[serde(default)]
    pub x_label: String,
    #[serde(default)]
    pub x_unit: String,
    #[serde(default)]
    pub order: Vec<String>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            analog: KindChannels::empty(ChannelKind::Analog),
            digital: KindChannels::empty(ChannelKind::Digital),
            computed: KindChannels::empty(ChannelKind::Computed),
            x_label: "Time".to_owned(),
            x_unit: "s".to_owned(),
            order: Vec::new(),
        }
    }
}

impl ChannelState {
    /// Builds load-time state; channels without a group are auto-grouped.
    pub fn from_rows(analog: Vec<ChannelRow>, digital: Vec<ChannelRow>) -> ViewerResult<Self> {
        let mut state = Self {
            analog: KindChannels::from_rows(ChannelKind::Analog, analog)?,
            digital: KindChannels::from_rows(ChannelKind::Digital, digital)?,
            ..Self::default()
        };
        crate::planner::fill_auto_groups(&mut state);
        Ok(state)
    }

    #[must_use]
    pub fn kind(&self, kind: ChannelKind) -> &KindChannels {
        match kind {
            ChannelKind::Analog => &self.analog,
            ChannelKind::Digital => &self.digital,
            ChannelKind::Computed => &self.computed,
        }
    }

    pub fn kind_mut(&mut self, kind: ChannelKind) -> &mut KindChannels {
        match kind {
            ChannelKind::Analog => &mut self.analog,
            ChannelKind::Digital => &mut self.digital,
            ChannelKind::Computed => &mut self.computed,
        }
    }

    pub fn check_parallel(&self) -> ViewerResult<()> {
        for kind in ChannelKind::ALL {
            self.kind(kind).check_parallel()?;
        }
        Ok(())
    }

    /// Every group key currently assigned to any channel of any kind.
    #[must_use]
    pub fn all_groups(&self) -> Vec<&str> {
        ChannelKind::ALL
            .into_iter()
            .flat_map(|kind| self.kind(kind).groups.iter().map(String::as_str))
            .collect()
    }

    #[must_use]
    pub fn axis_meta(&self, field: AxisMetaField) -> StateValue {
        match field {
            AxisMetaField::XLabel => StateValue::from(self.x_label.as_str()),
            AxisMetaField::XUnit => StateValue::from(self.x_unit.as_str()),
            AxisMetaField::Order => StateValue::texts(&self.order),
        }
    }

    pub fn set_axis_meta(&mut self, field: AxisMetaField, value: StateValue) -> ViewerResult<StateValue> {
        let old = self.axis_meta(field);
        match (field, value) {
            (AxisMetaField::XLabel, StateValue::Text(text)) => self.x_label = text,
            (AxisMetaField::XUnit, StateValue::Text(text)) => self.x_unit = text,
            (AxisMetaField::Order, StateValue::List(items)) => {
                self.order = items
                    .iter()
                    .map(|item| {
                        item.as_str().map(str::to_owned).ok_or_else(|| {
                            ViewerError::InvalidData("order entries must be text".to_owned())
                        })
                    })
                    .collect::<ViewerResult<_>>()?;
            }
            (field, other) => {
                return Err(ViewerError::InvalidData(format!(
                    "`{}` cannot hold a {}",
                    field.as_str(),
                    other.type_name()
                )));
            }
        }
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelField, ChannelRow, KindChannels};
    use crate::core::ChannelKind;
    use crate::reactive::StateValue;

    fn three_channels() -> KindChannels {
        KindChannels::from_rows(
            ChannelKind::Analog,
            vec![
                ChannelRow::new("IA").with_color("#111111"),
                ChannelRow::new("IB").with_color("#222222"),
                ChannelRow::new("IC").with_color("#333333"),
            ],
        )
        .expect("rows")
    }

    #[test]
    fn shorter_replacement_keeps_tail() {
        let mut channels = three_channels();
        channels
            .replace_field(ChannelField::LineColors, vec![StateValue::from("#000000")])
            .expect("replace");
        assert_eq!(channels.line_colors, vec!["#000000", "#222222", "#333333"]);
        channels.check_parallel().expect("parallel");
    }

    #[test]
    fn replacement_is_atomic_on_type_error() {
        let mut channels = three_channels();
        let result = channels.replace_field(
            ChannelField::LineColors,
            vec![StateValue::from("#000000"), StateValue::Number(1.0)],
        );
        assert!(result.is_err());
        assert_eq!(channels.line_colors[0], "#111111");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut channels = three_channels();
        assert!(channels.push_row(ChannelRow::new("IA")).is_err());
        assert!(
            channels
                .set_cell(ChannelField::ChannelIds, 1, StateValue::from("IC"))
                .is_err()
        );
    }

    #[test]
    fn remove_row_keeps_parallel_sequences_aligned() {
        let mut channels = three_channels();
        let removed = channels.remove_row(1).expect("remove");
        assert_eq!(removed.channel_id, "IB");
        assert_eq!(channels.channel_ids, vec!["IA", "IC"]);
        channels.check_parallel().expect("parallel");
    }

    #[test]
    fn equations_are_computed_only() {
        let analog = three_channels();
        assert!(!analog.fields().contains(&ChannelField::Equations));
        let mut computed = KindChannels::empty(ChannelKind::Computed);
        computed
            .push_row(ChannelRow::new("C1").with_equation("a0*2"))
            .expect("push");
        assert_eq!(computed.equations.as_deref(), Some(&["a0*2".to_owned()][..]));
        computed.check_parallel().expect("parallel");
    }
}
