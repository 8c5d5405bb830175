use crate::core::{AxisMetaField, ChannelField, ChannelKind};
use crate::reactive::{ChangeKind, ChangeRecord, DATA_KEY, PathSegment, TIME_KEY};

/// Reconciliation-relevant reading of one change record.
///
/// `index` is `None` when a whole sequence was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineChange {
    Color { kind: ChannelKind, index: Option<usize> },
    Label { kind: ChannelKind, index: Option<usize> },
    Window { kind: ChannelKind, index: Option<usize> },
    Invert { kind: ChannelKind, index: Option<usize> },
    Groups { kind: ChannelKind },
    ChannelInserted { kind: ChannelKind, index: usize },
    ChannelsRemoved { kind: ChannelKind },
    Renamed { kind: ChannelKind },
    Equation { kind: ChannelKind, index: Option<usize> },
    /// Units or axis scale factors of one kind.
    Structural { kind: ChannelKind, field: ChannelField },
    AxisMeta(AxisMetaField),
    Samples { kind: ChannelKind, index: usize },
    DataReplaced { kind: ChannelKind },
    TimeReplaced,
    Reloaded,
}

impl EngineChange {
    /// Strategy label used in logs.
    #[must_use]
    pub const fn strategy(self) -> &'static str {
        match self {
            Self::Color { .. } | Self::Label { .. } => "attribute",
            Self::Window { .. } => "scale",
            Self::Invert { .. } | Self::Samples { .. } => "data",
            Self::Groups { .. } => "group_merge",
            Self::ChannelInserted { .. } => "attach",
            Self::Renamed { .. } | Self::Equation { .. } => "none",
            Self::ChannelsRemoved { .. }
            | Self::Structural { .. }
            | Self::AxisMeta(_)
            | Self::DataReplaced { .. }
            | Self::TimeReplaced
            | Self::Reloaded => "recreate",
        }
    }
}

/// Property names whose changes reach the engine through leaf subscriptions.
#[must_use]
pub fn property_names() -> impl Iterator<Item = &'static str> {
    ChannelField::ALL
        .into_iter()
        .map(ChannelField::as_str)
        .chain(std::iter::once(DATA_KEY))
}

/// Whether a leaf-property subscription already covers this record, so the
/// generic tree subscriber must skip it.
#[must_use]
pub fn handled_by_property(record: &ChangeRecord) -> bool {
    if record.path.get(0).is_some_and(|segment| segment.is_key(DATA_KEY)) {
        return true;
    }
    record
        .property_name()
        .and_then(ChannelField::from_name)
        .is_some()
        && record.path.len() >= 2
}

/// Maps a store change to the engine work it requires.
#[must_use]
pub fn classify(record: &ChangeRecord) -> Option<EngineChange> {
    let segments = record.path.segments();
    match segments {
        [] => Some(EngineChange::Reloaded),
        [PathSegment::Key(root), rest @ ..] if root == DATA_KEY => classify_data(record, rest),
        [PathSegment::Key(name)] => AxisMetaField::from_name(name).map(EngineChange::AxisMeta),
        [PathSegment::Key(kind), PathSegment::Key(field), rest @ ..] => {
            let kind = kind.parse::<ChannelKind>().ok()?;
            let field = ChannelField::from_name(field)?;
            let index = match rest {
                [] => None,
                [PathSegment::Index(index)] => Some(*index),
                _ => return None,
            };
            classify_field(record.kind, kind, field, index)
        }
        _ => None,
    }
}

fn classify_data(record: &ChangeRecord, rest: &[PathSegment]) -> Option<EngineChange> {
    match rest {
        [PathSegment::Key(key)] if key == TIME_KEY => Some(EngineChange::TimeReplaced),
        [PathSegment::Key(kind)] => {
            let kind = kind.parse::<ChannelKind>().ok()?;
            Some(EngineChange::DataReplaced { kind })
        }
        [PathSegment::Key(kind), PathSegment::Index(index)]
            if record.kind == ChangeKind::ElementSet =>
        {
            let kind = kind.parse::<ChannelKind>().ok()?;
            Some(EngineChange::Samples {
                kind,
                index: *index,
            })
        }
        _ => None,
    }
}

fn classify_field(
    change: ChangeKind,
    kind: ChannelKind,
    field: ChannelField,
    index: Option<usize>,
) -> Option<EngineChange> {
    match change {
        ChangeKind::Insert => {
            return match (field, index) {
                (ChannelField::ChannelIds, Some(index)) => {
                    Some(EngineChange::ChannelInserted { kind, index })
                }
                _ => None,
            };
        }
        ChangeKind::Remove => {
            return (field == ChannelField::ChannelIds)
                .then_some(EngineChange::ChannelsRemoved { kind });
        }
        _ => {}
    }
    Some(match field {
        ChannelField::LineColors => EngineChange::Color { kind, index },
        ChannelField::YLabels => EngineChange::Label { kind, index },
        ChannelField::Starts | ChannelField::Durations => EngineChange::Window { kind, index },
        ChannelField::Inverts => EngineChange::Invert { kind, index },
        ChannelField::Groups => EngineChange::Groups { kind },
        ChannelField::ChannelIds => match index {
            Some(_) => EngineChange::Renamed { kind },
            None => EngineChange::ChannelsRemoved { kind },
        },
        ChannelField::Equations => EngineChange::Equation { kind, index },
        ChannelField::YUnits | ChannelField::AxesScales => {
            EngineChange::Structural { kind, field }
        }
    })
}
