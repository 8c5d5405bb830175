use std::fmt;

use serde::Serialize;
use smallvec::SmallVec;

use super::StateValue;

/// One step of a structured state path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    #[must_use]
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Self::Key(key) => Some(key),
            Self::Index(_) => None,
        }
    }

    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Key(_) => None,
            Self::Index(index) => Some(*index),
        }
    }

    #[must_use]
    pub fn is_key(&self, name: &str) -> bool {
        self.as_key() == Some(name)
    }
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        Self::Key(value.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        Self::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Path from the container root to a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub struct StatePath(SmallVec<[PathSegment; 4]>);

impl StatePath {
    #[must_use]
    pub fn root() -> Self {
        Self(SmallVec::new())
    }

    #[must_use]
    pub fn from_segments(segments: impl IntoIterator<Item = PathSegment>) -> Self {
        Self(segments.into_iter().collect())
    }

    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut next = self.clone();
        next.0.push(segment.into());
        next
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Segment counted from the end; `from_end(1)` is the last one.
    #[must_use]
    pub fn from_end(&self, offset: usize) -> Option<&PathSegment> {
        self.0.len().checked_sub(offset).and_then(|i| self.0.get(i))
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&PathSegment> {
        self.0.get(index)
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        let mut parent = self.clone();
        parent.0.pop();
        Some(parent)
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.0.iter().any(|segment| segment.is_key(name))
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Builds a [`StatePath`] from heterogeneous segments: `state_path!["analog", "groups", 1]`.
#[macro_export]
macro_rules! state_path {
    ($($segment:expr),* $(,)?) => {
        $crate::reactive::StatePath::from_segments([
            $($crate::reactive::PathSegment::from($segment)),*
        ])
    };
}

/// Shape of a mutation, decided by the operation that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChangeKind {
    /// Plain member assignment.
    Set,
    /// One element of a sequence replaced in place.
    ElementSet,
    /// A whole sequence replaced.
    ArrayReplace,
    /// Element appended or inserted into a sequence.
    Insert,
    /// Element removed from a sequence.
    Remove,
    TableSet,
    TableDelete,
}

/// Change notification fanned out to subscribers.
///
/// `path` is the full path of the touched member; `prop` repeats its last segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub path: StatePath,
    pub prop: Option<PathSegment>,
    pub old_value: Option<StateValue>,
    pub new_value: Option<StateValue>,
    pub kind: ChangeKind,
}

impl ChangeRecord {
    #[must_use]
    pub fn new(
        path: StatePath,
        kind: ChangeKind,
        old_value: Option<StateValue>,
        new_value: Option<StateValue>,
    ) -> Self {
        Self {
            prop: path.last().cloned(),
            path,
            old_value,
            new_value,
            kind,
        }
    }

    /// Index of the touched element for element-shaped changes.
    #[must_use]
    pub fn element_index(&self) -> Option<usize> {
        match self.kind {
            ChangeKind::ElementSet | ChangeKind::Insert | ChangeKind::Remove => {
                self.path.last().and_then(PathSegment::as_index)
            }
            _ => None,
        }
    }

    /// Name of the sequence or member this change belongs to.
    #[must_use]
    pub fn property_name(&self) -> Option<&str> {
        match self.kind {
            ChangeKind::ElementSet | ChangeKind::Insert | ChangeKind::Remove => {
                self.path.from_end(2).and_then(PathSegment::as_key)
            }
            _ => self.path.last().and_then(PathSegment::as_key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeKind, ChangeRecord, PathSegment};
    use crate::reactive::StateValue;

    #[test]
    fn element_changes_report_owning_property() {
        let record = ChangeRecord::new(
            crate::state_path!["analog", "lineColors", 1usize],
            ChangeKind::ElementSet,
            Some(StateValue::from("#111111")),
            Some(StateValue::from("#abcdef")),
        );
        assert_eq!(record.element_index(), Some(1));
        assert_eq!(record.property_name(), Some("lineColors"));
        assert_eq!(record.prop, Some(PathSegment::Index(1)));
        assert_eq!(record.path.to_string(), "analog.lineColors.1");
    }

    #[test]
    fn replace_changes_report_leaf_property() {
        let record = ChangeRecord::new(
            crate::state_path!["analog", "groups"],
            ChangeKind::ArrayReplace,
            None,
            Some(StateValue::texts(&["G0"])),
        );
        assert_eq!(record.element_index(), None);
        assert_eq!(record.property_name(), Some("groups"));
    }

    #[test]
    fn paths_serialize_as_plain_segment_arrays() {
        let path = crate::state_path!["digital", "lineColors", 3usize];
        let json = serde_json::to_string(&path).expect("json");
        assert_eq!(json, r#"["digital","lineColors",3]"#);
    }
}
