use indexmap::IndexMap;
use serde::Serialize;

/// Dynamic nested value held by reactive containers.
///
/// `Record` is a plain string-keyed structure; `Table` is a keyed collection
/// whose insert/remove/clear operations emit one change per key.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<StateValue>),
    Record(IndexMap<String, StateValue>),
    Table(IndexMap<String, StateValue>),
}

impl StateValue {
    #[must_use]
    pub fn record() -> Self {
        Self::Record(IndexMap::new())
    }

    #[must_use]
    pub fn table() -> Self {
        Self::Table(IndexMap::new())
    }

    #[must_use]
    pub fn numbers(values: &[f64]) -> Self {
        Self::List(values.iter().copied().map(Self::Number).collect())
    }

    #[must_use]
    pub fn texts<S: AsRef<str>>(values: &[S]) -> Self {
        Self::List(
            values
                .iter()
                .map(|value| Self::Text(value.as_ref().to_owned()))
                .collect(),
        )
    }

    #[must_use]
    pub fn optional_number(value: Option<f64>) -> Self {
        value.map_or(Self::Null, Self::Number)
    }

    #[must_use]
    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Record(_) | Self::Table(_))
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "text",
            Self::List(_) => "list",
            Self::Record(_) => "record",
            Self::Table(_) => "table",
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[StateValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::List(items) => Some(items.len()),
            Self::Record(entries) | Self::Table(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// Converts a JSON document; objects become records.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(flag) => Self::Bool(flag),
            serde_json::Value::Number(number) => {
                number.as_f64().map_or(Self::Null, Self::Number)
            }
            serde_json::Value::String(text) => Self::Text(text),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Self::Record(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Builds a value from any serializable type.
    pub fn from_serialize<T: Serialize>(value: &T) -> crate::error::ViewerResult<Self> {
        Ok(Self::from_json(serde_json::to_value(value)?))
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Vec<StateValue>> for StateValue {
    fn from(value: Vec<StateValue>) -> Self {
        Self::List(value)
    }
}
