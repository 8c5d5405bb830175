use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ViewerError, ViewerResult};

/// Channel families tracked by the channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Analog,
    Digital,
    Computed,
}

impl ChannelKind {
    pub const ALL: [Self; 3] = [Self::Analog, Self::Digital, Self::Computed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analog => "analog",
            Self::Digital => "digital",
            Self::Computed => "computed",
        }
    }

    /// Prefix used for per-sample scope variables (`a0`, `d3`, ...).
    #[must_use]
    pub const fn scope_prefix(self) -> &'static str {
        match self {
            Self::Analog => "a",
            Self::Digital => "d",
            Self::Computed => "c",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = ViewerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "analog" => Ok(Self::Analog),
            "digital" => Ok(Self::Digital),
            "computed" => Ok(Self::Computed),
            other => Err(ViewerError::InvalidData(format!(
                "unknown channel kind `{other}`"
            ))),
        }
    }
}

/// Reverse-index key of one channel position, rendered as `"{kind}-{position}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelKey {
    pub kind: ChannelKind,
    pub position: usize,
}

impl ChannelKey {
    #[must_use]
    pub const fn new(kind: ChannelKind, position: usize) -> Self {
        Self { kind, position }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.position)
    }
}

impl FromStr for ChannelKey {
    type Err = ViewerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (kind, position) = value.rsplit_once('-').ok_or_else(|| {
            ViewerError::InvalidData(format!("channel key `{value}` must be `kind-position`"))
        })?;
        let position = position.parse::<usize>().map_err(|e| {
            ViewerError::InvalidData(format!("channel key `{value}` has invalid position: {e}"))
        })?;
        Ok(Self::new(kind.parse()?, position))
    }
}

/// Validates `#rgb` / `#rrggbb` / `#rrggbbaa` color strings.
pub fn validate_hex_color(color: &str) -> ViewerResult<()> {
    let Some(digits) = color.strip_prefix('#') else {
        return Err(ViewerError::InvalidData(format!(
            "color `{color}` must start with `#`"
        )));
    };
    if !matches!(digits.len(), 3 | 6 | 8) || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ViewerError::InvalidData(format!(
            "color `{color}` must be #rgb, #rrggbb or #rrggbbaa"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ChannelKey, ChannelKind, validate_hex_color};

    #[test]
    fn channel_key_display_and_parse_agree() {
        let key = ChannelKey::new(ChannelKind::Digital, 12);
        assert_eq!(key.to_string(), "digital-12");
        assert_eq!("digital-12".parse::<ChannelKey>().expect("parse"), key);
        assert!("analog".parse::<ChannelKey>().is_err());
        assert!("bogus-1".parse::<ChannelKey>().is_err());
    }

    #[test]
    fn hex_color_validation() {
        assert!(validate_hex_color("#abcdef").is_ok());
        assert!(validate_hex_color("#abc").is_ok());
        assert!(validate_hex_color("abcdef").is_err());
        assert!(validate_hex_color("#abcd").is_err());
        assert!(validate_hex_color("#ggg").is_err());
    }
}
