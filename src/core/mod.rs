pub mod channel_state;
pub mod data_state;
pub mod group;
pub mod scale;
pub mod time_window;
pub mod types;

pub use channel_state::{AxisMetaField, ChannelField, ChannelRow, ChannelState, KindChannels};
pub use data_state::DataState;
pub use scale::LinearScale;
pub use time_window::{TimeWindow, resolve_time_window};
pub use types::{ChannelKey, ChannelKind, validate_hex_color};
