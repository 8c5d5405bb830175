//! Computed channels: persistence, cross-window broadcast, and the
//! evaluate-then-save pipeline.

mod bus;
mod model;
mod pipeline;
mod storage;
mod store;

pub use bus::{BusMessage, BusPeer, MessageBus, RecordingPeer};
pub use model::{
    ComputedChannel, ComputedChannelMeta, ComputedSave, LegacyComputedRecord, STRUCTURE_VERSION,
    SavedChannel, StoredMeta,
};
pub use pipeline::{ComputeRequest, ComputedPipeline};
pub use storage::{
    COMPUTED_CFG, COMPUTED_CHANNELS, COMPUTED_DATA, COMPUTED_META, KeyValueStorage, MemoryStorage,
};
pub use store::{COMPUTED_PALETTE, ComputedChannelStore, PersistOutcome, palette_color};
