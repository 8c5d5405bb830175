//! Chart reconciliation engine.
//!
//! [`Reconciler`] subscribes to a [`crate::reactive::ChannelStore`] and turns
//! every change into the cheapest chart mutation that keeps the charts
//! consistent with the state: attribute patch, scale patch, data replacement,
//! group merge, or full rebuild. Charts are tracked in a [`ChartRegistry`]
//! with a channel-to-chart reverse index.

mod attribute_patch;
mod change;
mod channel_update;
mod chart_builder;
mod data_patch;
mod engine_config;
mod group_merge;
mod rebuild;
mod reconciler;
mod redraw;
mod registry;
mod scale_patch;
mod scheduler;
mod stroke_cache;

pub use change::{EngineChange, classify, handled_by_property, property_names};
pub use channel_update::{ChannelUpdate, UpdateStage, handle_channel_update};
pub use chart_builder::{
    ChartBlueprint, blueprint, chart_data, container_id, display_samples, member_window,
};
pub use engine_config::ViewerConfig;
pub use group_merge::group_scope;
pub use reconciler::{
    EngineTask, ReconcileFailure, ReconcileStats, Reconciler, ReconcilerHandle, SeriesSnapshot,
};
pub use redraw::{RedrawLevel, RedrawQueue};
pub use registry::{ChartEntry, ChartMeta, ChartRegistry, InstanceId, Membership};
pub use scheduler::{Scheduler, TaskQueue};
pub use stroke_cache::{StrokeCache, StrokeCacheStats};
