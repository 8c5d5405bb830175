//! comtrade-view: reactive channel state and incremental chart reconciliation
//! for COMTRADE waveform viewers.
//!
//! Channel edits land in a [`reactive::ChannelStore`]; the [`api::Reconciler`]
//! turns each change into the cheapest chart mutation against a host-provided
//! [`render::ChartFactory`]. Computed channels are evaluated by the
//! [`expression`] engine and persisted by [`computed::ComputedChannelStore`];
//! [`interaction::CursorCore`] owns the vertical cursors and delta table.

pub mod api;
pub mod computed;
pub mod core;
pub mod error;
pub mod expression;
pub mod extensions;
pub mod interaction;
pub mod planner;
pub mod reactive;
pub mod render;
pub mod telemetry;

pub use api::{Reconciler, ReconcilerHandle, ViewerConfig};
pub use error::{ViewerError, ViewerResult};
