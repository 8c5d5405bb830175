//! Chart overlay plugin state and host-side plugin hooks.

pub mod plugins;

pub use plugins::{ChartPlugin, PluginEvent, PluginRegistry, PluginState};
