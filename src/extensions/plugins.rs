use serde::{Deserialize, Serialize};

use crate::api::InstanceId;
use crate::error::{ViewerError, ViewerResult};

/// Overlay state pushed into chart-side plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "plugin", rename_all = "snake_case")]
pub enum PluginState {
    /// Fill colors of digital channels, by local series index.
    DigitalFill { colors: Vec<String> },
    /// Cursor x positions in insertion order.
    VerticalLines { lines: Vec<f64> },
}

impl PluginState {
    #[must_use]
    pub const fn id(&self) -> &'static str {
        match self {
            Self::DigitalFill { .. } => "digital_fill",
            Self::VerticalLines { .. } => "vertical_lines",
        }
    }
}

/// Engine events observable by host plugins.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PluginEvent {
    ChartCreated { instance: InstanceId, group_id: String },
    ChartDestroyed { instance: InstanceId },
    Rebuilt { charts: usize },
    RedrawFlushed { charts: usize },
    CursorsChanged { lines: Vec<f64> },
    DeltasPublished { rows: usize },
}

/// Extension hook interface for host-side observers.
///
/// Plugins observe engine events without access to chart internals.
pub trait ChartPlugin {
    fn id(&self) -> &str;
    fn on_event(&mut self, event: &PluginEvent);
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn ChartPlugin>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|plugin| plugin.id()))
            .finish()
    }
}

impl PluginRegistry {
    /// Registers a plugin with unique identifier.
    pub fn register(&mut self, plugin: Box<dyn ChartPlugin>) -> ViewerResult<()> {
        let plugin_id = plugin.id().to_owned();
        if plugin_id.is_empty() {
            return Err(ViewerError::InvalidData(
                "plugin id must not be empty".to_owned(),
            ));
        }
        if self.has(&plugin_id) {
            return Err(ViewerError::InvalidData(format!(
                "plugin with id `{plugin_id}` is already registered"
            )));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Unregisters a plugin by id. Returns `true` when removed.
    pub fn unregister(&mut self, plugin_id: &str) -> bool {
        if let Some(position) = self.plugins.iter().position(|entry| entry.id() == plugin_id) {
            self.plugins.remove(position);
            return true;
        }
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    #[must_use]
    pub fn has(&self, plugin_id: &str) -> bool {
        self.plugins.iter().any(|plugin| plugin.id() == plugin_id)
    }

    pub fn dispatch(&mut self, event: &PluginEvent) {
        for plugin in &mut self.plugins {
            plugin.on_event(event);
        }
    }
}
