use std::rc::Rc;

use tracing::{trace, warn};

use crate::core::{ChannelKey, ChannelKind};
use crate::error::ViewerError;
use crate::extensions::PluginState;
use crate::render::StrokeFn;

use super::{InstanceId, RedrawLevel, Reconciler};

fn missing_member(key: ChannelKey) -> ViewerError {
    ViewerError::MissingState(format!("chart does not render {key}"))
}

const fn redraw_level(kind: ChannelKind) -> RedrawLevel {
    match kind {
        ChannelKind::Digital => RedrawLevel::Clear,
        _ => RedrawLevel::Light,
    }
}

impl Reconciler {
    /// Charts rendering channels of `kind`, with the local index of each such member.
    pub(super) fn members_of_kind(&self, kind: ChannelKind) -> Vec<(InstanceId, Vec<(usize, ChannelKey)>)> {
        self.registry
            .iter()
            .filter_map(|entry| {
                let members: Vec<(usize, ChannelKey)> = entry
                    .members()
                    .enumerate()
                    .filter(|(_, key)| key.kind == kind)
                    .collect();
                (!members.is_empty()).then(|| (entry.instance(), members))
            })
            .collect()
    }

    pub(super) fn apply_color(&mut self, kind: ChannelKind, index: Option<usize>) {
        match index {
            Some(position) => self.patch_color(ChannelKey::new(kind, position)),
            None => self.patch_kind_colors(kind),
        }
    }

    fn patch_color(&mut self, key: ChannelKey) {
        let color = self
            .store
            .state()
            .kind(key.kind)
            .line_colors
            .get(key.position)
            .cloned();
        let Some(color) = color else {
            warn!(channel = %key, "no color at position; skipping");
            return;
        };
        let (stroke, changed) = self.strokes.stroke_for(key, &color);
        if !changed {
            trace!(channel = %key, "stroke unchanged");
            return;
        }

        let digital = key.kind == ChannelKind::Digital;
        for instance in self.registry.charts_for(key).to_vec() {
            let stroke = Rc::clone(&stroke);
            let patched = self.patch_or_recreate(instance, "set_series_stroke", |entry| {
                let local = entry.local_index(key).ok_or_else(|| missing_member(key))?;
                entry.surface_mut().set_series_stroke(local, stroke)?;
                entry.surface_mut().invalidate_series_path(local);
                entry.set_color(local, &color);
                if digital {
                    let colors = entry.colors().to_vec();
                    entry
                        .surface_mut()
                        .set_plugin_state(PluginState::DigitalFill { colors })?;
                }
                Ok(())
            });
            if patched {
                self.stats.attribute_patches += 1;
                self.request_redraw(instance, redraw_level(key.kind));
            }
        }
    }

    /// Whole-sequence color replacement: every series of the kind, plus the
    /// fill plugin and a clearing redraw for digital charts.
    fn patch_kind_colors(&mut self, kind: ChannelKind) {
        let colors = self.store.state().kind(kind).line_colors.clone();
        for (instance, members) in self.members_of_kind(kind) {
            let mut updates: Vec<(usize, StrokeFn, String)> = Vec::new();
            for (local, key) in members {
                let Some(color) = colors.get(key.position) else {
                    continue;
                };
                let (stroke, changed) = self.strokes.stroke_for(key, color);
                if changed || self.stroke_differs(instance, local, &stroke) {
                    updates.push((local, stroke, color.clone()));
                }
            }
            let digital = kind == ChannelKind::Digital;
            if updates.is_empty() && !digital {
                continue;
            }
            let patched = self.patch_or_recreate(instance, "set_series_stroke", |entry| {
                for (local, stroke, color) in updates {
                    entry.surface_mut().set_series_stroke(local, stroke)?;
                    entry.surface_mut().invalidate_series_path(local);
                    entry.set_color(local, &color);
                }
                if digital {
                    let colors = entry.colors().to_vec();
                    entry
                        .surface_mut()
                        .set_plugin_state(PluginState::DigitalFill { colors })?;
                }
                Ok(())
            });
            if patched {
                self.stats.attribute_patches += 1;
                self.request_redraw(instance, redraw_level(kind));
            }
        }
    }

    fn stroke_differs(&self, instance: InstanceId, local: usize, stroke: &StrokeFn) -> bool {
        self.registry
            .get(instance)
            .and_then(|entry| entry.surface().series_stroke(local))
            .is_none_or(|current| !Rc::ptr_eq(&current, stroke))
    }

    pub(super) fn apply_label(&mut self, kind: ChannelKind, index: Option<usize>) {
        let labels = self.store.state().kind(kind).y_labels.clone();
        let targets: Vec<(InstanceId, Vec<(usize, ChannelKey)>)> = match index {
            Some(position) => {
                let key = ChannelKey::new(kind, position);
                self.registry
                    .charts_for(key)
                    .iter()
                    .filter_map(|&instance| {
                        let local = self.registry.get(instance)?.local_index(key)?;
                        Some((instance, vec![(local, key)]))
                    })
                    .collect()
            }
            None => self.members_of_kind(kind),
        };

        for (instance, members) in targets {
            let patched = self.patch_or_recreate(instance, "set_series_label", |entry| {
                for (local, key) in members {
                    let label = labels.get(key.position).ok_or_else(|| missing_member(key))?;
                    entry.surface_mut().set_series_label(local, label)?;
                }
                Ok(())
            });
            if patched {
                self.stats.attribute_patches += 1;
                self.request_redraw(instance, RedrawLevel::Light);
            }
        }
    }
}
