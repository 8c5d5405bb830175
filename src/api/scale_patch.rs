use tracing::{debug, warn};

use crate::core::{ChannelKey, ChannelKind, TimeWindow, resolve_time_window};
use crate::error::ViewerResult;

use super::chart_builder::member_window;
use super::{EngineTask, InstanceId, RedrawLevel, Reconciler};

impl Reconciler {
    fn channel_window(&self, key: ChannelKey) -> ViewerResult<TimeWindow> {
        let state = self.store.state();
        let data = self.store.data();
        let channels = state.kind(key.kind);
        let start = channels.starts.get(key.position).copied().flatten();
        let duration = channels.durations.get(key.position).copied().flatten();
        resolve_time_window(start, duration, data.time().unwrap_or_default())
    }

    /// Sets the x range of one chart inside a batch.
    fn set_window(&mut self, instance: InstanceId, window: TimeWindow) -> bool {
        let patched = self.patch_or_recreate(instance, "set_scale", |entry| {
            let surface = entry.surface_mut();
            surface.begin_batch();
            let applied = surface.set_scale("x", window.min, window.max);
            let closed = surface.end_batch();
            applied.and(closed)
        });
        if patched {
            self.stats.scale_patches += 1;
            self.request_redraw(instance, RedrawLevel::Light);
        }
        patched
    }

    pub(super) fn apply_window(&mut self, kind: ChannelKind, index: Option<usize>) {
        match index {
            Some(position) => {
                let key = ChannelKey::new(kind, position);
                if self.apply_channel_window(key) {
                    self.scheduler
                        .debounce(EngineTask::ScaleRetry(key), self.config.scale_retry());
                }
            }
            None => {
                for (instance, members) in self.members_of_kind(kind) {
                    let keys: Vec<ChannelKey> = members.into_iter().map(|(_, key)| key).collect();
                    let window = {
                        let state = self.store.state();
                        let data = self.store.data();
                        member_window(&keys, &state, &data)
                    };
                    match window {
                        Some(window) => {
                            self.set_window(instance, window);
                        }
                        None => debug!(%instance, "no member window to apply"),
                    }
                }
            }
        }
    }

    /// Returns `true` when at least one chart took the new window.
    fn apply_channel_window(&mut self, key: ChannelKey) -> bool {
        let window = match self.channel_window(key) {
            Ok(window) => window,
            Err(err) => {
                warn!(error = %err, channel = %key, "window not resolved; skipping");
                return false;
            }
        };
        let mut applied = false;
        for instance in self.registry.charts_for(key).to_vec() {
            applied |= self.set_window(instance, window);
        }
        applied
    }

    /// Second application of a channel window, after chart initialisation settled.
    pub(super) fn retry_window(&mut self, key: ChannelKey) {
        debug!(channel = %key, "retrying window");
        self.apply_channel_window(key);
    }
}
