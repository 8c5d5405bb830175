use std::collections::HashMap;
use std::rc::Rc;

use crate::core::ChannelKey;
use crate::render::StrokeFn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrokeCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

/// Per-channel stroke closures.
///
/// A channel keeps the same closure across redraws until its color changes.
#[derive(Default)]
pub struct StrokeCache {
    entries: HashMap<ChannelKey, (String, StrokeFn)>,
    hits: u64,
    misses: u64,
}

impl std::fmt::Debug for StrokeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrokeCache")
            .field("size", &self.entries.len())
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish()
    }
}

impl StrokeCache {
    /// Returns the closure for `key` painting `color`, and whether it was replaced.
    pub fn stroke_for(&mut self, key: ChannelKey, color: &str) -> (StrokeFn, bool) {
        if let Some((cached, stroke)) = self.entries.get(&key) {
            if cached == color {
                self.hits += 1;
                return (Rc::clone(stroke), false);
            }
        }
        self.misses += 1;
        let owned = color.to_owned();
        let captured = owned.clone();
        let stroke: StrokeFn = Rc::new(move || captured.clone());
        self.entries.insert(key, (owned, Rc::clone(&stroke)));
        (stroke, true)
    }

    #[must_use]
    pub fn get(&self, key: ChannelKey) -> Option<StrokeFn> {
        self.entries.get(&key).map(|(_, stroke)| Rc::clone(stroke))
    }

    /// Drops entries whose position no longer exists.
    pub fn retain(&mut self, keep: impl Fn(ChannelKey) -> bool) {
        self.entries.retain(|key, _| keep(*key));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> StrokeCacheStats {
        StrokeCacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
        }
    }
}
