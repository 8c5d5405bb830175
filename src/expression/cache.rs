use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use crate::error::ViewerResult;

use super::compiled::CompiledExpression;

/// Runtime metrics exposed by the compiled-expression cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpressionCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub capacity: usize,
}

/// Compiles expressions, memoized by exact source string with LRU eviction.
#[derive(Debug)]
pub struct ExpressionEngine {
    entries: IndexMap<String, Rc<CompiledExpression>>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl ExpressionEngine {
    pub const DEFAULT_CAPACITY: usize = 256;

    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    /// Returns the cached compilation or compiles and caches it. Errors are not cached.
    pub fn compile(&mut self, source: &str) -> ViewerResult<Rc<CompiledExpression>> {
        if let Some(index) = self.entries.get_index_of(source) {
            self.hits = self.hits.saturating_add(1);
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
            if let Some((_, compiled)) = self.entries.get_index(last) {
                return Ok(Rc::clone(compiled));
            }
        }

        self.misses = self.misses.saturating_add(1);
        let compiled = Rc::new(CompiledExpression::compile(source)?);
        if self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.shift_remove_index(0) {
                trace!(expression = %evicted, "evicted least recently used expression");
            }
        }
        self.entries
            .insert(source.to_owned(), Rc::clone(&compiled));
        Ok(compiled)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn contains(&self, source: &str) -> bool {
        self.entries.contains_key(source)
    }

    #[must_use]
    pub fn stats(&self) -> ExpressionCacheStats {
        ExpressionCacheStats {
            hits: self.hits,
            misses: self.misses,
            size: self.entries.len(),
            capacity: self.capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::ExpressionEngine;

    #[test]
    fn repeated_compiles_share_one_instance() {
        let mut engine = ExpressionEngine::default();
        let first = engine.compile("a0 + 1").expect("compile");
        let second = engine.compile("a0 + 1").expect("compile");
        assert!(Rc::ptr_eq(&first, &second));
        let stats = engine.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (1, 1, 1));
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let mut engine = ExpressionEngine::new(2);
        engine.compile("a0").expect("a0");
        engine.compile("a1").expect("a1");
        engine.compile("a0").expect("touch a0");
        engine.compile("a2").expect("a2");
        assert!(engine.contains("a0"));
        assert!(!engine.contains("a1"));
        assert!(engine.contains("a2"));
    }

    #[test]
    fn failures_are_not_cached_and_clear_empties() {
        let mut engine = ExpressionEngine::default();
        assert!(engine.compile("a0 +").is_err());
        assert_eq!(engine.stats().size, 0);
        engine.compile("a0").expect("compile");
        engine.clear();
        assert_eq!(engine.stats().size, 0);
    }
}
