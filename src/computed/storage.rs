use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{ViewerError, ViewerResult};

pub const COMPUTED_CFG: &str = "COMPUTED_CFG";
pub const COMPUTED_DATA: &str = "COMPUTED_DATA";
pub const COMPUTED_META: &str = "COMPUTED_META";
/// Combined single-array format; read only when the split keys are absent.
pub const COMPUTED_CHANNELS: &str = "COMPUTED_CHANNELS";

/// Durable string storage, as offered by the host (local storage or a file).
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> ViewerResult<()>;

    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: IndexMap<String, String>,
    quota: Option<usize>,
    writes: usize,
}

/// In-process storage with an optional byte quota.
///
/// Clones share the same entries, so a test can keep a handle for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that rejects writes once the total stored bytes would exceed `bytes`.
    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        let storage = Self::default();
        storage.inner.borrow_mut().quota = Some(bytes);
        storage
    }

    pub fn set_quota(&self, bytes: Option<usize>) {
        self.inner.borrow_mut().quota = bytes;
    }

    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.inner
            .borrow()
            .entries
            .iter()
            .map(|(key, value)| key.len() + value.len())
            .sum()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.inner.borrow().entries.keys().cloned().collect()
    }

    #[must_use]
    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.inner.borrow().entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> ViewerResult<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(quota) = inner.quota {
            let others: usize = inner
                .entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, stored)| existing.len() + stored.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > quota {
                return Err(ViewerError::Storage {
                    key: key.to_owned(),
                    message: format!("quota exceeded ({needed} > {quota} bytes)"),
                });
            }
        }
        inner.entries.insert(key.to_owned(), value.to_owned());
        inner.writes += 1;
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.inner.borrow_mut().entries.shift_remove(key);
    }
}
