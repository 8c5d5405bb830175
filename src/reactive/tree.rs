use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{ViewerError, ViewerResult};

use super::{
    ChangeKind, ChangeRecord, Dispatcher, PathSegment, PropertyOptions, StatePath, StateValue,
    SubscriptionId,
};

/// Slot name used when a primitive is passed as root.
pub const BOXED_ROOT_KEY: &str = "value";

struct TreeInner {
    root: RefCell<StateValue>,
    dispatcher: Dispatcher,
}

/// Generic deep reactive container.
///
/// Cloning yields another handle to the same tree. Every mutation synthesizes a
/// [`ChangeRecord`] and fans it out synchronously through the tree dispatcher.
#[derive(Clone)]
pub struct ReactiveTree {
    inner: Rc<TreeInner>,
}

impl std::fmt::Debug for ReactiveTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveTree")
            .field("root", &self.inner.root.borrow().type_name())
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}

impl ReactiveTree {
    /// Wraps an initial value; primitives are boxed under [`BOXED_ROOT_KEY`].
    #[must_use]
    pub fn new(initial: StateValue) -> Self {
        let root = if initial.is_container() {
            initial
        } else {
            let mut boxed = IndexMap::new();
            boxed.insert(BOXED_ROOT_KEY.to_owned(), initial);
            StateValue::Record(boxed)
        };
        Self {
            inner: Rc::new(TreeInner {
                root: RefCell::new(root),
                dispatcher: Dispatcher::new(),
            }),
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn subscribe(
        &self,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.subscribe(callback)
    }

    pub fn subscribe_path(
        &self,
        path: StatePath,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.inner.dispatcher.subscribe_path(path, callback)
    }

    pub fn subscribe_property(
        &self,
        name: impl Into<String>,
        options: PropertyOptions,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.inner
            .dispatcher
            .subscribe_property(name, options, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.dispatcher.unsubscribe(id)
    }

    /// Clones the member at `path`.
    #[must_use]
    pub fn get(&self, path: &StatePath) -> Option<StateValue> {
        let root = self.inner.root.borrow();
        resolve(&root, path.segments()).cloned()
    }

    /// Clones the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> StateValue {
        self.inner.root.borrow().clone()
    }

    /// Shallow snapshot of a sequence root.
    pub fn as_array(&self) -> ViewerResult<Vec<StateValue>> {
        match &*self.inner.root.borrow() {
            StateValue::List(items) => Ok(items.clone()),
            other => Err(ViewerError::InvalidData(format!(
                "as_array requires a list root, found {}",
                other.type_name()
            ))),
        }
    }

    /// Numeric view of a list member; non-numeric entries are skipped.
    #[must_use]
    pub fn numbers_at(&self, path: &StatePath) -> Vec<f64> {
        let root = self.inner.root.borrow();
        resolve(&root, path.segments())
            .and_then(StateValue::as_list)
            .map(|items| items.iter().filter_map(StateValue::as_f64).collect())
            .unwrap_or_default()
    }

    /// Assigns a record member. Assigning a list is reported as an array replacement.
    pub fn set(&self, path: &StatePath, value: StateValue) -> ViewerResult<()> {
        let Some((last, parent_path)) = path.segments().split_last() else {
            return self.replace_root(value);
        };
        if let PathSegment::Index(index) = last {
            return self.set_index(&StatePath::from_segments(parent_path.iter().cloned()), *index, value);
        }
        let kind = if value.is_list() {
            ChangeKind::ArrayReplace
        } else {
            ChangeKind::Set
        };
        let old = {
            let mut root = self.inner.root.borrow_mut();
            let parent = resolve_mut(&mut root, parent_path)?;
            let key = last.as_key().unwrap_or_default().to_owned();
            match parent {
                StateValue::Record(entries) | StateValue::Table(entries) => {
                    entries.insert(key, value.clone())
                }
                other => {
                    return Err(ViewerError::InvalidData(format!(
                        "cannot assign key on {} at `{path}`",
                        other.type_name()
                    )));
                }
            }
        };
        self.inner
            .dispatcher
            .emit(ChangeRecord::new(path.clone(), kind, old, Some(value)));
        Ok(())
    }

    /// Replaces one element of the list at `list_path`.
    pub fn set_index(
        &self,
        list_path: &StatePath,
        index: usize,
        value: StateValue,
    ) -> ViewerResult<()> {
        let old = {
            let mut root = self.inner.root.borrow_mut();
            let items = list_mut(&mut root, list_path)?;
            let len = items.len();
            let slot = items.get_mut(index).ok_or_else(|| {
                ViewerError::MissingState(format!(
                    "index {index} out of bounds for `{list_path}` (len {len})"
                ))
            })?;
            std::mem::replace(slot, value.clone())
        };
        self.inner.dispatcher.emit(ChangeRecord::new(
            list_path.child(index),
            ChangeKind::ElementSet,
            Some(old),
            Some(value),
        ));
        Ok(())
    }

    /// Replaces the whole list at `list_path`.
    pub fn replace_list(&self, list_path: &StatePath, items: Vec<StateValue>) -> ViewerResult<()> {
        let new_value = StateValue::List(items);
        let old = {
            let mut root = self.inner.root.borrow_mut();
            let target = resolve_mut(&mut root, list_path.segments())?;
            std::mem::replace(target, new_value.clone())
        };
        self.inner.dispatcher.emit(ChangeRecord::new(
            list_path.clone(),
            ChangeKind::ArrayReplace,
            Some(old),
            Some(new_value),
        ));
        Ok(())
    }

    /// Appends to the list at `list_path`; returns the new element index.
    pub fn push(&self, list_path: &StatePath, value: StateValue) -> ViewerResult<usize> {
        let index = {
            let mut root = self.inner.root.borrow_mut();
            let items = list_mut(&mut root, list_path)?;
            items.push(value.clone());
            items.len() - 1
        };
        self.inner.dispatcher.emit(ChangeRecord::new(
            list_path.child(index),
            ChangeKind::Insert,
            None,
            Some(value),
        ));
        Ok(index)
    }

    /// Removes an element; later elements shift down by one.
    pub fn remove_index(&self, list_path: &StatePath, index: usize) -> ViewerResult<StateValue> {
        let removed = {
            let mut root = self.inner.root.borrow_mut();
            let items = list_mut(&mut root, list_path)?;
            if index >= items.len() {
                return Err(ViewerError::MissingState(format!(
                    "index {index} out of bounds for `{list_path}` (len {})",
                    items.len()
                )));
            }
            items.remove(index)
        };
        self.inner.dispatcher.emit(ChangeRecord::new(
            list_path.child(index),
            ChangeKind::Remove,
            Some(removed.clone()),
            None,
        ));
        Ok(removed)
    }

    /// Inserts or overwrites a keyed-table entry.
    pub fn table_insert(
        &self,
        table_path: &StatePath,
        key: impl Into<String>,
        value: StateValue,
    ) -> ViewerResult<()> {
        let key = key.into();
        let old = {
            let mut root = self.inner.root.borrow_mut();
            table_mut(&mut root, table_path)?.insert(key.clone(), value.clone())
        };
        self.inner.dispatcher.emit(ChangeRecord::new(
            table_path.child(key),
            ChangeKind::TableSet,
            old,
            Some(value),
        ));
        Ok(())
    }

    /// Deletes a keyed-table entry. Returns `false` (and emits nothing) when absent.
    pub fn table_remove(&self, table_path: &StatePath, key: &str) -> ViewerResult<bool> {
        let old = {
            let mut root = self.inner.root.borrow_mut();
            table_mut(&mut root, table_path)?.shift_remove(key)
        };
        let Some(old) = old else {
            return Ok(false);
        };
        self.inner.dispatcher.emit(ChangeRecord::new(
            table_path.child(key),
            ChangeKind::TableDelete,
            Some(old),
            None,
        ));
        Ok(true)
    }

    /// Clears a keyed table, emitting one delete per previously present key.
    pub fn table_clear(&self, table_path: &StatePath) -> ViewerResult<usize> {
        let removed = {
            let mut root = self.inner.root.borrow_mut();
            std::mem::take(table_mut(&mut root, table_path)?)
        };
        let count = removed.len();
        self.inner
            .dispatcher
            .emit_all(removed.into_iter().map(|(key, old)| {
                ChangeRecord::new(table_path.child(key), ChangeKind::TableDelete, Some(old), None)
            }));
        Ok(count)
    }

    fn replace_root(&self, value: StateValue) -> ViewerResult<()> {
        if !value.is_container() {
            return self.set(&StatePath::root().child(BOXED_ROOT_KEY), value);
        }
        let kind = if value.is_list() {
            ChangeKind::ArrayReplace
        } else {
            ChangeKind::Set
        };
        let old = std::mem::replace(&mut *self.inner.root.borrow_mut(), value.clone());
        self.inner.dispatcher.emit(ChangeRecord::new(
            StatePath::root(),
            kind,
            Some(old),
            Some(value),
        ));
        Ok(())
    }
}

fn resolve<'a>(value: &'a StateValue, segments: &[PathSegment]) -> Option<&'a StateValue> {
    segments.iter().try_fold(value, |current, segment| match (current, segment) {
        (StateValue::Record(entries) | StateValue::Table(entries), PathSegment::Key(key)) => {
            entries.get(key)
        }
        (StateValue::List(items), PathSegment::Index(index)) => items.get(*index),
        _ => None,
    })
}

fn resolve_mut<'a>(
    value: &'a mut StateValue,
    segments: &[PathSegment],
) -> ViewerResult<&'a mut StateValue> {
    let mut current = value;
    for segment in segments {
        current = match (current, segment) {
            (StateValue::Record(entries) | StateValue::Table(entries), PathSegment::Key(key)) => {
                entries.get_mut(key)
            }
            (StateValue::List(items), PathSegment::Index(index)) => items.get_mut(*index),
            _ => None,
        }
        .ok_or_else(|| ViewerError::MissingState(format!("no member at segment `{segment}`")))?;
    }
    Ok(current)
}

fn list_mut<'a>(
    root: &'a mut StateValue,
    path: &StatePath,
) -> ViewerResult<&'a mut Vec<StateValue>> {
    match resolve_mut(root, path.segments())? {
        StateValue::List(items) => Ok(items),
        other => Err(ViewerError::InvalidData(format!(
            "`{path}` is a {}, not a list",
            other.type_name()
        ))),
    }
}

fn table_mut<'a>(
    root: &'a mut StateValue,
    path: &StatePath,
) -> ViewerResult<&'a mut IndexMap<String, StateValue>> {
    match resolve_mut(root, path.segments())? {
        StateValue::Table(entries) => Ok(entries),
        other => Err(ViewerError::InvalidData(format!(
            "`{path}` is a {}, not a keyed table",
            other.type_name()
        ))),
    }
}
