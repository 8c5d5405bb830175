use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::{ViewerError, ViewerResult};
use crate::telemetry::time_callback;

use super::{ChangeKind, ChangeRecord, StatePath};

pub type SubscriberFn = dyn FnMut(&ChangeRecord) -> ViewerResult<()>;

const DEFAULT_SLOW_CALLBACK: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Options for leaf-property subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyOptions {
    /// Also match any change whose path passes through the property.
    pub descendants: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Matcher {
    All,
    Path(StatePath),
    Property { name: String, descendants: bool },
}

impl Matcher {
    fn matches(&self, record: &ChangeRecord) -> bool {
        match self {
            Self::All => true,
            Self::Path(path) => &record.path == path,
            Self::Property { name, descendants } => {
                if *descendants && record.path.contains_key(name) {
                    return true;
                }
                match record.kind {
                    ChangeKind::ElementSet
                    | ChangeKind::Insert
                    | ChangeKind::Remove
                    | ChangeKind::TableSet
                    | ChangeKind::TableDelete => record
                        .path
                        .from_end(2)
                        .is_some_and(|segment| segment.is_key(name)),
                    ChangeKind::ArrayReplace | ChangeKind::Set => {
                        record.path.last().is_some_and(|segment| segment.is_key(name))
                            && record
                                .new_value
                                .as_ref()
                                .is_some_and(super::StateValue::is_list)
                    }
                }
            }
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    matcher: Matcher,
    callback: Rc<RefCell<Box<SubscriberFn>>>,
}

/// Subscriber failure captured during fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchFailure {
    pub subscription: SubscriptionId,
    pub path: StatePath,
    pub error: ViewerError,
}

/// Registry and synchronous fan-out of change records.
///
/// Mutations emitted while a dispatch is running are queued and delivered
/// after the current record has reached every subscriber, in FIFO order.
pub struct Dispatcher {
    subscribers: RefCell<Vec<Subscriber>>,
    pending: RefCell<VecDeque<ChangeRecord>>,
    dispatching: Cell<bool>,
    next_id: Cell<u64>,
    failures: RefCell<Vec<DispatchFailure>>,
    slow_callback: Cell<Duration>,
    delivered: Cell<u64>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("subscribers", &self.subscribers.borrow().len())
            .field("pending", &self.pending.borrow().len())
            .field("dispatching", &self.dispatching.get())
            .finish()
    }
}

struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Dispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            pending: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
            next_id: Cell::new(1),
            failures: RefCell::new(Vec::new()),
            slow_callback: Cell::new(DEFAULT_SLOW_CALLBACK),
            delivered: Cell::new(0),
        }
    }

    pub fn set_slow_callback_threshold(&self, threshold: Duration) {
        self.slow_callback.set(threshold);
    }

    /// Subscribes to every change.
    pub fn subscribe(
        &self,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.register(Matcher::All, Box::new(callback))
    }

    /// Subscribes to changes whose path equals `path` exactly.
    pub fn subscribe_path(
        &self,
        path: StatePath,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.register(Matcher::Path(path), Box::new(callback))
    }

    /// Subscribes by leaf property name anywhere in the tree.
    ///
    /// Element-shaped changes match when the owning sequence is named `name`;
    /// whole replacements match when the replaced member is named `name`.
    pub fn subscribe_property(
        &self,
        name: impl Into<String>,
        options: PropertyOptions,
        callback: impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static,
    ) -> SubscriptionId {
        self.register(
            Matcher::Property {
                name: name.into(),
                descendants: options.descendants,
            },
            Box::new(callback),
        )
    }

    fn register(&self, matcher: Matcher, callback: Box<SubscriberFn>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.subscribers.borrow_mut().push(Subscriber {
            id,
            matcher,
            callback: Rc::new(RefCell::new(callback)),
        });
        id
    }

    /// Removes a subscription. Returns `true` when it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let before = subscribers.len();
        subscribers.retain(|entry| entry.id != id);
        before != subscribers.len()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    #[must_use]
    pub fn is_dispatching(&self) -> bool {
        self.dispatching.get()
    }

    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.get()
    }

    /// Drains subscriber failures collected since the last call.
    pub fn take_failures(&self) -> Vec<DispatchFailure> {
        std::mem::take(&mut *self.failures.borrow_mut())
    }

    pub fn emit(&self, record: ChangeRecord) {
        self.pending.borrow_mut().push_back(record);
        if self.dispatching.get() {
            trace!("queued nested change until current dispatch completes");
            return;
        }

        self.dispatching.set(true);
        let _guard = DispatchGuard(&self.dispatching);
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(record) = next else {
                break;
            };
            self.deliver(&record);
        }
    }

    pub fn emit_all(&self, records: impl IntoIterator<Item = ChangeRecord>) {
        for record in records {
            self.emit(record);
        }
    }

    fn deliver(&self, record: &ChangeRecord) {
        let targets = self
            .subscribers
            .borrow()
            .iter()
            .filter(|entry| entry.matcher.matches(record))
            .map(|entry| (entry.id, Rc::clone(&entry.callback)))
            .collect::<Vec<_>>();

        for (id, callback) in targets {
            if !self.is_subscribed(id) {
                continue;
            }
            let result = match callback.try_borrow_mut() {
                Ok(mut callback) => time_callback(
                    "reactive subscriber",
                    self.slow_callback.get(),
                    || (&mut **callback)(record),
                ),
                Err(_) => Err(ViewerError::Reentrant("subscriber callback")),
            };
            self.delivered.set(self.delivered.get().saturating_add(1));
            if let Err(error) = result {
                warn!(
                    subscription = id.raw(),
                    path = %record.path,
                    error = %error,
                    "subscriber failed; continuing delivery"
                );
                self.failures.borrow_mut().push(DispatchFailure {
                    subscription: id,
                    path: record.path.clone(),
                    error,
                });
            }
        }
    }

    fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers.borrow().iter().any(|entry| entry.id == id)
    }
}
