//! Reactive state containers.
//!
//! Two containers share one change model: [`ReactiveTree`] wraps arbitrary
//! nested values, [`ChannelStore`] is the typed channel/data state used by the
//! reconciliation engine. Both fan changes out through a [`Dispatcher`].

mod channel_store;
mod dispatcher;
mod path;
mod tree;
mod value;

pub use channel_store::{ChannelStore, DATA_KEY, TIME_KEY, data_path, field_path};
pub use dispatcher::{
    DispatchFailure, Dispatcher, PropertyOptions, SubscriberFn, SubscriptionId,
};
pub use path::{ChangeKind, ChangeRecord, PathSegment, StatePath};
pub use tree::{BOXED_ROOT_KEY, ReactiveTree};
pub use value::StateValue;
