//! EdgeKV: a two-tier key/value configuration store.
//!
//! An [`node::EdgeNode`] holds the authoritative copy of its own
//! configuration locally and publishes every change as a structural
//! [`differ`] changelog over a [`bus::Bus`]; a [`node::CenterNode`] ingests
//! every edge's changelog into a namespaced [`store::Store`] and can write
//! back, completing the loop. [`accessor::Accessor`] gives typed scalar
//! access over either side's raw [`edgekv_proto::Value`] documents, and
//! [`bind`] layers a remote read-through protocol on top for values a
//! center never wants to mirror at all.

pub mod accessor;
pub mod bind;
pub mod bus;
pub mod differ;
pub mod dispatcher;
pub mod error;
pub mod keypath;
pub mod node;
pub mod store;

pub use accessor::{Accessor, Getter};
pub use bind::{BindHandler, BindMethod, BindSessions, PendingBindRequests};
pub use bus::{Bus, BusRegistry, BusUrlOptions, Handler as BusHandler};
pub use differ::{diff, patch};
pub use dispatcher::{Dispatcher, SubId, WatchEvent};
pub use error::{EdgeKvError, Result};
pub use node::{CenterNode, EdgeNode};
pub use store::{CenterStore, NamespacedStore, Store, StoreRegistry};

pub use edgekv_proto::{Change, ChangeKind, Changelog, Command, EdgeId, Message, Value};
