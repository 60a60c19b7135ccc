//! Client-side cache consistency for JSON:API backends.
//!
//! Lifecycle events emitted around each request (`LOAD_*`, `CREATE_*`,
//! `UPDATE_*`, `REMOVE_*`) are fed to a [`SyncEngine`], which decomposes them
//! into derived events for per-schema object and collection stores hosted by a
//! [`CacheLayer`]. Every cached entity and query result carries a [`Status`]
//! telling consumers whether it is valid and whether a request is in flight.

pub mod actions;
pub mod cache;
pub mod config;
pub mod denormalize;
pub mod driver;
pub mod engine;
pub mod error;
pub mod event;
pub mod logging;
pub mod merge;
pub mod query;
pub mod status;

pub use cache::{CacheLayer, Snapshot};
pub use denormalize::Denormalizer;
pub use driver::{DriverHandle, SyncDriver};
pub use engine::{Dispatcher, SyncEngine, DEFAULT_SOURCE};
pub use error::{SyncError, SyncResult};
pub use event::{DerivedEvent, DerivedKind, InboundEvent, LifecycleKind};
pub use query::{QueryKey, WILDCARD_TAG};
pub use status::{should_refresh, BusyStatus, Status, ValidationStatus};
