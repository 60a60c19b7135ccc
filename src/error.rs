//! Structural errors raised when a lifecycle event breaks the caller contract.
//!
//! These indicate a bug in whatever produced the event. They are never
//! transient and are never retried.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
  #[error("meta is undefined on {kind} event")]
  MissingMeta { kind: String },

  #[error("source is undefined on {kind} event")]
  MissingSource { kind: String },

  #[error("schema is invalid on {kind} event")]
  MissingSchema { kind: String },

  #[error("payload data is invalid on {kind} event, expecting payload.data")]
  MissingPayloadData { kind: String },

  #[error("payload data on {kind} event must be an object or an array")]
  InvalidPayloadShape { kind: String },

  #[error("payload included on {kind} event must be an array")]
  InvalidIncluded { kind: String },

  #[error("invalid argument: {0}")]
  InvalidArgument(&'static str),

  #[error("sync driver has stopped")]
  DriverStopped,
}

pub type SyncResult<T> = Result<T, SyncError>;
