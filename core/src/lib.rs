//! ServiceDesk core: the case board of a vehicle repair workshop.
//!
//! - [`store`]: durable snapshot storage (SQLite primary, legacy key/value
//!   file, one-time migration)
//! - [`repository`]: in-memory source of truth with async persistence and
//!   storage-full reporting
//! - [`archive`]: background recompression of photos on long-closed cases
//! - [`query`]: filtering, board columns and header stats

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod archive;
pub mod clock;
pub mod codec;
pub mod config;
pub mod errors;
pub mod model;
pub mod query;
pub mod repository;
pub mod schema;
pub mod store;

/// Upper bound on photos attached to one case.
pub const MAX_PHOTOS_PER_CASE: usize = 25;

/// Days a case must stay closed before its photos are archived.
pub const ARCHIVE_AFTER_DAYS: i64 = 15;

pub use archive::SweepReport;
pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{CodecError, CompressionProfile, ImageCodec};
pub use config::ServiceDeskConfig;
pub use errors::{FailureKind, RepositoryError, StoreError};
pub use model::{
    Case, CaseNote, CasePhoto, CaseStage, CaseUpdate, InsuranceStatus, NewCase, PartsStatus,
    Priority,
};
pub use query::{Board, BoardStats, CaseFilter, build_board, filter_cases};
pub use repository::{
    BoardSnapshot, PhotoBatchReport, Repository, RepositorySettings, StorageFullEvent,
};
pub use store::{CaseStore, DurableStore};
