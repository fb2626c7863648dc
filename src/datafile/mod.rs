//! Data File Module
//!
//! Rolling segments and the synchronous accessors that read them.
//!
//! ## Components
//! ```text
//! ┌──────────────┐  lease   ┌──────────────────┐  handle  ┌────────────┐
//! │ AccessorPool │ ───────▶ │ DataFileAccessor │ ◀─────── │  DataFile  │
//! └──────────────┘          └────────┬─────────┘          └────────────┘
//!                                    │ consults first
//!                                    ▼
//!                           ┌──────────────────┐
//!                           │  InflightWrites  │
//!                           └──────────────────┘
//! ```
//!
//! Segments are named `db-<id>.log` inside the journal directory.

mod accessor;
mod file;
mod pool;
mod set;

pub use accessor::DataFileAccessor;
pub use file::{DataFile, DEFAULT_MAX_OPEN_HANDLES};
pub use pool::{AccessorLease, AccessorPool};
pub use set::DataFileSet;

/// File name prefix of every segment
pub(crate) const FILE_PREFIX: &str = "db-";

/// File name suffix of every segment
pub(crate) const FILE_SUFFIX: &str = ".log";
