//! # medidup-core
//!
//! Core library for medidup, a media archive deduplication and tidying
//! engine. Given one or more directory trees of photos, videos, and audio
//! captured by cameras and phones, it detects duplicate and near-duplicate
//! items and can consolidate survivors into an output tree laid out by
//! shooting date.
//!
//! ## Architecture
//!
//! - **meta** - invokes the external metadata extractor, decodes its JSON
//!   output into `MetaRecord`s
//! - **medium** - the per-file object: lazily computed fingerprints, the
//!   shooting-time resolution chain, the `MediaKind` category tag
//! - **index** - the media-by-size index; the sole gateway for equivalence
//!   queries and the directory walk
//! - **cascade** - the layered equivalence decision procedure
//! - **dedup** - the duplicate-set finder: grouping, keeper selection, the
//!   commented removal script
//! - **placement** - the tidy target-path planner and collision resolution
//! - **pool** - bounded parallelism across independent size buckets
//! - **fsops** - copy-preserving-mtime and move-or-copy-then-remove
//! - **snapshot** - the optional, advisory `.index.json` snapshot
//!
//! ## Core philosophy
//!
//! - **Originals are never mutated** by the dedup side; `tidy` only ever
//!   copies (or, with `-m`, moves) into the output root.
//! - **No persisted index format** beyond an optional advisory JSON
//!   snapshot; every run re-walks its inputs.
//! - **Deterministic answers** under parallel execution: a size bucket is
//!   always scanned single-threaded and in a fixed pair order.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod cascade;
pub mod dedup;
pub mod filename_time;
pub mod fsops;
pub mod index;
pub mod medium;
pub mod meta;
pub mod placement;
pub mod pool;
pub mod snapshot;

pub use dedup::{find_duplicates, DuplicateClass, FinderOptions};
pub use index::Index;
pub use medium::{MediaKind, Medium};
pub use meta::{persist_exif_cache, MetaRecord};
pub use placement::{plan_placement, PlacementOutcome, PlanOptions};
pub use pool::CancellationToken;
pub use snapshot::{write_index_snapshot, write_index_snapshot_for_root, IndexSnapshot};

/// Standard result type for all medidup operations.
pub type Result<T> = std::result::Result<T, MedidupError>;

/// RFC3339-formatted timestamp string, used only for ambient/audit fields
/// (operation start/end). Shooting times in the data model itself are
/// epoch seconds (`i64`), per the metadata extractor's own convention.
pub type Timestamp = String;

/// Formats `now` as RFC3339. Never fails for a valid `OffsetDateTime`.
pub fn now_rfc3339(now: time::OffsetDateTime) -> Result<Timestamp> {
    now.format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| MedidupError::Internal {
            message: format!("failed to format timestamp: {e}"),
        })
}

// ============================================================================
// Progress events
// ============================================================================

/// Progress event emitted during long-running operations for real-time
/// progress reporting. Core functions accept an optional callback that
/// receives these events; the CLI renders them in human mode and ignores
/// them in JSON mode.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// A root directory's walk has started.
    WalkStarted { root: String },
    /// A size bucket is about to be scanned.
    BucketStarted { size: u64, count: usize },
    /// A size bucket finished scanning; `classes` duplicate classes found.
    BucketFinished { size: u64, classes: usize },
    /// A file could not be placed or indexed; non-fatal.
    Warning { path: String, message: String },
}

// ============================================================================
// Operation response wrapper
// ============================================================================

/// Generic wrapper for CLI operation results carrying timing metadata.
///
/// # JSON output
///
/// ```json
/// {
///   "started_at": "2025-01-15T14:30:00Z",
///   "finished_at": "2025-01-15T14:30:05Z",
///   "duration_ms": 5000,
///   "data": { }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResponse<T> {
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub duration_ms: u64,
    pub data: T,
}

impl<T> OperationResponse<T> {
    /// Builds a response, computing `duration_ms` from the two instants.
    pub fn new(
        data: T,
        started_at: time::OffsetDateTime,
        finished_at: time::OffsetDateTime,
    ) -> Result<Self> {
        let duration_ms = (finished_at - started_at).whole_milliseconds().max(0) as u64;
        Ok(Self {
            started_at: now_rfc3339(started_at)?,
            finished_at: now_rfc3339(finished_at)?,
            duration_ms,
            data,
        })
    }
}

// ============================================================================
// Error taxonomy
// ============================================================================

/// Structured error type for all medidup operations.
///
/// Maps onto the three CLI exit codes:
/// - `UserError` / `Internal` → 1
/// - `Runtime` → 2 (every root's metadata extractor failed)
/// - `PerFile` / `Fingerprint` / `Placement` never abort a run; they are
///   counted in the operation summary and logged as warnings, not returned
///   from top-level operations.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MedidupError {
    /// Bad CLI input: path not a directory, output equals input, invalid flag.
    #[serde(rename = "user")]
    UserError { message: String },

    /// Filesystem failure that aborts the enclosing operation.
    #[serde(rename = "io")]
    Io { message: String },

    /// Every root's metadata extractor failed; nothing could be indexed.
    #[serde(rename = "runtime")]
    Runtime { message: String },

    /// A defect in medidup itself (should not occur in practice).
    #[serde(rename = "internal")]
    Internal { message: String },
}

impl fmt::Display for MedidupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MedidupError::UserError { message } => write!(f, "user error: {message}"),
            MedidupError::Io { message } => write!(f, "I/O error: {message}"),
            MedidupError::Runtime { message } => write!(f, "runtime error: {message}"),
            MedidupError::Internal { message } => write!(f, "internal error: {message}"),
        }
    }
}

impl std::error::Error for MedidupError {}

impl From<std::io::Error> for MedidupError {
    fn from(err: std::io::Error) -> Self {
        MedidupError::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for MedidupError {
    fn from(err: serde_json::Error) -> Self {
        MedidupError::UserError {
            message: format!("JSON error: {err}"),
        }
    }
}

impl From<walkdir::Error> for MedidupError {
    fn from(err: walkdir::Error) -> Self {
        MedidupError::Io {
            message: format!("directory traversal error: {err}"),
        }
    }
}

impl MedidupError {
    /// Returns the CLI exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            MedidupError::UserError { .. } => 1,
            MedidupError::Internal { .. } => 1,
            MedidupError::Io { .. } => 1,
            MedidupError::Runtime { .. } => 2,
        }
    }
}

/// Validity floor for any shooting-time candidate: strictly greater than
/// 2000-01-01 00:00:00 UTC, expressed in epoch seconds.
pub const MIN_VALID_TIME: i64 = 946_684_800;
