//! Optional per-directory index snapshot (§6 persisted state): an advisory
//! `.index.json` document describing the last `Index` built for a root.
//!
//! Nothing in the engine reads this file back to skip work — the data model
//! (§3) is explicit that an `Index` is never persisted authoritatively, only
//! "an optional JSON snapshot may be written but is advisory". Its purpose
//! is purely informational (a human or another tool inspecting what the
//! last run saw), so writing it is opt-in, behind the CLI's `--snapshot`
//! flag, and reading it back is not part of this engine's own workflow.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::medium::Medium;
use crate::meta::MetaRecord;
use crate::Index;
use crate::Result;

/// Name of the advisory per-directory index snapshot. Always excluded from
/// [`crate::index::Index::build`]'s walk, matching [`crate::meta::EXIF_CACHE_FILE`].
pub const INDEX_SNAPSHOT_FILE: &str = ".index.json";

/// One valid medium's record in the snapshot: just enough to recognize it on
/// a future inspection, not a full re-hydration of a `Medium` (fingerprints
/// are never persisted; they are cheap to recompute and the data model
/// treats them as per-run, in-memory only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediumRecord {
    pub size: u64,
    pub mtime: i64,
    pub meta: Option<MetaRecord>,
}

/// The `.index.json` document shape from §6: `{ size, media: { path:
/// medium }, invalid: { path: true } }`. `size` here is the snapshot's own
/// record count (an Open Question resolution: the distilled spec names the
/// field but not its exact meaning; `original_source` has no surviving copy
/// of this format to resolve it from, so the natural reading — "how many
/// entries does this snapshot describe" — was chosen; see DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub size: usize,
    pub media: BTreeMap<String, MediumRecord>,
    pub invalid: BTreeMap<String, bool>,
}

impl IndexSnapshot {
    /// Builds a snapshot from a live `Index` without consuming it.
    pub fn from_index(index: &Index) -> Self {
        Self::from_media(index.iter())
    }

    /// Builds a snapshot from any subset of media, e.g. one root's slice of
    /// a multi-root `Index` (see [`write_index_snapshot_for_root`]).
    pub fn from_media<'a>(media: impl Iterator<Item = &'a Medium>) -> Self {
        let mut by_path = BTreeMap::new();
        let mut invalid = BTreeMap::new();

        for medium in media {
            let path = medium.path().to_string_lossy().into_owned();
            if medium.valid() {
                by_path.insert(path, snapshot_record(medium));
            } else {
                invalid.insert(path, true);
            }
        }

        IndexSnapshot {
            size: by_path.len() + invalid.len(),
            media: by_path,
            invalid,
        }
    }
}

fn snapshot_record(medium: &Medium) -> MediumRecord {
    MediumRecord {
        size: medium.size(),
        mtime: medium.mtime(),
        meta: medium.meta().cloned(),
    }
}

/// Writes `<root>/.index.json` atomically (tmp file, fsync, rename), the
/// same discipline [`crate::meta::persist_exif_cache`] uses for its sidecar.
pub fn write_index_snapshot(root: &Path, index: &Index) -> Result<()> {
    write_snapshot_file(root, &IndexSnapshot::from_index(index))
}

/// Writes `<root>/.index.json` scoped to the subset of `index`'s media that
/// live under `root`, for the multi-root case where one `Index` spans
/// several input trees but each gets its own per-directory snapshot (§6:
/// "per-directory snapshot").
pub fn write_index_snapshot_for_root(root: &Path, index: &Index) -> Result<()> {
    let snapshot = IndexSnapshot::from_media(index.iter().filter(|m| m.path().starts_with(root)));
    write_snapshot_file(root, &snapshot)
}

fn write_snapshot_file(root: &Path, snapshot: &IndexSnapshot) -> Result<()> {
    let path = root.join(INDEX_SNAPSHOT_FILE);
    let tmp_path = root.join(".index.json.tmp");
    let json = serde_json::to_string_pretty(snapshot)?;

    let mut file = std::fs::File::create(&tmp_path)?;
    use std::io::Write as _;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn valid_medium(path: &str, size: u64) -> Medium {
        Medium::new(
            PathBuf::from(path),
            size,
            0,
            None,
            Some(MetaRecord {
                source_path: path.to_string(),
                mime_type: Some("image/jpeg".into()),
                ..Default::default()
            }),
        )
    }

    fn invalid_medium(path: &str, size: u64) -> Medium {
        Medium::new(PathBuf::from(path), size, 0, None, None)
    }

    #[test]
    fn snapshot_sorts_valid_and_invalid_media_separately() {
        let mut index = Index::new();
        index.add(valid_medium("/a/photo.jpg", 10));
        index.add(invalid_medium("/a/notes.txt", 5));

        let snapshot = IndexSnapshot::from_index(&index);
        assert_eq!(snapshot.size, 2);
        assert!(snapshot.media.contains_key("/a/photo.jpg"));
        assert!(snapshot.invalid.contains_key("/a/notes.txt"));
        assert!(!snapshot.media.contains_key("/a/notes.txt"));
    }

    #[test]
    fn write_index_snapshot_round_trips_through_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut index = Index::new();
        index.add(valid_medium("/a/photo.jpg", 10));

        write_index_snapshot(dir.path(), &index).unwrap();

        let text = std::fs::read_to_string(dir.path().join(INDEX_SNAPSHOT_FILE)).unwrap();
        let loaded: IndexSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.size, 1);
        assert!(loaded.media.contains_key("/a/photo.jpg"));
    }

    #[test]
    fn per_root_snapshot_excludes_media_from_other_roots() {
        let dir = tempfile::TempDir::new().unwrap();
        let root_a = dir.path().join("a");
        let root_b = dir.path().join("b");
        std::fs::create_dir_all(&root_a).unwrap();
        std::fs::create_dir_all(&root_b).unwrap();

        let mut index = Index::new();
        index.add(valid_medium(root_a.join("photo.jpg").to_str().unwrap(), 10));
        index.add(valid_medium(root_b.join("other.jpg").to_str().unwrap(), 20));

        write_index_snapshot_for_root(&root_a, &index).unwrap();

        let text = std::fs::read_to_string(root_a.join(INDEX_SNAPSHOT_FILE)).unwrap();
        let loaded: IndexSnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(loaded.size, 1);
        assert!(loaded.media.keys().next().unwrap().contains("photo.jpg"));
    }

    #[test]
    fn snapshot_record_carries_size_and_mtime() {
        let medium = valid_medium("/a/photo.jpg", 42);
        let record = snapshot_record(&medium);
        assert_eq!(record.size, 42);
        assert_eq!(record.mtime, 0);
    }
}
