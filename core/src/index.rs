//! Media-by-Size Index (§4.C): the sole gateway for equivalence queries and
//! the owner of the directory walk. Groups media by size so that nothing
//! outside the same size bucket is ever compared.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::cascade;
use crate::medium::Medium;
use crate::meta::{self, MetaRecord};
use crate::{MedidupError, ProgressEvent, Result};

/// Media grouped by size, plus a path lookup. Construction (`build`) performs
/// the walk and metadata enrichment; the grouping structures themselves are
/// cheap index maps over an owned `Vec<Medium>`.
pub struct Index {
    media: Vec<Medium>,
    by_path: HashMap<PathBuf, usize>,
    by_size: BTreeMap<u64, Vec<usize>>,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    pub fn new() -> Self {
        Index {
            media: Vec::new(),
            by_path: HashMap::new(),
            by_size: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, medium: Medium) {
        let idx = self.media.len();
        self.by_path.insert(medium.path().to_path_buf(), idx);
        self.by_size.entry(medium.size()).or_default().push(idx);
        self.media.push(medium);
    }

    pub fn len(&self) -> usize {
        self.media.len()
    }

    pub fn is_empty(&self) -> bool {
        self.media.is_empty()
    }

    pub fn get(&self, path: &Path) -> Option<&Medium> {
        self.by_path.get(path).map(|&i| &self.media[i])
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut Medium> {
        let idx = *self.by_path.get(path)?;
        Some(&mut self.media[idx])
    }

    /// Borrowing iteration over every indexed medium, in walk order. Used by
    /// [`crate::snapshot`] to serialize the advisory `.index.json` without
    /// consuming the index.
    pub fn iter(&self) -> impl Iterator<Item = &Medium> {
        self.media.iter()
    }

    /// Looks for an existing medium in the same size bucket that the
    /// cascade judges equal to `candidate`. Used for incremental
    /// membership checks outside the batch Duplicate-Set Finder.
    pub fn lookup_same(&mut self, candidate: &mut Medium) -> Option<PathBuf> {
        let idxs = self.by_size.get(&candidate.size())?.clone();
        for idx in idxs {
            let member = &mut self.media[idx];
            if cascade::same(candidate, member) {
                return Some(member.path().to_path_buf());
            }
        }
        None
    }

    /// Consumes the index, handing back all media in (unspecified) walk
    /// order. Used by operations that don't need size-bucket grouping.
    pub fn into_media(self) -> Vec<Medium> {
        self.media
    }

    /// Consumes the index, grouping media into size buckets ordered largest
    /// first (§4.G: buckets are handed to workers large-first). Each bucket
    /// owns its members outright, so nothing outside a single worker can
    /// ever touch them.
    pub fn into_size_buckets_desc(self) -> Vec<(u64, Vec<Medium>)> {
        let Index { media, by_size, .. } = self;
        let mut slots: Vec<Option<Medium>> = media.into_iter().map(Some).collect();
        by_size
            .into_iter()
            .rev()
            .map(|(size, idxs)| {
                let items = idxs.into_iter().map(|i| slots[i].take().unwrap()).collect();
                (size, items)
            })
            .collect()
    }

    /// Walks `roots`, enriches each file with a metadata record (or a
    /// MIME-sniffed stand-in), and returns the populated index. Directories,
    /// zero-byte files, and any path component present in `ignore` are
    /// skipped. A root that isn't a directory is a fatal user error; a root
    /// whose extractor invocation fails yields an empty metadata set for
    /// that root rather than aborting.
    pub fn build(
        roots: &[PathBuf],
        extractor_path: &str,
        ignore: &HashSet<String>,
        mut on_event: impl FnMut(ProgressEvent),
    ) -> Result<Index> {
        let mut index = Index::new();
        let mut any_root_yielded_metadata = false;

        for root in roots {
            if !root.is_dir() {
                return Err(MedidupError::UserError {
                    message: format!("{} is not a directory", root.display()),
                });
            }

            on_event(ProgressEvent::WalkStarted {
                root: root.display().to_string(),
            });

            let records = meta::extract_metadata(extractor_path, root).unwrap_or_default();
            if !records.is_empty() {
                any_root_yielded_metadata = true;
            }

            let mut by_source_path: HashMap<String, MetaRecord> = records
                .into_iter()
                .map(|r| (normalize(Path::new(&r.source_path)), r))
                .collect();

            for entry in WalkDir::new(root)
                .into_iter()
                .filter_entry(|e| !is_ignored(e, ignore))
            {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        on_event(ProgressEvent::Warning {
                            path: root.display().to_string(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                };

                if entry.file_type().is_dir() {
                    continue;
                }

                let path = entry.path();
                let metadata = match entry.metadata() {
                    Ok(m) => m,
                    Err(e) => {
                        on_event(ProgressEvent::Warning {
                            path: path.display().to_string(),
                            message: e.to_string(),
                        });
                        continue;
                    }
                };

                if metadata.len() == 0 {
                    continue;
                }

                let meta = by_source_path
                    .remove(&normalize(path))
                    .or_else(|| meta::sniff_mime(path).map(|mime| {
                        MetaRecord::inferred(path.display().to_string(), mime)
                    }));

                let mtime = mtime_epoch(&metadata);
                let inode = inode_of(&metadata);

                index.add(Medium::new(path.to_path_buf(), metadata.len(), mtime, inode, meta));
            }
        }

        if !any_root_yielded_metadata && index.is_empty() {
            return Err(MedidupError::Runtime {
                message: "metadata extractor produced nothing for every root; nothing could be indexed"
                    .to_string(),
            });
        }

        Ok(index)
    }
}

/// Filenames of the advisory persisted-state files (§6): always excluded
/// from the walk regardless of the caller's ignore-set, so enabling
/// `--cache-exif`/`--snapshot` on one run never turns its own output into a
/// spurious "medium" on the next.
const RESERVED_FILE_NAMES: &[&str] = &[
    meta::EXIF_CACHE_FILE,
    ".exif.json.tmp",
    crate::snapshot::INDEX_SNAPSHOT_FILE,
    ".index.json.tmp",
];

fn is_ignored(entry: &walkdir::DirEntry, ignore: &HashSet<String>) -> bool {
    if let Some(name) = entry.file_name().to_str() {
        if RESERVED_FILE_NAMES.contains(&name) {
            return true;
        }
    }
    if ignore.is_empty() {
        return false;
    }
    entry.path().components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| ignore.contains(s))
            .unwrap_or(false)
    })
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(unix)]
fn mtime_epoch(metadata: &std::fs::Metadata) -> i64 {
    use std::os::unix::fs::MetadataExt;
    metadata.mtime()
}

#[cfg(not(unix))]
fn mtime_epoch(metadata: &std::fs::Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(unix)]
fn inode_of(metadata: &std::fs::Metadata) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.dev(), metadata.ino()))
}

#[cfg(not(unix))]
fn inode_of(_metadata: &std::fs::Metadata) -> Option<(u64, u64)> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, rel: &str, contents: &[u8]) {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(contents).unwrap();
    }

    #[test]
    fn walk_skips_zero_byte_files_and_ignored_components() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.jpg", b"some bytes");
        touch(&dir, "empty.jpg", b"");
        touch(&dir, ".thumbnails/cache.jpg", b"cached thumbnail bytes");

        let mut ignore = HashSet::new();
        ignore.insert(".thumbnails".to_string());

        let index = Index::build(
            &[dir.path().to_path_buf()],
            "nonexistent-extractor-binary",
            &ignore,
            |_| {},
        )
        .unwrap();

        assert_eq!(index.len(), 1);
        assert!(index.get(&dir.path().join("a.jpg")).is_some());
    }

    #[test]
    fn nonexistent_root_is_a_user_error() {
        let err = Index::build(
            &[PathBuf::from("/definitely/not/a/real/directory")],
            "exiftool",
            &HashSet::new(),
            |_| {},
        )
        .unwrap_err();
        assert!(matches!(err, MedidupError::UserError { .. }));
    }

    #[test]
    fn reserved_snapshot_filenames_are_excluded_without_an_explicit_ignore() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "a.jpg", b"some real media bytes");
        touch(&dir, ".exif.json", b"[]");
        touch(&dir, ".index.json", b"{}");

        let index = Index::build(&[dir.path().to_path_buf()], "exiftool", &HashSet::new(), |_| {})
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get(&dir.path().join("a.jpg")).is_some());
    }

    #[test]
    fn size_buckets_are_descending_and_own_their_media() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "small.jpg", b"12345");
        touch(&dir, "big.jpg", b"1234567890");

        let index = Index::build(&[dir.path().to_path_buf()], "exiftool", &HashSet::new(), |_| {})
            .unwrap();
        let buckets = index.into_size_buckets_desc();
        let sizes: Vec<u64> = buckets.iter().map(|(size, _)| *size).collect();
        assert_eq!(sizes, vec![10, 5]);
    }
}
