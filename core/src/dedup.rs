//! Duplicate-Set Finder (§4.E): groups every pairwise-equal medium within a
//! size bucket via union-find, selects a keeper per group, and emits a
//! commented removal script.
//!
//! REDESIGN FLAG: the original extractor's scan broke out of its inner loop
//! on the first mismatch within a bucket, which silently missed duplicate
//! pairs later in the same bucket. This finder instead unions every pair
//! judged equal, so duplicate membership doesn't depend on scan order.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::cascade;
use crate::medium::Medium;
use crate::pool::{self, CancellationToken};
use crate::ProgressEvent;

/// One group of mutually-equivalent media: a `keeper` to retain and the
/// `removable` members that may be deleted.
#[derive(Debug, Clone)]
pub struct DuplicateClass {
    pub members: Vec<PathBuf>,
    pub keeper: PathBuf,
    pub removable: Vec<PathBuf>,
}

impl DuplicateClass {
    /// Renders this class as lines of a removal script: the keeper is a
    /// commented-out `rm`, every other member is a live `rm` command.
    pub fn script_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.members.len());
        lines.push(format!("# rm \"{}\"", self.keeper.display()));
        for path in &self.removable {
            lines.push(format!("rm \"{}\"", path.display()));
        }
        lines
    }
}

/// Options controlling duplicate grouping and keeper selection.
#[derive(Debug, Clone, Default)]
pub struct FinderOptions {
    /// Path components that mark a file as preferred-for-removal: a file
    /// under one of these components is never chosen as keeper unless every
    /// member of its class is also marked.
    pub prefer_remove: HashSet<String>,
}

/// Finds every duplicate class across all of `index`'s size buckets.
/// Buckets are processed large-first, each on its own worker (§4.G); within
/// a bucket, comparisons happen in a fixed, path-sorted order so results are
/// deterministic regardless of scheduling.
pub fn find_duplicates(
    index: crate::Index,
    options: &FinderOptions,
    threads: Option<usize>,
    cancel: &CancellationToken,
    mut on_event: impl FnMut(ProgressEvent),
) -> Vec<DuplicateClass> {
    let buckets = index.into_size_buckets_desc();

    for (size, media) in &buckets {
        on_event(ProgressEvent::BucketStarted {
            size: *size,
            count: media.len(),
        });
    }

    let options = options.clone();
    let per_bucket: Vec<Vec<DuplicateClass>> =
        pool::run_size_buckets_with_threads(buckets, threads, cancel, move |size, media, cancel| {
            let classes = find_duplicates_in_bucket(media, &options, cancel);
            let _ = size;
            classes
        });

    per_bucket.into_iter().flatten().collect()
}

fn find_duplicates_in_bucket(
    mut media: Vec<Medium>,
    options: &FinderOptions,
    cancel: &CancellationToken,
) -> Vec<DuplicateClass> {
    if media.len() < 2 {
        return Vec::new();
    }

    media.sort_by(|a, b| a.path().cmp(b.path()));
    let n = media.len();
    let mut uf = UnionFind::new(n);

    'outer: for i in 0..n {
        for j in (i + 1)..n {
            if cancel.is_cancelled() {
                break 'outer;
            }
            let inode_a = media[i].inode();
            if inode_a.is_some() && inode_a == media[j].inode() {
                continue;
            }
            let (left, right) = media.split_at_mut(j);
            if cascade::same(&mut left[i], &mut right[0]) {
                uf.union(i, j);
            }
        }
    }

    let mut emitted = vec![false; n];
    let mut classes = Vec::new();
    for i in 0..n {
        if emitted[i] {
            continue;
        }
        let root = uf.find(i);
        let members: Vec<usize> = (0..n).filter(|&k| uf.find(k) == root).collect();
        if members.len() < 2 {
            emitted[i] = true;
            continue;
        }
        for &m in &members {
            emitted[m] = true;
        }
        let paths: Vec<PathBuf> = members.iter().map(|&k| media[k].path().to_path_buf()).collect();
        classes.push(build_class(paths, options));
    }
    classes
}

fn build_class(mut paths: Vec<PathBuf>, options: &FinderOptions) -> DuplicateClass {
    paths.sort_by(|a, b| {
        let rune_count = |p: &Path| p.to_string_lossy().chars().count();
        rune_count(a).cmp(&rune_count(b)).then_with(|| a.cmp(b))
    });

    let keeper_idx = paths
        .iter()
        .position(|p| !is_prefer_removed(p, options))
        .unwrap_or(0);

    let keeper = paths[keeper_idx].clone();
    let removable = paths
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != keeper_idx)
        .map(|(_, p)| p.clone())
        .collect();

    DuplicateClass {
        members: paths,
        keeper,
        removable,
    }
}

fn is_prefer_removed(path: &Path, options: &FinderOptions) -> bool {
    if options.prefer_remove.is_empty() {
        return false;
    }
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .map(|s| options.prefer_remove.contains(s))
            .unwrap_or(false)
    })
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        path
    }

    #[test]
    fn keeper_is_shortest_then_lexicographic() {
        let dir = TempDir::new().unwrap();
        let long = touch(&dir, "IMG_20200101_zzz_copy.jpg", b"identical content here");
        let short = touch(&dir, "a.jpg", b"identical content here");
        let class = build_class(vec![long.clone(), short.clone()], &FinderOptions::default());
        assert_eq!(class.keeper, short);
        assert_eq!(class.removable, vec![long]);
    }

    #[test]
    fn prefer_remove_skips_marked_components_for_keeper() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("trash")).unwrap();
        let marked = touch(&dir, "trash/a.jpg", b"same bytes so rune-count wins normally");
        let unmarked = touch(&dir, "zzzzzzzzzzzzzz.jpg", b"different length entirely here");

        let mut options = FinderOptions::default();
        options.prefer_remove.insert("trash".to_string());

        let class = build_class(vec![marked.clone(), unmarked.clone()], &options);
        assert_eq!(class.keeper, unmarked);
        assert_eq!(class.removable, vec![marked]);
    }

    #[test]
    fn script_lines_comment_out_only_the_keeper() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.jpg", b"x");
        let b = touch(&dir, "b.jpg", b"y");
        let class = build_class(vec![b.clone(), a.clone()], &FinderOptions::default());
        let lines = class.script_lines();
        assert!(lines[0].starts_with("# rm "));
        assert!(!lines[1].starts_with('#'));
        assert!(lines[1].starts_with("rm "));
    }

    #[test]
    fn hardlinked_pair_is_not_unioned_but_others_still_compared() {
        let dir = TempDir::new().unwrap();
        let p1 = touch(&dir, "a.jpg", b"shared content across all three files");
        let p2 = dir.path().join("b.jpg");
        std::fs::hard_link(&p1, &p2).unwrap();
        let p3 = touch(&dir, "c.jpg", b"shared content across all three files");

        let media = vec![
            Medium::new(p1.clone(), 38, 0, Some((1, 100)), None),
            Medium::new(p2.clone(), 38, 0, Some((1, 100)), None),
            Medium::new(p3.clone(), 38, 0, Some((1, 200)), None),
        ];
        let cancel = CancellationToken::new();
        let classes = find_duplicates_in_bucket(media, &FinderOptions::default(), &cancel);
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].members.len(), 3);
    }
}
