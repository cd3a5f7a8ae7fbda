//! Medium: the per-file object at the center of the engine. Holds a file's
//! identity (path, size, mtime), its metadata record, and a set of lazily
//! computed fingerprints used by the [`crate::cascade`] to decide equality.
//!
//! Fingerprint accessors take `&mut self` and memoise on success (I1): once
//! materialised a fingerprint never changes for the lifetime of the
//! `Medium`. A read failure is not cached — it is treated as "unknown" for
//! that call and the cascade falls through to the next layer (§7 category 3).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::filename_time;
use crate::meta::MetaRecord;
use crate::MIN_VALID_TIME;

/// Category tag replacing dynamic dispatch over MIME strings (REDESIGN FLAG,
/// §3/§9). Derived from the first path segment of `mimeType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Image,
    Video,
    Other,
}

impl MediaKind {
    fn from_mime(mime: &str) -> Self {
        match mime.split('/').next().unwrap_or("") {
            "audio" => MediaKind::Audio,
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            _ => MediaKind::Other,
        }
    }
}

/// A single media file tracked by the engine.
#[derive(Debug)]
pub struct Medium {
    path: PathBuf,
    size: u64,
    mtime: i64,
    inode: Option<(u64, u64)>,
    meta: Option<MetaRecord>,

    shooting_time: Option<i64>,
    prefix_sum: Option<u32>,
    content_hash: Option<[u8; 32]>,
    perceptual_hash: Option<u64>,
    rolling_signature: Option<Vec<u8>>,
}

impl Medium {
    /// Builds a `Medium` from filesystem facts and an optional metadata
    /// record. `inode` is the `(dev, ino)` pair used by the Duplicate-Set
    /// Finder to skip hardlinked pairs (§4.E); `None` when it could not be
    /// determined.
    pub fn new(
        path: PathBuf,
        size: u64,
        mtime: i64,
        inode: Option<(u64, u64)>,
        meta: Option<MetaRecord>,
    ) -> Self {
        Medium {
            path,
            size,
            mtime,
            inode,
            meta,
            shooting_time: None,
            prefix_sum: None,
            content_hash: None,
            perceptual_hash: None,
            rolling_signature: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mtime(&self) -> i64 {
        self.mtime
    }

    pub fn inode(&self) -> Option<(u64, u64)> {
        self.inode
    }

    pub fn meta(&self) -> Option<&MetaRecord> {
        self.meta.as_ref()
    }

    /// (I3) A medium is valid iff it has metadata whose `mimeType` begins
    /// with `audio/`, `image/`, or `video/`.
    pub fn valid(&self) -> bool {
        matches!(self.kind(), MediaKind::Audio | MediaKind::Image | MediaKind::Video)
            && self.meta.is_some()
    }

    /// The category tag derived from `mimeType`. `Other` when there is no
    /// metadata, or the MIME type doesn't fall in a recognised category.
    pub fn kind(&self) -> MediaKind {
        self.meta
            .as_ref()
            .and_then(|m| m.mime_type.as_deref())
            .map(MediaKind::from_mime)
            .unwrap_or(MediaKind::Other)
    }

    /// Best available capture time (§4.B), memoised after the first call.
    /// Returns 0 when no source yields a timestamp past [`MIN_VALID_TIME`].
    pub fn shooting_time(&mut self) -> i64 {
        if let Some(t) = self.shooting_time {
            return t;
        }
        let t = self.compute_shooting_time();
        self.shooting_time = Some(t);
        t
    }

    fn compute_shooting_time(&self) -> i64 {
        let meta = self.meta.as_ref();

        let exif_candidates = [
            meta.and_then(|m| m.exif_date_time_original),
            meta.and_then(|m| m.h264_date_time_original),
            meta.and_then(|m| m.quick_time_create_date),
            meta.and_then(|m| m.exif_create_date),
        ];
        for candidate in exif_candidates {
            if let Some(t) = candidate {
                if t > MIN_VALID_TIME {
                    return t;
                }
            }
        }

        if let Some(basename) = self.path.file_name().and_then(|n| n.to_str()) {
            if let Some(t) = filename_time::parse_filename_time(basename) {
                return t;
            }
        }

        let file_modify = meta.and_then(|m| m.file_modify_time).unwrap_or(self.mtime);
        let file_create = meta.and_then(|m| m.file_create_time);

        if let Some(create) = file_create {
            if create > 0 && file_modify > create && create > MIN_VALID_TIME {
                return create;
            }
        }
        if file_modify > MIN_VALID_TIME {
            return file_modify;
        }
        if let Some(create) = file_create {
            if create > MIN_VALID_TIME {
                return create;
            }
        }

        0
    }

    /// Layer 2: 32-bit rolling checksum over the leading `min(size, 4096)`
    /// bytes. `None` if the file could not be read.
    pub fn prefix_sum(&mut self) -> Option<u32> {
        if self.prefix_sum.is_none() {
            self.prefix_sum = compute_prefix_sum(&self.path);
        }
        self.prefix_sum
    }

    /// Layer 3: SHA-256 of the full file contents. `None` if the file could
    /// not be read.
    pub fn content_hash(&mut self) -> Option<[u8; 32]> {
        if self.content_hash.is_none() {
            self.content_hash = compute_content_hash(&self.path);
        }
        self.content_hash
    }

    /// Layer 4a: 64-bit DCT-based perceptual hash. `None` for non-images or
    /// on decode failure.
    pub fn perceptual_hash(&mut self) -> Option<u64> {
        if self.perceptual_hash.is_none() {
            self.perceptual_hash = compute_perceptual_hash(&self.path);
        }
        self.perceptual_hash
    }

    /// Layer 4b: the rsync-style signature file for this medium as the
    /// cascade's "base" side. Serialized bytes are cached so repeated
    /// comparisons against this medium amortise the scan of its contents.
    pub fn rolling_signature(&mut self) -> Option<&[u8]> {
        if self.rolling_signature.is_none() {
            self.rolling_signature = compute_rolling_signature(&self.path);
        }
        self.rolling_signature.as_deref()
    }

    /// Test-only introspection: whether the prefix checksum has been
    /// materialized, used to assert that size mismatches prune without
    /// touching the filesystem.
    #[cfg(test)]
    pub fn prefix_sum_was_computed(&self) -> bool {
        self.prefix_sum.is_some()
    }
}

fn compute_prefix_sum(path: &Path) -> Option<u32> {
    use std::io::Read;
    let mut file = std::fs::File::open(path).ok()?;
    let mut buf = [0u8; 4096];
    let mut total = 0usize;
    loop {
        let n = file.read(&mut buf[total..]).ok()?;
        if n == 0 {
            break;
        }
        total += n;
        if total == buf.len() {
            break;
        }
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..total]);
    Some(hasher.finalize())
}

fn compute_content_hash(path: &Path) -> Option<[u8; 32]> {
    let data = std::fs::read(path).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    Some(hasher.finalize().into())
}

fn compute_perceptual_hash(path: &Path) -> Option<u64> {
    let img = image::open(path).ok()?;
    let hasher = img_hash::HasherConfig::new().to_hasher();

    let rgba = img.to_rgba8();
    let (width, height) = (rgba.width(), rgba.height());
    let buffer = img_hash::image::ImageBuffer::from_raw(width, height, rgba.into_raw())?;
    let compat = img_hash::image::DynamicImage::ImageRgba8(buffer);

    let hash = hasher.hash_image(&compat);
    let bytes = hash.as_bytes();
    if bytes.len() != 8 {
        return None;
    }
    let mut arr = [0u8; 8];
    arr.copy_from_slice(bytes);
    Some(u64::from_be_bytes(arr))
}

fn compute_rolling_signature(path: &Path) -> Option<Vec<u8>> {
    let data = std::fs::read(path).ok()?;
    let signature = fast_rsync::Signature::calculate(
        &data,
        fast_rsync::SignatureOptions {
            block_size: 4096,
            crypto_hash_size: 8,
        },
    );
    Some(signature.serialize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn medium_with_meta(meta: Option<MetaRecord>) -> Medium {
        Medium::new(PathBuf::from("/tmp/x.jpg"), 10, 0, None, meta)
    }

    #[test]
    fn valid_requires_recognized_mime() {
        let valid = medium_with_meta(Some(MetaRecord {
            source_path: "/tmp/x.jpg".into(),
            mime_type: Some("image/jpeg".into()),
            ..Default::default()
        }));
        assert!(valid.valid());
        assert_eq!(valid.kind(), MediaKind::Image);

        let invalid = medium_with_meta(Some(MetaRecord {
            source_path: "/tmp/x.txt".into(),
            mime_type: Some("text/plain".into()),
            ..Default::default()
        }));
        assert!(!invalid.valid());

        let no_meta = medium_with_meta(None);
        assert!(!no_meta.valid());
    }

    #[test]
    fn shooting_time_prefers_exif_over_filename_and_mtime() {
        let mut m = Medium::new(
            PathBuf::from("/tmp/IMG_20200615_143000.jpg"),
            10,
            1_700_000_000,
            None,
            Some(MetaRecord {
                source_path: "/tmp/IMG_20200615_143000.jpg".into(),
                mime_type: Some("image/jpeg".into()),
                exif_date_time_original: Some(1_592_231_400),
                ..Default::default()
            }),
        );
        assert_eq!(m.shooting_time(), 1_592_231_400);
    }

    #[test]
    fn shooting_time_falls_back_to_filename_then_mtime() {
        let mut with_filename = Medium::new(
            PathBuf::from("/tmp/IMG_20200615_143000.jpg"),
            10,
            1_700_000_000,
            None,
            None,
        );
        assert!(with_filename.shooting_time() > MIN_VALID_TIME);

        let mut mtime_only = Medium::new(PathBuf::from("/tmp/DSC01234.jpg"), 10, 1_700_000_000, None, None);
        assert_eq!(mtime_only.shooting_time(), 1_700_000_000);
    }

    #[test]
    fn shooting_time_is_zero_when_nothing_valid() {
        let mut m = Medium::new(PathBuf::from("/tmp/DSC01234.jpg"), 10, 0, None, None);
        assert_eq!(m.shooting_time(), 0);
    }

    #[test]
    fn missing_file_yields_none_fingerprints_not_errors() {
        let mut m = Medium::new(PathBuf::from("/nonexistent/path.jpg"), 10, 0, None, None);
        assert_eq!(m.prefix_sum(), None);
        assert_eq!(m.content_hash(), None);
        assert_eq!(m.perceptual_hash(), None);
        assert_eq!(m.rolling_signature(), None);
    }
}
