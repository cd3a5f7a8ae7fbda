//! Filesystem primitives used by the Placement Planner: copy that preserves
//! mtime, and a move that renames when possible and falls back to
//! copy-then-remove across devices.

use std::fs;
use std::path::Path;

use crate::Result;

/// Copies `src` to `dst`, creating `dst`'s parent directories if needed, and
/// carries `src`'s modification time over to `dst` so placed files keep
/// their original timestamp rather than the time of the tidy run.
pub fn copy_preserving_mtime(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    let src_meta = fs::metadata(src)?;
    let mtime = filetime::FileTime::from_last_modification_time(&src_meta);
    filetime::set_file_mtime(dst, mtime)?;
    Ok(())
}

/// Moves `src` to `dst`: a plain rename when both paths are on the same
/// device, otherwise a copy-preserving-mtime followed by removing `src`.
pub fn move_or_copy_remove(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_preserving_mtime(src, dst)?;
            fs::remove_file(src)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn copy_preserves_mtime() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.jpg");
        std::fs::File::create(&src).unwrap().write_all(b"content").unwrap();
        let old_mtime = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&src, old_mtime).unwrap();

        let dst = dir.path().join("out").join("dst.jpg");
        copy_preserving_mtime(&src, &dst).unwrap();

        let dst_meta = std::fs::metadata(&dst).unwrap();
        let dst_mtime = filetime::FileTime::from_last_modification_time(&dst_meta);
        assert_eq!(dst_mtime, old_mtime);
    }

    #[test]
    fn move_removes_source() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.jpg");
        std::fs::File::create(&src).unwrap().write_all(b"content").unwrap();
        let dst = dir.path().join("out").join("dst.jpg");

        move_or_copy_remove(&src, &dst).unwrap();

        assert!(!src.exists());
        assert!(dst.exists());
    }
}
