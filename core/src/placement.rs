//! Placement Planner (§4.F): computes the `tidy` target path for a medium
//! from its shooting time and resolves name collisions against whatever
//! already lives there.
//!
//! Deliberately out of scope: inheriting any "interesting" sub-path
//! component from the source tree. The target layout is always
//! `<output_root>/<year>/<month>/<basename>`, nothing more.

use std::path::PathBuf;

use time::OffsetDateTime;

use crate::medium::Medium;

const MAX_COLLISION_SUFFIX: u32 = 9;

/// Options for a `tidy` run.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub output_root: PathBuf,
}

/// The outcome of planning a single medium's placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementOutcome {
    /// No existing file occupies the target path; `target` is where the
    /// medium should be copied or moved.
    Placed { target: PathBuf },
    /// A file already at the target path (or a `_N` collision slot) has
    /// identical content; nothing needs to be placed.
    AlreadyPresent { existing: PathBuf },
    /// The medium has no usable shooting time and was left untouched.
    Skipped { reason: String },
    /// All nine collision suffixes were occupied by distinct content.
    Failed { reason: String },
}

/// Plans where `medium` should land in `options.output_root`.
pub fn plan_placement(medium: &mut Medium, options: &PlanOptions) -> PlacementOutcome {
    let shooting_time = medium.shooting_time();
    if shooting_time <= 0 {
        return PlacementOutcome::Skipped {
            reason: "no valid shooting time".to_string(),
        };
    }

    let Some((year, month)) = year_month(shooting_time) else {
        return PlacementOutcome::Skipped {
            reason: "shooting time out of range".to_string(),
        };
    };

    let dir = options.output_root.join(format!("{year:04}")).join(format!("{month:02}"));
    let Some(basename) = medium.path().file_name() else {
        return PlacementOutcome::Skipped {
            reason: "source path has no file name".to_string(),
        };
    };

    let candidate = dir.join(basename);
    if let Some(outcome) = resolve_candidate(medium, &candidate) {
        return outcome;
    }

    let stem = candidate.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = candidate.extension().map(|e| e.to_string_lossy().into_owned());

    for n in 1..=MAX_COLLISION_SUFFIX {
        let name = match &extension {
            Some(ext) => format!("{stem}_{n}.{ext}"),
            None => format!("{stem}_{n}"),
        };
        let numbered = dir.join(name);
        if let Some(outcome) = resolve_candidate(medium, &numbered) {
            return outcome;
        }
    }

    PlacementOutcome::Failed {
        reason: "collision-exhausted".to_string(),
    }
}

/// Returns `Some(Placed)` if `candidate` is free, `Some(AlreadyPresent)` if
/// it already holds identical content, or `None` to try the next slot.
fn resolve_candidate(medium: &mut Medium, candidate: &std::path::Path) -> Option<PlacementOutcome> {
    if !candidate.exists() {
        return Some(PlacementOutcome::Placed {
            target: candidate.to_path_buf(),
        });
    }
    if files_match(medium, candidate) {
        return Some(PlacementOutcome::AlreadyPresent {
            existing: candidate.to_path_buf(),
        });
    }
    None
}

fn files_match(medium: &mut Medium, other: &std::path::Path) -> bool {
    let Ok(other_meta) = std::fs::metadata(other) else {
        return false;
    };
    if other_meta.len() != medium.size() {
        return false;
    }
    let Some(source_hash) = medium.content_hash() else {
        return false;
    };
    let Ok(other_bytes) = std::fs::read(other) else {
        return false;
    };
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(&other_bytes);
    let other_hash: [u8; 32] = hasher.finalize().into();
    source_hash == other_hash
}

fn year_month(epoch: i64) -> Option<(i32, u8)> {
    let dt = OffsetDateTime::from_unix_timestamp(epoch).ok()?;
    Some((dt.year(), dt.month() as u8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn medium_at(path: PathBuf, contents: &[u8], shooting_time: i64) -> Medium {
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        Medium::new(
            path,
            contents.len() as u64,
            0,
            None,
            Some(crate::MetaRecord {
                exif_date_time_original: Some(shooting_time),
                mime_type: Some("image/jpeg".into()),
                ..Default::default()
            }),
        )
    }

    #[test]
    fn places_into_year_month_directory() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut m = medium_at(dir.path().join("photo.jpg"), b"content", 1_592_231_400);
        let outcome = plan_placement(&mut m, &PlanOptions { output_root: out.clone() });
        assert_eq!(
            outcome,
            PlacementOutcome::Placed {
                target: out.join("2020").join("06").join("photo.jpg")
            }
        );
    }

    #[test]
    fn skips_when_no_shooting_time() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut m = Medium::new(dir.path().join("photo.jpg"), 0, 0, None, None);
        let outcome = plan_placement(&mut m, &PlanOptions { output_root: out });
        assert!(matches!(outcome, PlacementOutcome::Skipped { .. }));
    }

    #[test]
    fn identical_content_at_target_is_already_present() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("2020").join("06")).unwrap();
        std::fs::write(out.join("2020").join("06").join("photo.jpg"), b"content").unwrap();

        let mut m = medium_at(dir.path().join("photo.jpg"), b"content", 1_592_231_400);
        let outcome = plan_placement(&mut m, &PlanOptions { output_root: out.clone() });
        assert_eq!(
            outcome,
            PlacementOutcome::AlreadyPresent {
                existing: out.join("2020").join("06").join("photo.jpg")
            }
        );
    }

    #[test]
    fn different_content_at_target_gets_numbered_suffix() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("2020").join("06")).unwrap();
        std::fs::write(out.join("2020").join("06").join("photo.jpg"), b"different bytes").unwrap();

        let mut m = medium_at(dir.path().join("photo.jpg"), b"content", 1_592_231_400);
        let outcome = plan_placement(&mut m, &PlanOptions { output_root: out.clone() });
        assert_eq!(
            outcome,
            PlacementOutcome::Placed {
                target: out.join("2020").join("06").join("photo_1.jpg")
            }
        );
    }

    #[test]
    fn collision_exhausted_after_nine_distinct_occupants() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let month_dir = out.join("2020").join("06");
        std::fs::create_dir_all(&month_dir).unwrap();
        std::fs::write(month_dir.join("photo.jpg"), b"occupant 0").unwrap();
        for n in 1..=9 {
            std::fs::write(month_dir.join(format!("photo_{n}.jpg")), format!("occupant {n}")).unwrap();
        }

        let mut m = medium_at(dir.path().join("photo.jpg"), b"content", 1_592_231_400);
        let outcome = plan_placement(&mut m, &PlanOptions { output_root: out });
        assert_eq!(
            outcome,
            PlacementOutcome::Failed {
                reason: "collision-exhausted".to_string()
            }
        );
    }
}
