//! The layered equivalence decision procedure (§4.D): size, then prefix
//! checksum, then full content hash, then a format-aware comparison. Each
//! layer either settles the question or falls through to the next one; a
//! fingerprint read failure is treated the same as a disagreement, not as
//! an error, and simply advances the cascade.

use crate::medium::{MediaKind, Medium};

const ROLLING_SAME_RATIO: f64 = 0.1001;
const ROLLING_DIFFERENT_RATIO: f64 = 0.5;
const BINARY_DIFF_SAME_RATIO: f64 = 0.2001;

/// Decides whether `a` and `b` are the same media item. Mutates both to
/// memoise whatever fingerprints get computed along the way.
pub fn same(a: &mut Medium, b: &mut Medium) -> bool {
    if a.size() != b.size() {
        return false;
    }

    match (a.prefix_sum(), b.prefix_sum()) {
        (Some(pa), Some(pb)) if pa == pb => {
            if let (Some(ha), Some(hb)) = (a.content_hash(), b.content_hash()) {
                if ha == hb {
                    return true;
                }
            }
            layer4(a, b)
        }
        _ => layer4(a, b),
    }
}

fn layer4(a: &mut Medium, b: &mut Medium) -> bool {
    if a.kind() == MediaKind::Image && b.kind() == MediaKind::Image {
        if layer4a_perceptual_hash(a, b) {
            return true;
        }
        // 4a yielding false (including decode failure) still falls through
        // to the rolling-signature/binary-diff path below.
    }

    match layer4b_rolling_signature(a, b) {
        Some(verdict) => verdict,
        None => layer4c_binary_diff(a, b),
    }
}

fn layer4a_perceptual_hash(a: &mut Medium, b: &mut Medium) -> bool {
    if metadata_shortcut_matches(a, b) {
        return true;
    }
    match (a.perceptual_hash(), b.perceptual_hash()) {
        (Some(ha), Some(hb)) => (ha ^ hb).count_ones() == 0,
        _ => false,
    }
}

/// Metadata shortcut (§4.D Layer 4a): both media need an agreeing,
/// non-empty `cameraModel`, agreeing positive `imageWidth`/`imageHeight`,
/// and an identical, non-zero `shootingTime`.
fn metadata_shortcut_matches(a: &mut Medium, b: &mut Medium) -> bool {
    let camera_matches = match (a.meta().and_then(|m| m.camera_model.clone()), b.meta().and_then(|m| m.camera_model.clone())) {
        (Some(ca), Some(cb)) if !ca.is_empty() && !cb.is_empty() => ca == cb,
        _ => return false,
    };
    if !camera_matches {
        return false;
    }

    let dims = |m: &Medium| m.meta().and_then(|m| Some((m.image_width?, m.image_height?)));
    let dims_match = match (dims(a), dims(b)) {
        (Some((wa, ha)), Some((wb, hb))) if wa > 0 && ha > 0 => wa == wb && ha == hb,
        _ => return false,
    };
    if !dims_match {
        return false;
    }

    let ta = a.shooting_time();
    let tb = b.shooting_time();
    ta > 0 && ta == tb
}

/// Returns `Some(true/false)` when the delta ratio decisively settles the
/// comparison, `None` when the ratio lands in the inconclusive middle band
/// or the signature/delta could not be computed, in which case the caller
/// falls through to the binary diff.
fn layer4b_rolling_signature(a: &mut Medium, b: &mut Medium) -> Option<bool> {
    let sig_bytes = a.rolling_signature()?.to_vec();
    let target = std::fs::read(b.path()).ok()?;

    let signature = fast_rsync::Signature::deserialize(sig_bytes).ok()?;
    let indexed = signature.index();

    let mut delta = Vec::new();
    fast_rsync::diff(&indexed, &target, &mut delta).ok()?;

    let ratio = delta.len() as f64 / a.size().max(1) as f64;
    if ratio <= ROLLING_SAME_RATIO {
        Some(true)
    } else if ratio > ROLLING_DIFFERENT_RATIO {
        Some(false)
    } else {
        None
    }
}

fn layer4c_binary_diff(a: &mut Medium, b: &mut Medium) -> bool {
    let source = match std::fs::read(a.path()) {
        Ok(d) => d,
        Err(_) => return false,
    };
    let target = match std::fs::read(b.path()) {
        Ok(d) => d,
        Err(_) => return false,
    };

    let mut patch = Vec::new();
    if qbsdiff::Bsdiff::new(&source, &target).compare(&mut patch).is_err() {
        return false;
    }

    let ratio = patch.len() as f64 / a.size().max(1) as f64;
    ratio <= BINARY_DIFF_SAME_RATIO
}
