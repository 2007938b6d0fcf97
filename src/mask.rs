//! Dense/sparse pixel-validity conversions and the sentinel-stamping
//! operations shared by RBPF and LWPF. The two detectors use inverted
//! mask conventions; this module normalizes internally and documents the
//! inversion at each boundary rather than forcing callers to remember it
//! everywhere.

use crate::layout::DetectorLayout;

/// In-band sentinel marking an invalid pixel in a `data` buffer: the
/// smallest finite value of `f32` (`-FLT_MAX`). Never `-inf` or `NaN` --
/// [`mask_from_data`] relies on `is_finite` to reconstruct a mask, and
/// every ordered comparison against `INVALID` must behave uniformly.
pub const INVALID: f32 = f32::MIN;

/// An ascending-sorted sequence of linear pixel indices that are invalid.
/// Round-tripping through [`build_sparse`] and [`fuse_sparse`] is a total
/// inverse of the dense mask representation.
pub type SparseMask = Vec<u32>;

/// For each pixel `p`, if `mask[p] != 0`, set `data[p] <- INVALID`.
///
/// `mask` follows the LWPF "primary" convention: nonzero means invalid.
/// Idempotent: a second call on already-fused data is a no-op, since
/// `INVALID` is simply overwritten with `INVALID` again.
///
/// # Panics
///
/// Panics (via slice indexing) if `data.len()` or `mask.len()` is smaller
/// than `layout.pix_n`; callers are responsible for sizing buffers to the
/// layout.
pub fn fuse_mask(data: &mut [f32], mask: &[u8], layout: &DetectorLayout) {
    let n = layout.pix_n as usize;
    for p in 0..n {
        if mask[p] != 0 {
            data[p] = INVALID;
        }
    }
}

/// Same as [`fuse_mask`] with the validity predicate inverted: stamps
/// `INVALID` where `mask[p] == 0`. This is the RBPF mask convention
/// (zero = invalid) expressed as a fuse operation, for callers that want
/// to materialize an RBPF-convention mask into the in-band sentinel form
/// LWPF expects.
pub fn fuse_inverted_mask(data: &mut [f32], mask: &[u8], layout: &DetectorLayout) {
    let n = layout.pix_n as usize;
    for p in 0..n {
        if mask[p] == 0 {
            data[p] = INVALID;
        }
    }
}

/// For each `idx` in `sparse`, set `data[idx] <- INVALID`.
pub fn fuse_sparse(data: &mut [f32], sparse: &SparseMask) {
    for &idx in sparse {
        data[idx as usize] = INVALID;
    }
}

/// `out_mask[p] = 0` iff `data[p]` is finite, else `1`. Inverse of
/// [`fuse_mask`] in the sense described in the round-trip law: fusing a
/// mask into all-finite data and then rebuilding a mask from the result
/// reproduces the original mask pixel-for-pixel.
pub fn mask_from_data(data: &[f32], out_mask: &mut [u8], layout: &DetectorLayout) {
    let n = layout.pix_n as usize;
    for p in 0..n {
        out_mask[p] = if data[p].is_finite() { 0 } else { 1 };
    }
}

/// Collects indices where `mask != 0`, in ascending linear order.
pub fn build_sparse(mask: &[u8], layout: &DetectorLayout) -> SparseMask {
    let n = layout.pix_n as usize;
    let mut sparse = Vec::new();
    for p in 0..n {
        if mask[p] != 0 {
            sparse.push(p as u32);
        }
    }
    sparse
}

/// Like [`fuse_mask`] but writes the fused result into `data_copy`, leaving
/// `data` untouched. `data_copy` must already contain a copy of `data`'s
/// contents (or any buffer the caller wants post-fusion invalid pixels
/// stamped into); only pixels marked invalid by `mask` are overwritten.
pub fn fuse_mask_into_copy(
    data: &[f32],
    data_copy: &mut [f32],
    mask: &[u8],
    layout: &DetectorLayout,
) {
    let n = layout.pix_n as usize;
    for p in 0..n {
        data_copy[p] = if mask[p] != 0 { INVALID } else { data[p] };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout_4096() -> DetectorLayout {
        DetectorLayout::new(64, 64, 1, 1).unwrap()
    }

    #[test]
    fn fuse_mask_stamps_invalid_sentinel() {
        let layout = layout_4096();
        let mut data: Vec<f32> = (0..layout.pix_n).map(|p| p as f32).collect();
        let mask: Vec<u8> = (0..layout.pix_n).map(|p| (p % 7 == 0) as u8).collect();

        fuse_mask(&mut data, &mask, &layout);

        for p in 0..layout.pix_n as usize {
            if p % 7 == 0 {
                assert_eq!(data[p], INVALID);
            } else {
                assert_eq!(data[p], p as f32);
            }
        }
    }

    #[test]
    fn build_sparse_matches_mask_stride() {
        let layout = layout_4096();
        let mask: Vec<u8> = (0..layout.pix_n).map(|p| (p % 7 == 0) as u8).collect();
        let sparse = build_sparse(&mask, &layout);
        let expected: Vec<u32> = (0..layout.pix_n).step_by(7).collect();
        assert_eq!(sparse, expected);
    }

    #[test]
    fn mask_from_data_reconstructs_original_mask() {
        let layout = layout_4096();
        let mut data: Vec<f32> = (0..layout.pix_n).map(|p| p as f32).collect();
        let mask: Vec<u8> = (0..layout.pix_n).map(|p| (p % 7 == 0) as u8).collect();

        fuse_mask(&mut data, &mask, &layout);

        let mut rebuilt = vec![0u8; layout.pix_n as usize];
        mask_from_data(&data, &mut rebuilt, &layout);
        assert_eq!(rebuilt, mask);
    }

    #[test]
    fn fuse_mask_is_idempotent() {
        let layout = layout_4096();
        let mut data: Vec<f32> = (0..layout.pix_n).map(|p| p as f32).collect();
        let mask: Vec<u8> = (0..layout.pix_n).map(|p| (p % 7 == 0) as u8).collect();

        fuse_mask(&mut data, &mask, &layout);
        let once = data.clone();
        fuse_mask(&mut data, &mask, &layout);
        assert_eq!(data, once);
    }

    #[test]
    fn fuse_sparse_matches_fuse_mask() {
        let layout = layout_4096();
        let mask: Vec<u8> = (0..layout.pix_n).map(|p| (p % 7 == 0) as u8).collect();

        let mut via_mask: Vec<f32> = (0..layout.pix_n).map(|p| p as f32).collect();
        fuse_mask(&mut via_mask, &mask, &layout);

        let mut via_sparse: Vec<f32> = (0..layout.pix_n).map(|p| p as f32).collect();
        let sparse = build_sparse(&mask, &layout);
        fuse_sparse(&mut via_sparse, &sparse);

        assert_eq!(via_mask, via_sparse);
    }

    #[test]
    fn fuse_inverted_mask_flips_the_predicate() {
        let layout = layout_4096();
        let mask: Vec<u8> = (0..layout.pix_n).map(|p| (p % 7 == 0) as u8).collect();

        let mut data: Vec<f32> = (0..layout.pix_n).map(|p| p as f32).collect();
        fuse_inverted_mask(&mut data, &mask, &layout);

        for p in 0..layout.pix_n as usize {
            if p % 7 != 0 {
                assert_eq!(data[p], INVALID);
            } else {
                assert_eq!(data[p], p as f32);
            }
        }
    }

    #[test]
    fn fuse_mask_into_copy_leaves_original_untouched() {
        let layout = layout_4096();
        let data: Vec<f32> = (0..layout.pix_n).map(|p| p as f32).collect();
        let mask: Vec<u8> = (0..layout.pix_n).map(|p| (p % 7 == 0) as u8).collect();

        let mut data_copy = data.clone();
        fuse_mask_into_copy(&data, &mut data_copy, &mask, &layout);

        // Original is untouched.
        assert_eq!(data, (0..layout.pix_n).map(|p| p as f32).collect::<Vec<_>>());
        assert_eq!(data_copy[7], INVALID);
        assert_eq!(data_copy[8], 8.0);
    }
}
