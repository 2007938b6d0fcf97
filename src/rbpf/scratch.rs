//! Per-session scratch buffers for [`super::Rbpf`]. Allocated once (or
//! whenever the detector layout changes) and reused frame to frame, so a
//! frame-level search never allocates beyond a handful of `Vec::push`
//! reallocations for an unusually large cluster.

use crate::layout::DetectorLayout;

/// Reusable flood-fill bookkeeping for one [`super::Rbpf`] instance.
pub struct RbpfScratch {
    /// `peak_mask[p]` is set once pixel `p` has been claimed by some
    /// flood-fill cluster this frame, accepted or not. A rejected
    /// candidate still leaves its mask entries set so the same cluster is
    /// never rescanned.
    peak_mask: Vec<bool>,
    /// Iterative flood-fill work list, not recursive; reused across
    /// candidates within a frame.
    work_list: Vec<u32>,
    /// Pixels accepted into the current candidate's cluster, as linear
    /// indices. Reused across candidates within a frame.
    accepted: Vec<u32>,
}

impl RbpfScratch {
    /// Allocates scratch buffers sized for a layout with `pix_n` pixels,
    /// pre-reserving `max_pix_count` of work-list/accepted-list capacity
    /// as a sizing hint -- a cluster is never reintegrated past that many
    /// pixels, though the underlying flood fill may still accumulate more
    /// before the size check rejects it.
    pub fn new(layout: &DetectorLayout, max_pix_count: usize) -> Self {
        RbpfScratch {
            peak_mask: vec![false; layout.pix_n as usize],
            work_list: Vec::with_capacity(max_pix_count),
            accepted: Vec::with_capacity(max_pix_count),
        }
    }

    /// Resets all per-frame state. Must be called once at the start of
    /// every [`super::Rbpf::find_peaks`] call.
    pub fn clear(&mut self) {
        self.peak_mask.iter_mut().for_each(|b| *b = false);
        self.work_list.clear();
        self.accepted.clear();
    }

    #[inline]
    pub(super) fn is_claimed(&self, p: usize) -> bool {
        self.peak_mask[p]
    }

    #[inline]
    pub(super) fn claim(&mut self, p: usize) {
        self.peak_mask[p] = true;
    }

    pub(super) fn work_list_mut(&mut self) -> &mut Vec<u32> {
        &mut self.work_list
    }

    pub(super) fn accepted_mut(&mut self) -> &mut Vec<u32> {
        &mut self.accepted
    }

    pub(super) fn accepted(&self) -> &[u32] {
        &self.accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_claims() {
        let layout = DetectorLayout::new(8, 8, 1, 1).unwrap();
        let mut scratch = RbpfScratch::new(&layout, 16);
        scratch.claim(3);
        assert!(scratch.is_claimed(3));
        scratch.clear();
        assert!(!scratch.is_claimed(3));
    }
}
