//! Frame-level parallelism helpers. The peak-detection core itself is
//! single-threaded per frame; distinct frames may be processed
//! concurrently, each with its own [`PeakList`] and RBPF/LWPF scratch, but
//! sharing one read-only [`RadialStats`] snapshot.
//!
//! This is a simplified descendant of a `parallelize_op!`-style helper
//! that re-opens a file handle per chunk when frames live on disk; here
//! every frame already lives in memory, so a direct `rayon` `par_iter`
//! over owned per-frame buffers is enough and that file-reopening
//! machinery doesn't apply.

use rayon::prelude::*;

use crate::layout::DetectorLayout;
use crate::peaklist::PeakList;
use crate::radial::RadialStats;
use crate::rbpf::{Rbpf, RbpfScratch};
use crate::lwpf::Lwpf;

/// One frame's RBPF inputs: intensity data, RBPF-convention mask (nonzero
/// = valid), and per-pixel radius.
pub struct RbpfFrame<'a> {
    pub data: &'a [f32],
    pub mask: &'a [u8],
    pub radius: &'a [f32],
}

/// Runs RBPF over every frame in `frames` concurrently, returning one
/// [`PeakList`] per frame in input order. Each worker gets its own
/// [`RbpfScratch`] and [`PeakList`]; `radial` is shared read-only across
/// all workers.
pub fn find_peaks_rbpf_many(
    rbpf: &Rbpf,
    radial: &RadialStats,
    layout: &DetectorLayout,
    frames: &[RbpfFrame<'_>],
    kmax: usize,
) -> Vec<PeakList> {
    frames
        .par_iter()
        .map(|frame| {
            let mut scratch = RbpfScratch::new(layout, rbpf.config().max_pix_count as usize);
            let mut peak_list = PeakList::new(kmax);
            rbpf.find_peaks(
                &mut scratch,
                frame.data,
                frame.mask,
                frame.radius,
                layout,
                radial,
                &mut peak_list,
            );
            peak_list
        })
        .collect()
}

/// Runs LWPF over every frame's data buffer concurrently, returning one
/// [`PeakList`] per frame in input order. Each frame's buffer must
/// already carry the invalid-pixel sentinel; since LWPF reads but does
/// not need to mutate the caller's copy for this convenience wrapper,
/// callers pass owned buffers.
pub fn find_peaks_lwpf_many(
    lwpf: &Lwpf,
    layout: &DetectorLayout,
    frames: &[Vec<f32>],
    kmax: usize,
) -> Vec<PeakList> {
    frames
        .par_iter()
        .map(|data| {
            let mut peak_list = PeakList::new(kmax);
            lwpf.find_peaks(data, layout, &mut peak_list);
            peak_list
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radial::RadialConfig;
    use crate::rbpf::RbpfConfig;
    use crate::lwpf::LwpfConfig;

    #[test]
    fn rbpf_many_preserves_frame_order() {
        let layout = DetectorLayout::new(64, 64, 1, 1).unwrap();
        let n = layout.pix_n as usize;
        let mask = vec![1u8; n];
        let radius: Vec<f32> = (0..n).map(|p| (p as f32 / n as f32) * 100.0).collect();

        let mut frames_data = Vec::new();
        for i in 0..4 {
            let mut data = vec![100.0f32; n];
            let cx = 10.0 + i as f32 * 10.0;
            for p in 0..n {
                let (fs, ss) = layout.coords(p as u32);
                let dx = fs as f32 - cx;
                let dy = ss as f32 - 32.0;
                data[p] += 800.0 * (-(dx * dx + dy * dy) / (2.0 * 1.0)).exp();
            }
            frames_data.push(data);
        }

        let mut radial = RadialStats::new(&radius, &layout, &RadialConfig::default()).unwrap();
        radial.calibrate(&frames_data[0], &mask, &radius, &layout, &RadialConfig::default());

        let rbpf = Rbpf::new(RbpfConfig::new(5.0, 0.0, 1, 30, 3, 10).unwrap());
        let frames: Vec<RbpfFrame> = frames_data
            .iter()
            .map(|data| RbpfFrame { data, mask: &mask, radius: &radius })
            .collect();

        let results = find_peaks_rbpf_many(&rbpf, &radial, &layout, &frames, 10);
        assert_eq!(results.len(), 4);
        for (i, peak_list) in results.iter().enumerate() {
            assert_eq!(peak_list.len(), 1);
            let expected_cx = 10.0 + i as f32 * 10.0;
            assert!((peak_list.peaks()[0].com_fs - expected_cx).abs() < 0.5);
        }
    }

    #[test]
    fn lwpf_many_runs_independently_per_frame() {
        let layout = DetectorLayout::new(64, 64, 1, 1).unwrap();
        let n = layout.pix_n as usize;
        let lwpf = Lwpf::new(LwpfConfig::new(4, 5.0, 4.0, 6.0, 1.0, 0.0, 10, false).unwrap());

        let mut frames = Vec::new();
        for i in 0..3 {
            let mut data = vec![100.0f32; n];
            let cx = 20.0 + i as f32 * 5.0;
            for p in 0..n {
                let (fs, ss) = layout.coords(p as u32);
                let dx = fs as f32 - cx;
                let dy = ss as f32 - 32.0;
                data[p] += 1000.0 * (-(dx * dx + dy * dy) / (2.0 * 1.5 * 1.5)).exp();
            }
            frames.push(data);
        }

        let results = find_peaks_lwpf_many(&lwpf, &layout, &frames, 10);
        assert_eq!(results.len(), 3);
        for peak_list in &results {
            assert_eq!(peak_list.len(), 1);
        }
    }
}
