//! LWPF: the local-window peak finder. Tests each interior pixel as a
//! local-maximum candidate against a ring-sampled background, then grows
//! an accumulator outward in concentric square rings until it stops
//! picking up new pixels.
//!
//! LWPF reads `data` modulated by the in-band [`crate::mask::INVALID`]
//! sentinel; the caller (typically via [`crate::mask`]) is responsible
//! for stamping invalid pixels before calling [`Lwpf::find_peaks`].

use crate::layout::DetectorLayout;
use crate::mask::INVALID;
use crate::peaklist::{Peak, PeakList};

/// Errors that can occur while constructing an [`LwpfConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LwpfConfigError {
    /// `window_radius < 2`; the growth and ring-sampling geometry need at
    /// least that much room.
    WindowRadiusTooSmall { got: u32 },
    /// `max_num_peaks == 0`.
    ZeroMaxPeaks,
}

impl std::error::Error for LwpfConfigError {}

impl std::fmt::Display for LwpfConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LwpfConfigError::WindowRadiusTooSmall { got } => {
                write!(f, "window_radius must be at least 2, got {}", got)
            }
            LwpfConfigError::ZeroMaxPeaks => write!(f, "max_num_peaks must be at least 1"),
        }
    }
}

/// Configuration for [`Lwpf`].
#[derive(Debug, Clone, Copy)]
pub struct LwpfConfig {
    pub window_radius: u32,
    pub sigma_biggest: f32,
    pub sigma_peak_pixel: f32,
    pub sigma_whole_peak: f32,
    pub min_sigma: f32,
    pub min_oversize_neighbours: f32,
    pub max_num_peaks: usize,
    /// When set, the background ring is also sampled at `window_radius +
    /// 1`, doubling the number of border samples the mean/sigma estimate
    /// is drawn from.
    pub double_bg_window: bool,
}

impl LwpfConfig {
    pub fn new(
        window_radius: u32,
        sigma_biggest: f32,
        sigma_peak_pixel: f32,
        sigma_whole_peak: f32,
        min_sigma: f32,
        min_oversize_neighbours: f32,
        max_num_peaks: usize,
        double_bg_window: bool,
    ) -> Result<Self, LwpfConfigError> {
        if window_radius < 2 {
            return Err(LwpfConfigError::WindowRadiusTooSmall { got: window_radius });
        }
        if max_num_peaks == 0 {
            return Err(LwpfConfigError::ZeroMaxPeaks);
        }
        Ok(LwpfConfig {
            window_radius,
            sigma_biggest,
            sigma_peak_pixel,
            sigma_whole_peak,
            min_sigma,
            min_oversize_neighbours,
            max_num_peaks,
            double_bg_window,
        })
    }
}

/// The local-window peak finder.
pub struct Lwpf {
    config: LwpfConfig,
}

impl Lwpf {
    pub fn new(config: LwpfConfig) -> Self {
        Lwpf { config }
    }

    pub fn config(&self) -> &LwpfConfig {
        &self.config
    }

    /// Scans every interior pixel of every ASIC (margin `window_radius`
    /// from ASIC edges, or `window_radius + 1` when `double_bg_window` is
    /// set, since the background ring then samples one pixel further out)
    /// for local maxima, appending accepted peaks into `peak_list`. `data`
    /// must already have invalid pixels stamped with [`INVALID`]; LWPF does
    /// not mutate `data` itself.
    pub fn find_peaks(&self, data: &[f32], layout: &DetectorLayout, peak_list: &mut PeakList) {
        let cfg = &self.config;
        let r = cfg.window_radius as i64;
        // background_estimate samples a ring one pixel further out when
        // double_bg_window is set, so the scan margin must widen to match
        // or that ring read runs past the ASIC edge.
        let margin = if cfg.double_bg_window { r + 1 } else { r };

        'asics: for (ax, ay) in layout.iter_asics() {
            let (fs_lo, fs_hi, ss_lo, ss_hi) = layout.asic_bounds(ax, ay);

            for ss in (ss_lo as i64 + margin)..(ss_hi as i64 - margin) {
                for fs in (fs_lo as i64 + margin)..(fs_hi as i64 - margin) {
                    let center = layout.linear(fs as u32, ss as u32) as usize;
                    let center_v = data[center];
                    if center_v == INVALID {
                        continue;
                    }

                    if !is_local_maximum_candidate(data, layout, fs, ss, r, cfg.min_oversize_neighbours, center_v) {
                        continue;
                    }

                    let (mean, sigma) = background_estimate(data, layout, fs, ss, r, cfg);
                    if center_v <= mean + cfg.sigma_biggest * sigma {
                        continue;
                    }

                    let (total, wx, wy, max_val, count) =
                        grow_peak(data, layout, fs, ss, r, mean, sigma, cfg.sigma_peak_pixel, center_v);

                    if total <= mean + cfg.sigma_whole_peak * sigma {
                        continue;
                    }

                    let intensity = total - count as f32 * mean;
                    let snr = intensity / sigma;
                    let peak = Peak {
                        com_fs: wx / total,
                        com_ss: wy / total,
                        linear_index: layout.linear(
                            (wx / total).round().clamp(0.0, layout.pix_fs as f32 - 1.0) as u32,
                            (wy / total).round().clamp(0.0, layout.pix_ss as f32 - 1.0) as u32,
                        ),
                        intensity,
                        max_intensity: max_val,
                        sigma,
                        snr,
                        pixel_count: count,
                        panel: None,
                    };

                    if !peak_list.push(peak) {
                        log::debug!("LWPF peak list reached capacity; remaining candidates dropped");
                        break 'asics;
                    }
                    if peak_list.is_full() {
                        break 'asics;
                    }
                }
            }
        }
    }
}

/// Step 1: local-maximum candidate test. Compares the 8 immediate
/// neighbors and the 12 far-ring neighbors at Chebyshev distance `r`
/// (4 cardinal + 8 diagonal-ish border points).
fn is_local_maximum_candidate(
    data: &[f32],
    layout: &DetectorLayout,
    fs: i64,
    ss: i64,
    r: i64,
    min_oversize_neighbours: f32,
    center: f32,
) -> bool {
    for dss in -1i64..=1 {
        for dfs in -1i64..=1 {
            if dfs == 0 && dss == 0 {
                continue;
            }
            let v = data[layout.linear((fs + dfs) as u32, (ss + dss) as u32) as usize];
            if v != INVALID && center <= v {
                return false;
            }
        }
    }

    let far_offsets: [(i64, i64); 12] = [
        (r, 0),
        (-r, 0),
        (0, r),
        (0, -r),
        (r, 1),
        (r, -1),
        (-r, 1),
        (-r, -1),
        (1, r),
        (-1, r),
        (1, -r),
        (-1, -r),
    ];
    let threshold = center - min_oversize_neighbours;
    for (dfs, dss) in far_offsets {
        let v = data[layout.linear((fs + dfs) as u32, (ss + dss) as u32) as usize];
        if v != INVALID && threshold <= v {
            return false;
        }
    }
    true
}

/// Step 2: ring-sampled background estimate at Chebyshev radius `r`
/// around `(fs, ss)`: the 5-pixel runs on each of the four borders, plus
/// (when `double_bg_window` is set) the equivalent runs at `r + 1`.
fn background_estimate(
    data: &[f32],
    layout: &DetectorLayout,
    fs: i64,
    ss: i64,
    r: i64,
    cfg: &LwpfConfig,
) -> (f32, f32) {
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut n = 0u64;

    let mut sample_ring = |radius: i64| {
        for d in -2i64..=2 {
            // top and bottom borders
            for &side in &[-radius, radius] {
                let v = data[layout.linear((fs + d) as u32, (ss + side) as u32) as usize];
                if v != INVALID {
                    sum += v as f64;
                    sum_sq += (v as f64) * (v as f64);
                    n += 1;
                }
            }
            // left and right borders
            for &side in &[-radius, radius] {
                let v = data[layout.linear((fs + side) as u32, (ss + d) as u32) as usize];
                if v != INVALID {
                    sum += v as f64;
                    sum_sq += (v as f64) * (v as f64);
                    n += 1;
                }
            }
        }
    };

    sample_ring(r);
    if cfg.double_bg_window {
        sample_ring(r + 1);
    }

    if n < 4 {
        return (f32::INFINITY, f32::INFINITY);
    }

    let mean = sum / n as f64;
    let var = (sum_sq - mean * mean * n as f64) / (n as f64 - 1.0);
    let sigma = (var.max(0.0)).sqrt().max(cfg.min_sigma as f64);
    (mean as f32, sigma as f32)
}

/// Step 4: grows the peak accumulator outward in concentric square rings
/// of radius `1..window_radius`, stopping the moment a ring adds nothing.
fn grow_peak(
    data: &[f32],
    layout: &DetectorLayout,
    fs: i64,
    ss: i64,
    max_r: i64,
    mean: f32,
    sigma: f32,
    sigma_peak_pixel: f32,
    center_v: f32,
) -> (f32, f32, f32, f32, u32) {
    let mut total = center_v;
    let mut wx = fs as f32 * center_v;
    let mut wy = ss as f32 * center_v;
    let mut max_val = center_v;
    let mut count = 1u32;

    let threshold = mean + sigma_peak_pixel * sigma;

    for radius in 1..max_r {
        let mut added_this_ring = false;
        for (dfs, dss) in square_ring_offsets(radius) {
            let nfs = fs + dfs;
            let nss = ss + dss;
            let v = data[layout.linear(nfs as u32, nss as u32) as usize];
            if v == INVALID || v <= threshold {
                continue;
            }
            total += v;
            wx += nfs as f32 * v;
            wy += nss as f32 * v;
            count += 1;
            added_this_ring = true;
            if v > max_val {
                max_val = v;
            }
        }
        if !added_this_ring {
            break;
        }
    }

    (total, wx, wy, max_val, count)
}

/// Offsets `(dfs, dss)` of the square Chebyshev ring at the given radius,
/// traversed once each (no duplicate corners).
fn square_ring_offsets(radius: i64) -> impl Iterator<Item = (i64, i64)> {
    (-radius..=radius).flat_map(move |d| {
        let top = (d, -radius);
        let bottom = (d, radius);
        let left = (-radius, d);
        let right = (radius, d);
        let mut pts = vec![top, bottom];
        if d != -radius && d != radius {
            pts.push(left);
            pts.push(right);
        }
        pts.into_iter()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_frame(layout: &DetectorLayout, cx: f32, cy: f32, amp: f32, sigma: f32) -> Vec<f32> {
        let n = layout.pix_n as usize;
        (0..n)
            .map(|p| {
                let (fs, ss) = layout.coords(p as u32);
                let dx = fs as f32 - cx;
                let dy = ss as f32 - cy;
                100.0 + amp * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
            })
            .collect()
    }

    fn default_config() -> LwpfConfig {
        LwpfConfig::new(4, 5.0, 4.0, 6.0, 1.0, 0.0, 100, false).unwrap()
    }

    #[test]
    fn finds_single_gaussian_peak() {
        let layout = DetectorLayout::new(64, 64, 1, 1).unwrap();
        let data = gaussian_frame(&layout, 32.0, 32.0, 1000.0, 1.5);
        let lwpf = Lwpf::new(default_config());
        let mut peak_list = PeakList::new(10);

        lwpf.find_peaks(&data, &layout, &mut peak_list);

        assert_eq!(peak_list.len(), 1);
        let peak = &peak_list.peaks()[0];
        assert!((peak.com_fs - 32.0).abs() < 0.1);
        assert!((peak.com_ss - 32.0).abs() < 0.1);
        assert!(peak.pixel_count >= 5 && peak.pixel_count <= 25);
        assert!((peak.max_intensity - 1100.0).abs() < 5.0);
    }

    #[test]
    fn rejects_peak_inside_border_margin() {
        let layout = DetectorLayout::new(64, 64, 1, 1).unwrap();
        let data = gaussian_frame(&layout, 3.0, 32.0, 1000.0, 1.5);
        let lwpf = Lwpf::new(default_config());
        let mut peak_list = PeakList::new(10);

        lwpf.find_peaks(&data, &layout, &mut peak_list);

        assert_eq!(peak_list.len(), 0);
    }

    #[test]
    fn construction_rejects_small_window_radius() {
        assert!(matches!(
            LwpfConfig::new(1, 5.0, 4.0, 6.0, 1.0, 0.0, 100, false),
            Err(LwpfConfigError::WindowRadiusTooSmall { got: 1 })
        ));
    }

    #[test]
    fn plateau_peak_ring_growth_terminates() {
        // A flat plateau peak exercises the ring-growth stopping condition:
        // growth must halt once a ring adds no new pixels, rather than
        // running all the way to window_radius regardless.
        let layout = DetectorLayout::new(32, 32, 1, 1).unwrap();
        let data = gaussian_frame(&layout, 16.0, 16.0, 500.0, 2.0);
        let lwpf = Lwpf::new(LwpfConfig::new(4, 3.0, 2.0, 3.0, 1.0, 0.0, 10, false).unwrap());
        let mut peak_list = PeakList::new(10);

        lwpf.find_peaks(&data, &layout, &mut peak_list);
        assert_eq!(peak_list.len(), 1);
        assert!(peak_list.peaks()[0].pixel_count >= 1);
    }

    #[test]
    fn double_bg_window_does_not_read_past_asic_edge() {
        // With window_radius=4 and the old (unwidened) margin of 4, a
        // candidate at ss=59 in a 64-row ASIC would make
        // background_estimate's r+1 ring sample ss=64, one row past the
        // last valid row -- out of bounds. The widened margin must keep
        // this position out of the scan entirely.
        let layout = DetectorLayout::new(64, 64, 1, 1).unwrap();
        let cfg = LwpfConfig::new(4, 5.0, 4.0, 6.0, 1.0, 0.0, 100, true).unwrap();
        let data = gaussian_frame(&layout, 32.0, 59.0, 1000.0, 1.0);
        let lwpf = Lwpf::new(cfg);
        let mut peak_list = PeakList::new(10);

        lwpf.find_peaks(&data, &layout, &mut peak_list);
        assert_eq!(peak_list.len(), 0);
    }

    #[test]
    fn capacity_saturation_retains_first_peaks_in_scan_order() {
        let layout = DetectorLayout::new(64, 64, 2, 2).unwrap();
        let n = layout.pix_n as usize;
        let mut data = vec![100.0f32; n];
        for ay in 0..2u8 {
            for ax in 0..2u8 {
                for i in 0..3 {
                    let cx = ax as f32 * 64.0 + 10.0 + i as f32 * 15.0;
                    let cy = ay as f32 * 64.0 + 10.0;
                    for p in 0..n {
                        let (fs, ss) = layout.coords(p as u32);
                        let dx = fs as f32 - cx;
                        let dy = ss as f32 - cy;
                        data[p] += 800.0 * (-(dx * dx + dy * dy) / (2.0 * 0.8 * 0.8)).exp();
                    }
                }
            }
        }
        let lwpf = Lwpf::new(LwpfConfig::new(4, 5.0, 4.0, 6.0, 1.0, 0.0, 4, false).unwrap());
        let mut peak_list = PeakList::new(4);
        lwpf.find_peaks(&data, &layout, &mut peak_list);
        assert_eq!(peak_list.len(), 4);
    }
}
