//! RBPF: the radial-background flood-fill peak finder. Combines a
//! precomputed [`RadialStats`] threshold table with an 8-connected
//! flood-fill over pixels that exceed their ring's threshold, then
//! re-estimates background locally around each candidate's centroid
//! before accepting or rejecting it.

mod scratch;

pub use scratch::RbpfScratch;

use crate::layout::DetectorLayout;
use crate::peaklist::{Peak, PeakList};
use crate::radial::RadialStats;

/// Errors that can occur while constructing an [`RbpfConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RbpfConfigError {
    /// `min_pix_count > max_pix_count`.
    InvertedPixCountRange { min: u32, max: u32 },
    /// `max_pix_count == 0`.
    ZeroMaxPixCount,
    /// `max_num_peaks == 0`.
    ZeroMaxPeaks,
    /// `local_bg_radius == 0`.
    ZeroLocalBgRadius,
}

impl std::error::Error for RbpfConfigError {}

impl std::fmt::Display for RbpfConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RbpfConfigError::InvertedPixCountRange { min, max } => write!(
                f,
                "min_pix_count ({}) must not exceed max_pix_count ({})",
                min, max
            ),
            RbpfConfigError::ZeroMaxPixCount => write!(f, "max_pix_count must be at least 1"),
            RbpfConfigError::ZeroMaxPeaks => write!(f, "max_num_peaks must be at least 1"),
            RbpfConfigError::ZeroLocalBgRadius => write!(f, "local_bg_radius must be at least 1"),
        }
    }
}

/// Configuration for [`Rbpf`].
#[derive(Debug, Clone, Copy)]
pub struct RbpfConfig {
    pub min_snr: f32,
    pub adc_threshold: f32,
    pub min_pix_count: u32,
    pub max_pix_count: u32,
    pub local_bg_radius: u32,
    pub max_num_peaks: usize,
}

impl RbpfConfig {
    /// Validates the configuration at construction time, so a bad config
    /// never surfaces as a runtime failure mid-scan.
    pub fn new(
        min_snr: f32,
        adc_threshold: f32,
        min_pix_count: u32,
        max_pix_count: u32,
        local_bg_radius: u32,
        max_num_peaks: usize,
    ) -> Result<Self, RbpfConfigError> {
        if max_pix_count == 0 {
            return Err(RbpfConfigError::ZeroMaxPixCount);
        }
        if min_pix_count > max_pix_count {
            return Err(RbpfConfigError::InvertedPixCountRange {
                min: min_pix_count,
                max: max_pix_count,
            });
        }
        if max_num_peaks == 0 {
            return Err(RbpfConfigError::ZeroMaxPeaks);
        }
        if local_bg_radius == 0 {
            return Err(RbpfConfigError::ZeroLocalBgRadius);
        }
        Ok(RbpfConfig {
            min_snr,
            adc_threshold,
            min_pix_count,
            max_pix_count,
            local_bg_radius,
            max_num_peaks,
        })
    }
}

/// The radial-background flood-fill peak finder.
pub struct Rbpf {
    config: RbpfConfig,
}

impl Rbpf {
    pub fn new(config: RbpfConfig) -> Self {
        if (config.local_bg_radius as u64) * 4 > u16::MAX as u64 {
            log::warn!(
                "RBPF local_bg_radius={} is unusually large; the local ring may rarely find in-bounds samples",
                config.local_bg_radius
            );
        }
        Rbpf { config }
    }

    pub fn config(&self) -> &RbpfConfig {
        &self.config
    }

    /// Runs the per-ASIC flood-fill peak search over one frame, appending
    /// accepted peaks into `peak_list`. `data` is read-only (RBPF never
    /// mutates its inputs); `mask` follows the RBPF convention (nonzero =
    /// valid).
    ///
    /// `scratch` must be sized for `layout` via [`RbpfScratch::new`]; it
    /// is cleared at the start of this call.
    pub fn find_peaks(
        &self,
        scratch: &mut RbpfScratch,
        data: &[f32],
        mask: &[u8],
        radius: &[f32],
        layout: &DetectorLayout,
        radial: &RadialStats,
        peak_list: &mut PeakList,
    ) {
        scratch.clear();
        let cfg = &self.config;

        'asics: for (ax, ay) in layout.iter_asics() {
            let (fs_lo, fs_hi, ss_lo, ss_hi) = layout.asic_bounds(ax, ay);

            for ss in (ss_lo + 1)..(ss_hi - 1) {
                for fs in (fs_lo + 1)..(fs_hi - 1) {
                    let p = layout.linear(fs, ss) as usize;
                    if scratch.is_claimed(p) || mask[p] == 0 {
                        continue;
                    }
                    let b = radial.bin_of(radius[p]);
                    if data[p] <= radial.bin(b).threshold {
                        continue;
                    }

                    flood_fill(scratch, data, mask, radius, radial, layout, (fs_lo, fs_hi, ss_lo, ss_hi), p);

                    let count = scratch.accepted().len();
                    if count < cfg.min_pix_count as usize || count > cfg.max_pix_count as usize {
                        continue;
                    }

                    if let Some(peak) = evaluate_candidate(
                        scratch,
                        data,
                        mask,
                        radius,
                        radial,
                        layout,
                        (fs_lo, fs_hi, ss_lo, ss_hi),
                        cfg,
                    ) {
                        let mut peak = peak;
                        peak.panel = Some((ay as u16) * layout.nasics_fs as u16 + ax as u16);
                        if !peak_list.push(peak) {
                            log::debug!("RBPF peak list reached capacity; remaining candidates dropped");
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
}

/// 8-connected iterative flood fill from seed pixel `seed`, bounded to the
/// current ASIC. Accepts pixels `q` where `data[q] > threshold[bin(q)]`,
/// not yet claimed, and `mask[q] != 0`. Writes accepted linear indices
/// into `scratch`'s accepted buffer and marks each visited pixel claimed.
fn flood_fill(
    scratch: &mut RbpfScratch,
    data: &[f32],
    mask: &[u8],
    radius: &[f32],
    radial: &RadialStats,
    layout: &DetectorLayout,
    asic_bounds: (u32, u32, u32, u32),
    seed: usize,
) {
    let (fs_lo, fs_hi, ss_lo, ss_hi) = asic_bounds;

    scratch.work_list_mut().clear();
    scratch.accepted_mut().clear();

    scratch.claim(seed);
    scratch.work_list_mut().push(seed as u32);
    scratch.accepted_mut().push(seed as u32);

    let mut cursor = 0usize;
    while cursor < scratch.work_list_mut().len() {
        let p = scratch.work_list_mut()[cursor] as u32;
        cursor += 1;
        let (fs, ss) = layout.coords(p);

        for dss in -1i32..=1 {
            for dfs in -1i32..=1 {
                if dfs == 0 && dss == 0 {
                    continue;
                }
                let nfs = fs as i32 + dfs;
                let nss = ss as i32 + dss;
                if nfs < fs_lo as i32 || nfs >= fs_hi as i32 || nss < ss_lo as i32 || nss >= ss_hi as i32 {
                    continue;
                }
                let q = layout.linear(nfs as u32, nss as u32) as usize;
                if scratch.is_claimed(q) || mask[q] == 0 {
                    continue;
                }
                let b = radial.bin_of(radius[q]);
                if data[q] <= radial.bin(b).threshold {
                    continue;
                }
                scratch.claim(q);
                scratch.work_list_mut().push(q as u32);
                scratch.accepted_mut().push(q as u32);
            }
        }
    }
}

/// Runs the size-check-survived candidate through local ring background
/// estimation, reintegration, and the final acceptance test. Returns
/// `None` if the candidate is rejected.
fn evaluate_candidate(
    scratch: &RbpfScratch,
    data: &[f32],
    mask: &[u8],
    radius: &[f32],
    radial: &RadialStats,
    layout: &DetectorLayout,
    asic_bounds: (u32, u32, u32, u32),
    cfg: &RbpfConfig,
) -> Option<Peak> {
    let accepted = scratch.accepted();
    // Step 4: preliminary COM from the raw radial-background-subtracted sums.
    let mut sum_i = 0.0f64;
    let mut sum_i_fs = 0.0f64;
    let mut sum_i_ss = 0.0f64;
    for &q in accepted {
        let (fs, ss) = layout.coords(q);
        let b = radial.bin_of(radius[q as usize]);
        let adj = data[q as usize] as f64 - radial.bin(b).offset as f64;
        sum_i += adj;
        sum_i_fs += adj * fs as f64;
        sum_i_ss += adj * ss as f64;
    }
    if sum_i.abs() < f64::EPSILON {
        return None;
    }
    let com_fs = (sum_i_fs / sum_i.abs()) as f32;
    let com_ss = (sum_i_ss / sum_i.abs()) as f32;

    // Step 5: local ring background over a square box of half-width
    // 2*local_bg_radius around the rounded COM, restricted to pixels
    // within Euclidean distance 2*local_bg_radius.
    let (fs_lo, fs_hi, ss_lo, ss_hi) = asic_bounds;
    let half_width = 2 * cfg.local_bg_radius as i64;
    let center_fs = com_fs.round() as i64;
    let center_ss = com_ss.round() as i64;

    let mut ring_sum = 0.0f64;
    let mut ring_sum_sq = 0.0f64;
    let mut ring_count = 0u64;
    let mut ring_max = f32::NEG_INFINITY;

    for dss in -half_width..=half_width {
        for dfs in -half_width..=half_width {
            let nfs = center_fs + dfs;
            let nss = center_ss + dss;
            if nfs < fs_lo as i64 || nfs >= fs_hi as i64 || nss < ss_lo as i64 || nss >= ss_hi as i64 {
                continue;
            }
            let dist2 = (dfs * dfs + dss * dss) as f64;
            if dist2 > (half_width * half_width) as f64 {
                continue;
            }
            let q = layout.linear(nfs as u32, nss as u32) as usize;
            if mask[q] == 0 {
                continue;
            }
            let b = radial.bin_of(radius[q]);
            let v = data[q];
            if v >= radial.bin(b).threshold {
                continue;
            }
            // The ring must exclude pixels already claimed by this (or
            // any other) cluster this frame -- global peak_mask state,
            // not just this candidate's own accepted set.
            if scratch.is_claimed(q) {
                continue;
            }
            ring_sum += v as f64;
            ring_sum_sq += (v as f64) * (v as f64);
            ring_count += 1;
            if v > ring_max {
                ring_max = v;
            }
        }
    }

    let (local_offset, local_sigma) = if ring_count == 0 {
        let center_p = layout.linear(center_fs.clamp(0, layout.pix_fs as i64 - 1) as u32, center_ss.clamp(0, layout.pix_ss as i64 - 1) as u32) as usize;
        let b = radial.bin_of(radius[center_p]);
        (radial.bin(b).offset, 0.01f32)
    } else {
        let mean = ring_sum / ring_count as f64;
        let var = (ring_sum_sq / ring_count as f64 - mean * mean).max(0.0);
        (mean as f32, var.sqrt() as f32)
    };

    // Step 6: reintegrate each recorded peak pixel against the local
    // background, strictly bounded below max_pix_count.
    let mut peak_tot = 0.0f64;
    let mut raw_tot = 0.0f64;
    let mut sum_fs = 0.0f64;
    let mut sum_ss = 0.0f64;
    let mut peak_max = f32::NEG_INFINITY;
    let mut raw_max = f32::NEG_INFINITY;

    let mut peak_idx = 0usize;
    while peak_idx < accepted.len() && peak_idx < cfg.max_pix_count as usize {
        let q = accepted[peak_idx];
        let (fs, ss) = layout.coords(q);
        let v = data[q as usize];
        let adj = v as f64 - local_offset as f64;
        peak_tot += adj;
        raw_tot += v as f64;
        sum_fs += adj * fs as f64;
        sum_ss += adj * ss as f64;
        if (adj as f32) > peak_max {
            peak_max = adj as f32;
        }
        if v > raw_max {
            raw_max = v;
        }
        peak_idx += 1;
    }
    let _ = raw_tot;
    let _ = raw_max;

    // Step 7: recompute COM, compute SNR.
    if peak_tot.abs() < f64::EPSILON {
        return None;
    }
    let final_com_fs = (sum_fs / peak_tot.abs()) as f32;
    let final_com_ss = (sum_ss / peak_tot.abs()) as f32;
    let snr = (peak_tot / local_sigma as f64) as f32;

    // Step 8: acceptance test.
    if snr < cfg.min_snr {
        return None;
    }
    if peak_max < ring_max - local_offset {
        return None;
    }
    if !layout.strictly_interior(final_com_fs, final_com_ss) {
        return None;
    }

    let linear_index = layout.linear(
        final_com_fs.round().clamp(0.0, layout.pix_fs as f32 - 1.0) as u32,
        final_com_ss.round().clamp(0.0, layout.pix_ss as f32 - 1.0) as u32,
    );

    Some(Peak {
        com_fs: final_com_fs,
        com_ss: final_com_ss,
        linear_index,
        intensity: peak_tot as f32,
        max_intensity: peak_max,
        sigma: local_sigma,
        snr,
        pixel_count: peak_idx as u32,
        panel: None,
    })
}
