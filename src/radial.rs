//! `RadialStats` builds the per-radial-bin background+noise model RBPF
//! thresholds against. Calibration runs a handful of passes that exclude
//! pixels above the previous pass's threshold, so the offset and sigma
//! converge on the local non-peak distribution in each ring.

use itertools::izip;

use crate::layout::DetectorLayout;

/// Errors that can occur while constructing [`RadialStats`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RadialConfigError {
    /// `iterations == 0`; calibration would never run.
    ZeroIterations,
    /// The radius map's length did not match `layout.pix_n`.
    RadiusLenMismatch { expected: u32, got: u32 },
}

impl std::error::Error for RadialConfigError {}

impl std::fmt::Display for RadialConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RadialConfigError::ZeroIterations => {
                write!(f, "radial stats iterations must be at least 1")
            }
            RadialConfigError::RadiusLenMismatch { expected, got } => {
                write!(f, "radius map length {} does not match pix_n {}", got, expected)
            }
        }
    }
}

/// Per-ring background statistics, keyed by `rbin = round(radius[pixel])`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadialBin {
    pub offset: f32,
    pub sigma: f32,
    pub count: u32,
    pub threshold: f32,
}

/// Configuration for a [`RadialStats`] calibration pass.
#[derive(Debug, Clone, Copy)]
pub struct RadialConfig {
    pub min_snr: f32,
    pub adc_threshold: f32,
    pub iterations: u32,
}

impl Default for RadialConfig {
    fn default() -> Self {
        RadialConfig {
            min_snr: 5.0,
            adc_threshold: 0.0,
            iterations: 5,
        }
    }
}

/// A radial background model: one [`RadialBin`] per integer radius bin,
/// `bin_count = ceil(max(radius)) + 1`.
pub struct RadialStats {
    bins: Vec<RadialBin>,
}

impl RadialStats {
    /// Allocates a radial stats table sized to cover `radius`'s maximum
    /// value, with every bin initialized to `threshold = +inf` (so the
    /// first calibration pass admits every valid pixel).
    ///
    /// `config` is validated here rather than in `calibrate` so a
    /// zero-iteration configuration is rejected before any calibration
    /// pass ever runs.
    ///
    /// # Errors
    ///
    /// Returns [`RadialConfigError::ZeroIterations`] if `config.iterations
    /// == 0`, or [`RadialConfigError::RadiusLenMismatch`] if
    /// `radius.len() != layout.pix_n`.
    pub fn new(
        radius: &[f32],
        layout: &DetectorLayout,
        config: &RadialConfig,
    ) -> Result<Self, RadialConfigError> {
        if config.iterations == 0 {
            return Err(RadialConfigError::ZeroIterations);
        }
        if radius.len() != layout.pix_n as usize {
            return Err(RadialConfigError::RadiusLenMismatch {
                expected: layout.pix_n,
                got: radius.len() as u32,
            });
        }
        let max_radius = radius.iter().cloned().fold(0.0f32, f32::max);
        let bin_count = max_radius.ceil() as usize + 1;
        Ok(RadialStats {
            bins: vec![
                RadialBin {
                    offset: 0.0,
                    sigma: 0.0,
                    count: 0,
                    threshold: f32::INFINITY,
                };
                bin_count
            ],
        })
    }

    /// Number of radial bins in the table.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Read-only access to a bin's statistics.
    pub fn bin(&self, b: usize) -> RadialBin {
        self.bins[b]
    }

    /// `round(radius[p])` clamped into the valid bin range. Radius values
    /// are always nonnegative, so `bin(0)` is reachable without any
    /// special-casing for negative radii.
    #[inline]
    pub fn bin_of(&self, r: f32) -> usize {
        (r.round() as usize).min(self.bins.len() - 1)
    }

    /// Runs `config.iterations` calibration passes over `data`/`mask`/
    /// `radius`. `mask` follows the RBPF convention: nonzero = valid.
    ///
    /// Intermediate accumulators (`offset`, `sigma2`) are carried in `f64`
    /// even though the stored, published statistics are `f32`, matching
    /// the numeric-precision contract these statistics are published under.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()`, `mask.len()`, or `radius.len()` is smaller
    /// than `layout.pix_n`.
    pub fn calibrate(
        &mut self,
        data: &[f32],
        mask: &[u8],
        radius: &[f32],
        layout: &DetectorLayout,
        config: &RadialConfig,
    ) {
        let n = layout.pix_n as usize;
        let nbins = self.bins.len();

        let mut offset64 = vec![0.0f64; nbins];
        let mut sigma2_64 = vec![0.0f64; nbins];
        let mut count = vec![0u32; nbins];

        for _pass in 0..config.iterations {
            offset64.iter_mut().for_each(|v| *v = 0.0);
            sigma2_64.iter_mut().for_each(|v| *v = 0.0);
            count.iter_mut().for_each(|v| *v = 0);

            for (&v, &m, &r) in izip!(&data[..n], &mask[..n], &radius[..n]) {
                if m == 0 {
                    continue;
                }
                let b = self.bin_of(r);
                if v < self.bins[b].threshold {
                    offset64[b] += v as f64;
                    sigma2_64[b] += (v as f64) * (v as f64);
                    count[b] += 1;
                }
            }

            let mut degenerate = 0usize;
            for b in 0..nbins {
                if count[b] == 0 {
                    self.bins[b] = RadialBin {
                        offset: 0.0,
                        sigma: 0.0,
                        count: 0,
                        threshold: f32::INFINITY,
                    };
                    degenerate += 1;
                } else {
                    let n_b = count[b] as f64;
                    let mean = offset64[b] / n_b;
                    let var = (sigma2_64[b] / n_b - mean * mean).max(0.0);
                    let sigma = var.sqrt();
                    let threshold =
                        (config.adc_threshold as f64).max(mean + config.min_snr as f64 * sigma);
                    self.bins[b] = RadialBin {
                        offset: mean as f32,
                        sigma: sigma as f32,
                        count: count[b],
                        threshold: threshold as f32,
                    };
                }
            }
            if degenerate > 0 {
                log::debug!(
                    "radial stats calibration pass finished with {} empty bin(s) out of {}",
                    degenerate,
                    nbins
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_layout() -> DetectorLayout {
        DetectorLayout::new(64, 64, 1, 1).unwrap()
    }

    #[test]
    fn rejects_mismatched_radius_length() {
        let layout = flat_layout();
        let radius = vec![0.0f32; 10];
        assert!(matches!(
            RadialStats::new(&radius, &layout, &RadialConfig::default()),
            Err(RadialConfigError::RadiusLenMismatch { .. })
        ));
    }

    #[test]
    fn rejects_zero_iterations() {
        let layout = flat_layout();
        let radius = vec![0.0f32; layout.pix_n as usize];
        let config = RadialConfig {
            min_snr: 5.0,
            adc_threshold: 0.0,
            iterations: 0,
        };
        assert!(matches!(
            RadialStats::new(&radius, &layout, &config),
            Err(RadialConfigError::ZeroIterations)
        ));
    }

    #[test]
    fn empty_bins_get_infinite_threshold() {
        let layout = DetectorLayout::new(4, 4, 1, 1).unwrap();
        let n = layout.pix_n as usize;
        // radius[p] = 100 for all p except one pixel at radius 0; bin 0
        // will have a single contributing pixel's worth of data, all
        // other bins up to 99 are empty.
        let mut radius = vec![100.0f32; n];
        radius[0] = 0.0;
        let mask = vec![1u8; n];
        let data = vec![10.0f32; n];

        let mut stats = RadialStats::new(&radius, &layout, &RadialConfig::default()).unwrap();
        stats.calibrate(&data, &mask, &radius, &layout, &RadialConfig::default());

        let empty_bin = stats.bin(1);
        assert_eq!(empty_bin.count, 0);
        assert_eq!(empty_bin.threshold, f32::INFINITY);
    }

    #[test]
    fn converges_on_flat_noisy_background() {
        let layout = DetectorLayout::new(64, 64, 1, 1).unwrap();
        let n = layout.pix_n as usize;

        // Deterministic pseudo-noise around 100 with a spread of ~2,
        // no injected peaks, radius grows monotonically with pixel index
        // so bins fill up predictably.
        let mut state: u64 = 0x2545F4914F6CDD1D;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        let data: Vec<f32> = (0..n)
            .map(|_| {
                let bits = next();
                let unit = (bits % 10_000) as f32 / 10_000.0; // [0, 1)
                100.0 + (unit - 0.5) * 4.0 * 2.0_f32.sqrt()
            })
            .collect();
        let radius: Vec<f32> = (0..n).map(|p| (p as f32 / n as f32) * 500.0).collect();
        let mask = vec![1u8; n];

        let mut stats = RadialStats::new(&radius, &layout, &RadialConfig::default()).unwrap();
        stats.calibrate(&data, &mask, &radius, &layout, &RadialConfig::default());

        for b in 0..stats.bin_count() {
            let bin = stats.bin(b);
            if bin.count >= 30 {
                assert!((bin.offset - 100.0).abs() < 1.0, "bin {} offset {}", b, bin.offset);
            }
        }
    }

    #[test]
    fn zero_radius_lands_in_bin_zero() {
        let layout = flat_layout();
        let radius = vec![0.0f32; layout.pix_n as usize];
        let stats = RadialStats::new(&radius, &layout, &RadialConfig::default()).unwrap();
        assert_eq!(stats.bin_of(0.0), 0);
        assert_eq!(stats.bin_count(), 1);
    }
}
