//! `DetectorLayout` describes the static geometry of a detector frame:
//! ASIC tile size, tile grid, and the resulting pixel plane. It carries
//! no per-frame state and is constructed once per session (or whenever
//! the facility geometry changes).

/// Errors that can occur while constructing a [`DetectorLayout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// One of the ASIC or grid dimensions was zero.
    ZeroDimension,
    /// `pix_fs`/`pix_ss` (if supplied) disagreed with `asic_fs * nasics_fs`
    /// (or the `ss` analog).
    InconsistentGrid {
        expected_fs: u32,
        expected_ss: u32,
    },
}

impl std::error::Error for LayoutError {}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LayoutError::ZeroDimension => {
                write!(f, "detector layout has a zero-sized ASIC or grid dimension")
            }
            LayoutError::InconsistentGrid { expected_fs, expected_ss } => {
                write!(
                    f,
                    "inconsistent detector grid: expected pix_fs={}, pix_ss={}",
                    expected_fs, expected_ss
                )
            }
        }
    }
}

/// Describes a detector frame: `asic_fs x asic_ss` pixels per ASIC tile,
/// arranged in an `nasics_fs x nasics_ss` grid, giving a contiguous
/// row-major pixel plane of `pix_fs x pix_ss` pixels.
///
/// Linear index of pixel `(fs, ss)` is `ss * pix_fs + fs`. ASIC `(ax, ay)`
/// owns pixels with `fs` in `[ax*asic_fs, (ax+1)*asic_fs)` and analogously
/// for `ss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorLayout {
    pub asic_fs: u16,
    pub asic_ss: u16,
    pub nasics_fs: u8,
    pub nasics_ss: u8,
    pub pix_fs: u16,
    pub pix_ss: u16,
    pub pix_n: u32,
}

impl DetectorLayout {
    /// Builds a layout from ASIC tile size and grid shape, deriving
    /// `pix_fs`, `pix_ss`, and `pix_n`.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::ZeroDimension`] if any dimension is zero.
    pub fn new(
        asic_fs: u16,
        asic_ss: u16,
        nasics_fs: u8,
        nasics_ss: u8,
    ) -> Result<Self, LayoutError> {
        if asic_fs == 0 || asic_ss == 0 || nasics_fs == 0 || nasics_ss == 0 {
            return Err(LayoutError::ZeroDimension);
        }
        let pix_fs = asic_fs as u32 * nasics_fs as u32;
        let pix_ss = asic_ss as u32 * nasics_ss as u32;
        // ASIC grids in practice stay well under u16::MAX per axis; a
        // genuinely oversized configuration is a caller bug, not a
        // recoverable runtime condition.
        let pix_fs = u16::try_from(pix_fs).map_err(|_| LayoutError::InconsistentGrid {
            expected_fs: pix_fs,
            expected_ss: pix_ss,
        })?;
        let pix_ss = u16::try_from(pix_ss).map_err(|_| LayoutError::InconsistentGrid {
            expected_fs: pix_fs as u32,
            expected_ss: pix_ss,
        })?;
        let pix_n = pix_fs as u32 * pix_ss as u32;

        Ok(DetectorLayout {
            asic_fs,
            asic_ss,
            nasics_fs,
            nasics_ss,
            pix_fs,
            pix_ss,
            pix_n,
        })
    }

    /// Linear index of pixel `(fs, ss)` in the row-major pixel plane.
    #[inline]
    pub fn linear(&self, fs: u32, ss: u32) -> u32 {
        ss * self.pix_fs as u32 + fs
    }

    /// Inverse of [`DetectorLayout::linear`]: `(fs, ss)` for a linear index.
    #[inline]
    pub fn coords(&self, idx: u32) -> (u32, u32) {
        (idx % self.pix_fs as u32, idx / self.pix_fs as u32)
    }

    /// Total number of ASIC tiles in the grid.
    #[inline]
    pub fn num_asics(&self) -> u32 {
        self.nasics_fs as u32 * self.nasics_ss as u32
    }

    /// Iterates over `(ax, ay)` ASIC grid coordinates in row-major order
    /// (ay outer, ax inner), matching the per-ASIC scan order both RBPF
    /// and LWPF rely on to make capacity saturation deterministic.
    pub fn iter_asics(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        let nasics_fs = self.nasics_fs;
        (0..self.nasics_ss).flat_map(move |ay| (0..nasics_fs).map(move |ax| (ax, ay)))
    }

    /// The pixel-plane bounding box `(fs_lo, fs_hi, ss_lo, ss_hi)` owned by
    /// ASIC `(ax, ay)`; `fs_hi`/`ss_hi` are exclusive.
    #[inline]
    pub fn asic_bounds(&self, ax: u8, ay: u8) -> (u32, u32, u32, u32) {
        let fs_lo = ax as u32 * self.asic_fs as u32;
        let ss_lo = ay as u32 * self.asic_ss as u32;
        (fs_lo, fs_lo + self.asic_fs as u32, ss_lo, ss_lo + self.asic_ss as u32)
    }

    /// Returns `true` if `(fs, ss)` lies strictly inside some ASIC (i.e. not
    /// on the one-pixel border of whichever ASIC contains it). Used to
    /// validate RBPF's COM-inside-ASIC acceptance criterion.
    pub fn strictly_interior(&self, fs: f32, ss: f32) -> bool {
        if fs < 0.0 || ss < 0.0 {
            return false;
        }
        let (fs_u, ss_u) = (fs as u32, ss as u32);
        if fs_u >= self.pix_fs as u32 || ss_u >= self.pix_ss as u32 {
            return false;
        }
        let ax = fs_u / self.asic_fs as u32;
        let ay = ss_u / self.asic_ss as u32;
        let (fs_lo, fs_hi, ss_lo, ss_hi) = self.asic_bounds(ax as u8, ay as u8);
        fs > fs_lo as f32 && fs < (fs_hi - 1) as f32 && ss > ss_lo as f32 && ss < (ss_hi - 1) as f32
    }
}
