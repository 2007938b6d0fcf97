//! # braggpeak
//!
//! `braggpeak` is the diffraction-image peak-detection core of a
//! real-time X-ray imaging monitoring framework. It implements two
//! independent single-frame peak finders:
//!
//! - [`rbpf`] -- a global, radially-binned background model combined with
//!   a flood-fill connected-component search ([`rbpf::Rbpf`]).
//! - [`lwpf`] -- a per-ASIC local-maximum test with a ring-shaped
//!   background estimator and a radial-growth accumulator
//!   ([`lwpf::Lwpf`]).
//!
//! Both write their results into a caller-owned [`peaklist::PeakList`].
//! [`mask`] and [`layout`] are the shared collaborators: pixel-validity
//! bookkeeping and detector geometry, respectively.
//!
//! This crate does not read frames from disk, assemble detector geometry
//! into a lab frame, or aggregate peaks across frames -- those are the
//! surrounding monitor runtime's job. See each module's docs for the
//! exact per-frame contract.

pub mod layout;
pub mod mask;
pub mod parallel;
pub mod peaklist;
pub mod radial;

pub mod lwpf;
pub mod rbpf;

pub use layout::{DetectorLayout, LayoutError};
pub use lwpf::{Lwpf, LwpfConfig, LwpfConfigError};
pub use mask::{SparseMask, INVALID};
pub use peaklist::{Peak, PeakList};
pub use radial::{RadialConfig, RadialConfigError, RadialStats};
pub use rbpf::{Rbpf, RbpfConfig, RbpfConfigError, RbpfScratch};

/// Aggregated construction-time error for the peak-detection core.
/// Per-frame calls never fail at runtime: capacity saturation and
/// degenerate statistics are handled locally and recorded through the
/// `log` facade rather than surfaced as errors.
#[derive(Debug)]
pub enum BraggError {
    Layout(LayoutError),
    Radial(RadialConfigError),
    Rbpf(RbpfConfigError),
    Lwpf(LwpfConfigError),
}

impl From<LayoutError> for BraggError {
    fn from(err: LayoutError) -> Self {
        BraggError::Layout(err)
    }
}

impl From<RadialConfigError> for BraggError {
    fn from(err: RadialConfigError) -> Self {
        BraggError::Radial(err)
    }
}

impl From<RbpfConfigError> for BraggError {
    fn from(err: RbpfConfigError) -> Self {
        BraggError::Rbpf(err)
    }
}

impl From<LwpfConfigError> for BraggError {
    fn from(err: LwpfConfigError) -> Self {
        BraggError::Lwpf(err)
    }
}

impl std::error::Error for BraggError {}

impl std::fmt::Display for BraggError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            BraggError::Layout(err) => write!(f, "layout error: {}", err),
            BraggError::Radial(err) => write!(f, "radial stats error: {}", err),
            BraggError::Rbpf(err) => write!(f, "RBPF config error: {}", err),
            BraggError::Lwpf(err) => write!(f, "LWPF config error: {}", err),
        }
    }
}

/// One-shot convenience wrapper: builds a fresh [`RadialStats`],
/// calibrates it, runs [`Rbpf`] once, and returns the resulting
/// [`PeakList`]. For repeated calls across many frames, build
/// `RadialStats`/`Rbpf`/`RbpfScratch` once and call [`Rbpf::find_peaks`]
/// directly instead -- this wrapper recalibrates the radial background
/// on every call, which is wasteful for anything but a single frame.
pub fn find_peaks_rbpf(
    layout: &DetectorLayout,
    data: &[f32],
    mask: &[u8],
    radius: &[f32],
    radial_config: RadialConfig,
    rbpf_config: RbpfConfig,
    kmax: usize,
) -> Result<PeakList, BraggError> {
    let mut radial = RadialStats::new(radius, layout, &radial_config)?;
    radial.calibrate(data, mask, radius, layout, &radial_config);

    let rbpf = Rbpf::new(rbpf_config);
    let mut scratch = RbpfScratch::new(layout, rbpf_config.max_pix_count as usize);
    let mut peak_list = PeakList::new(kmax);
    rbpf.find_peaks(&mut scratch, data, mask, radius, layout, &radial, &mut peak_list);
    Ok(peak_list)
}

/// One-shot convenience wrapper around [`Lwpf::find_peaks`].
pub fn find_peaks_lwpf(
    layout: &DetectorLayout,
    data: &[f32],
    lwpf_config: LwpfConfig,
    kmax: usize,
) -> Result<PeakList, BraggError> {
    let lwpf = Lwpf::new(lwpf_config);
    let mut peak_list = PeakList::new(kmax);
    lwpf.find_peaks(data, layout, &mut peak_list);
    Ok(peak_list)
}


// --- C ABI surface -----------------------------------------------------
//
// A construct/free pair per detector, mirroring an open/close style FFI
// surface at a scope matching this crate's API: build a boxed detector
// from raw config fields so a surrounding process can drive detection
// without linking Rust directly.

/// Constructs a boxed [`Rbpf`] from raw config fields, returning a raw
/// pointer the caller owns. Returns a null pointer if the configuration
/// fails validation.
///
/// # Safety
///
/// The caller must eventually pass the returned pointer to
/// [`rbpf_free_extern`] exactly once, and must not use it after doing so.
#[no_mangle]
pub extern "C" fn rbpf_new_extern(
    min_snr: f32,
    adc_threshold: f32,
    min_pix_count: u32,
    max_pix_count: u32,
    local_bg_radius: u32,
    max_num_peaks: usize,
) -> *mut Rbpf {
    match RbpfConfig::new(
        min_snr,
        adc_threshold,
        min_pix_count,
        max_pix_count,
        local_bg_radius,
        max_num_peaks,
    ) {
        Ok(config) => Box::into_raw(Box::new(Rbpf::new(config))),
        Err(err) => {
            log::warn!("rbpf_new_extern: invalid configuration: {}", err);
            std::ptr::null_mut()
        }
    }
}

/// Frees an [`Rbpf`] constructed by [`rbpf_new_extern`].
///
/// # Safety
///
/// `ptr` must have been returned by [`rbpf_new_extern`] and not already
/// freed.
#[no_mangle]
pub unsafe extern "C" fn rbpf_free_extern(ptr: *mut Rbpf) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}

/// Constructs a boxed [`Lwpf`] from raw config fields; returns a null
/// pointer if the configuration is invalid (e.g. `window_radius < 2`).
///
/// # Safety
///
/// The caller must eventually pass the returned pointer to
/// [`lwpf_free_extern`] exactly once, and must not use it after doing so.
#[no_mangle]
pub extern "C" fn lwpf_new_extern(
    window_radius: u32,
    sigma_biggest: f32,
    sigma_peak_pixel: f32,
    sigma_whole_peak: f32,
    min_sigma: f32,
    min_oversize_neighbours: f32,
    max_num_peaks: usize,
    double_bg_window: bool,
) -> *mut Lwpf {
    match LwpfConfig::new(
        window_radius,
        sigma_biggest,
        sigma_peak_pixel,
        sigma_whole_peak,
        min_sigma,
        min_oversize_neighbours,
        max_num_peaks,
        double_bg_window,
    ) {
        Ok(config) => Box::into_raw(Box::new(Lwpf::new(config))),
        Err(err) => {
            log::warn!("lwpf_new_extern: invalid configuration: {}", err);
            std::ptr::null_mut()
        }
    }
}

/// Frees an [`Lwpf`] constructed by [`lwpf_new_extern`].
///
/// # Safety
///
/// `ptr` must have been returned by [`lwpf_new_extern`] and not already
/// freed.
#[no_mangle]
pub unsafe extern "C" fn lwpf_free_extern(ptr: *mut Lwpf) {
    if !ptr.is_null() {
        drop(Box::from_raw(ptr));
    }
}
