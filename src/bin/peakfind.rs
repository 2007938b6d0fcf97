use std::env;
use std::fs;

use braggpeak::{
    find_peaks_lwpf, find_peaks_rbpf, DetectorLayout, LwpfConfig, RadialConfig, RbpfConfig,
};

const USE_MESSAGE: &str = "\x1b[31mUsage: peakfind <frame_file> \
    -g <asic_fs> <asic_ss> <nasics_fs> <nasics_ss> \
    [-a rbpf|lwpf] [-k <max_peaks>]\x1b[0m";

macro_rules! send_use_msg {
    () => {
        panic!("{}", USE_MESSAGE)
    };
}

/// Runs a peak finder over a single frame stored as a flat, little-endian
/// `f32` binary dump (row-major, `pix_fs * pix_ss` values). Intended for
/// quick inspection of a captured frame outside the surrounding monitor
/// runtime.
///
/// # Example
///
/// ```text
/// peakfind frame.bin -g 256 256 2 2 -a rbpf -k 128
/// ```
fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        send_use_msg!();
    }
    let frame_path = &args[1];

    let mut geometry: Option<(u16, u16, u8, u8)> = None;
    let mut algorithm = "rbpf".to_string();
    let mut kmax: usize = 256;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "-g" => {
                if i + 4 >= args.len() {
                    send_use_msg!();
                }
                let asic_fs = args[i + 1].parse().unwrap_or_else(|_| send_use_msg!());
                let asic_ss = args[i + 2].parse().unwrap_or_else(|_| send_use_msg!());
                let nasics_fs = args[i + 3].parse().unwrap_or_else(|_| send_use_msg!());
                let nasics_ss = args[i + 4].parse().unwrap_or_else(|_| send_use_msg!());
                geometry = Some((asic_fs, asic_ss, nasics_fs, nasics_ss));
                i += 5;
            }
            "-a" => {
                algorithm = args.get(i + 1).cloned().unwrap_or_else(|| send_use_msg!());
                i += 2;
            }
            "-k" => {
                kmax = args
                    .get(i + 1)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| send_use_msg!());
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let (asic_fs, asic_ss, nasics_fs, nasics_ss) = geometry.unwrap_or_else(|| send_use_msg!());
    let layout = DetectorLayout::new(asic_fs, asic_ss, nasics_fs, nasics_ss)
        .expect("valid detector geometry");

    let raw = fs::read(frame_path).expect("failed to read frame file");
    let n = layout.pix_n as usize;
    if raw.len() != n * 4 {
        panic!(
            "frame file has {} bytes, expected {} ({} pixels x 4 bytes)",
            raw.len(),
            n * 4,
            n
        );
    }
    let data: Vec<f32> = raw
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    match algorithm.as_str() {
        "rbpf" => {
            let mask = vec![1u8; n];
            let radius = radial_distance_from_center(&layout);
            let peaks = find_peaks_rbpf(
                &layout,
                &data,
                &mask,
                &radius,
                RadialConfig::default(),
                RbpfConfig::new(5.0, 0.0, 2, 64, 3, kmax).expect("valid RBPF config"),
                kmax,
            )
            .expect("RBPF run failed");
            report(&peaks.peaks().iter().map(|p| (p.com_fs, p.com_ss, p.snr)).collect::<Vec<_>>());
        }
        "lwpf" => {
            let peaks = find_peaks_lwpf(
                &layout,
                &data,
                LwpfConfig::new(4, 5.0, 4.0, 6.0, 1.0, 0.0, kmax, false).expect("valid LWPF config"),
                kmax,
            )
            .expect("LWPF run failed");
            report(&peaks.peaks().iter().map(|p| (p.com_fs, p.com_ss, p.snr)).collect::<Vec<_>>());
        }
        other => panic!("unknown algorithm '{}', expected rbpf or lwpf", other),
    }
}

fn radial_distance_from_center(layout: &DetectorLayout) -> Vec<f32> {
    let cx = layout.pix_fs as f32 / 2.0;
    let cy = layout.pix_ss as f32 / 2.0;
    (0..layout.pix_n)
        .map(|p| {
            let (fs, ss) = layout.coords(p);
            ((fs as f32 - cx).powi(2) + (ss as f32 - cy).powi(2)).sqrt()
        })
        .collect()
}

fn report(peaks: &[(f32, f32, f32)]) {
    println!("{} peak(s)", peaks.len());
    for (fs, ss, snr) in peaks {
        println!("  com=({:.2}, {:.2}) snr={:.2}", fs, ss, snr);
    }
}
