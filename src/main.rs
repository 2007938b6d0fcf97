use braggpeak::{find_peaks_lwpf, DetectorLayout, LwpfConfig};

fn main() {
    let layout = DetectorLayout::new(128, 128, 1, 1).expect("valid demo layout");
    let n = layout.pix_n as usize;

    let mut data = vec![100.0f32; n];
    for p in 0..n {
        let (fs, ss) = layout.coords(p as u32);
        let dx = fs as f32 - 64.0;
        let dy = ss as f32 - 64.0;
        data[p] += 900.0 * (-(dx * dx + dy * dy) / (2.0 * 2.0 * 2.0)).exp();
    }

    let config = LwpfConfig::new(4, 5.0, 4.0, 6.0, 1.0, 0.0, 64, false)
        .expect("valid demo config");

    match find_peaks_lwpf(&layout, &data, config, 64) {
        Ok(peaks) => {
            println!("found {} peak(s)", peaks.len());
            for peak in peaks.peaks() {
                println!(
                    "  com=({:.2}, {:.2}) snr={:.2} pixels={}",
                    peak.com_fs, peak.com_ss, peak.snr, peak.pixel_count
                );
            }
        }
        Err(e) => println!("error: {}", e),
    }
}
