use std::{f64::consts::PI, fs::File};

use massspring::oscillator::{write_scan_csv, Method, Oscillator};

fn main() -> massspring::Result<()> {
    let oscillator = Oscillator::new(1.0, 1.0)?;
    let taus = [0.1, 0.05, 0.01];

    for method in Method::ALL {
        let samples = oscillator.scan(method, (1.0, 0.0), &taus, 8.0 * PI)?;
        let last = samples.last().expect("scan is not empty");
        println!(
            "{method:>15}: energy {:.6} at t = {:.3}",
            oscillator.energy(last.x, last.v),
            last.t
        );
        write_scan_csv(&samples, File::create(format!("{method}.csv"))?)?;
    }
    Ok(())
}
