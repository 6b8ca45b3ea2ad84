//! Capture software-triggered frames and report timing.
//!
//! Usage: cargo run --example capture [count] [exposure_us]

use std::time::Instant;

use dscam::{FeatureId, PropertyUpdate};

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let count: u32 = args.next().and_then(|a| a.parse().ok()).unwrap_or(10);
    let exposure: Option<i64> = args.next().and_then(|a| a.parse().ok());

    let mut camera = match dscam::open(0, true) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to open camera: {}", e);
            std::process::exit(1);
        }
    };

    if exposure.is_some() {
        let update = PropertyUpdate {
            exposure,
            ..Default::default()
        };
        if let Err(e) = camera.set_properties(&update) {
            eprintln!("Failed to set exposure: {}", e);
            std::process::exit(1);
        }
    }

    match camera.get_properties() {
        Ok(p) => println!(
            "exposure={}us  gain={}  gamma={}  wb={:?}",
            p.exposure, p.gain, p.gamma, p.white_balance
        ),
        Err(e) => eprintln!("Failed to read properties: {}", e),
    }
    if let Ok(format) = camera.get(FeatureId::FORMAT) {
        println!("format={:?}  geometry={:?}", format, camera.geometry());
    }

    let start = Instant::now();
    for _ in 0..count {
        let t = Instant::now();
        match camera.get_image() {
            Ok(frame) => {
                let meta = frame.metadata();
                let centre = frame.pixel(frame.width() / 2, frame.height() / 2);
                println!(
                    "frame={:<6} end_time={:<12} remained={}  {:>7.1} ms  centre={:?}",
                    meta.frame_count,
                    meta.end_time,
                    meta.remained,
                    t.elapsed().as_secs_f64() * 1000.0,
                    centre,
                );
            }
            Err(e) => {
                eprintln!("Capture failed: {}", e);
                break;
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} frames in {:.2}s ({:.2} fps)",
        count,
        elapsed,
        count as f64 / elapsed
    );
    camera.close();
}
