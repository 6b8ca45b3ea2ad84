//! Print the connected cameras and the feature table of the first one.
//!
//! Usage: cargo run --example info [index]

use dscam::{DriverContext, DsCamLibrary, SessionConfig};

fn main() {
    env_logger::init();

    let index: u32 = std::env::args()
        .nth(1)
        .and_then(|a| a.parse().ok())
        .unwrap_or(0);

    let ctx = match DsCamLibrary::load_default().and_then(DriverContext::open) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("{} camera(s) connected", ctx.device_count());
    for (i, dev) in ctx.devices().iter().enumerate() {
        println!(
            "[{}] {} ({:?}{})  serial={}  fw={}  fpga={}  driver={}",
            i,
            dev.camera_name,
            dev.device_type,
            if dev.device_type.is_simulator() { ", simulated" } else { "" },
            dev.serial_number,
            dev.firmware_version,
            dev.fpga_version,
            dev.driver_version,
        );
    }

    let config = SessionConfig::from_env().with_apply_defaults(false);
    let session = match dscam::Session::open(&ctx, index, config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open camera {}: {}", index, e);
            std::process::exit(1);
        }
    };

    println!();
    println!("Geometry:   {:?}", session.geometry());
    println!("Frame size: {:?}", session.frame_size());
    println!();
    for id in session.feature_ids() {
        match session.get(id) {
            Ok(value) => println!("{:<24} {:?}", id.to_string(), value),
            Err(e) => println!("{:<24} <{}>", id.to_string(), e),
        }
        if let Some(desc) = session.descriptor(id) {
            println!("{:<24}   {:?}", "", desc.bounds);
        }
    }
}
