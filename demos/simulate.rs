//! Exercise a full session against the simulated driver.
//!
//! Usage: cargo run --example simulate --features mock

use dscam::mock::MockDriver;
use dscam::{DriverContext, FeatureId, Format, FormatColor, FormatMode, Session, SessionConfig};

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> dscam::Result<()> {
    let mock = MockDriver::new().with_devices(2);
    let ctx = DriverContext::open(mock.clone())?;
    println!("{} simulated camera(s)", ctx.device_count());

    let config = SessionConfig::default()
        .with_default_format(Format::new(FormatColor::RGB24, FormatMode::H2880X2048));
    let mut camera = Session::open(&ctx, 0, config)?;
    println!("geometry={:?}  frame_size={:?}", camera.geometry(), camera.frame_size());

    let confirmed = camera.set(FeatureId::EXPOSURE_TIME, 12_345i64)?;
    println!("exposure requested 12345us, camera confirmed {:?}", confirmed);

    for _ in 0..3 {
        let frame = camera.get_image()?;
        println!(
            "frame {}  {}x{}x{}  first pixel {:?}",
            frame.metadata().frame_count,
            frame.width(),
            frame.height(),
            frame.channels(),
            frame.pixel(0, 0),
        );
    }

    camera.set(
        FeatureId::FORMAT,
        Format::new(FormatColor::MONO16, FormatMode::H1440X1024),
    )?;
    let frame = camera.get_image()?;
    println!("after format change: {:?}", frame.geometry());

    println!("properties: {:?}", camera.get_properties()?);
    camera.close();
    println!(
        "soft triggers={}  open handles={}",
        mock.soft_triggers(),
        mock.open_handles()
    );
    Ok(())
}
