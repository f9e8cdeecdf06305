//! Demo binary: open a capture device, show what it offers and grab a
//! few frames.

use v4l2_capture_core::{Camera, ControlKind, FourCC};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> v4l2_capture_core::Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/video0".to_owned());

    let mut camera = Camera::open(&path)?;

    println!("Device: {}", camera.capabilities().card);
    println!("Driver: {}", camera.capabilities().driver);

    println!("Available pixel formats:");
    for format in camera.list_formats()? {
        println!("  {} - {}", format.fourcc, format.description);
    }

    println!("Available controls:");
    for control in camera.list_controls()? {
        let value = camera
            .control_value(control.id)
            .map_or_else(|_| "?".to_owned(), |value| value.to_string());
        println!("  {} ({:#010x}) = {}", control.name, control.id, value);
        if let ControlKind::Menu { items } = &control.kind {
            for (value, label) in items {
                println!("    {value} => {label}");
            }
        }
    }

    let format = camera.negotiate_format(640, 480, FourCC::YUYV)?;
    println!("Negotiated format: {format}");

    camera.start()?;
    for _ in 0..10 {
        let frame = camera.capture()?;
        println!(
            "Frame {}: {} bytes, timestamp: {:?}",
            frame.metadata.sequence,
            frame.data.len(),
            frame.metadata.timestamp
        );
    }
    camera.stop()?;

    Ok(())
}
