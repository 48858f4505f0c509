//! Routing example against scripted endpoints.
//!
//! Runs a device route and a one-shot playback on the mock backend, then
//! stops everything. No audio hardware needed.
//!
//! Run with: cargo run --example mock_route

use std::path::Path;
use std::time::Duration;

use route_audio::{
    Decoder, Direction, MockBackend, MockEndpoint, NativeFormat, PcmBuffer, RouteController,
    RouteError, SampleFormat,
};

/// Generates a short ramp instead of reading a file.
struct RampDecoder;

impl Decoder for RampDecoder {
    fn decode(&self, _path: &Path) -> Result<PcmBuffer, RouteError> {
        let samples: Vec<i16> = (0..22050).map(|i| ((i % 200) * 100) as i16).collect();
        Ok(PcmBuffer::from_i16(&samples, 22050, 1))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "route_audio=debug".into()),
        )
        .init();

    let stereo = NativeFormat::new(48000, 2, SampleFormat::F32);
    let backend = MockBackend::new();
    backend
        .add(
            MockEndpoint::capture("mic", stereo)
                .display_name("Mock Mic")
                .samples(vec![0.5; 960])
                .looping(),
        )
        .add(
            MockEndpoint::render("speakers", NativeFormat::new(44100, 2, SampleFormat::I16))
                .display_name("Mock Speakers")
                .drain_per_wait(441),
        )
        .set_default(Direction::Capture, "mic")
        .set_default(Direction::Render, "speakers");

    let controller = RouteController::new(backend.clone())
        .with_decoder(RampDecoder)
        .on_event(|e| tracing::info!(?e, "route event"));

    controller.set_gain("mic", 0.8);
    controller.init_effect_chain("delay time=50\nreverb intensity=20", 44100)?;

    let mut route = controller.start_device_route("Mock Mic", "Mock Speakers", false, "mic")?;
    let mut playback = controller.start_playback("ramp.wav", "", true)?;

    println!("Playback: {:?}", playback.finished().await);

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("Device route stats: {:?}", route.stats());

    controller.stop_all();
    println!("Device route: {:?}", route.finished().await);

    println!("Samples rendered: {}", backend.rendered("speakers").len());
    println!("Handles still open: {}", backend.open_handles());

    Ok(())
}
