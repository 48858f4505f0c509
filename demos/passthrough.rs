//! Live passthrough example.
//!
//! Routes the default input device to the default output device for five
//! seconds. Use headphones to avoid feedback.
//!
//! Run with: cargo run --example passthrough --features cpal-backend

use std::time::Duration;

use route_audio::{CpalBackend, Direction, RouteController, RouteStatus};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let controller =
        RouteController::new(CpalBackend::new()).on_event(|e| tracing::info!(?e, "route event"));

    println!("Input devices:");
    for endpoint in controller.list_endpoints(Direction::Capture)? {
        println!("  {}", endpoint.display_name);
    }
    println!("Output devices:");
    for endpoint in controller.list_endpoints(Direction::Render)? {
        println!("  {}", endpoint.display_name);
    }

    // Empty names select the system defaults
    controller.set_gain("mic", 1.0);
    let mut route = controller.start_device_route("", "", true, "mic")?;

    println!("Passing audio through for 5 seconds...");
    tokio::time::sleep(Duration::from_secs(5)).await;

    controller.stop_all();
    match route.finished().await {
        RouteStatus::Failed(e) => eprintln!("Route failed: {e}"),
        status => println!("Route ended: {status:?}"),
    }
    println!("Stats: {:?}", route.stats());

    Ok(())
}
