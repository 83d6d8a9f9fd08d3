//! Stream sensor positions to stdout and positions.log.
//!
//! Usage: cargo run --example stream [port] [baud]
//! Press Ctrl+C to stop.

use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let port = args.next().unwrap_or_else(|| "/dev/ttyUSB0".to_string());
    let baud = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(115_200);

    let mut device = match emtrack::Device::connect(&port, baud) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to connect on {}: {}", port, e);
            std::process::exit(1);
        }
    };

    match device.activate_ports() {
        Ok(0) => {
            eprintln!("No sensors attached");
            std::process::exit(1);
        }
        Ok(n) => println!("Tracking {} sensor(s)", n),
        Err(e) => {
            eprintln!("Failed to activate ports: {}", e);
            std::process::exit(1);
        }
    }

    let session = match emtrack::TrackingSession::start(device, "positions.log") {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to start tracking: {}", e);
            std::process::exit(1);
        }
    };

    println!("Streaming positions (Ctrl+C to stop)...");

    let start = Instant::now();
    let mut count: u64 = 0;
    let mut last_report = Instant::now();

    loop {
        match session.recv_timeout(Duration::from_secs(2)) {
            Ok(sample) => {
                count += 1;

                // Print every ~10th sample to avoid flooding the terminal
                if count % 10 == 1 {
                    let p = &sample.positions[0];
                    println!(
                        "frame={:<10}  pos=[{:+9.3}, {:+9.3}, {:+9.3}]  valid={:?}",
                        sample.frame, p[0], p[1], p[2], sample.valid,
                    );
                }

                // Report rate every 3 seconds
                let now = Instant::now();
                if now.duration_since(last_report) >= Duration::from_secs(3) {
                    let elapsed = start.elapsed().as_secs_f64();
                    let hz = count as f64 / elapsed;
                    println!("--- {} samples in {:.1}s ({:.1} Hz) ---", count, elapsed, hz);
                    if session.sensor_broken() {
                        eprintln!("warning: a sensor reported itself broken");
                    }
                    last_report = now;
                }
            }
            Err(emtrack::TrackerError::Timeout) => {
                eprintln!("Timeout waiting for tracking data");
                break;
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }
    }

    let dropped = session.dropped_frames();
    if let Err(e) = session.stop() {
        eprintln!("Failed to stop cleanly: {}", e);
    }

    let elapsed = start.elapsed().as_secs_f64();
    println!(
        "\nTotal: {} samples in {:.1}s ({:.1} Hz), {} dropped",
        count,
        elapsed,
        count as f64 / elapsed,
        dropped
    );
}
