//! Activate every attached sensor and print its tool information.
//!
//! Usage: cargo run --example info [port]

fn main() {
    env_logger::init();

    let port = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/dev/ttyUSB0".to_string());

    let mut device = match emtrack::Device::connect(&port, 115_200) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Failed to connect on {}: {}", port, e);
            std::process::exit(1);
        }
    };

    let sensors = match device.activate_ports() {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Failed to activate ports: {}", e);
            std::process::exit(1);
        }
    };

    println!("Enabled {} sensor(s):", sensors);
    for (handle, state) in device.enabled_handles() {
        println!(
            "  [{:02X}] port={}  type={}  mfr={}  rev={}  serial={}  part={}",
            handle,
            state.port,
            state.info.tool_type.trim_end(),
            state.info.manufacturer.trim_end(),
            state.info.revision.trim_end(),
            state.info.serial_number.trim_end(),
            state.info.part_number.trim_end(),
        );
    }
}
